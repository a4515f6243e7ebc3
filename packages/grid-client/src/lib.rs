//! Gridline client: the effectful half of a server-driven data grid.
//!
//! [`GridController`] owns a grid's Query State and coordinates:
//!
//! - [`fetcher`]: paged requests with a content-addressed cache and
//!   last-dispatched-wins ordering
//! - [`views`]: saved-view persistence behind the [`ViewStore`] seam
//! - [`export`]: per-format CSV/PDF export state machines
//! - [`debounce`]: search input debouncing
//!
//! Pure state, encoding, and rendering live in `gridline-core`.

pub mod config;
pub mod controller;
pub mod debounce;
pub mod export;
pub mod fetcher;
pub mod transport;
pub mod views;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ClientConfig;
pub use controller::{
    GridController, GridHost, GridOptions, GridServices, NoopHost, Notice, NoticeLevel,
    DEFAULT_PAGE_SIZE,
};
pub use debounce::SearchDebouncer;
pub use export::{
    DirectorySink, ExportError, ExportReceipt, ExportSink, ExportStatus, ExportTrigger,
};
pub use fetcher::{DataFetcher, FetchError, FetchOutcome, FetchSnapshot};
pub use transport::{HttpTransport, Transport, TransportError};
pub use views::{HttpViewStore, MemoryViewStore, ViewError, ViewStore};
