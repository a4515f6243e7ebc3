//! Gridline core: column definitions, Query State reducer, wire encoding,
//! and the headless render model for server-driven data grids.

pub mod column;
pub mod error;
pub mod export;
pub mod params;
pub mod query;
pub mod render;
pub mod state;
pub mod view;

pub use column::{Cell, CellRenderer, ColumnDef, ColumnSet, ColumnType, DefaultRenderer};
pub use error::ConfigError;
pub use export::{export_file_name, flatten_rows, ExportFormat};
pub use params::{cache_key, encode_export, encode_query, QueryParams};
pub use query::{
    row_id, FilterDescriptor, FilterOperator, Row, SortDescriptor, SortDirection, TableResponse,
};
pub use render::{build_view, clamp_page, GridView, RenderInput, SelectionSummary};
pub use state::{QueryAction, QueryState, ReducerContext};
pub use view::{default_view, order_views, NewSavedView, SavedView, ViewConfig};
