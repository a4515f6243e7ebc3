//! The grid controller: owns one grid's Query State and wires it to the data
//! fetcher, saved-view store, export trigger, and host callbacks.
//!
//! Nothing here fails across the host boundary. Fetch failures end up in the
//! fetch snapshot, saved-view failures become [`Notice`]s, and export
//! failures land in the per-format [`ExportStatus`]. The only `Result` a host
//! sees is from [`GridController::new`], for malformed configuration.

use std::sync::Arc;

use gridline_core::{
    build_view, clamp_page, default_view, flatten_rows, order_views, row_id, ColumnDef, ColumnSet,
    ConfigError, ExportFormat, FilterDescriptor, GridView, NewSavedView, QueryAction, QueryState,
    ReducerContext, RenderInput, Row, SavedView, SortDescriptor,
};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::debounce::SearchDebouncer;
use crate::export::{
    DirectorySink, ExportError, ExportReceipt, ExportSink, ExportStatus, ExportTrigger,
};
use crate::fetcher::{DataFetcher, FetchOutcome, FetchSnapshot};
use crate::transport::{HttpTransport, Transport, TransportError};
use crate::views::{HttpViewStore, ViewStore};

/// Page size used when the host passes zero and strict mode is off.
pub const DEFAULT_PAGE_SIZE: u32 = 25;

// ---------------------------------------------------------------------------
// Host-facing configuration
// ---------------------------------------------------------------------------

/// Callbacks into the page hosting the grid. All default to no-ops.
pub trait GridHost: Send + Sync {
    fn on_row_click(&self, _row: &Row) {}

    /// Called after every selection change with the selected rows that are
    /// on the current page.
    fn on_row_select(&self, _rows: &[Row]) {}

    /// Called after a successful export with the loaded rows flattened
    /// through each column's export renderer. The first row holds labels.
    fn on_export(&self, _format: ExportFormat, _rows: &[Vec<String>]) {}
}

/// Host that ignores every callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHost;

impl GridHost for NoopHost {}

/// Everything the host supplies about one grid.
#[derive(Debug, Clone)]
pub struct GridOptions {
    pub endpoint: String,
    pub table_name: String,
    /// Namespaces the response cache. Defaults to the table name.
    pub query_key: String,
    pub columns: Vec<ColumnDef>,
    pub default_page_size: u32,
    pub default_sort: Vec<SortDescriptor>,
    pub enable_sorting: bool,
    pub enable_multi_sort: bool,
    pub enable_filters: bool,
    pub enable_search: bool,
    pub enable_column_settings: bool,
    pub enable_saved_views: bool,
    pub enable_export: bool,
    pub enable_selection: bool,
    /// Reject malformed configuration instead of repairing it. On by
    /// default in debug builds.
    pub strict: bool,
}

impl GridOptions {
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        table_name: impl Into<String>,
        columns: Vec<ColumnDef>,
    ) -> Self {
        let table_name = table_name.into();
        Self {
            endpoint: endpoint.into(),
            query_key: table_name.clone(),
            table_name,
            columns,
            default_page_size: DEFAULT_PAGE_SIZE,
            default_sort: Vec::new(),
            enable_sorting: true,
            enable_multi_sort: false,
            enable_filters: true,
            enable_search: true,
            enable_column_settings: true,
            enable_saved_views: true,
            enable_export: true,
            enable_selection: true,
            strict: cfg!(debug_assertions),
        }
    }
}

/// The effectful collaborators a controller talks to.
#[derive(Clone)]
pub struct GridServices {
    pub transport: Arc<dyn Transport>,
    pub views: Arc<dyn ViewStore>,
    pub sink: Arc<dyn ExportSink>,
    pub host: Arc<dyn GridHost>,
}

impl GridServices {
    /// HTTP transport, REST saved views, and a download-directory sink, all
    /// from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn http(config: &ClientConfig, host: Arc<dyn GridHost>) -> Result<Self, TransportError> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(config.clone())?);
        Ok(Self {
            views: Arc::new(HttpViewStore::new(
                Arc::clone(&transport),
                config.saved_views_path.clone(),
            )),
            sink: Arc::new(DirectorySink::new(config.download_dir.clone())),
            transport,
            host,
        })
    }
}

/// Severity of a transient notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A transient, one-shot notification for the host to display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Configuration checks
// ---------------------------------------------------------------------------

struct Prepared {
    columns: ColumnSet,
    page_size: u32,
    sorts: Vec<SortDescriptor>,
}

fn prepare(options: &GridOptions) -> Result<Prepared, ConfigError> {
    let columns = if options.strict {
        ColumnSet::new(options.columns.clone())?
    } else {
        ColumnSet::dedup(options.columns.clone())
    };

    let page_size = match options.default_page_size {
        0 if options.strict => return Err(ConfigError::InvalidPageSize),
        0 => {
            warn!(
                table = %options.table_name,
                "default page size is zero, using {DEFAULT_PAGE_SIZE}"
            );
            DEFAULT_PAGE_SIZE
        }
        n => n,
    };

    let mut sorts: Vec<SortDescriptor> = Vec::new();
    for sort in &options.default_sort {
        if !columns.contains(&sort.field) {
            if options.strict {
                return Err(ConfigError::UnknownField {
                    context: "default sort",
                    field: sort.field.clone(),
                });
            }
            warn!(field = %sort.field, "dropping default sort on unknown column");
            continue;
        }
        if sorts.iter().any(|s| s.field == sort.field) {
            warn!(field = %sort.field, "dropping repeated default sort field");
            continue;
        }
        sorts.push(sort.clone());
    }
    if !options.enable_multi_sort && sorts.len() > 1 {
        warn!(
            table = %options.table_name,
            "multi-sort disabled, keeping only the first default sort"
        );
        sorts.truncate(1);
    }

    Ok(Prepared {
        columns,
        page_size,
        sorts,
    })
}

// ---------------------------------------------------------------------------
// GridController
// ---------------------------------------------------------------------------

/// Headless controller for one server-driven grid.
pub struct GridController {
    options: GridOptions,
    columns: ColumnSet,
    state: Mutex<QueryState>,
    fetcher: DataFetcher,
    exporter: ExportTrigger,
    views: Arc<dyn ViewStore>,
    saved_views: Mutex<Vec<SavedView>>,
    host: Arc<dyn GridHost>,
    notices: Mutex<Vec<Notice>>,
    debouncer: SearchDebouncer,
}

impl GridController {
    /// Creates a controller with its initial Query State. No request is
    /// made until [`mount`](Self::mount) or another operation runs.
    ///
    /// # Errors
    ///
    /// In strict mode, returns [`ConfigError`] for duplicate column keys, a
    /// zero default page size, or a default sort on an unknown column.
    pub fn new(
        options: GridOptions,
        services: GridServices,
        config: &ClientConfig,
    ) -> Result<Self, ConfigError> {
        let Prepared {
            columns,
            page_size,
            sorts,
        } = prepare(&options)?;
        let state = QueryState::initial(&columns, page_size, sorts);
        let fetcher = DataFetcher::new(
            Arc::clone(&services.transport),
            options.endpoint.clone(),
            options.query_key.clone(),
            config.cache_capacity,
        );
        let exporter = ExportTrigger::new(
            services.transport,
            &options.endpoint,
            options.table_name.clone(),
            services.sink,
        );
        Ok(Self {
            columns,
            state: Mutex::new(state),
            fetcher,
            exporter,
            views: services.views,
            saved_views: Mutex::new(Vec::new()),
            host: services.host,
            notices: Mutex::new(Vec::new()),
            debouncer: SearchDebouncer::new(config.search_debounce),
            options,
        })
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.options.table_name
    }

    #[must_use]
    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    #[must_use]
    pub fn state(&self) -> QueryState {
        self.state.lock().clone()
    }

    #[must_use]
    pub fn fetch_status(&self) -> FetchSnapshot {
        self.fetcher.snapshot()
    }

    /// Drains pending notifications.
    pub fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock())
    }

    fn notify(&self, level: NoticeLevel, message: String) {
        self.notices.lock().push(Notice { level, message });
    }

    fn ctx(&self) -> ReducerContext<'_> {
        ReducerContext {
            columns: &self.columns,
            multi_sort: self.options.enable_multi_sort,
        }
    }

    fn dispatch(&self, action: QueryAction) -> QueryState {
        let mut state = self.state.lock();
        state.apply(action, &self.ctx());
        state.clone()
    }

    /// Applies `action` and reserves a fetch sequence number under the same
    /// lock, so fetch order always matches state order.
    fn dispatch_with_ticket(&self, action: Option<QueryAction>) -> (QueryState, u64) {
        let mut state = self.state.lock();
        if let Some(action) = action {
            state.apply(action, &self.ctx());
        }
        (state.clone(), self.fetcher.begin())
    }

    async fn dispatch_and_fetch(&self, action: QueryAction) -> FetchOutcome {
        let (snapshot, seq) = self.dispatch_with_ticket(Some(action));
        self.fetcher.fetch_as(seq, &snapshot).await
    }

    fn check_filter_fields(&self, filters: &[FilterDescriptor]) {
        for f in filters {
            if !self.columns.contains(&f.field) {
                warn!(field = %f.field, "filter references a column the grid does not define");
            }
        }
    }

    // ---- data ----

    /// Loads saved views, applies the default one if present, and fetches
    /// the first page.
    pub async fn mount(&self) -> FetchOutcome {
        if self.options.enable_saved_views {
            self.reload_views().await;
            let default = default_view(&self.saved_views.lock()).cloned();
            if let Some(view) = default {
                debug!(view = %view.name, "applying default saved view");
                self.dispatch(QueryAction::ApplyView(view.config));
            }
        }
        self.refresh().await
    }

    /// Fetches the current state. Served from cache while the displayed page
    /// is still current.
    pub async fn refresh(&self) -> FetchOutcome {
        let (snapshot, seq) = self.dispatch_with_ticket(None);
        self.fetcher.fetch_as(seq, &snapshot).await
    }

    /// Drops cached pages and fetches the current state again.
    pub async fn reload(&self) -> FetchOutcome {
        self.fetcher.invalidate();
        self.refresh().await
    }

    // ---- sorting ----

    pub async fn toggle_sort(&self, field: &str) -> Option<FetchOutcome> {
        if !self.options.enable_sorting {
            return None;
        }
        Some(
            self.dispatch_and_fetch(QueryAction::ToggleSort(field.to_string()))
                .await,
        )
    }

    // ---- filtering ----

    pub async fn set_filters(&self, filters: Vec<FilterDescriptor>) -> Option<FetchOutcome> {
        if !self.options.enable_filters {
            return None;
        }
        self.check_filter_fields(&filters);
        Some(self.dispatch_and_fetch(QueryAction::SetFilters(filters)).await)
    }

    pub async fn add_filter(&self, filter: FilterDescriptor) -> Option<FetchOutcome> {
        if !self.options.enable_filters {
            return None;
        }
        self.check_filter_fields(std::slice::from_ref(&filter));
        Some(self.dispatch_and_fetch(QueryAction::AddFilter(filter)).await)
    }

    pub async fn remove_filter_at(&self, index: usize) -> Option<FetchOutcome> {
        if !self.options.enable_filters {
            return None;
        }
        Some(self.dispatch_and_fetch(QueryAction::RemoveFilterAt(index)).await)
    }

    pub async fn clear_filters(&self) -> Option<FetchOutcome> {
        if !self.options.enable_filters {
            return None;
        }
        Some(self.dispatch_and_fetch(QueryAction::ClearFilters).await)
    }

    // ---- search ----

    /// Commits search text immediately.
    pub async fn set_search(&self, text: &str) -> Option<FetchOutcome> {
        if !self.options.enable_search {
            return None;
        }
        Some(
            self.dispatch_and_fetch(QueryAction::SetSearch(text.to_string()))
                .await,
        )
    }

    /// Commits search text after the debounce period, unless newer input
    /// arrives first. Returns `None` for overtaken input.
    pub async fn type_search(&self, text: &str) -> Option<FetchOutcome> {
        if !self.options.enable_search {
            return None;
        }
        let settled = self.debouncer.settle(text.to_string()).await?;
        self.set_search(&settled).await
    }

    // ---- pagination ----

    /// Moves to page `page`, clamped to the last known page count.
    pub async fn set_page(&self, page: u32) -> FetchOutcome {
        let page = match self.fetcher.current() {
            Some(resp) => clamp_page(page, resp.total_pages),
            None => page.max(1),
        };
        self.dispatch_and_fetch(QueryAction::SetPage(page)).await
    }

    pub async fn next_page(&self) -> FetchOutcome {
        let page = self.state.lock().page;
        self.set_page(page.saturating_add(1)).await
    }

    pub async fn prev_page(&self) -> FetchOutcome {
        let page = self.state.lock().page;
        self.set_page(page.saturating_sub(1)).await
    }

    pub async fn set_page_size(&self, page_size: u32) -> FetchOutcome {
        self.dispatch_and_fetch(QueryAction::SetPageSize(page_size)).await
    }

    // ---- columns ----

    /// Shows or hides a column. Keeps the current page but refetches, since
    /// the `columns` parameter changes.
    pub async fn toggle_column(&self, key: &str) -> Option<FetchOutcome> {
        if !self.options.enable_column_settings {
            return None;
        }
        Some(
            self.dispatch_and_fetch(QueryAction::ToggleColumn(key.to_string()))
                .await,
        )
    }

    // ---- selection and row events ----

    fn notify_selection(&self) {
        let Some(page) = self.fetcher.current() else {
            self.host.on_row_select(&[]);
            return;
        };
        let selected: Vec<Row> = {
            let state = self.state.lock();
            page.data
                .iter()
                .filter(|row| row_id(row).is_some_and(|id| state.is_selected(&id)))
                .cloned()
                .collect()
        };
        self.host.on_row_select(&selected);
    }

    pub fn select_row(&self, id: &str, selected: bool) {
        if !self.options.enable_selection {
            return;
        }
        self.dispatch(QueryAction::SelectRow {
            id: id.to_string(),
            selected,
        });
        self.notify_selection();
    }

    /// Selects or deselects every row on the currently loaded page. Rows on
    /// other pages are not affected.
    pub fn select_all(&self, selected: bool) {
        if !self.options.enable_selection {
            return;
        }
        let page_ids = self
            .fetcher
            .current()
            .map(|resp| resp.row_ids())
            .unwrap_or_default();
        self.dispatch(QueryAction::SelectAll { selected, page_ids });
        self.notify_selection();
    }

    pub fn clear_selection(&self) {
        if !self.options.enable_selection {
            return;
        }
        self.dispatch(QueryAction::ClearSelection);
        self.notify_selection();
    }

    /// Forwards a click on a row of the current page to the host.
    pub fn row_click(&self, id: &str) {
        let Some(page) = self.fetcher.current() else {
            return;
        };
        match page.find_row(id) {
            Some(row) => self.host.on_row_click(row),
            None => debug!(id, "click on a row that is not on the current page"),
        }
    }

    // ---- saved views ----

    #[must_use]
    pub fn saved_views(&self) -> Vec<SavedView> {
        self.saved_views.lock().clone()
    }

    /// Reloads the saved-view list. On failure the old list is kept.
    pub async fn reload_views(&self) {
        if !self.options.enable_saved_views {
            return;
        }
        match self.views.list(&self.options.table_name).await {
            Ok(views) => *self.saved_views.lock() = order_views(views),
            Err(e) => {
                warn!(table = %self.options.table_name, error = %e, "failed to load saved views");
                self.notify(NoticeLevel::Error, format!("Could not load saved views: {e}"));
            }
        }
    }

    /// Saves the current state (minus page and selection) as a named view.
    pub async fn save_view(
        &self,
        name: &str,
        is_default: bool,
        is_public: bool,
    ) -> Option<SavedView> {
        if !self.options.enable_saved_views {
            return None;
        }
        let view = NewSavedView {
            table_name: self.options.table_name.clone(),
            name: name.trim().to_string(),
            is_default,
            is_public,
            config: self.state.lock().snapshot(),
        };
        match self.views.save(view).await {
            Ok(saved) => {
                {
                    let mut list = self.saved_views.lock();
                    if saved.is_default {
                        for v in list.iter_mut() {
                            v.is_default = false;
                        }
                    }
                    list.retain(|v| v.id != saved.id);
                    list.push(saved.clone());
                    let reordered = order_views(std::mem::take(&mut *list));
                    *list = reordered;
                }
                self.notify(NoticeLevel::Info, format!("Saved view \"{}\"", saved.name));
                Some(saved)
            }
            Err(e) => {
                warn!(table = %self.options.table_name, error = %e, "failed to save view");
                self.notify(NoticeLevel::Error, format!("Could not save view: {e}"));
                None
            }
        }
    }

    /// Applies a saved view and fetches its first page.
    pub async fn apply_view(&self, view: &SavedView) -> FetchOutcome {
        self.dispatch_and_fetch(QueryAction::ApplyView(view.config.clone()))
            .await
    }

    /// Applies the saved view with id `view_id` from the loaded list.
    pub async fn load_view(&self, view_id: &str) -> Option<FetchOutcome> {
        if !self.options.enable_saved_views {
            return None;
        }
        let view = self
            .saved_views
            .lock()
            .iter()
            .find(|v| v.id == view_id)
            .cloned();
        match view {
            Some(view) => Some(self.apply_view(&view).await),
            None => {
                debug!(view_id, "load requested for unknown view");
                None
            }
        }
    }

    pub async fn delete_view(&self, view_id: &str) -> bool {
        if !self.options.enable_saved_views {
            return false;
        }
        match self.views.delete(view_id).await {
            Ok(()) => {
                self.saved_views.lock().retain(|v| v.id != view_id);
                true
            }
            Err(e) => {
                warn!(view_id, error = %e, "failed to delete view");
                self.notify(NoticeLevel::Error, format!("Could not delete view: {e}"));
                false
            }
        }
    }

    // ---- export ----

    #[must_use]
    pub fn export_status(&self, format: ExportFormat) -> ExportStatus {
        self.exporter.status(format)
    }

    /// Whether the export trigger for `format` should be enabled.
    #[must_use]
    pub fn can_export(&self, format: ExportFormat) -> bool {
        self.options.enable_export && !self.exporter.is_exporting(format)
    }

    /// Exports the full result set for the current state.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Disabled`] or [`ExportError::InFlight`] without
    /// making a request. Request and sink failures are also recorded in
    /// [`export_status`](Self::export_status) and as an error [`Notice`].
    pub async fn export(&self, format: ExportFormat) -> Result<ExportReceipt, ExportError> {
        if !self.options.enable_export {
            return Err(ExportError::Disabled);
        }
        if self.exporter.is_exporting(format) {
            debug!(%format, "export already running");
            return Err(ExportError::InFlight(format));
        }
        let snapshot = self.state();
        match self.exporter.export(&snapshot, format).await {
            Ok(receipt) => {
                let rows = self
                    .fetcher
                    .current()
                    .map(|resp| resp.data.clone())
                    .unwrap_or_default();
                let flat = flatten_rows(&self.columns, &snapshot.visible_columns, &rows);
                self.host.on_export(format, &flat);
                Ok(receipt)
            }
            Err(e) => {
                self.notify(NoticeLevel::Error, format!("Export failed: {e}"));
                Err(e)
            }
        }
    }

    // ---- rendering ----

    /// Builds the render model for the current state and last displayed page.
    #[must_use]
    pub fn view(&self) -> GridView {
        let fetch = self.fetcher.snapshot();
        let state = self.state();
        build_view(RenderInput {
            columns: &self.columns,
            state: &state,
            response: fetch.data.as_deref(),
            loading: fetch.loading,
            error: fetch.error.as_deref(),
            multi_sort: self.options.enable_multi_sort,
        })
    }
}
