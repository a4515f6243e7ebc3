//! Query State and its reducer.
//!
//! The reducer is a set of total, synchronous transformations. Any action
//! that changes which rows the server returns (sort, filter, search, page
//! size, applying a saved view) resets `page` to 1. Selection, page
//! navigation, and column toggles leave every other field alone.
//!
//! Debouncing search input and clamping page numbers to the last known
//! `total_pages` are the caller's job; the reducer knows neither timing nor
//! totals.

use serde::{Deserialize, Serialize};

use crate::column::ColumnSet;
use crate::query::{FilterDescriptor, SortDescriptor, SortDirection};
use crate::view::ViewConfig;

/// Everything that describes what a grid currently displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryState {
    pub page: u32,
    pub page_size: u32,
    pub sorts: Vec<SortDescriptor>,
    pub filters: Vec<FilterDescriptor>,
    pub search: String,
    pub visible_columns: Vec<String>,
    pub selected_row_ids: Vec<String>,
}

/// A discrete user interaction, dispatched through [`QueryState::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryAction {
    ToggleSort(String),
    SetFilters(Vec<FilterDescriptor>),
    AddFilter(FilterDescriptor),
    RemoveFilterAt(usize),
    ClearFilters,
    SetSearch(String),
    SetPage(u32),
    SetPageSize(u32),
    ToggleColumn(String),
    SelectRow { id: String, selected: bool },
    SelectAll { selected: bool, page_ids: Vec<String> },
    ClearSelection,
    ApplyView(ViewConfig),
}

impl QueryAction {
    /// Whether this action changes result membership and therefore resets
    /// the page.
    #[must_use]
    pub fn resets_page(&self) -> bool {
        matches!(
            self,
            Self::ToggleSort(_)
                | Self::SetFilters(_)
                | Self::AddFilter(_)
                | Self::RemoveFilterAt(_)
                | Self::ClearFilters
                | Self::SetSearch(_)
                | Self::SetPageSize(_)
                | Self::ApplyView(_)
        )
    }
}

/// What the reducer needs to know about the host configuration.
#[derive(Debug, Clone, Copy)]
pub struct ReducerContext<'a> {
    pub columns: &'a ColumnSet,
    pub multi_sort: bool,
}

impl QueryState {
    /// Creates the initial state for a freshly mounted grid.
    ///
    /// A zero page size is coerced to 1.
    #[must_use]
    pub fn initial(columns: &ColumnSet, page_size: u32, sorts: Vec<SortDescriptor>) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
            sorts,
            filters: Vec::new(),
            search: String::new(),
            visible_columns: columns.default_visible(),
            selected_row_ids: Vec::new(),
        }
    }

    /// Applies one action in place.
    pub fn apply(&mut self, action: QueryAction, ctx: &ReducerContext<'_>) {
        let resets_page = action.resets_page();
        match action {
            QueryAction::ToggleSort(field) => self.toggle_sort(&field, ctx),
            QueryAction::SetFilters(list) => self.filters = list,
            QueryAction::AddFilter(filter) => self.filters.push(filter),
            QueryAction::RemoveFilterAt(index) => {
                if index < self.filters.len() {
                    self.filters.remove(index);
                }
            }
            QueryAction::ClearFilters => self.filters.clear(),
            QueryAction::SetSearch(text) => self.search = text.trim().to_string(),
            QueryAction::SetPage(page) => self.page = page.max(1),
            QueryAction::SetPageSize(size) => self.page_size = size.max(1),
            QueryAction::ToggleColumn(key) => self.toggle_column(&key, ctx.columns),
            QueryAction::SelectRow { id, selected } => self.select_row(id, selected),
            QueryAction::SelectAll { selected, page_ids } => {
                for id in page_ids {
                    self.select_row(id, selected);
                }
            }
            QueryAction::ClearSelection => self.selected_row_ids.clear(),
            QueryAction::ApplyView(config) => self.apply_view(config, ctx.columns),
        }
        if resets_page {
            self.page = 1;
        }
    }

    /// Asc → desc → removed, in place. Non-sortable and unknown fields are
    /// ignored.
    fn toggle_sort(&mut self, field: &str, ctx: &ReducerContext<'_>) {
        if !ctx.columns.is_sortable(field) {
            tracing::debug!(field, "ignoring sort toggle on non-sortable column");
            return;
        }
        match self.sorts.iter().position(|s| s.field == field) {
            None => {
                if ctx.multi_sort {
                    self.sorts.push(SortDescriptor::asc(field));
                } else {
                    self.sorts = vec![SortDescriptor::asc(field)];
                }
            }
            Some(pos) => {
                let next = match self.sorts[pos].direction {
                    SortDirection::Asc => Some(SortDirection::Desc),
                    SortDirection::Desc => None,
                };
                if ctx.multi_sort {
                    match next {
                        Some(direction) => self.sorts[pos].direction = direction,
                        None => {
                            self.sorts.remove(pos);
                        }
                    }
                } else {
                    self.sorts = next
                        .map(|direction| SortDescriptor {
                            field: field.to_string(),
                            direction,
                        })
                        .into_iter()
                        .collect();
                }
            }
        }
    }

    fn toggle_column(&mut self, key: &str, columns: &ColumnSet) {
        if !columns.contains(key) {
            return;
        }
        if self.visible_columns.iter().any(|k| k == key) {
            self.visible_columns.retain(|k| k != key);
        } else {
            self.visible_columns.push(key.to_string());
            self.visible_columns = columns.normalize_keys(&self.visible_columns);
        }
    }

    fn select_row(&mut self, id: String, selected: bool) {
        let present = self.selected_row_ids.contains(&id);
        if selected && !present {
            self.selected_row_ids.push(id);
        } else if !selected && present {
            self.selected_row_ids.retain(|s| s != &id);
        }
    }

    fn apply_view(&mut self, config: ViewConfig, columns: &ColumnSet) {
        self.visible_columns = columns.normalize_keys(&config.columns);
        self.sorts = config.sorts;
        self.filters = config.filters;
        self.page_size = config.page_size.max(1);
        self.search = config.search;
        self.selected_row_ids.clear();
    }

    /// The persisted part of this state, as stored in a saved view.
    #[must_use]
    pub fn snapshot(&self) -> ViewConfig {
        ViewConfig {
            columns: self.visible_columns.clone(),
            sorts: self.sorts.clone(),
            filters: self.filters.clone(),
            page_size: self.page_size,
            search: self.search.clone(),
        }
    }

    #[must_use]
    pub fn is_selected(&self, id: &str) -> bool {
        self.selected_row_ids.iter().any(|s| s == id)
    }

    /// Sort state of `field`: direction and 1-based priority.
    #[must_use]
    pub fn sort_of(&self, field: &str) -> Option<(SortDirection, usize)> {
        self.sorts
            .iter()
            .position(|s| s.field == field)
            .map(|pos| (self.sorts[pos].direction, pos + 1))
    }
}
