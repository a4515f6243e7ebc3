//! Headless render model.
//!
//! [`build_view`] turns the current Query State, the last displayed
//! [`TableResponse`], and fetch status into a [`GridView`] that a UI layer
//! paints directly: header cells with sort indicators, rendered body rows,
//! filter chips, pagination controls, the column-settings panel, and the
//! selection summary for the current page.

use crate::column::{Cell, ColumnSet};
use crate::query::{row_id, FilterDescriptor, SortDirection, TableResponse};
use crate::state::QueryState;

/// Number of page buttons shown around the current page.
pub const PAGE_WINDOW: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderCell {
    pub key: String,
    pub label: String,
    pub width: Option<u16>,
    pub sortable: bool,
    pub sort: Option<SortDirection>,
    /// 1-based sort priority, only set in multi-sort mode.
    pub priority: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BodyRow {
    pub id: Option<String>,
    pub selected: bool,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChip {
    /// Position in the filter list, for `remove_filter_at`.
    pub index: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnToggle {
    pub key: String,
    pub label: String,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub total_count: u64,
    /// 1-based index of the first row on the page, 0 when there are no rows.
    pub first_row: u64,
    pub last_row: u64,
    pub has_prev: bool,
    pub has_next: bool,
    pub window: Vec<u32>,
}

/// Selection state of the rows on the current page, for the header checkbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSummary {
    None,
    Some,
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridView {
    pub headers: Vec<HeaderCell>,
    pub rows: Vec<BodyRow>,
    pub chips: Vec<FilterChip>,
    pub columns_panel: Vec<ColumnToggle>,
    pub pagination: Option<Pagination>,
    pub selection: SelectionSummary,
    pub selected_count: usize,
    pub search: String,
    pub loading: bool,
    pub error: Option<String>,
}

/// Everything [`build_view`] reads.
#[derive(Debug, Clone, Copy)]
pub struct RenderInput<'a> {
    pub columns: &'a ColumnSet,
    pub state: &'a QueryState,
    pub response: Option<&'a TableResponse>,
    pub loading: bool,
    pub error: Option<&'a str>,
    pub multi_sort: bool,
}

/// Clamps a requested page to `[1, total_pages]`. With no pages at all the
/// only valid page is 1.
#[must_use]
pub fn clamp_page(page: u32, total_pages: u32) -> u32 {
    page.clamp(1, total_pages.max(1))
}

/// Page numbers to show around `page`, at most [`PAGE_WINDOW`] of them.
#[must_use]
pub fn page_window(page: u32, total_pages: u32) -> Vec<u32> {
    let total = total_pages.max(1);
    let page = clamp_page(page, total);
    let span = PAGE_WINDOW.min(total);
    let half = span / 2;
    let start = page.saturating_sub(half).max(1).min(total - span + 1);
    (start..start + span).collect()
}

impl Pagination {
    #[must_use]
    pub fn from_response(resp: &TableResponse) -> Self {
        let page = resp.page.max(1);
        let size = u64::from(resp.page_size.max(1));
        let (first_row, last_row) = if resp.total_count == 0 {
            (0, 0)
        } else {
            let first = u64::from(page - 1) * size + 1;
            let last = (u64::from(page) * size).min(resp.total_count);
            (first.min(resp.total_count), last)
        };
        Self {
            page,
            page_size: resp.page_size,
            total_pages: resp.total_pages,
            total_count: resp.total_count,
            first_row,
            last_row,
            has_prev: page > 1,
            has_next: page < resp.total_pages,
            window: page_window(page, resp.total_pages),
        }
    }
}

/// Chip text: the filter's own label when set, otherwise
/// `"{column label} {operator} {value}"`.
#[must_use]
pub fn chip_text(columns: &ColumnSet, filter: &FilterDescriptor) -> String {
    if let Some(label) = &filter.label {
        return label.clone();
    }
    let field = columns
        .get(&filter.field)
        .map_or(filter.field.as_str(), |c| c.label.as_str());
    if filter.operator.is_unary() {
        return format!("{field} {}", filter.operator.symbol());
    }
    let value = match &filter.value {
        serde_json::Value::Array(items) => items
            .iter()
            .map(crate::column::plain_text)
            .collect::<Vec<_>>()
            .join(", "),
        other => crate::column::plain_text(other),
    };
    format!("{field} {} {value}", filter.operator.symbol())
}

/// Builds the render model.
#[must_use]
pub fn build_view(input: RenderInput<'_>) -> GridView {
    let RenderInput {
        columns,
        state,
        response,
        loading,
        error,
        multi_sort,
    } = input;

    let visible = columns.resolve(&state.visible_columns);

    let headers = visible
        .iter()
        .map(|col| {
            let sort = state.sort_of(&col.key);
            HeaderCell {
                key: col.key.clone(),
                label: col.label.clone(),
                width: col.width,
                sortable: col.sortable,
                sort: sort.map(|(d, _)| d),
                priority: if multi_sort { sort.map(|(_, p)| p) } else { None },
            }
        })
        .collect();

    let rows: Vec<BodyRow> = response
        .map(|resp| {
            resp.data
                .iter()
                .map(|row| {
                    let id = row_id(row);
                    BodyRow {
                        selected: id.as_deref().is_some_and(|id| state.is_selected(id)),
                        id,
                        cells: visible.iter().map(|c| c.render_cell(row)).collect(),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let selectable: Vec<&BodyRow> = rows.iter().filter(|r| r.id.is_some()).collect();
    let on_page = selectable.iter().filter(|r| r.selected).count();
    let selection = if on_page == 0 {
        SelectionSummary::None
    } else if on_page == selectable.len() {
        SelectionSummary::All
    } else {
        SelectionSummary::Some
    };

    GridView {
        headers,
        rows,
        chips: state
            .filters
            .iter()
            .enumerate()
            .map(|(index, f)| FilterChip {
                index,
                text: chip_text(columns, f),
            })
            .collect(),
        columns_panel: columns
            .iter()
            .map(|c| ColumnToggle {
                key: c.key.clone(),
                label: c.label.clone(),
                visible: state.visible_columns.iter().any(|k| k == &c.key),
            })
            .collect(),
        pagination: response.map(Pagination::from_response),
        selection,
        selected_count: state.selected_row_ids.len(),
        search: state.search.clone(),
        loading,
        error: error.map(str::to_string),
    }
}
