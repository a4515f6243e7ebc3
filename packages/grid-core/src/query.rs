//! Sort, filter, and response types exchanged with the tabular endpoint.
//!
//! All structs use `#[serde(rename_all = "camelCase")]` so the JSON they
//! produce matches what the paginated-query endpoint expects and returns.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An opaque table row. The only field the grid relies on is `id`.
pub type Row = serde_json::Map<String, Value>;

/// Extracts the row identifier as a string.
///
/// String ids are returned as-is and numeric ids are rendered in decimal.
/// Any other shape (missing, null, object) yields `None`.
#[must_use]
pub fn row_id(row: &Row) -> Option<String> {
    match row.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

/// Sort direction for a single column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// Wire representation (`"asc"` / `"desc"`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// One entry of the ordered sort list. Priority is the list position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortDescriptor {
    pub field: String,
    pub direction: SortDirection,
}

impl SortDescriptor {
    #[must_use]
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    #[must_use]
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Predicate operators understood by the tabular endpoint.
///
/// The client never evaluates these; it only serializes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    Contains,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl FilterOperator {
    /// Wire representation, e.g. `"not_in"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Contains => "contains",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::IsNull => "is_null",
            Self::IsNotNull => "is_not_null",
        }
    }

    /// Short human-readable symbol used in filter chips.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Contains => "contains",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::IsNull => "is empty",
            Self::IsNotNull => "is not empty",
        }
    }

    /// Whether the operator ignores its value (`is_null`, `is_not_null`).
    #[must_use]
    pub fn is_unary(self) -> bool {
        matches!(self, Self::IsNull | Self::IsNotNull)
    }
}

/// A single predicate. Filters in a list are ANDed by the server.
///
/// `label` is a client-side display override and is never sent to the
/// tabular endpoint, though it is kept in saved views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDescriptor {
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub label: Option<String>,
}

impl FilterDescriptor {
    #[must_use]
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
            label: None,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// One page of results returned by the tabular endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableResponse {
    pub data: Vec<Row>,
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl TableResponse {
    /// Ids of the rows on this page, in display order. Rows without a
    /// usable id are skipped.
    #[must_use]
    pub fn row_ids(&self) -> Vec<String> {
        self.data.iter().filter_map(row_id).collect()
    }

    /// Finds a row on this page by id.
    #[must_use]
    pub fn find_row(&self, id: &str) -> Option<&Row> {
        self.data
            .iter()
            .find(|row| row_id(row).as_deref() == Some(id))
    }
}
