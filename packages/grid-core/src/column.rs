//! Column definitions and the cell rendering strategy.
//!
//! Column definitions are supplied by the host once and never change for the
//! lifetime of a grid. Each column may carry a [`CellRenderer`] that turns a
//! raw JSON value into a display [`Cell`] and into a flat export string.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;
use crate::query::Row;

/// Semantic type of a column, used to pick the default cell rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    Text,
    Number,
    Date,
    Boolean,
    Badge,
    Currency,
}

/// A rendered table cell. The UI layer decides how each variant is painted.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(String),
    Date(String),
    Bool(bool),
    Badge(String),
    Currency(String),
}

impl Cell {
    /// Plain-text form of the cell, as a terminal or screen reader would show it.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s)
            | Self::Number(s)
            | Self::Date(s)
            | Self::Badge(s)
            | Self::Currency(s) => s.clone(),
            Self::Bool(true) => "Yes".to_string(),
            Self::Bool(false) => "No".to_string(),
        }
    }
}

/// Converts a JSON value to its plain string form.
///
/// `null` becomes the empty string, strings are unquoted, everything else
/// uses its compact JSON rendering.
#[must_use]
pub fn plain_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Default rendering for a value of the given column type.
#[must_use]
pub fn default_cell(column_type: ColumnType, value: &Value) -> Cell {
    if value.is_null() {
        return Cell::Empty;
    }
    match column_type {
        ColumnType::Text => Cell::Text(plain_text(value)),
        ColumnType::Number => Cell::Number(plain_text(value)),
        ColumnType::Date => Cell::Date(plain_text(value)),
        ColumnType::Badge => Cell::Badge(plain_text(value)),
        ColumnType::Boolean => match value {
            Value::Bool(b) => Cell::Bool(*b),
            Value::String(s) => Cell::Bool(matches!(s.as_str(), "true" | "1" | "yes")),
            Value::Number(n) => Cell::Bool(n.as_f64().is_some_and(|f| f != 0.0)),
            _ => Cell::Text(plain_text(value)),
        },
        ColumnType::Currency => match value.as_f64() {
            Some(amount) => Cell::Currency(format!("{amount:.2}")),
            None => match value.as_str().and_then(|s| s.parse::<f64>().ok()) {
                Some(amount) => Cell::Currency(format!("{amount:.2}")),
                None => Cell::Text(plain_text(value)),
            },
        },
    }
}

/// Rendering strategy for a column's cells.
///
/// Both methods have defaults, so implementors override only what they need.
/// `export_render` deliberately does not go through `render`: flat-file
/// output keeps the raw value unless told otherwise.
pub trait CellRenderer: Send + Sync {
    /// Renders a cell for display.
    fn render(&self, column_type: ColumnType, value: &Value, _row: &Row) -> Cell {
        default_cell(column_type, value)
    }

    /// Renders a cell for CSV/PDF export.
    fn export_render(&self, value: &Value, _row: &Row) -> String {
        plain_text(value)
    }
}

/// Renderer that uses only the defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRenderer;

impl CellRenderer for DefaultRenderer {}

// ---------------------------------------------------------------------------
// ColumnDef
// ---------------------------------------------------------------------------

/// Declarative description of one table column.
#[derive(Clone)]
pub struct ColumnDef {
    pub key: String,
    pub label: String,
    pub sortable: bool,
    pub default_visible: bool,
    pub width: Option<u16>,
    pub column_type: ColumnType,
    renderer: Option<Arc<dyn CellRenderer>>,
}

impl fmt::Debug for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDef")
            .field("key", &self.key)
            .field("label", &self.label)
            .field("sortable", &self.sortable)
            .field("default_visible", &self.default_visible)
            .field("width", &self.width)
            .field("column_type", &self.column_type)
            .field("custom_renderer", &self.renderer.is_some())
            .finish()
    }
}

impl ColumnDef {
    /// Creates a sortable, visible text column.
    #[must_use]
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            sortable: true,
            default_visible: true,
            width: None,
            column_type: ColumnType::Text,
            renderer: None,
        }
    }

    #[must_use]
    pub fn typed(mut self, column_type: ColumnType) -> Self {
        self.column_type = column_type;
        self
    }

    #[must_use]
    pub fn sortable(mut self, sortable: bool) -> Self {
        self.sortable = sortable;
        self
    }

    /// Marks the column as hidden until the user enables it.
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.default_visible = false;
        self
    }

    #[must_use]
    pub fn width(mut self, width: u16) -> Self {
        self.width = Some(width);
        self
    }

    #[must_use]
    pub fn renderer(mut self, renderer: Arc<dyn CellRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Renders this column's cell for `row`. Missing fields render as `null`.
    #[must_use]
    pub fn render_cell(&self, row: &Row) -> Cell {
        let value = row.get(&self.key).unwrap_or(&Value::Null);
        match &self.renderer {
            Some(r) => r.render(self.column_type, value, row),
            None => default_cell(self.column_type, value),
        }
    }

    /// Renders this column's flat export string for `row`.
    #[must_use]
    pub fn export_cell(&self, row: &Row) -> String {
        let value = row.get(&self.key).unwrap_or(&Value::Null);
        match &self.renderer {
            Some(r) => r.export_render(value, row),
            None => plain_text(value),
        }
    }
}

// ---------------------------------------------------------------------------
// ColumnSet
// ---------------------------------------------------------------------------

/// The immutable, ordered set of columns a grid was created with.
#[derive(Debug, Clone, Default)]
pub struct ColumnSet {
    columns: Vec<ColumnDef>,
}

impl ColumnSet {
    /// Builds a column set, rejecting duplicate keys.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateColumn`] for the first repeated key.
    pub fn new(columns: Vec<ColumnDef>) -> Result<Self, ConfigError> {
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.key == col.key) {
                return Err(ConfigError::DuplicateColumn {
                    key: col.key.clone(),
                });
            }
        }
        Ok(Self { columns })
    }

    /// Builds a column set, keeping the first definition of any repeated key.
    #[must_use]
    pub fn dedup(columns: Vec<ColumnDef>) -> Self {
        let mut kept: Vec<ColumnDef> = Vec::with_capacity(columns.len());
        for col in columns {
            if kept.iter().any(|c| c.key == col.key) {
                tracing::warn!(key = %col.key, "dropping duplicate column definition");
                continue;
            }
            kept.push(col);
        }
        Self { columns: kept }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.key == key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    #[must_use]
    pub fn is_sortable(&self, key: &str) -> bool {
        self.get(key).is_some_and(|c| c.sortable)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Keys of the columns visible by default, in declaration order.
    #[must_use]
    pub fn default_visible(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.default_visible)
            .map(|c| c.key.clone())
            .collect()
    }

    /// Restricts `keys` to known columns and sorts them into declaration order.
    #[must_use]
    pub fn normalize_keys(&self, keys: &[String]) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| keys.iter().any(|k| k == &c.key))
            .map(|c| c.key.clone())
            .collect()
    }

    /// Resolves `keys` to their definitions, skipping unknown keys.
    #[must_use]
    pub fn resolve<'a>(&'a self, keys: &[String]) -> Vec<&'a ColumnDef> {
        keys.iter().filter_map(|k| self.get(k)).collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(v: Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    struct Upper;

    impl CellRenderer for Upper {
        fn render(&self, _t: ColumnType, value: &Value, _row: &Row) -> Cell {
            Cell::Text(plain_text(value).to_uppercase())
        }
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let err = ColumnSet::new(vec![ColumnDef::new("a", "A"), ColumnDef::new("a", "Again")])
            .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateColumn { key: "a".into() });
    }

    #[test]
    fn dedup_keeps_first_definition() {
        let set = ColumnSet::dedup(vec![ColumnDef::new("a", "A"), ColumnDef::new("a", "Again")]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("a").unwrap().label, "A");
    }

    #[test]
    fn default_visible_skips_hidden_columns() {
        let set = ColumnSet::new(vec![
            ColumnDef::new("name", "Name"),
            ColumnDef::new("notes", "Notes").hidden(),
            ColumnDef::new("owner", "Owner"),
        ])
        .unwrap();
        assert_eq!(set.default_visible(), vec!["name", "owner"]);
    }

    #[test]
    fn normalize_keys_uses_declaration_order_and_drops_unknown() {
        let set = ColumnSet::new(vec![
            ColumnDef::new("a", "A"),
            ColumnDef::new("b", "B"),
            ColumnDef::new("c", "C"),
        ])
        .unwrap();
        let keys = vec!["c".to_string(), "zzz".to_string(), "a".to_string()];
        assert_eq!(set.normalize_keys(&keys), vec!["a", "c"]);
    }

    #[test]
    fn custom_renderer_only_overrides_display() {
        let col = ColumnDef::new("status", "Status").renderer(Arc::new(Upper));
        let r = row(json!({"id": 1, "status": "open"}));
        assert_eq!(col.render_cell(&r), Cell::Text("OPEN".into()));
        assert_eq!(col.export_cell(&r), "open");
    }

    #[test]
    fn missing_field_renders_empty() {
        let col = ColumnDef::new("absent", "Absent").typed(ColumnType::Number);
        let r = row(json!({"id": 1}));
        assert_eq!(col.render_cell(&r), Cell::Empty);
        assert_eq!(col.export_cell(&r), "");
    }

    #[test]
    fn typed_defaults() {
        assert_eq!(
            default_cell(ColumnType::Currency, &json!(1234.5)),
            Cell::Currency("1234.50".into())
        );
        assert_eq!(
            default_cell(ColumnType::Currency, &json!("99")),
            Cell::Currency("99.00".into())
        );
        assert_eq!(default_cell(ColumnType::Boolean, &json!(true)), Cell::Bool(true));
        assert_eq!(default_cell(ColumnType::Boolean, &json!(0)), Cell::Bool(false));
        assert_eq!(
            default_cell(ColumnType::Badge, &json!("hot")),
            Cell::Badge("hot".into())
        );
        assert_eq!(Cell::Bool(true).text(), "Yes");
    }

    #[test]
    fn plain_text_of_compound_values_is_json() {
        assert_eq!(plain_text(&json!(["a", 1])), "[\"a\",1]");
        assert_eq!(plain_text(&json!(null)), "");
    }
}
