//! Saved-view types exchanged with the saved-views endpoint.

use serde::{Deserialize, Serialize};

use crate::query::{FilterDescriptor, SortDescriptor};

/// The persisted part of a Query State: everything except page and selection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewConfig {
    pub columns: Vec<String>,
    pub sorts: Vec<SortDescriptor>,
    pub filters: Vec<FilterDescriptor>,
    pub page_size: u32,
    #[serde(default)]
    pub search: String,
}

/// A named, persisted view owned by the saved-views store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedView {
    pub id: String,
    pub table_name: String,
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub is_public: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub owner_id: Option<String>,
    pub config: ViewConfig,
}

/// Body of a create request (`POST /api/saved-views`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSavedView {
    pub table_name: String,
    pub name: String,
    pub is_default: bool,
    #[serde(default)]
    pub is_public: bool,
    pub config: ViewConfig,
}

/// Orders views for display: the first default view leads, everything else
/// keeps its original order.
///
/// The store is expected to keep at most one default per user and table, but
/// this does not rely on it. Only the first default is promoted; later ones
/// stay in place.
#[must_use]
pub fn order_views(mut views: Vec<SavedView>) -> Vec<SavedView> {
    if let Some(pos) = views.iter().position(|v| v.is_default) {
        let default = views.remove(pos);
        views.insert(0, default);
    }
    views
}

/// Returns the view that should be applied on mount, if any.
#[must_use]
pub fn default_view(views: &[SavedView]) -> Option<&SavedView> {
    views.iter().find(|v| v.is_default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(id: &str, is_default: bool) -> SavedView {
        SavedView {
            id: id.to_string(),
            table_name: "leads".to_string(),
            name: format!("view {id}"),
            is_default,
            is_public: false,
            owner_id: None,
            config: ViewConfig {
                page_size: 25,
                ..ViewConfig::default()
            },
        }
    }

    #[test]
    fn default_view_moves_to_front() {
        let ordered = order_views(vec![view("a", false), view("b", true), view("c", false)]);
        let ids: Vec<&str> = ordered.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn multiple_defaults_pick_the_first() {
        let views = vec![view("a", false), view("b", true), view("c", true)];
        assert_eq!(default_view(&views).unwrap().id, "b");
        let ordered = order_views(views);
        let ids: Vec<&str> = ordered.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn saved_view_decodes_without_optional_flags() {
        let v: SavedView = serde_json::from_str(
            r#"{"id":"1","tableName":"leads","name":"Mine",
                "config":{"columns":["name"],"sorts":[],"filters":[],"pageSize":50}}"#,
        )
        .unwrap();
        assert!(!v.is_default);
        assert!(!v.is_public);
        assert_eq!(v.config.page_size, 50);
        assert_eq!(v.config.search, "");
    }
}
