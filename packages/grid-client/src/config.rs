//! Client configuration shared by every grid on a page.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the HTTP transport and the effect layers built on it.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL that relative endpoints are resolved against.
    pub base_url: String,
    /// Sent as `X-User-Id` so the saved-views store can scope views.
    pub user_id: Option<String>,
    /// Upper bound for any single request. A timeout surfaces as a fetch error.
    pub request_timeout: Duration,
    /// Quiet period before typed search text is committed.
    pub search_debounce: Duration,
    /// Maximum number of pages kept in the response cache.
    pub cache_capacity: usize,
    /// Directory that downloaded exports are written into.
    pub download_dir: PathBuf,
    /// Path of the saved-views collection.
    pub saved_views_path: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            user_id: None,
            request_timeout: Duration::from_secs(30),
            search_debounce: Duration::from_millis(300),
            cache_capacity: 64,
            download_dir: PathBuf::from("."),
            saved_views_path: "/api/saved-views".to_string(),
        }
    }
}

impl ClientConfig {
    /// Resolves `path` against `base_url`. Absolute URLs pass through.
    #[must_use]
    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}
