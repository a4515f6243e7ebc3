//! Saved-view persistence.
//!
//! [`ViewStore`] is the seam between the controller and wherever views live.
//! [`HttpViewStore`] talks to the saved-views endpoint; [`MemoryViewStore`]
//! is an in-process store that enforces the same invariants a real backend
//! must: views are scoped by `(user, table)`, at most one default per scope,
//! and a save under an existing name overwrites it (last write wins).

use std::sync::Arc;

use async_trait::async_trait;
use gridline_core::{order_views, NewSavedView, SavedView};
use parking_lot::Mutex;
use tracing::debug;

use crate::transport::{decode_json, Transport, TransportError};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ViewError {
    #[error("saved view name must not be empty")]
    EmptyName,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// CRUD over saved views for the current user.
#[async_trait]
pub trait ViewStore: Send + Sync {
    /// Views visible to the current user for `table_name`, default first.
    async fn list(&self, table_name: &str) -> Result<Vec<SavedView>, ViewError>;

    /// Creates (or overwrites by name) a view and returns it as stored.
    async fn save(&self, view: NewSavedView) -> Result<SavedView, ViewError>;

    /// Removes a view. Deleting a view that does not exist succeeds.
    async fn delete(&self, view_id: &str) -> Result<(), ViewError>;
}

fn validate(view: &NewSavedView) -> Result<(), ViewError> {
    if view.name.trim().is_empty() {
        return Err(ViewError::EmptyName);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// HttpViewStore
// ---------------------------------------------------------------------------

/// Saved-views store backed by the REST endpoint.
///
/// - `GET {base}/{table}` lists views
/// - `POST {base}` creates one
/// - `DELETE {base}/{id}` removes one
pub struct HttpViewStore {
    transport: Arc<dyn Transport>,
    base_path: String,
}

impl HttpViewStore {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, base_path: impl Into<String>) -> Self {
        Self {
            transport,
            base_path: base_path.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ViewStore for HttpViewStore {
    async fn list(&self, table_name: &str) -> Result<Vec<SavedView>, ViewError> {
        let path = format!("{}/{table_name}", self.base_path);
        let body = self.transport.get(&path, &[]).await?;
        let views: Vec<SavedView> = decode_json(&body)?;
        Ok(order_views(views))
    }

    async fn save(&self, view: NewSavedView) -> Result<SavedView, ViewError> {
        validate(&view)?;
        let body = serde_json::to_value(&view)
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        let resp = self.transport.post_json(&self.base_path, body).await?;
        Ok(decode_json(&resp)?)
    }

    async fn delete(&self, view_id: &str) -> Result<(), ViewError> {
        let path = format!("{}/{view_id}", self.base_path);
        match self.transport.delete(&path).await {
            Ok(()) => Ok(()),
            Err(TransportError::NotFound) => {
                debug!(view_id, "view already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryViewStore
// ---------------------------------------------------------------------------

/// In-process saved-views store.
///
/// Handles created with [`MemoryViewStore::for_user`] share the same backing
/// list, which is how multiple users (or tabs) are modelled.
#[derive(Clone)]
pub struct MemoryViewStore {
    user_id: String,
    views: Arc<Mutex<Vec<SavedView>>>,
}

impl MemoryViewStore {
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            views: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Another user's handle onto the same storage.
    #[must_use]
    pub fn for_user(&self, user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            views: Arc::clone(&self.views),
        }
    }

    fn owned_by_me(&self, view: &SavedView) -> bool {
        view.owner_id.as_deref() == Some(self.user_id.as_str())
    }
}

#[async_trait]
impl ViewStore for MemoryViewStore {
    async fn list(&self, table_name: &str) -> Result<Vec<SavedView>, ViewError> {
        let views = self.views.lock();
        let mut mine_default: Vec<SavedView> = Vec::new();
        let mut rest: Vec<SavedView> = Vec::new();
        for v in views.iter().filter(|v| v.table_name == table_name) {
            if self.owned_by_me(v) {
                if v.is_default {
                    mine_default.push(v.clone());
                } else {
                    rest.push(v.clone());
                }
            } else if v.is_public {
                // Another user's default is not ours.
                let mut shared = v.clone();
                shared.is_default = false;
                rest.push(shared);
            }
        }
        mine_default.extend(rest);
        Ok(mine_default)
    }

    async fn save(&self, view: NewSavedView) -> Result<SavedView, ViewError> {
        validate(&view)?;
        let mut views = self.views.lock();
        if view.is_default {
            for v in views.iter_mut() {
                if v.table_name == view.table_name && self.owned_by_me(v) {
                    v.is_default = false;
                }
            }
        }
        let name = view.name.trim().to_string();
        let existing = views.iter().position(|v| {
            v.table_name == view.table_name && self.owned_by_me(v) && v.name == name
        });
        let id = existing.map_or_else(|| uuid::Uuid::new_v4().to_string(), |i| views[i].id.clone());
        let stored = SavedView {
            id,
            table_name: view.table_name,
            name,
            is_default: view.is_default,
            is_public: view.is_public,
            owner_id: Some(self.user_id.clone()),
            config: view.config,
        };
        match existing {
            Some(i) => views[i] = stored.clone(),
            None => views.push(stored.clone()),
        }
        Ok(stored)
    }

    async fn delete(&self, view_id: &str) -> Result<(), ViewError> {
        self.views
            .lock()
            .retain(|v| !(v.id == view_id && self.owned_by_me(v)));
        Ok(())
    }
}
