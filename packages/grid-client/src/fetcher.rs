//! Remote data fetcher with a content-addressed cache and
//! last-dispatched-wins ordering.
//!
//! Every fetch carries a sequence number taken from [`DataFetcher::begin`].
//! Callers that own a state lock take the number while still holding it, so
//! sequence order always matches state order. A response is applied only if
//! its sequence number is still the latest one dispatched; anything older is
//! dropped on arrival and never touches the loading or error flags.
//!
//! The cache is keyed by content hash. Re-fetching the state that is
//! currently displayed is served from cache with no request. Once the state
//! moves on, the entry it left behind is stale: coming back to it displays
//! the cached page immediately and revalidates it with a new request.
//!
//! While a request is in flight the previously displayed page stays visible.
//! A failed request sets the error flag and keeps that page too; there is no
//! automatic retry.

use std::sync::Arc;
use std::time::Instant;

use gridline_core::{cache_key, encode_query, ConfigError, QueryState, TableResponse};
use parking_lot::Mutex;
use quick_cache::sync::Cache;
use tracing::{debug, info_span, warn, Instrument};

use crate::transport::{decode_json, Transport, TransportError};

/// Why a fetch did not produce data.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Encode(#[from] ConfigError),
}

/// What happened to one dispatched fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Served from the cache without a request.
    Cached,
    /// The response arrived and is now displayed.
    Applied,
    /// A newer fetch was dispatched before this one resolved; its result was
    /// discarded.
    Superseded,
    /// The request failed; the previous data is still displayed.
    Failed(FetchError),
}

/// Point-in-time view of the fetcher for rendering.
#[derive(Debug, Clone, Default)]
pub struct FetchSnapshot {
    pub data: Option<Arc<TableResponse>>,
    pub loading: bool,
    pub error: Option<String>,
    /// Cache key of the state `data` belongs to.
    pub data_key: Option<String>,
}

#[derive(Debug, Default)]
struct FetchState {
    latest_seq: u64,
    /// Key of the displayed page while the server copy is still current.
    fresh_key: Option<String>,
    snapshot: FetchSnapshot,
}

/// Fetches pages of a tabular endpoint for one grid.
pub struct DataFetcher {
    transport: Arc<dyn Transport>,
    endpoint: String,
    query_key: String,
    cache: Cache<String, Arc<TableResponse>>,
    state: Mutex<FetchState>,
}

impl DataFetcher {
    /// Creates a fetcher for `endpoint`. `query_key` namespaces cache keys.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoint: impl Into<String>,
        query_key: impl Into<String>,
        cache_capacity: usize,
    ) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            query_key: query_key.into(),
            cache: Cache::new(cache_capacity.max(1)),
            state: Mutex::new(FetchState::default()),
        }
    }

    /// Current data, loading, and error flags.
    #[must_use]
    pub fn snapshot(&self) -> FetchSnapshot {
        self.state.lock().snapshot.clone()
    }

    /// The last response that was applied, if any.
    #[must_use]
    pub fn current(&self) -> Option<Arc<TableResponse>> {
        self.state.lock().snapshot.data.clone()
    }

    /// Drops every cached page. Displayed data is kept.
    pub fn invalidate(&self) {
        self.cache.clear();
        self.state.lock().fresh_key = None;
    }

    /// Reserves the next sequence number. Any fetch holding an older number
    /// can no longer be displayed.
    pub fn begin(&self) -> u64 {
        let mut st = self.state.lock();
        st.latest_seq += 1;
        st.latest_seq
    }

    /// Fetches the page described by `state` under a fresh sequence number.
    pub async fn fetch(&self, state: &QueryState) -> FetchOutcome {
        let seq = self.begin();
        self.fetch_as(seq, state).await
    }

    /// Fetches the page described by `state` under `seq`, which must come
    /// from [`begin`](Self::begin).
    pub async fn fetch_as(&self, seq: u64, state: &QueryState) -> FetchOutcome {
        let prepared = cache_key(&self.query_key, state)
            .and_then(|key| encode_query(state).map(|params| (key, params)));
        let (key, params) = match prepared {
            Ok(p) => p,
            Err(e) => return self.finish_error(seq, e.into()),
        };

        let cached = self.cache.get(&key);
        {
            let mut st = self.state.lock();
            if st.latest_seq != seq {
                return FetchOutcome::Superseded;
            }
            let fresh = st.fresh_key.as_deref() == Some(key.as_str());
            match cached {
                Some(hit) if fresh => {
                    debug!(query_key = %self.query_key, seq, "serving page from cache");
                    st.snapshot.data = Some(hit);
                    st.snapshot.data_key = Some(key);
                    st.snapshot.loading = false;
                    st.snapshot.error = None;
                    return FetchOutcome::Cached;
                }
                Some(stale) => {
                    debug!(
                        query_key = %self.query_key,
                        seq,
                        "showing stale page while revalidating"
                    );
                    st.snapshot.data = Some(stale);
                    st.snapshot.data_key = Some(key.clone());
                }
                None => {}
            }
            st.fresh_key = None;
            st.snapshot.loading = true;
        }

        let span = info_span!(
            "grid_fetch",
            query_key = %self.query_key,
            seq,
            page = state.page,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );
        let start = Instant::now();
        let result = self
            .transport
            .get(&self.endpoint, &params)
            .instrument(span.clone())
            .await
            .and_then(|body| decode_json::<TableResponse>(&body));
        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;
        span.record("duration_ms", duration_ms);

        match result {
            Ok(resp) => {
                let resp = Arc::new(resp);
                self.cache.insert(key.clone(), Arc::clone(&resp));
                let mut st = self.state.lock();
                if st.latest_seq != seq {
                    span.record("outcome", "superseded");
                    debug!(seq, latest = st.latest_seq, "discarding superseded response");
                    return FetchOutcome::Superseded;
                }
                span.record("outcome", "ok");
                st.fresh_key = Some(key.clone());
                st.snapshot.data = Some(resp);
                st.snapshot.data_key = Some(key);
                st.snapshot.loading = false;
                st.snapshot.error = None;
                FetchOutcome::Applied
            }
            Err(e) => {
                span.record("outcome", "error");
                self.finish_error(seq, e.into())
            }
        }
    }

    fn finish_error(&self, seq: u64, err: FetchError) -> FetchOutcome {
        let mut st = self.state.lock();
        if st.latest_seq != seq {
            debug!(seq, error = %err, "discarding superseded failure");
            return FetchOutcome::Superseded;
        }
        warn!(query_key = %self.query_key, error = %err, "fetch failed, keeping previous page");
        st.snapshot.loading = false;
        st.snapshot.error = Some(err.to_string());
        FetchOutcome::Failed(err)
    }
}

#[cfg(test)]
mod tests {
    use gridline_core::{ColumnDef, ColumnSet, SortDescriptor};

    use super::*;
    use crate::testing::{page_body, paging_handler, FakeTransport, Request};

    fn base_state() -> QueryState {
        let cols = ColumnSet::new(vec![ColumnDef::new("name", "Name")]).unwrap();
        QueryState::initial(&cols, 2, vec![SortDescriptor::desc("createdAt")])
    }

    fn at_page(page: u32) -> QueryState {
        let mut s = base_state();
        s.page = page;
        s
    }

    fn is_page(page: u32) -> impl Fn(&Request) -> bool + Send + Sync + 'static {
        move |req: &Request| req.param("page") == Some(page.to_string().as_str())
    }

    fn shown_page(fetcher: &DataFetcher) -> Option<u32> {
        fetcher.current().map(|r| r.page)
    }

    #[tokio::test]
    async fn identical_state_is_served_from_cache() {
        let transport = Arc::new(FakeTransport::new(paging_handler(2, 5)));
        let fetcher = DataFetcher::new(transport.clone(), "/api/leads", "leads", 8);

        assert_eq!(fetcher.fetch(&at_page(1)).await, FetchOutcome::Applied);
        assert_eq!(fetcher.fetch(&at_page(1)).await, FetchOutcome::Cached);
        assert_eq!(transport.requests().len(), 1);

        // Selection is not part of the key.
        let mut selected = at_page(1);
        selected.selected_row_ids.push("1-1".into());
        assert_eq!(fetcher.fetch(&selected).await, FetchOutcome::Cached);

        fetcher.invalidate();
        assert_eq!(fetcher.fetch(&at_page(1)).await, FetchOutcome::Applied);
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn request_carries_encoded_state() {
        let transport = Arc::new(FakeTransport::new(paging_handler(2, 5)));
        let fetcher = DataFetcher::new(transport.clone(), "/api/leads", "leads", 8);
        fetcher.fetch(&at_page(3)).await;

        let req = &transport.requests()[0];
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/api/leads");
        assert_eq!(req.param("page"), Some("3"));
        assert_eq!(req.param("pageSize"), Some("2"));
        assert_eq!(
            req.param("sorts"),
            Some(r#"[{"field":"createdAt","direction":"desc"}]"#)
        );
        assert_eq!(req.param("columns"), Some("name"));
    }

    #[tokio::test]
    async fn stale_data_stays_visible_while_loading() {
        let transport = Arc::new(FakeTransport::new(paging_handler(2, 5)));
        let fetcher = Arc::new(DataFetcher::new(transport.clone(), "/api/leads", "leads", 8));
        fetcher.fetch(&at_page(1)).await;

        let gate = transport.gate(is_page(2));
        let task = {
            let fetcher = Arc::clone(&fetcher);
            tokio::spawn(async move { fetcher.fetch(&at_page(2)).await })
        };
        while transport.requests().len() < 2 {
            tokio::task::yield_now().await;
        }

        let snap = fetcher.snapshot();
        assert!(snap.loading);
        assert_eq!(snap.data.map(|d| d.page), Some(1));

        gate.send(Ok(page_body(2, 2, 5))).unwrap();
        assert_eq!(task.await.unwrap(), FetchOutcome::Applied);
        assert!(!fetcher.snapshot().loading);
        assert_eq!(shown_page(&fetcher), Some(2));
    }

    #[tokio::test]
    async fn stale_response_arriving_last_is_discarded() {
        let transport = Arc::new(FakeTransport::new(paging_handler(2, 5)));
        let fetcher = DataFetcher::new(transport.clone(), "/api/leads", "leads", 8);
        let gate_a = transport.gate(is_page(1));
        let gate_b = transport.gate(is_page(2));

        let (first, second) = (at_page(1), at_page(2));

        let (a, b, ()) = tokio::join!(fetcher.fetch(&first), fetcher.fetch(&second), async {
            gate_b.send(Ok(page_body(2, 2, 5))).unwrap();
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            gate_a.send(Ok(page_body(1, 2, 5))).unwrap();
        });

        assert_eq!(a, FetchOutcome::Superseded);
        assert_eq!(b, FetchOutcome::Applied);
        assert_eq!(shown_page(&fetcher), Some(2));

        // The losing response is cached but stale, so going back refetches.
        assert_eq!(fetcher.fetch(&first).await, FetchOutcome::Applied);
        assert_eq!(shown_page(&fetcher), Some(1));
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn stale_response_arriving_first_is_discarded() {
        let transport = Arc::new(FakeTransport::new(paging_handler(2, 5)));
        let fetcher = DataFetcher::new(transport.clone(), "/api/leads", "leads", 8);
        let gate_a = transport.gate(is_page(1));
        let gate_b = transport.gate(is_page(2));

        let (first, second) = (at_page(1), at_page(2));

        let (a, b, ()) = tokio::join!(fetcher.fetch(&first), fetcher.fetch(&second), async {
            gate_a.send(Ok(page_body(1, 2, 5))).unwrap();
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            gate_b.send(Ok(page_body(2, 2, 5))).unwrap();
        });

        assert_eq!(a, FetchOutcome::Superseded);
        assert_eq!(b, FetchOutcome::Applied);
        assert_eq!(shown_page(&fetcher), Some(2));
    }

    #[tokio::test]
    async fn failure_keeps_previous_page() {
        let transport = Arc::new(FakeTransport::new(|req: &Request| {
            if req.param("page") == Some("2") {
                Err(TransportError::Status {
                    code: 500,
                    body: "boom".into(),
                })
            } else {
                Ok(page_body(1, 2, 5))
            }
        }));
        let fetcher = DataFetcher::new(transport, "/api/leads", "leads", 8);
        fetcher.fetch(&at_page(1)).await;

        let outcome = fetcher.fetch(&at_page(2)).await;
        assert!(matches!(
            outcome,
            FetchOutcome::Failed(FetchError::Transport(TransportError::Status { code: 500, .. }))
        ));
        let snap = fetcher.snapshot();
        assert_eq!(snap.data.map(|d| d.page), Some(1));
        assert!(!snap.loading);
        assert!(snap.error.unwrap().contains("500"));

        // A later success clears the error.
        assert_eq!(fetcher.fetch(&at_page(1)).await, FetchOutcome::Applied);
        assert!(fetcher.snapshot().error.is_none());
    }

    #[tokio::test]
    async fn superseded_failure_does_not_flag_error() {
        let transport = Arc::new(FakeTransport::new(paging_handler(2, 5)));
        let fetcher = DataFetcher::new(transport.clone(), "/api/leads", "leads", 8);
        let gate_a = transport.gate(is_page(1));

        let (first, second) = (at_page(1), at_page(2));

        let (a, b, ()) = tokio::join!(fetcher.fetch(&first), fetcher.fetch(&second), async {
            tokio::task::yield_now().await;
            gate_a.send(Err(TransportError::Timeout)).unwrap();
        });
        assert_eq!(a, FetchOutcome::Superseded);
        assert_eq!(b, FetchOutcome::Applied);
        assert!(fetcher.snapshot().error.is_none());
    }

    #[tokio::test]
    async fn returning_to_a_left_state_shows_cache_and_revalidates() {
        let transport = Arc::new(FakeTransport::new(paging_handler(2, 5)));
        let fetcher = Arc::new(DataFetcher::new(transport.clone(), "/api/leads", "leads", 8));
        fetcher.fetch(&at_page(1)).await;
        fetcher.fetch(&at_page(2)).await;

        let gate = transport.gate(is_page(1));
        let task = {
            let fetcher = Arc::clone(&fetcher);
            tokio::spawn(async move { fetcher.fetch(&at_page(1)).await })
        };
        while transport.requests().len() < 3 {
            tokio::task::yield_now().await;
        }

        // The stale copy of page 1 is on screen while the request runs.
        let snap = fetcher.snapshot();
        assert!(snap.loading);
        assert_eq!(snap.data.map(|d| d.page), Some(1));

        gate.send(Ok(page_body(1, 2, 5))).unwrap();
        assert_eq!(task.await.unwrap(), FetchOutcome::Applied);
        assert!(!fetcher.snapshot().loading);

        // Now current again: no further request.
        assert_eq!(fetcher.fetch(&at_page(1)).await, FetchOutcome::Cached);
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn older_ticket_never_displays_or_sets_loading() {
        let transport = Arc::new(FakeTransport::new(paging_handler(2, 5)));
        let fetcher = Arc::new(DataFetcher::new(transport.clone(), "/api/leads", "leads", 8));
        let older = fetcher.begin();
        let newer = fetcher.begin();

        assert_eq!(fetcher.fetch_as(newer, &at_page(2)).await, FetchOutcome::Applied);

        // The older ticket runs last but was dispatched first.
        assert_eq!(fetcher.fetch_as(older, &at_page(1)).await, FetchOutcome::Superseded);
        let snap = fetcher.snapshot();
        assert!(!snap.loading);
        assert_eq!(snap.data.map(|d| d.page), Some(2));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn superseded_request_leaves_loading_to_the_latest() {
        let transport = Arc::new(FakeTransport::new(paging_handler(2, 5)));
        let fetcher = DataFetcher::new(transport.clone(), "/api/leads", "leads", 8);
        fetcher.fetch(&at_page(1)).await;
        let gate = transport.gate(is_page(2));
        let (second, first) = (at_page(2), at_page(1));

        let (a, b, ()) = tokio::join!(fetcher.fetch(&second), fetcher.fetch(&first), async {
            tokio::task::yield_now().await;
            gate.send(Ok(page_body(2, 2, 5))).unwrap();
        });

        assert_eq!(a, FetchOutcome::Superseded);
        assert_eq!(b, FetchOutcome::Applied);
        assert!(!fetcher.snapshot().loading);
        assert_eq!(shown_page(&fetcher), Some(1));
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_failure() {
        let transport = Arc::new(FakeTransport::new(|_req: &Request| {
            Ok(bytes::Bytes::from_static(b"<html>oops</html>"))
        }));
        let fetcher = DataFetcher::new(transport, "/api/leads", "leads", 8);
        let outcome = fetcher.fetch(&at_page(1)).await;
        assert!(matches!(
            outcome,
            FetchOutcome::Failed(FetchError::Transport(TransportError::Decode(_)))
        ));
        assert!(fetcher.current().is_none());
    }
}
