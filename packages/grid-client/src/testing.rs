//! In-process transport fake for unit tests.
//!
//! Requests are answered by a handler closure unless a gate matches them, in
//! which case they park until the test releases the gate. Gates are how the
//! ordering tests control which response lands first.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::oneshot;

use crate::transport::{Transport, TransportError};

pub(crate) type Reply = Result<Bytes, TransportError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Request {
    pub method: &'static str,
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl Request {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

type Handler = Box<dyn Fn(&Request) -> Reply + Send + Sync>;
type Matcher = Box<dyn Fn(&Request) -> bool + Send + Sync>;

struct Gate {
    matcher: Matcher,
    rx: Option<oneshot::Receiver<Reply>>,
}

pub(crate) struct FakeTransport {
    handler: Handler,
    gates: Mutex<Vec<Gate>>,
    requests: Mutex<Vec<Request>>,
}

impl FakeTransport {
    pub fn new(handler: impl Fn(&Request) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            gates: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Parks the next request matching `matcher` until the returned sender
    /// delivers its reply.
    pub fn gate(
        &self,
        matcher: impl Fn(&Request) -> bool + Send + Sync + 'static,
    ) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().push(Gate {
            matcher: Box::new(matcher),
            rx: Some(rx),
        });
        tx
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    async fn dispatch(&self, req: Request) -> Reply {
        self.requests.lock().push(req.clone());
        let parked = {
            let mut gates = self.gates.lock();
            gates
                .iter_mut()
                .find(|g| g.rx.is_some() && (g.matcher)(&req))
                .and_then(|g| g.rx.take())
        };
        match parked {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(TransportError::Network("gate dropped".into()))),
            None => (self.handler)(&req),
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(&self, path: &str, params: &[(String, String)]) -> Reply {
        self.dispatch(Request {
            method: "GET",
            path: path.to_string(),
            params: params.to_vec(),
            body: None,
        })
        .await
    }

    async fn post_json(&self, path: &str, body: serde_json::Value) -> Reply {
        self.dispatch(Request {
            method: "POST",
            path: path.to_string(),
            params: Vec::new(),
            body: Some(body),
        })
        .await
    }

    async fn delete(&self, path: &str) -> Result<(), TransportError> {
        self.dispatch(Request {
            method: "DELETE",
            path: path.to_string(),
            params: Vec::new(),
            body: None,
        })
        .await
        .map(|_| ())
    }
}

/// A JSON table page whose rows are `{"id": "<page>-<n>"}`.
pub(crate) fn page_body(page: u32, rows: u32, total_pages: u32) -> Bytes {
    let data: Vec<serde_json::Value> = (1..=rows)
        .map(|n| json!({"id": format!("{page}-{n}"), "name": format!("row {n} of page {page}")}))
        .collect();
    Bytes::from(
        json!({
            "data": data,
            "totalCount": u64::from(rows) * u64::from(total_pages),
            "page": page,
            "pageSize": rows,
            "totalPages": total_pages,
        })
        .to_string(),
    )
}

/// Handler that serves [`page_body`] for whatever `page` is requested.
pub(crate) fn paging_handler(
    rows: u32,
    total_pages: u32,
) -> impl Fn(&Request) -> Reply + Send + Sync + 'static {
    move |req: &Request| {
        let page = req.param("page").and_then(|p| p.parse().ok()).unwrap_or(1);
        Ok(page_body(page, rows, total_pages))
    }
}
