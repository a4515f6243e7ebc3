//! Export trigger: replays the current Query State against the export
//! endpoint and hands the file to an [`ExportSink`].
//!
//! Each format has its own state machine, so a CSV export never waits on or
//! cancels a PDF export:
//!
//! ```text
//! Idle -> Exporting -> Idle
//!                   -> Failed(message) -> Exporting -> ...
//! ```
//!
//! The trigger does not refuse a second export of a format already in
//! flight; the controller does that before calling in.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use bytes::Bytes;
use gridline_core::{encode_export, export_file_name, ConfigError, ExportFormat, QueryState};
use tracing::{info, info_span, warn, Instrument};

use crate::transport::{Transport, TransportError};

/// Per-format export status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExportStatus {
    #[default]
    Idle,
    Exporting,
    /// The last attempt failed. The trigger is usable again.
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("exports are disabled for this grid")]
    Disabled,
    #[error("a {0} export is already in progress")]
    InFlight(ExportFormat),
    #[error(transparent)]
    Encode(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to save export: {0}")]
    Sink(#[source] std::io::Error),
}

/// Where downloaded export files end up.
#[async_trait]
pub trait ExportSink: Send + Sync {
    /// Saves `bytes` under `file_name` and returns where they were written.
    async fn save(&self, file_name: &str, bytes: Bytes) -> std::io::Result<PathBuf>;
}

/// Writes export files into a directory, creating it if needed.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ExportSink for DirectorySink {
    async fn save(&self, file_name: &str, bytes: Bytes) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(file_name);
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }
}

/// A completed export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReceipt {
    pub format: ExportFormat,
    pub path: PathBuf,
    pub bytes: usize,
}

/// Issues export requests for one grid.
pub struct ExportTrigger {
    transport: Arc<dyn Transport>,
    export_path: String,
    table_name: String,
    sink: Arc<dyn ExportSink>,
    csv: ArcSwap<ExportStatus>,
    pdf: ArcSwap<ExportStatus>,
}

impl ExportTrigger {
    /// `endpoint` is the tabular endpoint; exports go to `{endpoint}/export`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoint: &str,
        table_name: impl Into<String>,
        sink: Arc<dyn ExportSink>,
    ) -> Self {
        Self {
            transport,
            export_path: format!("{}/export", endpoint.trim_end_matches('/')),
            table_name: table_name.into(),
            sink,
            csv: ArcSwap::from_pointee(ExportStatus::Idle),
            pdf: ArcSwap::from_pointee(ExportStatus::Idle),
        }
    }

    fn slot(&self, format: ExportFormat) -> &ArcSwap<ExportStatus> {
        match format {
            ExportFormat::Csv => &self.csv,
            ExportFormat::Pdf => &self.pdf,
        }
    }

    #[must_use]
    pub fn status(&self, format: ExportFormat) -> ExportStatus {
        self.slot(format).load().as_ref().clone()
    }

    #[must_use]
    pub fn is_exporting(&self, format: ExportFormat) -> bool {
        matches!(**self.slot(format).load(), ExportStatus::Exporting)
    }

    /// Runs one export of the full filtered, sorted, and searched result set.
    ///
    /// # Errors
    ///
    /// Returns the request, encoding, or sink failure. The status for
    /// `format` is left at [`ExportStatus::Failed`] in that case.
    pub async fn export(
        &self,
        state: &QueryState,
        format: ExportFormat,
    ) -> Result<ExportReceipt, ExportError> {
        let slot = self.slot(format);
        slot.store(Arc::new(ExportStatus::Exporting));

        let span = info_span!(
            "grid_export",
            table = %self.table_name,
            %format,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );
        let start = Instant::now();
        let result = self.run(state, format).instrument(span.clone()).await;
        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;
        span.record("duration_ms", duration_ms);

        match &result {
            Ok(receipt) => {
                span.record("outcome", "ok");
                info!(path = %receipt.path.display(), bytes = receipt.bytes, "export saved");
                slot.store(Arc::new(ExportStatus::Idle));
            }
            Err(e) => {
                span.record("outcome", "error");
                warn!(table = %self.table_name, %format, error = %e, "export failed");
                slot.store(Arc::new(ExportStatus::Failed(e.to_string())));
            }
        }
        result
    }

    async fn run(
        &self,
        state: &QueryState,
        format: ExportFormat,
    ) -> Result<ExportReceipt, ExportError> {
        let params = encode_export(state, format)?;
        let body = self.transport.get(&self.export_path, &params).await?;
        let name = export_file_name(
            &self.table_name,
            format,
            chrono::Local::now().date_naive(),
        );
        let bytes = body.len();
        let path = self.sink.save(&name, body).await.map_err(ExportError::Sink)?;
        Ok(ExportReceipt {
            format,
            path,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use gridline_core::{ColumnDef, ColumnSet};
    use parking_lot::Mutex;

    use super::*;
    use crate::testing::{FakeTransport, Request};

    #[derive(Default)]
    struct MemorySink {
        saved: Mutex<Vec<(String, Bytes)>>,
    }

    #[async_trait]
    impl ExportSink for MemorySink {
        async fn save(&self, file_name: &str, bytes: Bytes) -> std::io::Result<PathBuf> {
            self.saved.lock().push((file_name.to_string(), bytes));
            Ok(PathBuf::from(file_name))
        }
    }

    fn state() -> QueryState {
        let cols = ColumnSet::new(vec![ColumnDef::new("name", "Name")]).unwrap();
        let mut s = QueryState::initial(&cols, 25, vec![]);
        s.page = 4;
        s.search = "acme".into();
        s
    }

    fn echo_format(req: &Request) -> crate::testing::Reply {
        Ok(Bytes::from(format!("file:{}", req.param("format").unwrap_or("?"))))
    }

    fn is_format(f: &'static str) -> impl Fn(&Request) -> bool + Send + Sync + 'static {
        move |req: &Request| req.param("format") == Some(f)
    }

    #[tokio::test]
    async fn export_requests_full_result_and_names_file() {
        let transport = Arc::new(FakeTransport::new(echo_format));
        let sink = Arc::new(MemorySink::default());
        let trigger = ExportTrigger::new(transport.clone(), "/api/leads/", "leads", sink.clone());

        let receipt = trigger.export(&state(), ExportFormat::Csv).await.unwrap();
        assert_eq!(receipt.bytes, "file:csv".len());

        let req = &transport.requests()[0];
        assert_eq!(req.path, "/api/leads/export");
        assert_eq!(req.param("format"), Some("csv"));
        assert_eq!(req.param("search"), Some("acme"));
        assert!(req.param("page").is_none());
        assert!(req.param("pageSize").is_none());

        let saved = sink.saved.lock();
        let (name, body) = &saved[0];
        assert!(name.starts_with("leads_export_"));
        assert!(name.ends_with(".csv"));
        // leads_export_YYYY-MM-DD.csv
        assert_eq!(name.len(), "leads_export_".len() + 10 + ".csv".len());
        assert_eq!(body.as_ref(), b"file:csv");
        assert_eq!(trigger.status(ExportFormat::Csv), ExportStatus::Idle);
    }

    #[tokio::test]
    async fn csv_and_pdf_run_independently() {
        let transport = Arc::new(FakeTransport::new(echo_format));
        let sink = Arc::new(MemorySink::default());
        let trigger = ExportTrigger::new(transport.clone(), "/api/leads", "leads", sink.clone());
        let csv_gate = transport.gate(is_format("csv"));
        let pdf_gate = transport.gate(is_format("pdf"));
        let s = state();

        let (csv, pdf, ()) = tokio::join!(
            trigger.export(&s, ExportFormat::Csv),
            trigger.export(&s, ExportFormat::Pdf),
            async {
                tokio::task::yield_now().await;
                assert!(trigger.is_exporting(ExportFormat::Csv));
                assert!(trigger.is_exporting(ExportFormat::Pdf));
                csv_gate.send(Ok(Bytes::from_static(b"csv"))).unwrap();
                tokio::task::yield_now().await;
                tokio::task::yield_now().await;
                assert_eq!(trigger.status(ExportFormat::Csv), ExportStatus::Idle);
                assert!(trigger.is_exporting(ExportFormat::Pdf));
                pdf_gate.send(Ok(Bytes::from_static(b"pdf"))).unwrap();
            }
        );

        assert_eq!(csv.unwrap().format, ExportFormat::Csv);
        assert_eq!(pdf.unwrap().format, ExportFormat::Pdf);
        assert_eq!(sink.saved.lock().len(), 2);
    }

    #[tokio::test]
    async fn failure_leaves_failed_status_and_allows_retry() {
        let transport = Arc::new(FakeTransport::new(echo_format));
        let sink = Arc::new(MemorySink::default());
        let trigger = ExportTrigger::new(transport.clone(), "/api/leads", "leads", sink);
        let gate = transport.gate(is_format("pdf"));
        gate.send(Err(TransportError::Timeout)).unwrap();

        let err = trigger.export(&state(), ExportFormat::Pdf).await.unwrap_err();
        assert!(matches!(err, ExportError::Transport(TransportError::Timeout)));
        assert_eq!(
            trigger.status(ExportFormat::Pdf),
            ExportStatus::Failed("request timed out".into())
        );
        assert_eq!(trigger.status(ExportFormat::Csv), ExportStatus::Idle);

        trigger.export(&state(), ExportFormat::Pdf).await.unwrap();
        assert_eq!(trigger.status(ExportFormat::Pdf), ExportStatus::Idle);
    }

    #[tokio::test]
    async fn directory_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().join("downloads"));
        let path = sink
            .save("leads_export_2024-01-01.csv", Bytes::from_static(b"id,name\n1,Acme\n"))
            .await
            .unwrap();
        let written = tokio::fs::read(&path).await.unwrap();
        assert_eq!(written, b"id,name\n1,Acme\n");
    }
}
