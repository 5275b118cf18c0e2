//! Pipeline telemetry.
//!
//! [`Telemetry`] is an explicit handle built once in `main` and passed to the
//! components that report through it. With Langfuse credentials it buffers
//! ingestion events and ships them on [`Telemetry::flush`]; without them it
//! only mirrors events to `tracing`. Telemetry never affects pipeline
//! outcomes: every failure here is logged and dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

/// Langfuse batch ingestion endpoint.
pub const INGESTION_PATH: &str = "/api/public/ingestion";

const FLUSH_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize)]
struct IngestionEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: &'static str,
    timestamp: String,
    body: Value,
}

impl IngestionEvent {
    fn new(event_type: &'static str, body: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            timestamp: Utc::now().to_rfc3339(),
            body,
        }
    }
}

struct LangfuseSink {
    host: String,
    public_key: String,
    secret_key: String,
    http_client: Client,
}

struct Inner {
    sink: Option<LangfuseSink>,
    buffer: Mutex<Vec<IngestionEvent>>,
    active: AtomicBool,
}

/// Shared telemetry handle. Cloning is cheap.
#[derive(Clone)]
pub struct Telemetry {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("exporting", &self.is_exporting())
            .field("pending_events", &self.pending_events())
            .finish()
    }
}

impl Telemetry {
    /// Telemetry that only mirrors events to `tracing`.
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(Inner {
                sink: None,
                buffer: Mutex::new(Vec::new()),
                active: AtomicBool::new(false),
            }),
        }
    }

    /// Telemetry exporting to a Langfuse server at `host`.
    pub fn langfuse(host: &str, public_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        let sink = LangfuseSink {
            host: host.trim_end_matches('/').to_string(),
            public_key: public_key.into(),
            secret_key: secret_key.into(),
            http_client: Client::builder()
                .timeout(Duration::from_secs(FLUSH_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
        };
        Self {
            inner: Arc::new(Inner {
                sink: Some(sink),
                buffer: Mutex::new(Vec::new()),
                active: AtomicBool::new(true),
            }),
        }
    }

    /// Whether events are buffered for export.
    pub fn is_exporting(&self) -> bool {
        self.inner.sink.is_some() && self.inner.active.load(Ordering::SeqCst)
    }

    /// Number of buffered events not yet flushed.
    pub fn pending_events(&self) -> usize {
        self.inner.buffer.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// Open a trace for one pipeline run.
    pub fn trace(&self, name: &str, metadata: Value) -> PipelineTrace {
        let trace_id = Uuid::new_v4().to_string();
        debug!(trace_id = %trace_id, name, "Trace started");
        self.record(IngestionEvent::new(
            "trace-create",
            json!({
                "id": trace_id,
                "name": name,
                "metadata": metadata,
                "timestamp": Utc::now().to_rfc3339(),
            }),
        ));
        PipelineTrace {
            telemetry: self.clone(),
            trace_id,
        }
    }

    fn record(&self, event: IngestionEvent) {
        if !self.is_exporting() {
            return;
        }
        if let Ok(mut buffer) = self.inner.buffer.lock() {
            buffer.push(event);
        }
    }

    /// Send buffered events. Failures are logged and the batch is dropped.
    pub async fn flush(&self) {
        let Some(sink) = &self.inner.sink else {
            return;
        };

        let batch = match self.inner.buffer.lock() {
            Ok(mut buffer) => std::mem::take(&mut *buffer),
            Err(_) => return,
        };
        if batch.is_empty() {
            return;
        }

        let url = format!("{}{}", sink.host, INGESTION_PATH);
        let count = batch.len();
        let result = sink
            .http_client
            .post(&url)
            .basic_auth(&sink.public_key, Some(&sink.secret_key))
            .json(&json!({ "batch": batch }))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(events = count, "Telemetry flushed");
            }
            Ok(response) => {
                warn!(events = count, status = response.status().as_u16(), "Telemetry export rejected");
            }
            Err(e) => {
                warn!(events = count, error = %e, "Telemetry export failed");
            }
        }
    }

    /// Flush pending events and stop buffering new ones.
    pub async fn shutdown(&self) {
        self.flush().await;
        self.inner.active.store(false, Ordering::SeqCst);
    }
}

/// Handle to one open trace.
#[derive(Debug, Clone)]
pub struct PipelineTrace {
    telemetry: Telemetry,
    trace_id: String,
}

impl PipelineTrace {
    pub fn id(&self) -> &str {
        &self.trace_id
    }

    /// Record a stage transition.
    pub fn event(&self, step: &str, status: &str, detail: Option<&str>) {
        debug!(trace_id = %self.trace_id, step, status, detail, "Pipeline event");
        self.telemetry.record(IngestionEvent::new(
            "event-create",
            json!({
                "id": Uuid::new_v4().to_string(),
                "traceId": self.trace_id,
                "name": format!("{}.{}", step, status),
                "metadata": { "detail": detail },
                "startTime": Utc::now().to_rfc3339(),
            }),
        ));
    }

    /// Attach the run's final output to the trace.
    pub fn finish(&self, output: &str, is_error: bool) {
        debug!(trace_id = %self.trace_id, is_error, "Trace finished");
        self.telemetry.record(IngestionEvent::new(
            "trace-create",
            json!({
                "id": self.trace_id,
                "output": output,
                "metadata": { "error": is_error },
            }),
        ));
    }
}
