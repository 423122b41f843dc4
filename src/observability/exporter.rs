//! Sinks for completed spans

use std::fmt::Debug;
use std::sync::Mutex;

use super::span::SpanRecord;

/// Receives every sampled span exactly once, when it closes
pub trait SpanExporter: Send + Sync + Debug {
    fn export(&self, record: SpanRecord);
}

/// Emits each span as a structured `tracing` event under the `span` target
///
/// With a project id the event also carries `logging.googleapis.com/trace`
/// so Cloud Logging groups it with the request trace.
#[derive(Debug, Default)]
pub struct LogExporter {
    project_id: Option<String>,
}

impl LogExporter {
    pub fn new(project_id: Option<String>) -> Self {
        Self { project_id }
    }

    fn trace_resource(&self, trace_id: &str) -> String {
        match &self.project_id {
            Some(project) => format!("projects/{}/traces/{}", project, trace_id),
            None => String::new(),
        }
    }
}

impl SpanExporter for LogExporter {
    fn export(&self, record: SpanRecord) {
        let trace = self.trace_resource(&record.trace_id);
        if record.status.is_error() {
            tracing::warn!(
                target: "span",
                trace_id = %record.trace_id,
                "logging.googleapis.com/trace" = %trace,
                span_id = %record.span_id,
                parent_span_id = record.parent_span_id.as_deref().unwrap_or(""),
                name = %record.name,
                kind = record.kind.as_str(),
                duration_ms = record.duration_ms,
                status = ?record.status,
                error = record.error.as_deref().unwrap_or(""),
                attributes = %record.attributes,
                "Span closed"
            );
        } else {
            tracing::info!(
                target: "span",
                trace_id = %record.trace_id,
                "logging.googleapis.com/trace" = %trace,
                span_id = %record.span_id,
                parent_span_id = record.parent_span_id.as_deref().unwrap_or(""),
                name = %record.name,
                kind = record.kind.as_str(),
                duration_ms = record.duration_ms,
                attributes = %record.attributes,
                "Span closed"
            );
        }
    }
}

/// Keeps spans in memory; used by tests and local debugging
#[derive(Debug, Default)]
pub struct InMemoryExporter {
    spans: Mutex<Vec<SpanRecord>>,
}

impl InMemoryExporter {
    /// Snapshot of the spans exported so far, in close order
    pub fn spans(&self) -> Vec<SpanRecord> {
        self.spans
            .lock()
            .map(|spans| spans.clone())
            .unwrap_or_default()
    }

    pub fn find(&self, name: &str) -> Vec<SpanRecord> {
        self.spans()
            .into_iter()
            .filter(|span| span.name == name)
            .collect()
    }
}

impl SpanExporter for InMemoryExporter {
    fn export(&self, record: SpanRecord) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.push(record);
        }
    }
}
