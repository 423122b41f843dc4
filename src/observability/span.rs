//! Span lifecycle for request tracing
//!
//! A [`SpanGuard`] is the only way to open a span. It is closed either
//! explicitly with [`SpanGuard::finish`] or, on any other exit path
//! (early return, `?`, future dropped by a disconnecting client), by its
//! `Drop` impl. Either way the span is exported exactly once.

use rand::Rng;
use std::fmt::Display;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::attributes::{Attributes, SpanAttribute};
use super::exporter::SpanExporter;

/// Span kind (similar to OpenTelemetry, but simplified)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    /// Server-side request handler
    Server,
    /// Client-side outgoing request
    Client,
    /// Internal operation
    Internal,
}

impl SpanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanKind::Server => "server",
            SpanKind::Client => "client",
            SpanKind::Internal => "internal",
        }
    }
}

/// Propagation token: the read-only identity of a span
///
/// This is all a child operation or a downstream service ever receives
/// from its parent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceContext {
    /// 128-bit trace id, 32 lowercase hex chars
    pub trace_id: String,
    /// 64-bit span id, 16 lowercase hex chars
    pub span_id: String,
    pub sampled: bool,
}

impl TraceContext {
    /// Create a new root context with random ids
    pub fn new_root(sampled: bool) -> Self {
        Self {
            trace_id: generate_trace_id(),
            span_id: generate_span_id(),
            sampled,
        }
    }

    /// Create a context for a child span in the same trace
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: generate_span_id(),
            sampled: self.sampled,
        }
    }
}

/// Factory for spans, shared by all handlers
#[derive(Clone)]
pub struct Tracer {
    exporter: Arc<dyn SpanExporter>,
    sample_ratio: f64,
}

impl Tracer {
    pub fn new(exporter: Arc<dyn SpanExporter>, sample_ratio: f64) -> Self {
        Self {
            exporter,
            sample_ratio,
        }
    }

    /// Open a span. Without a parent a new trace is started and the
    /// sampling decision is made here; with one it is inherited.
    pub fn start_span(
        &self,
        parent: Option<&TraceContext>,
        name: &'static str,
        kind: SpanKind,
    ) -> SpanGuard {
        let (context, parent_span_id) = match parent {
            Some(parent) => (parent.child(), Some(parent.span_id.clone())),
            None => (TraceContext::new_root(self.sample()), None),
        };

        SpanGuard {
            context,
            open: Some(OpenSpan {
                parent_span_id,
                name,
                kind,
                start_time: current_millis(),
                attributes: Attributes::default(),
            }),
            exporter: self.exporter.clone(),
            sample_ratio: self.sample_ratio,
        }
    }

    fn sample(&self) -> bool {
        if self.sample_ratio >= 1.0 {
            true
        } else if self.sample_ratio <= 0.0 {
            false
        } else {
            rand::thread_rng().gen_bool(self.sample_ratio)
        }
    }
}

#[derive(Debug)]
struct OpenSpan {
    parent_span_id: Option<String>,
    name: &'static str,
    kind: SpanKind,
    start_time: u64,
    attributes: Attributes,
}

/// An open span; closes itself on drop
#[derive(Debug)]
pub struct SpanGuard {
    context: TraceContext,
    /// `None` once the span has been closed
    open: Option<OpenSpan>,
    exporter: Arc<dyn SpanExporter>,
    sample_ratio: f64,
}

impl SpanGuard {
    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    pub fn set_attribute(&mut self, attribute: SpanAttribute) {
        if let Some(open) = self.open.as_mut() {
            open.attributes.set(attribute);
        }
    }

    /// Merge several attributes; later keys overwrite earlier ones
    pub fn set_attributes(&mut self, attributes: impl IntoIterator<Item = SpanAttribute>) {
        if let Some(open) = self.open.as_mut() {
            open.attributes.extend(attributes);
        }
    }

    /// Open a child span in the same trace
    pub fn child(&self, name: &'static str, kind: SpanKind) -> SpanGuard {
        Tracer::new(self.exporter.clone(), self.sample_ratio).start_span(
            Some(&self.context),
            name,
            kind,
        )
    }

    /// Close the span, marking it failed if `result` is an error
    pub fn finish<T, E: Display>(mut self, result: &Result<T, E>) {
        match result {
            Ok(_) => self.close(SpanStatus::Ok, None),
            Err(e) => self.close(SpanStatus::Error, Some(e.to_string())),
        }
    }

    fn close(&mut self, status: SpanStatus, error: Option<String>) {
        if let Some(open) = self.open.take() {
            if self.context.sampled {
                self.exporter
                    .export(SpanRecord::from_span(&self.context, &open, status, error));
            }
        }
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        // Reached only when `finish` was never called
        self.close(
            SpanStatus::Cancelled,
            Some("span dropped before completion".to_string()),
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanStatus {
    Ok,
    Error,
    Cancelled,
}

impl SpanStatus {
    pub fn is_error(&self) -> bool {
        !matches!(self, SpanStatus::Ok)
    }
}

/// Completed span, as handed to the exporter
#[derive(Debug, Clone)]
pub struct SpanRecord {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub name: String,
    pub kind: SpanKind,
    pub start_time: u64,
    pub end_time: u64,
    pub duration_ms: u64,
    pub status: SpanStatus,
    pub error: Option<String>,
    pub attributes: serde_json::Value,
}

impl SpanRecord {
    fn from_span(
        context: &TraceContext,
        span: &OpenSpan,
        status: SpanStatus,
        error: Option<String>,
    ) -> Self {
        let end_time = current_millis();

        Self {
            trace_id: context.trace_id.clone(),
            span_id: context.span_id.clone(),
            parent_span_id: span.parent_span_id.clone(),
            name: span.name.to_string(),
            kind: span.kind,
            start_time: span.start_time,
            end_time,
            duration_ms: end_time.saturating_sub(span.start_time),
            status,
            error,
            attributes: span.attributes.to_json(),
        }
    }
}

/// Get current time as Unix milliseconds
pub fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn generate_trace_id() -> String {
    let id: u128 = loop {
        // All-zero ids are invalid in both propagation formats
        let candidate = rand::random::<u128>();
        if candidate != 0 {
            break candidate;
        }
    };
    format!("{:032x}", id)
}

fn generate_span_id() -> String {
    let id: u64 = loop {
        let candidate = rand::random::<u64>();
        if candidate != 0 {
            break candidate;
        }
    };
    format!("{:016x}", id)
}
