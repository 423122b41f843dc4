//! Request tracing for fanout-gateway
//!
//! - **Spans**: guard-scoped, closed exactly once on every exit path
//! - **Attributes**: a fixed, typed set of keys per span
//! - **Propagation**: W3C `traceparent` and `X-Cloud-Trace-Context` headers
//! - **Export**: completed spans go to a [`SpanExporter`]
//!
//! ```text
//! inbound headers ──extract──▶ Tracer::start_span ──▶ SpanGuard
//!                                                      │ child()
//!                                                      ▼
//!                               outbound headers ◀──inject── SpanGuard
//!                                                      │ finish()/drop
//!                                                      ▼
//!                                                 SpanExporter
//! ```

pub mod attributes;
pub mod exporter;
pub mod propagation;
pub mod span;

pub use attributes::{Attributes, SpanAttribute};
pub use exporter::{InMemoryExporter, LogExporter, SpanExporter};
pub use span::{SpanGuard, SpanKind, SpanRecord, SpanStatus, TraceContext, Tracer};
