use arc_swap::ArcSwap;
use std::sync::Arc;

use crate::{
    access_log::{self, AccessLogEntry, AccessLogStore},
    config::Config,
    error::AppError,
    fanout::FanoutAggregator,
    observability::{SpanAttribute, SpanGuard, SpanKind, TraceContext, Tracer},
};

/// `/hello` pipeline: id → access log → fan-out → ordered bodies
///
/// The access-log write always completes before the first outbound call;
/// if it fails no downstream service is contacted. No step is retried.
pub struct RequestGateway {
    store: Arc<dyn AccessLogStore>,
    fanout: FanoutAggregator,
    config: Arc<ArcSwap<Config>>,
    tracer: Tracer,
}

impl RequestGateway {
    pub fn new(
        store: Arc<dyn AccessLogStore>,
        fanout: FanoutAggregator,
        config: Arc<ArcSwap<Config>>,
        tracer: Tracer,
    ) -> Self {
        Self {
            store,
            fanout,
            config,
            tracer,
        }
    }

    pub async fn handle(
        &self,
        parent: Option<&TraceContext>,
        message: Option<String>,
    ) -> Result<Vec<String>, AppError> {
        let id = access_log::generate_id();
        let mut span = self.tracer.start_span(parent, "hello", SpanKind::Server);

        let result = self.record_and_fanout(&mut span, id, message).await;

        span.finish(&result);
        result
    }

    async fn record_and_fanout(
        &self,
        span: &mut SpanGuard,
        id: String,
        message: Option<String>,
    ) -> Result<Vec<String>, AppError> {
        let entry = AccessLogEntry::new(id, message, Some(span.context().trace_id.clone()));
        self.store.insert(&entry).await?;

        let message = entry.message.clone().unwrap_or_default();
        tracing::info!(
            access_log_id = %entry.id,
            trace_id = %span.context().trace_id,
            message = %message,
            "Access log recorded"
        );
        span.set_attributes([
            SpanAttribute::AccessLogId(entry.id.clone()),
            SpanAttribute::Message(message),
        ]);

        let config = self.config.load_full();
        span.set_attribute(SpanAttribute::TargetCount(config.fanout.targets.len()));

        let bodies = self.fanout.fanout(span, &config.fanout.targets).await?;
        Ok(bodies)
    }
}
