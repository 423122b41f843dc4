//! Trace context propagation over HTTP headers
//!
//! Outbound calls carry both the W3C `traceparent` header and Google Cloud's
//! `X-Cloud-Trace-Context`, so downstream services on either convention can
//! attach their spans as children. Inbound extraction prefers W3C.

use axum::http::{HeaderMap, HeaderValue};

use super::span::TraceContext;

/// W3C Trace Context header name
pub const TRACEPARENT_HEADER: &str = "traceparent";
/// Google Cloud trace header name
pub const CLOUD_TRACE_HEADER: &str = "x-cloud-trace-context";

impl TraceContext {
    /// Format as W3C traceparent header value
    /// Format: version-trace_id-span_id-flags
    pub fn to_traceparent(&self) -> String {
        format!(
            "00-{}-{}-{:02x}",
            self.trace_id,
            self.span_id,
            u8::from(self.sampled)
        )
    }

    /// Parse from W3C traceparent header value
    pub fn from_traceparent(value: &str) -> Option<Self> {
        let parts: Vec<&str> = value.trim().split('-').collect();
        if parts.len() != 4 || parts[0] != "00" {
            return None;
        }

        let (trace_id, span_id, flags) = (parts[1], parts[2], parts[3]);
        if trace_id.len() != 32 || span_id.len() != 16 || flags.len() != 2 {
            return None;
        }
        if !is_hex(trace_id) || !is_hex(span_id) || is_zero(trace_id) || is_zero(span_id) {
            return None;
        }

        let flags = u8::from_str_radix(flags, 16).ok()?;

        Some(Self {
            trace_id: trace_id.to_ascii_lowercase(),
            span_id: span_id.to_ascii_lowercase(),
            sampled: flags & 0x01 != 0,
        })
    }

    /// Format as `X-Cloud-Trace-Context` header value
    /// Format: TRACE_ID/SPAN_ID;o=OPTIONS, span id in decimal
    pub fn to_cloud_trace_context(&self) -> String {
        let span_id = u64::from_str_radix(&self.span_id, 16).unwrap_or_default();
        format!(
            "{}/{};o={}",
            self.trace_id,
            span_id,
            u8::from(self.sampled)
        )
    }

    /// Parse from `X-Cloud-Trace-Context` header value
    pub fn from_cloud_trace_context(value: &str) -> Option<Self> {
        let (trace_id, rest) = value.trim().split_once('/')?;
        if trace_id.len() != 32 || !is_hex(trace_id) || is_zero(trace_id) {
            return None;
        }

        let (span_id, options) = match rest.split_once(';') {
            Some((span_id, options)) => (span_id, Some(options)),
            None => (rest, None),
        };
        let span_id: u64 = span_id.parse().ok()?;
        if span_id == 0 {
            return None;
        }

        // `o` is a bitmask; bit 0 is the trace flag
        let sampled = options
            .and_then(|o| o.strip_prefix("o="))
            .and_then(|o| o.parse::<u32>().ok())
            .map(|o| o & 0x01 != 0)
            .unwrap_or(false);

        Some(Self {
            trace_id: trace_id.to_ascii_lowercase(),
            span_id: format!("{:016x}", span_id),
            sampled,
        })
    }
}

/// Extract the caller's trace context from inbound request headers
pub fn extract(headers: &HeaderMap) -> Option<TraceContext> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    header(TRACEPARENT_HEADER)
        .and_then(TraceContext::from_traceparent)
        .or_else(|| header(CLOUD_TRACE_HEADER).and_then(TraceContext::from_cloud_trace_context))
}

/// Build the propagation headers for an outbound call
pub fn inject(ctx: &TraceContext) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&ctx.to_traceparent()) {
        headers.insert(TRACEPARENT_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&ctx.to_cloud_trace_context()) {
        headers.insert(CLOUD_TRACE_HEADER, value);
    }
    headers
}

fn is_hex(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_zero(s: &str) -> bool {
    s.chars().all(|c| c == '0')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_context() -> TraceContext {
        TraceContext {
            trace_id: "4bf92f3577b34da6a3ce929d0e0e4736".to_string(),
            span_id: "00f067aa0ba902b7".to_string(),
            sampled: true,
        }
    }

    #[test]
    fn test_traceparent_format() {
        assert_eq!(
            sample_context().to_traceparent(),
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"
        );
    }

    #[test]
    fn test_traceparent_parse() {
        let ctx = TraceContext::from_traceparent(
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00",
        )
        .unwrap();
        assert_eq!(ctx.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(ctx.span_id, "00f067aa0ba902b7");
        assert!(!ctx.sampled);
    }

    #[test]
    fn test_traceparent_rejects_malformed() {
        assert!(TraceContext::from_traceparent("garbage").is_none());
        assert!(TraceContext::from_traceparent(
            "01-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"
        )
        .is_none());
        assert!(TraceContext::from_traceparent(
            "00-00000000000000000000000000000000-00f067aa0ba902b7-01"
        )
        .is_none());
        assert!(TraceContext::from_traceparent("00-4bf92f35-00f067aa0ba902b7-01").is_none());
    }

    #[test]
    fn test_cloud_trace_context_format() {
        // 0x00f067aa0ba902b7 == 67667974448284343
        assert_eq!(
            sample_context().to_cloud_trace_context(),
            "4bf92f3577b34da6a3ce929d0e0e4736/67667974448284343;o=1"
        );
    }

    #[test]
    fn test_cloud_trace_context_parse() {
        let ctx = TraceContext::from_cloud_trace_context(
            "4bf92f3577b34da6a3ce929d0e0e4736/67667974448284343;o=1",
        )
        .unwrap();
        assert_eq!(ctx, sample_context());

        let unsampled =
            TraceContext::from_cloud_trace_context("4bf92f3577b34da6a3ce929d0e0e4736/1").unwrap();
        assert!(!unsampled.sampled);
        assert_eq!(unsampled.span_id, "0000000000000001");
    }

    #[test]
    fn test_cloud_trace_options_are_a_bitmask() {
        let parse = |o: &str| {
            TraceContext::from_cloud_trace_context(&format!(
                "4bf92f3577b34da6a3ce929d0e0e4736/1;o={}",
                o
            ))
            .unwrap()
            .sampled
        };

        assert!(parse("1"));
        assert!(parse("3"));
        assert!(!parse("2"));
        assert!(!parse("0"));
        assert!(!parse("x"));
    }

    #[test]
    fn test_extract_prefers_w3c() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CLOUD_TRACE_HEADER,
            HeaderValue::from_static("11111111111111111111111111111111/5;o=1"),
        );
        headers.insert(
            TRACEPARENT_HEADER,
            HeaderValue::from_static("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"),
        );

        let ctx = extract(&headers).unwrap();
        assert_eq!(ctx.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
    }

    #[test]
    fn test_extract_falls_back_to_cloud_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CLOUD_TRACE_HEADER,
            HeaderValue::from_static("11111111111111111111111111111111/5;o=1"),
        );

        let ctx = extract(&headers).unwrap();
        assert_eq!(ctx.trace_id, "11111111111111111111111111111111");
        assert_eq!(ctx.span_id, "0000000000000005");
        assert!(extract(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_inject_sets_both_headers() {
        let headers = inject(&sample_context());
        assert_eq!(
            headers.get(TRACEPARENT_HEADER).unwrap(),
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"
        );
        assert!(headers.get(CLOUD_TRACE_HEADER).is_some());
    }
}
