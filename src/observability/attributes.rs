//! Typed span attributes
//!
//! Spans only accept the keys enumerated in [`SpanAttribute`]:
//!
//! | key              | set by                         |
//! |------------------|--------------------------------|
//! | `access_log_id`  | `/hello`                       |
//! | `message`        | `/hello`                       |
//! | `target_count`   | fan-out                        |
//! | `target_url`     | fan-out, per outbound call     |
//! | `http_status`    | fan-out, per outbound call     |
//! | `job_name`       | `/deleteSchedulerJob`          |
//! | `deletion_state` | `/deleteSchedulerJob`          |
//! | `confirm_error`  | `/deleteSchedulerJob`          |

use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum SpanAttribute {
    AccessLogId(String),
    Message(String),
    TargetCount(usize),
    TargetUrl(String),
    HttpStatus(u16),
    JobName(String),
    DeletionState(&'static str),
    ConfirmError(String),
}

impl SpanAttribute {
    pub fn key(&self) -> &'static str {
        match self {
            SpanAttribute::AccessLogId(_) => "access_log_id",
            SpanAttribute::Message(_) => "message",
            SpanAttribute::TargetCount(_) => "target_count",
            SpanAttribute::TargetUrl(_) => "target_url",
            SpanAttribute::HttpStatus(_) => "http_status",
            SpanAttribute::JobName(_) => "job_name",
            SpanAttribute::DeletionState(_) => "deletion_state",
            SpanAttribute::ConfirmError(_) => "confirm_error",
        }
    }

    pub fn value(&self) -> Value {
        match self {
            SpanAttribute::AccessLogId(v)
            | SpanAttribute::Message(v)
            | SpanAttribute::TargetUrl(v)
            | SpanAttribute::JobName(v)
            | SpanAttribute::ConfirmError(v) => Value::from(v.as_str()),
            SpanAttribute::TargetCount(n) => Value::from(*n),
            SpanAttribute::HttpStatus(code) => Value::from(*code),
            SpanAttribute::DeletionState(state) => Value::from(*state),
        }
    }
}

/// Attribute accumulator with last-write-wins merge
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    entries: BTreeMap<&'static str, SpanAttribute>,
}

impl Attributes {
    pub fn set(&mut self, attribute: SpanAttribute) {
        self.entries.insert(attribute.key(), attribute);
    }

    #[cfg(test)]
    pub(crate) fn get(&self, key: &str) -> Option<&SpanAttribute> {
        self.entries.get(key)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(key, attribute)| (key.to_string(), attribute.value()))
                .collect(),
        )
    }
}

impl Extend<SpanAttribute> for Attributes {
    fn extend<I: IntoIterator<Item = SpanAttribute>>(&mut self, iter: I) {
        for attribute in iter {
            self.set(attribute);
        }
    }
}
