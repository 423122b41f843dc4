pub mod delete_job;
pub mod health;
pub mod hello;
pub mod metrics_handler;

use std::sync::Arc;

use crate::{gateway::RequestGateway, job_deletion::JobDeletionWorkflow};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<RequestGateway>,
    pub deletion: Arc<JobDeletionWorkflow>,
}

/// Decoded `key=value` pairs of a query string or form body, in order
pub type FormPairs = Vec<(String, String)>;

/// First value for `key` in the form body, else in the query string
///
/// Repeated keys are allowed; later occurrences are ignored.
pub(crate) fn form_value(
    form: Option<&FormPairs>,
    query: Option<&FormPairs>,
    key: &str,
) -> Option<String> {
    let first = |pairs: &FormPairs| {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    };

    form.and_then(first).or_else(|| query.and_then(first))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> FormPairs {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_form_value_takes_first_occurrence() {
        let query = pairs(&[("message", "first"), ("message", "second")]);
        assert_eq!(form_value(None, Some(&query), "message").as_deref(), Some("first"));
    }

    #[test]
    fn test_form_value_prefers_body() {
        let form = pairs(&[("jobName", "from-body")]);
        let query = pairs(&[("jobName", "from-query")]);
        assert_eq!(
            form_value(Some(&form), Some(&query), "jobName").as_deref(),
            Some("from-body")
        );
        assert_eq!(
            form_value(Some(&pairs(&[])), Some(&query), "jobName").as_deref(),
            Some("from-query")
        );
        assert_eq!(form_value(None, None, "jobName"), None);
    }
}
