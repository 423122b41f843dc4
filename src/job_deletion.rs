//! Scheduler job deletion with confirmation and cooldown
//!
//! ```text
//! Initial ──delete ok──▶ Deleting ──get: not found──▶ Confirmed
//!    │                      └──────get: found/error──▶ Unconfirmed
//!    ├──delete: not found──▶ AlreadyAbsent
//!    └──delete: error──────▶ Failed
//! ```
//!
//! Every state except `Failed` answers 200. After a successful delete the
//! job name stays locked for the cooldown, in a detached task, so a
//! retrying caller re-entering for the same job waits instead of racing
//! the scheduler backend. The cooldown is not tied to the inbound request
//! and is never cancelled by it.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex, OwnedMutexGuard};

use crate::{
    error::AppError,
    metrics,
    observability::{SpanAttribute, SpanGuard, SpanKind, TraceContext, Tracer},
    scheduler::{self, Job, SchedulerClient, SchedulerError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionState {
    Initial,
    Deleting,
    /// Delete succeeded and a follow-up lookup reported the job missing
    Confirmed,
    /// Delete succeeded but the lookup found the job or failed
    Unconfirmed,
    /// Delete reported not found: an earlier invocation already removed it
    AlreadyAbsent,
    Failed,
}

impl DeletionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionState::Initial => "initial",
            DeletionState::Deleting => "deleting",
            DeletionState::Confirmed => "confirmed",
            DeletionState::Unconfirmed => "unconfirmed",
            DeletionState::AlreadyAbsent => "already_absent",
            DeletionState::Failed => "failed",
        }
    }
}

/// Result of the confirmation lookup
#[derive(Debug)]
pub enum Confirmation {
    Absent,
    StillPresent(Job),
    LookupFailed(SchedulerError),
}

#[derive(Debug)]
pub struct DeletionOutcome {
    pub state: DeletionState,
    /// `None` when no lookup was made
    pub confirmation: Option<Confirmation>,
}

#[derive(Clone)]
pub struct JobDeletionWorkflow {
    scheduler: Arc<dyn SchedulerClient>,
    tracer: Tracer,
    cooldown: Duration,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl JobDeletionWorkflow {
    pub fn new(scheduler: Arc<dyn SchedulerClient>, tracer: Tracer, cooldown: Duration) -> Self {
        Self {
            scheduler,
            tracer,
            cooldown,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Delete `job_name` and confirm it is gone
    ///
    /// Waits for any earlier invocation on the same job name, including its
    /// cooldown, before issuing the delete.
    pub async fn run(
        &self,
        parent: Option<&TraceContext>,
        job_name: &str,
    ) -> Result<DeletionOutcome, AppError> {
        let mut span = self
            .tracer
            .start_span(parent, "delete_scheduler_job", SpanKind::Server);
        span.set_attribute(SpanAttribute::JobName(job_name.to_string()));

        if let Err(reason) = scheduler::validate_job_name(job_name) {
            let result: Result<DeletionOutcome, AppError> = Err(AppError::InvalidJobName(reason));
            span.finish(&result);
            return result;
        }

        let guard = self.lock(job_name).await;

        // From here on the work runs detached: a caller that disconnects
        // mid-delete must not skip the confirmation or the cooldown.
        let (tx, rx) = oneshot::channel();
        let workflow = self.clone();
        let job_name = job_name.to_string();
        tokio::spawn(async move {
            let result = workflow.delete_and_confirm(&mut span, &job_name).await;

            let state = match &result {
                Ok(outcome) => outcome.state,
                Err(_) => DeletionState::Failed,
            };
            span.set_attribute(SpanAttribute::DeletionState(state.as_str()));
            metrics::record_deletion(state.as_str());
            span.finish(&result);

            let deleted = result.is_ok();
            let _ = tx.send(result);

            if deleted && !workflow.cooldown.is_zero() {
                tokio::time::sleep(workflow.cooldown).await;
                tracing::debug!(job_name = %job_name, "Deletion cooldown elapsed");
            }
            workflow.release(&job_name, guard);
        });

        rx.await.unwrap_or_else(|_| {
            Err(AppError::Internal(
                "job deletion task ended unexpectedly".to_string(),
            ))
        })
    }

    async fn delete_and_confirm(
        &self,
        span: &mut SpanGuard,
        job_name: &str,
    ) -> Result<DeletionOutcome, AppError> {
        let trace = span.context().clone();

        tracing::debug!(job_name = %job_name, state = DeletionState::Initial.as_str(), "Deleting scheduler job");
        match self.scheduler.delete_job(job_name, &trace).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::info!(job_name = %job_name, "Scheduler job already absent");
                return Ok(DeletionOutcome {
                    state: DeletionState::AlreadyAbsent,
                    confirmation: None,
                });
            }
            Err(e) => {
                tracing::error!(job_name = %job_name, error = %e, "Failed to delete scheduler job");
                return Err(AppError::SchedulerDelete(e));
            }
        }

        tracing::debug!(job_name = %job_name, state = DeletionState::Deleting.as_str(), "Confirming scheduler job deletion");
        let confirmation = match self.scheduler.get_job(job_name, &trace).await {
            Err(e) if e.is_not_found() => Confirmation::Absent,
            Err(e) => Confirmation::LookupFailed(e),
            Ok(job) => Confirmation::StillPresent(job),
        };

        let state = match &confirmation {
            Confirmation::Absent => {
                tracing::info!(job_name = %job_name, "Scheduler job deletion confirmed");
                DeletionState::Confirmed
            }
            Confirmation::StillPresent(job) => {
                tracing::warn!(
                    job_name = %job_name,
                    job_state = job.state.as_deref().unwrap_or("unknown"),
                    "Scheduler job still present after delete"
                );
                span.set_attribute(SpanAttribute::ConfirmError("job still present".to_string()));
                DeletionState::Unconfirmed
            }
            Confirmation::LookupFailed(e) => {
                tracing::warn!(job_name = %job_name, error = %e, "Could not confirm scheduler job deletion");
                span.set_attribute(SpanAttribute::ConfirmError(e.to_string()));
                DeletionState::Unconfirmed
            }
        };

        Ok(DeletionOutcome {
            state,
            confirmation: Some(confirmation),
        })
    }

    async fn lock(&self, job_name: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(job_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drop the guard and forget the lock once nobody else holds or awaits it
    fn release(&self, job_name: &str, guard: OwnedMutexGuard<()>) {
        drop(guard);
        self.locks
            .remove_if(job_name, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::InMemoryExporter;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const JOB: &str = "projects/p/locations/l/jobs/j";

    #[derive(Default)]
    struct Scripted {
        delete_fails: bool,
        still_present: bool,
        delete_delay: Duration,
        deletes: AtomicUsize,
        gets: AtomicUsize,
    }

    #[async_trait]
    impl SchedulerClient for Scripted {
        async fn delete_job(&self, name: &str, _: &TraceContext) -> Result<(), SchedulerError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            if !self.delete_delay.is_zero() {
                tokio::time::sleep(self.delete_delay).await;
            }
            if self.delete_fails {
                Err(SchedulerError::Api {
                    status: StatusCode::FORBIDDEN,
                    message: "denied".to_string(),
                })
            } else if self.deletes.load(Ordering::SeqCst) > 1 {
                Err(SchedulerError::NotFound(name.to_string()))
            } else {
                Ok(())
            }
        }

        async fn get_job(&self, name: &str, _: &TraceContext) -> Result<Job, SchedulerError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            if self.still_present {
                Ok(Job {
                    name: name.to_string(),
                    schedule: None,
                    time_zone: None,
                    state: Some("ENABLED".to_string()),
                })
            } else {
                Err(SchedulerError::NotFound(name.to_string()))
            }
        }
    }

    fn workflow(
        scheduler: Arc<Scripted>,
        cooldown: Duration,
    ) -> (JobDeletionWorkflow, Arc<InMemoryExporter>) {
        let exporter = Arc::new(InMemoryExporter::default());
        let tracer = Tracer::new(exporter.clone(), 1.0);
        (JobDeletionWorkflow::new(scheduler, tracer, cooldown), exporter)
    }

    #[tokio::test]
    async fn test_confirmed_when_lookup_reports_not_found() {
        let scheduler = Arc::new(Scripted::default());
        let (workflow, exporter) = workflow(scheduler.clone(), Duration::ZERO);

        let outcome = workflow.run(None, JOB).await.unwrap();

        assert_eq!(outcome.state, DeletionState::Confirmed);
        assert!(matches!(outcome.confirmation, Some(Confirmation::Absent)));
        assert_eq!(scheduler.gets.load(Ordering::SeqCst), 1);

        let spans = exporter.find("delete_scheduler_job");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].attributes["deletion_state"], "confirmed");
    }

    #[tokio::test]
    async fn test_unconfirmed_when_job_still_present() {
        let scheduler = Arc::new(Scripted {
            still_present: true,
            ..Scripted::default()
        });
        let (workflow, _) = workflow(scheduler, Duration::ZERO);

        let outcome = workflow.run(None, JOB).await.unwrap();

        assert_eq!(outcome.state, DeletionState::Unconfirmed);
        assert!(matches!(outcome.confirmation, Some(Confirmation::StillPresent(_))));
    }

    #[tokio::test]
    async fn test_delete_failure_skips_confirmation() {
        let scheduler = Arc::new(Scripted {
            delete_fails: true,
            ..Scripted::default()
        });
        let (workflow, exporter) = workflow(scheduler.clone(), Duration::ZERO);

        let result = workflow.run(None, JOB).await;

        assert!(matches!(result, Err(AppError::SchedulerDelete(_))));
        assert_eq!(scheduler.gets.load(Ordering::SeqCst), 0);
        assert_eq!(
            exporter.find("delete_scheduler_job")[0].attributes["deletion_state"],
            "failed"
        );
    }

    #[tokio::test]
    async fn test_second_delete_is_already_absent() {
        let scheduler = Arc::new(Scripted::default());
        let (workflow, _) = workflow(scheduler.clone(), Duration::ZERO);

        let first = workflow.run(None, JOB).await.unwrap();
        let second = workflow.run(None, JOB).await.unwrap();

        assert_eq!(first.state, DeletionState::Confirmed);
        assert_eq!(second.state, DeletionState::AlreadyAbsent);
        assert_eq!(scheduler.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_job_name_never_reaches_scheduler() {
        let scheduler = Arc::new(Scripted::default());
        let (workflow, _) = workflow(scheduler.clone(), Duration::ZERO);

        let result = workflow.run(None, "jobs/j").await;

        assert!(matches!(result, Err(AppError::InvalidJobName(_))));
        assert_eq!(scheduler.deletes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reentry_waits_for_cooldown() {
        let scheduler = Arc::new(Scripted::default());
        let cooldown = Duration::from_secs(300);
        let (workflow, _) = workflow(scheduler.clone(), cooldown);

        let start = tokio::time::Instant::now();
        workflow.run(None, JOB).await.unwrap();
        assert!(start.elapsed() < cooldown, "first call must not block on cooldown");

        workflow.run(None, JOB).await.unwrap();
        assert!(start.elapsed() >= cooldown);
        assert_eq!(scheduler.deletes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_caller_does_not_cancel_confirmation_or_cooldown() {
        let scheduler = Arc::new(Scripted {
            delete_delay: Duration::from_millis(100),
            ..Scripted::default()
        });
        let cooldown = Duration::from_millis(500);
        let (workflow, exporter) = workflow(scheduler.clone(), cooldown);

        let start = tokio::time::Instant::now();
        let caller = tokio::spawn({
            let workflow = workflow.clone();
            async move { workflow.run(None, JOB).await }
        });

        // Abort while delete_job is still in flight
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(scheduler.deletes.load(Ordering::SeqCst), 1);
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());

        let second = workflow.run(None, JOB).await.unwrap();

        assert_eq!(scheduler.gets.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() >= Duration::from_millis(100) + cooldown);
        assert_eq!(second.state, DeletionState::AlreadyAbsent);

        let states: Vec<_> = exporter
            .find("delete_scheduler_job")
            .iter()
            .map(|s| s.attributes["deletion_state"].clone())
            .collect();
        assert_eq!(states, vec!["confirmed", "already_absent"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_does_not_block_other_jobs() {
        let scheduler = Arc::new(Scripted::default());
        let cooldown = Duration::from_secs(300);
        let (workflow, _) = workflow(scheduler, cooldown);

        let start = tokio::time::Instant::now();
        workflow.run(None, JOB).await.unwrap();
        workflow
            .run(None, "projects/p/locations/l/jobs/other")
            .await
            .unwrap();

        assert!(start.elapsed() < cooldown);
    }

    #[tokio::test]
    async fn test_lock_entries_are_released() {
        let scheduler = Arc::new(Scripted::default());
        let (workflow, _) = workflow(scheduler, Duration::ZERO);

        workflow.run(None, JOB).await.unwrap();
        // Zero cooldown still releases from the spawned task
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(workflow.locks.is_empty());
    }
}
