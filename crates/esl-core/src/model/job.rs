use tokio::sync::watch;

use crate::error::CoreError;

/// The outcome of a background job: the engine's `+OK <result>` payload, or
/// the `-ERR <cause>` string it failed with.
pub type JobOutcome = Result<String, String>;

/// An outstanding `bgapi` call (§3 Data Model: Job).
///
/// `Job` is cheaply `Clone`: every clone observes the same single
/// assignment through a `watch` channel, so a caller can hand the handle
/// to several places without contention over one-shot semantics.
#[derive(Debug, Clone)]
pub struct Job {
    pub job_uuid: String,
    /// Preset for `originate`-issued jobs so callers can look up the
    /// session before the first event arrives (§4.5 `originate`).
    pub session_uuid: Option<String>,
    rx: watch::Receiver<Option<JobOutcome>>,
}

/// The resolving half, held only by the Listener's job table.
#[derive(Debug)]
pub struct JobResolver {
    tx: watch::Sender<Option<JobOutcome>>,
}

pub fn new_job(job_uuid: String, session_uuid: Option<String>) -> (Job, JobResolver) {
    let (tx, rx) = watch::channel(None);
    (
        Job {
            job_uuid,
            session_uuid,
            rx,
        },
        JobResolver { tx },
    )
}

impl JobResolver {
    pub fn resolve(&self, outcome: JobOutcome) {
        // Single-assignment: a job that already has a value (e.g. it was
        // already failed by ConnectionLost) keeps that value.
        let _ = self.tx.send_if_modified(|current| {
            if current.is_some() {
                false
            } else {
                *current = Some(outcome);
                true
            }
        });
    }
}

impl Job {
    /// Await the job's single result. Local-only cancellation: dropping
    /// the returned future simply stops waiting (§9: Background-job
    /// cancellation).
    pub async fn wait(&self) -> Result<String, CoreError> {
        let mut rx = self.rx.clone();
        loop {
            if let Some(outcome) = rx.borrow().clone() {
                return outcome.map_err(CoreError::JobFailed);
            }
            if rx.changed().await.is_err() {
                return Err(CoreError::ConnectionLost);
            }
        }
    }

    /// Non-blocking peek at the job's result, if it has resolved.
    pub fn poll(&self) -> Option<Result<String, CoreError>> {
        self.rx
            .borrow()
            .clone()
            .map(|outcome| outcome.map_err(CoreError::JobFailed))
    }

    pub fn is_resolved(&self) -> bool {
        self.rx.borrow().is_some()
    }
}
