//! The closed-loop burst engine (§4.7).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use esl_core::client::OriginateRequest;
use esl_core::model::AppSpec;
use esl_core::pool::Pool;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cdr::CdrStore;

#[derive(Debug, Error)]
pub enum OriginatorError {
    #[error("no originate template configured")]
    NoTemplate,
    #[error("no app loaded")]
    NoApp,
    #[error(transparent)]
    Core(#[from] esl_core::error::CoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginatorState {
    Initial,
    Originating,
    Stopped,
}

/// Mutable pacing parameters; `duration` re-derives from `limit / rate`
/// whenever either changes and no explicit duration was given (§4.7
/// Invariant and control law).
#[derive(Debug, Clone)]
pub struct Params {
    pub rate: u32,
    pub limit: u32,
    pub max_offered: u64,
    pub duration: Duration,
    pub period: Duration,
    pub autohangup: bool,
}

struct Shared {
    pool: Arc<Pool>,
    params: Mutex<Params>,
    state: Mutex<OriginatorState>,
    total_offered: AtomicU64,
    failed_calls: Mutex<HashMap<String, u64>>,
    cdr: Arc<CdrStore>,
    app_id: String,
    request: OriginateRequest,
}

/// The burst loop owner (§3 Data Model, §4.7).
pub struct Originator {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Originator {
    pub fn new(
        pool: Arc<Pool>,
        app_id: String,
        request: OriginateRequest,
        params: Params,
        cdr: Arc<CdrStore>,
    ) -> Self {
        Originator {
            shared: Arc::new(Shared {
                pool,
                params: Mutex::new(params),
                state: Mutex::new(OriginatorState::Initial),
                total_offered: AtomicU64::new(0),
                failed_calls: Mutex::new(HashMap::new()),
                cdr,
                app_id,
                request,
            }),
            task: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> OriginatorState {
        *self.shared.state.lock().await
    }

    pub fn total_offered(&self) -> u64 {
        self.shared.total_offered.load(Ordering::Relaxed)
    }

    pub async fn failed_calls(&self) -> HashMap<String, u64> {
        self.shared.failed_calls.lock().await.clone()
    }

    /// `INITIAL|STOPPED → ORIGINATING`. Requires a non-empty pool and an
    /// app id (§4.7 State machine).
    pub async fn start(&self) -> Result<(), OriginatorError> {
        if self.shared.app_id.is_empty() {
            return Err(OriginatorError::NoApp);
        }
        if self.shared.request.destination.is_empty() {
            return Err(OriginatorError::NoTemplate);
        }

        let mut state = self.shared.state.lock().await;
        if *state == OriginatorState::Originating {
            return Ok(()); // idempotent per §8 "double-Start is a no-op"
        }
        *state = OriginatorState::Originating;
        drop(state);

        install_cdr_capture(&self.shared).await?;
        if self.shared.params.lock().await.autohangup {
            install_autohangup(&self.shared).await?;
        }

        let shared = self.shared.clone();
        let handle = tokio::spawn(async move { run_burst_loop(shared).await });
        *self.task.lock().await = Some(handle);
        Ok(())
    }

    /// Stop issuing new originates; in-flight calls drain naturally
    /// (§4.7 State machine).
    pub async fn stop(&self) {
        *self.shared.state.lock().await = OriginatorState::Stopped;
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
    }

    /// Stop, then force-terminate every session on every Client (§4.7
    /// `Hupall()`).
    pub async fn hupall(&self) -> Result<(), OriginatorError> {
        self.stop().await;
        for client in self.shared.pool.clients() {
            client.hupall().await?;
        }
        Ok(())
    }

    pub fn cdr(&self) -> Arc<CdrStore> {
        self.shared.cdr.clone()
    }
}

async fn run_burst_loop(shared: Arc<Shared>) {
    loop {
        if *shared.state.lock().await != OriginatorState::Originating {
            return;
        }

        let params = shared.params.lock().await.clone();
        let active = shared.pool.active_session_count().await as u64;
        let total_offered = shared.total_offered.load(Ordering::Relaxed);

        let by_rate = u64::from(params.rate) * params.period.as_secs().max(1);
        let by_limit = u64::from(params.limit).saturating_sub(active);
        let by_max_offered = params.max_offered.saturating_sub(total_offered);
        let to_fire = by_rate.min(by_limit).min(by_max_offered);

        if to_fire == 0 && total_offered >= params.max_offered {
            info!(total_offered, "max_offered reached; stopping");
            *shared.state.lock().await = OriginatorState::Stopped;
            return;
        }

        for _ in 0..to_fire {
            fire_one(&shared).await;
        }

        tokio::time::sleep(params.period).await;
    }
}

async fn fire_one(shared: &Arc<Shared>) {
    shared.total_offered.fetch_add(1, Ordering::Relaxed);
    match shared
        .pool
        .originate_round_robin(&shared.request, Some(&shared.app_id))
        .await
    {
        Ok(job) => {
            let shared = shared.clone();
            tokio::spawn(async move {
                if let Err(err) = job.wait().await {
                    let cause = err.to_string();
                    warn!(%cause, "originate job failed");
                    *shared
                        .failed_calls
                        .lock()
                        .await
                        .entry(cause)
                        .or_insert(0) += 1;
                }
            });
        }
        Err(err) => {
            warn!(%err, "failed to submit originate");
            *shared
                .failed_calls
                .lock()
                .await
                .entry(err.to_string())
                .or_insert(0) += 1;
        }
    }
}

async fn install_cdr_capture(shared: &Arc<Shared>) -> Result<(), OriginatorError> {
    for client in shared.pool.clients() {
        let client = client.clone();
        let shared = shared.clone();
        let spec = AppSpec::new()
            .with_id(format!("{}-cdr", shared.app_id))
            .on(
                "CHANNEL_HANGUP_COMPLETE",
                Arc::new(move |session, _msg| {
                    let Some(session) = session.cloned() else {
                        return;
                    };
                    let client = client.clone();
                    let shared = shared.clone();
                    tokio::spawn(async move {
                        let active = client.listener().active_session_count().await;
                        shared.cdr.record(&session, active);
                    });
                }),
            );
        client.load_app(spec).await?;
    }
    Ok(())
}

async fn install_autohangup(shared: &Arc<Shared>) -> Result<(), OriginatorError> {
    let duration = shared.params.lock().await.duration;
    for client in shared.pool.clients() {
        let client_for_hangup = client.clone();
        let spec = AppSpec::new()
            .with_id(format!("{}-autohangup", shared.app_id))
            .on(
                "CHANNEL_ANSWER",
                Arc::new(move |session, _msg| {
                    let Some(session) = session else { return };
                    if session.owns_teardown {
                        return;
                    }
                    let uuid = session.uuid.clone();
                    let client = client_for_hangup.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(duration).await;
                        let _ = client.hangup(&uuid, "NORMAL_CLEARING").await;
                    });
                }),
            );
        client.load_app(spec).await?;
    }
    Ok(())
}
