//! Per-call metric capture and derived metrics (§4.7 Metric capture).
//!
//! One row is appended per originated session when its
//! `CHANNEL_HANGUP_COMPLETE` fires. Cross-leg timestamps for the peer are
//! intentionally not joined here: by the time the app callback runs, the
//! built-in handler chain may already have torn the Call down (§4.4), so
//! each row reports only the timestamps its own session observed.

use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use esl_core::model::Session;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CdrRow {
    pub session_uuid: String,
    pub hangup_cause: Option<String>,
    pub invite_latency: Option<Duration>,
    pub answer_latency: Option<Duration>,
    pub call_setup_latency: Option<Duration>,
    pub active_calls_at_capture: usize,
    captured_at: Instant,
}

#[derive(Serialize)]
struct CdrCsvRow {
    session_uuid: String,
    hangup_cause: String,
    invite_latency_secs: f64,
    answer_latency_secs: f64,
    call_setup_latency_secs: f64,
    active_calls_at_capture: usize,
}

/// Append-only CDR store (§6 Persisted state: "optional CDR store,
/// append-only, one row per call").
#[derive(Default)]
pub struct CdrStore {
    rows: Mutex<Vec<CdrRow>>,
}

impl CdrStore {
    pub fn new() -> Self {
        CdrStore::default()
    }

    pub fn record(&self, session: &Session, active_calls: usize) {
        let invite_latency = session
            .originated_at
            .and_then(|o| o.checked_duration_since(session.created_at));
        let answer_latency = match (session.originated_at, session.answered_at) {
            (Some(o), Some(a)) => a.checked_duration_since(o),
            _ => None,
        };
        let call_setup_latency = session
            .answered_at
            .and_then(|a| a.checked_duration_since(session.created_at));

        self.rows.lock().unwrap().push(CdrRow {
            session_uuid: session.uuid.clone(),
            hangup_cause: session.hangup_cause.clone(),
            invite_latency,
            answer_latency,
            call_setup_latency,
            active_calls_at_capture: active_calls,
            captured_at: Instant::now(),
        });
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rows(&self) -> Vec<CdrRow> {
        self.rows.lock().unwrap().clone()
    }

    /// Rows captured per second since the first capture, or `None` before
    /// the second row arrives (§4.7 "effective call rate").
    pub fn effective_call_rate(&self) -> Option<f64> {
        let rows = self.rows.lock().unwrap();
        let (first, last) = (rows.first()?, rows.last()?);
        let elapsed = last.captured_at.checked_duration_since(first.captured_at)?;
        if elapsed.is_zero() {
            return None;
        }
        Some(rows.len() as f64 / elapsed.as_secs_f64())
    }

    pub fn write_csv(&self, path: &Path) -> std::io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for row in self.rows().iter() {
            writer
                .serialize(CdrCsvRow {
                    session_uuid: row.session_uuid.clone(),
                    hangup_cause: row.hangup_cause.clone().unwrap_or_default(),
                    invite_latency_secs: row.invite_latency.map_or(0.0, |d| d.as_secs_f64()),
                    answer_latency_secs: row.answer_latency.map_or(0.0, |d| d.as_secs_f64()),
                    call_setup_latency_secs: row
                        .call_setup_latency
                        .map_or(0.0, |d| d.as_secs_f64()),
                    active_calls_at_capture: row.active_calls_at_capture,
                })
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        }
        writer.flush()
    }
}
