//! Simulated upload progress and the token that stops it at settlement.
//!
//! The percentage is not derived from transfer telemetry. It creeps up by a
//! random increment per tick and stalls at the cap until the real response
//! arrives.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::debug;
use uuid::Uuid;

use crate::{session::SessionState, SessionEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Uploading,
    ProcessingCharacter,
    GeneratingAnimation,
    Complete,
}

impl ProgressPhase {
    pub fn from_percent(percent: f64) -> Self {
        if percent < 30.0 {
            Self::Uploading
        } else if percent < 60.0 {
            Self::ProcessingCharacter
        } else {
            Self::GeneratingAnimation
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Uploading => "Uploading files...",
            Self::ProcessingCharacter => "Processing character...",
            Self::GeneratingAnimation => "Generating animation...",
            Self::Complete => "Complete!",
        }
    }
}

/// Source of per-tick increments in `[0, max)`.
pub trait ProgressJitter: Send + Sync {
    fn next_increment(&self, max: f64) -> f64;
}

pub struct RandomJitter;

impl ProgressJitter for RandomJitter {
    fn next_increment(&self, max: f64) -> f64 {
        rand::random::<f64>() * max
    }
}

#[derive(Debug, Clone)]
pub struct ProgressSimulator {
    percent: f64,
    cap: f64,
    max_increment: f64,
}

impl ProgressSimulator {
    pub fn new(cap: f64, max_increment: f64) -> Self {
        Self {
            percent: 0.0,
            cap: cap.clamp(0.0, 100.0),
            max_increment: max_increment.max(0.0),
        }
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn advance(&mut self, jitter: &dyn ProgressJitter) -> f64 {
        let step = jitter.next_increment(self.max_increment).clamp(0.0, self.max_increment);
        self.percent = (self.percent + step).min(self.cap);
        self.percent
    }
}

/// Set exactly once, when the network call settles.
#[derive(Debug, Clone, Default)]
pub struct SettlementToken(Arc<AtomicBool>);

impl SettlementToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true only for the call that performed the settlement.
    pub fn settle(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_settled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub(crate) struct ProgressTicker {
    pub state: Arc<Mutex<SessionState>>,
    pub events: broadcast::Sender<SessionEvent>,
    pub job_id: Uuid,
    pub token: SettlementToken,
    pub simulator: ProgressSimulator,
    pub jitter: Arc<dyn ProgressJitter>,
    pub interval: Duration,
}

impl ProgressTicker {
    /// Progress writes happen under the session lock after re-checking the
    /// token; settlement sets the token under the same lock.
    pub(crate) fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately; progress starts one interval in.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if self.token.is_settled() {
                    break;
                }

                let percent = self.simulator.advance(self.jitter.as_ref());
                let phase = ProgressPhase::from_percent(percent);

                let mut guard = self.state.lock().await;
                if self.token.is_settled() || guard.job.job_id != Some(self.job_id) {
                    break;
                }
                guard.job.progress_percent = percent;
                guard.job.phase = Some(phase);
                let _ = self.events.send(SessionEvent::Progress {
                    job_id: self.job_id,
                    percent,
                    phase,
                    at: Utc::now(),
                });
            }
            debug!(job_id = %self.job_id, "progress ticker stopped");
        })
    }
}
