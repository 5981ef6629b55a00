//! Client core for the talking-head animator: mouth-anchor calibration, form
//! state, and the upload workflow against the remote render service.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use shared::{domain::StyleMode, protocol::HealthResponse};
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

pub mod calibration;
pub mod config;
pub mod coordinates;
pub mod error;
pub mod feedback;
pub mod form_state;
pub mod media;
pub mod progress;
pub mod session;
pub mod transport;
pub mod upload;

pub use config::{load_settings, ClientSettings};
pub use error::{ClientError, PreconditionError, ValidationError};
pub use form_state::ControlState;
pub use media::FileHandle;
pub use session::{Intent, SessionState, Transition};
pub use upload::{JobState, RenderOutput, TestUploadReport};

use crate::{
    feedback::PositionFeedback,
    progress::{ProgressJitter, ProgressPhase, RandomJitter},
    transport::{HttpRenderTransport, RenderTransport},
    upload::UploadOrchestrator,
};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Progress {
        job_id: Uuid,
        percent: f64,
        phase: ProgressPhase,
        at: DateTime<Utc>,
    },
    /// A failed job is reset right after this event is sent, so snapshots
    /// only keep its notice in `SessionState::last_failure`.
    JobStateChanged {
        job_id: Uuid,
        state: JobState,
        detail: Option<String>,
        at: DateTime<Utc>,
    },
    FeedbackChanged(Option<PositionFeedback>),
    Reset,
}

pub struct AnimatorClient {
    state: Arc<Mutex<SessionState>>,
    orchestrator: UploadOrchestrator,
    events: broadcast::Sender<SessionEvent>,
}

impl AnimatorClient {
    pub fn new(settings: ClientSettings) -> Result<Self, ClientError> {
        let transport =
            HttpRenderTransport::new(settings.service_origin.clone(), settings.request_timeout)?;
        Ok(Self::new_with_dependencies(
            settings,
            Arc::new(transport),
            Arc::new(RandomJitter),
        ))
    }

    pub fn new_with_dependencies(
        settings: ClientSettings,
        transport: Arc<dyn RenderTransport>,
        jitter: Arc<dyn ProgressJitter>,
    ) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            state: Arc::new(Mutex::new(SessionState::new(settings.default_style))),
            orchestrator: UploadOrchestrator::new(transport, jitter, settings),
            events,
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        self.orchestrator.settings()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    pub async fn controls(&self) -> ControlState {
        ControlState::derive(&*self.state.lock().await)
    }

    pub async fn style(&self) -> StyleMode {
        self.state.lock().await.style
    }

    /// Applies one user intent. Rejected intents leave state untouched.
    pub async fn dispatch(&self, intent: Intent) -> Result<Transition, ClientError> {
        let is_reset = matches!(intent, Intent::Reset);
        let mut guard = self.state.lock().await;
        let feedback_before = guard.feedback();
        let transition = guard.apply(intent)?;

        if is_reset && transition == Transition::Applied {
            let _ = self.events.send(SessionEvent::Reset);
        }
        let feedback_after = guard.feedback();
        if feedback_after != feedback_before {
            let _ = self.events.send(SessionEvent::FeedbackChanged(feedback_after));
        }
        Ok(transition)
    }

    pub async fn submit(&self) -> Result<RenderOutput, ClientError> {
        self.orchestrator.submit(&self.state, &self.events).await
    }

    pub async fn test_submit(&self) -> Result<TestUploadReport, ClientError> {
        self.orchestrator.test_submit(&self.state).await
    }

    pub async fn download_result(&self, dest: &Path) -> Result<PathBuf, ClientError> {
        self.orchestrator.download_result(&self.state, dest).await
    }

    pub async fn check_health(&self) -> Result<HealthResponse, ClientError> {
        self.orchestrator.check_health().await
    }

    pub fn failure_notice(&self, err: &ClientError) -> String {
        upload::failure_notice(err, &self.settings().service_origin)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
