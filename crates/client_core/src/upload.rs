//! Submit workflow: payload, simulated progress racing the real request,
//! response interpretation, and the terminal transition.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{NativePoint, StyleMode},
    error::ErrorBody,
    protocol::{
        HealthResponse, TestUploadResponse, UploadResponse, FIELD_MOUTH_X, FIELD_MOUTH_Y,
        FIELD_STYLE,
    },
};
use tokio::{
    runtime::Handle,
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::{
    config::ClientSettings,
    error::{ClientError, PreconditionError},
    media::FileHandle,
    progress::{ProgressJitter, ProgressPhase, ProgressSimulator, ProgressTicker, SettlementToken},
    session::SessionState,
    transport::{Endpoint, RawResponse, RenderTransport},
    SessionEvent,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Idle,
    /// Request outstanding; simulated progress is ticking.
    Uploading,
    /// Response accepted and the bar shows 100; waiting out the completion beat.
    Processing,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadJob {
    pub job_id: Option<Uuid>,
    pub state: JobState,
    pub progress_percent: f64,
    pub phase: Option<ProgressPhase>,
    pub result_video_url: Option<Url>,
    pub error: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl UploadJob {
    fn started(job_id: Uuid) -> Self {
        Self {
            job_id: Some(job_id),
            state: JobState::Uploading,
            phase: Some(ProgressPhase::Uploading),
            submitted_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.state, JobState::Uploading | JobState::Processing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPayload {
    pub image: FileHandle,
    pub audio: FileHandle,
    pub style: StyleMode,
    pub mouth: Option<NativePoint>,
}

impl UploadPayload {
    /// Non-file form fields in the order they are sent.
    pub fn text_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![(FIELD_STYLE, self.style.as_str().to_string())];
        if let Some(mouth) = self.mouth {
            fields.push((FIELD_MOUTH_X, mouth.x.to_string()));
            fields.push((FIELD_MOUTH_Y, mouth.y.to_string()));
        }
        fields
    }
}

pub fn build_payload(state: &SessionState) -> Result<UploadPayload, PreconditionError> {
    let (Some(image), Some(audio)) = (&state.media.image, &state.media.audio) else {
        return Err(PreconditionError::IncompleteSelection);
    };
    Ok(UploadPayload {
        image: image.clone(),
        audio: audio.clone(),
        style: state.style,
        mouth: state.effective_mouth_position(),
    })
}

/// Turns a settled `/upload` response into the relative video reference.
pub fn interpret_response(response: &RawResponse) -> Result<String, ClientError> {
    if !response.is_success() {
        let body: ErrorBody = serde_json::from_slice(&response.body).unwrap_or_default();
        return Err(ClientError::ServerReported {
            status: response.status,
            message: body.message_or_status(response.status),
        });
    }

    let body: UploadResponse = serde_json::from_slice(&response.body)
        .map_err(|err| ClientError::MalformedResponse(err.to_string()))?;
    if !body.success {
        return Err(ClientError::ServerReported {
            status: response.status,
            message: body
                .error
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| "Processing failed".to_string()),
        });
    }
    body.video_url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| {
            ClientError::MalformedResponse("success response carried no video_url".to_string())
        })
}

pub fn resolve_video_url(origin: &Url, video_url: &str) -> Result<Url, ClientError> {
    origin
        .join(video_url)
        .map_err(|err| ClientError::MalformedResponse(format!("bad video_url {video_url}: {err}")))
}

/// Blocking notification text for a failed upload, with the usual external causes.
pub fn failure_notice(err: &ClientError, origin: &Url) -> String {
    format!(
        "Error: {err}\n\nMake sure:\n\
         1. The render service is running at {origin}\n\
         2. ffmpeg is installed on the service host (for MP3 support)\n\
         3. Files are not too large"
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutput {
    pub job_id: Uuid,
    pub video_url: Url,
}

#[derive(Debug, Clone)]
pub struct TestUploadReport {
    pub status: u16,
    pub response: TestUploadResponse,
}

pub struct UploadOrchestrator {
    transport: Arc<dyn RenderTransport>,
    jitter: Arc<dyn ProgressJitter>,
    settings: ClientSettings,
}

impl UploadOrchestrator {
    pub fn new(
        transport: Arc<dyn RenderTransport>,
        jitter: Arc<dyn ProgressJitter>,
        settings: ClientSettings,
    ) -> Self {
        Self {
            transport,
            jitter,
            settings,
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub async fn submit(
        &self,
        state: &Arc<Mutex<SessionState>>,
        events: &broadcast::Sender<SessionEvent>,
    ) -> Result<RenderOutput, ClientError> {
        let job_id = Uuid::new_v4();
        let payload = {
            let mut guard = state.lock().await;
            if guard.job.is_in_flight() {
                return Err(PreconditionError::UploadInFlight.into());
            }
            let payload = build_payload(&guard)?;
            guard.job = UploadJob::started(job_id);
            guard.last_failure = None;
            emit_job_state(events, &guard, None);
            payload
        };
        info!(
            %job_id,
            style = %payload.style,
            mouth = ?payload.mouth,
            image = %payload.image.name,
            audio = %payload.audio.name,
            "submitting render job"
        );

        let token = SettlementToken::new();
        let ticker = ProgressTicker {
            state: Arc::clone(state),
            events: events.clone(),
            job_id,
            token: token.clone(),
            simulator: ProgressSimulator::new(
                self.settings.progress_cap,
                self.settings.progress_max_increment,
            ),
            jitter: Arc::clone(&self.jitter),
            interval: self.settings.progress_tick,
        }
        .spawn();
        let mut in_flight = InFlightJob {
            state: Arc::clone(state),
            events: events.clone(),
            job_id,
            token,
            ticker,
            rendered: None,
            finished: false,
        };

        let response = self.transport.post_form(Endpoint::Upload, &payload).await;

        let mut guard = state.lock().await;
        in_flight.settle();
        guard.job.settled_at = Some(Utc::now());

        let outcome = response.and_then(|raw| {
            info!(%job_id, status = raw.status, "render service responded");
            let reference = interpret_response(&raw)?;
            resolve_video_url(&self.settings.service_origin, &reference)
        });
        let video_url = match outcome {
            Ok(url) => url,
            Err(err) => {
                self.fail(&mut guard, events, job_id, &err);
                in_flight.finished = true;
                return Err(err);
            }
        };
        in_flight.rendered = Some(video_url.clone());

        guard.job.state = JobState::Processing;
        guard.job.progress_percent = 100.0;
        guard.job.phase = Some(ProgressPhase::Complete);
        let _ = events.send(SessionEvent::Progress {
            job_id,
            percent: 100.0,
            phase: ProgressPhase::Complete,
            at: Utc::now(),
        });
        emit_job_state(events, &guard, None);
        drop(guard);

        tokio::time::sleep(self.settings.completion_delay).await;

        let mut guard = state.lock().await;
        if guard.job.job_id == Some(job_id) {
            guard.job.state = JobState::Complete;
            guard.job.result_video_url = Some(video_url.clone());
            emit_job_state(events, &guard, Some(video_url.to_string()));
        } else {
            warn!(%job_id, "job superseded before completion was shown");
        }
        in_flight.finished = true;
        info!(%job_id, %video_url, "render job complete");

        Ok(RenderOutput { job_id, video_url })
    }

    fn fail(
        &self,
        guard: &mut SessionState,
        events: &broadcast::Sender<SessionEvent>,
        job_id: Uuid,
        err: &ClientError,
    ) {
        error!(%job_id, error = %err, "render job failed");
        let notice = failure_notice(err, &self.settings.service_origin);
        guard.job.state = JobState::Failed;
        guard.job.error = Some(notice.clone());
        emit_job_state(events, guard, Some(notice.clone()));

        // Not recoverable in place: the user must pick inputs again.
        guard.reset_form();
        guard.last_failure = Some(notice);
        let _ = events.send(SessionEvent::Reset);
    }

    pub async fn check_health(&self) -> Result<HealthResponse, ClientError> {
        let health = self.transport.health().await?;
        if !health.is_ok() {
            warn!(status = %health.status, "render service reports unhealthy");
        }
        Ok(health)
    }

    /// Sends the submit payload to the diagnostic endpoint. Never touches the job.
    pub async fn test_submit(
        &self,
        state: &Arc<Mutex<SessionState>>,
    ) -> Result<TestUploadReport, ClientError> {
        let payload = build_payload(&*state.lock().await)?;
        info!(style = %payload.style, "sending test upload");
        let raw = self
            .transport
            .post_form(Endpoint::TestUpload, &payload)
            .await?;
        if !raw.is_success() {
            let body: ErrorBody = serde_json::from_slice(&raw.body).unwrap_or_default();
            return Err(ClientError::ServerReported {
                status: raw.status,
                message: body.message_or_status(raw.status),
            });
        }
        let response = serde_json::from_slice(&raw.body)
            .map_err(|err| ClientError::MalformedResponse(err.to_string()))?;
        Ok(TestUploadReport {
            status: raw.status,
            response,
        })
    }

    /// Saves the completed video. A directory destination gets the default file name.
    pub async fn download_result(
        &self,
        state: &Arc<Mutex<SessionState>>,
        dest: &Path,
    ) -> Result<PathBuf, ClientError> {
        let video_url = {
            let guard = state.lock().await;
            match (&guard.job.state, &guard.job.result_video_url) {
                (JobState::Complete, Some(url)) => url.clone(),
                _ => return Err(PreconditionError::NoResult.into()),
            }
        };

        let target = if tokio::fs::metadata(dest)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
        {
            dest.join(&self.settings.download_file_name)
        } else {
            dest.to_path_buf()
        };

        let bytes = self.transport.fetch(&video_url).await?;
        tokio::fs::write(&target, &bytes).await?;
        info!(path = %target.display(), size = bytes.len(), "saved rendered video");
        Ok(target)
    }
}

pub const ABANDONED_NOTICE: &str = "Upload cancelled before the render service responded";

/// Owns the ticker of one submit. Dropping it before `finished` is set (the
/// submit future was dropped mid-flight) stops the ticker and releases the job.
struct InFlightJob {
    state: Arc<Mutex<SessionState>>,
    events: broadcast::Sender<SessionEvent>,
    job_id: Uuid,
    token: SettlementToken,
    ticker: JoinHandle<()>,
    rendered: Option<Url>,
    finished: bool,
}

impl InFlightJob {
    fn settle(&self) {
        self.token.settle();
        self.ticker.abort();
    }
}

impl Drop for InFlightJob {
    fn drop(&mut self) {
        self.settle();
        if self.finished {
            return;
        }

        let job_id = self.job_id;
        let rendered = self.rendered.take();
        match self.state.try_lock() {
            Ok(mut guard) => release_job(&mut guard, &self.events, job_id, rendered),
            Err(_) => match Handle::try_current() {
                Ok(handle) => {
                    let state = Arc::clone(&self.state);
                    let events = self.events.clone();
                    handle.spawn(async move {
                        release_job(&mut *state.lock().await, &events, job_id, rendered);
                    });
                }
                Err(_) => warn!(%job_id, "submit dropped outside a runtime; job left in flight"),
            },
        }
    }
}

/// Finishes a job whose submit was dropped: a response already accepted still
/// completes, otherwise the job fails and returns to idle with media kept.
fn release_job(
    state: &mut SessionState,
    events: &broadcast::Sender<SessionEvent>,
    job_id: Uuid,
    rendered: Option<Url>,
) {
    if state.job.job_id != Some(job_id) || !state.job.is_in_flight() {
        return;
    }
    state.job.settled_at.get_or_insert_with(Utc::now);

    if let Some(video_url) = rendered {
        state.job.state = JobState::Complete;
        state.job.result_video_url = Some(video_url.clone());
        emit_job_state(events, state, Some(video_url.to_string()));
        return;
    }

    warn!(%job_id, "submit dropped before the render service responded");
    state.job.state = JobState::Failed;
    state.job.error = Some(ABANDONED_NOTICE.to_string());
    emit_job_state(events, state, Some(ABANDONED_NOTICE.to_string()));
    state.job = UploadJob::default();
    state.last_failure = Some(ABANDONED_NOTICE.to_string());
}

fn emit_job_state(
    events: &broadcast::Sender<SessionEvent>,
    state: &SessionState,
    detail: Option<String>,
) {
    let Some(job_id) = state.job.job_id else {
        return;
    };
    let _ = events.send(SessionEvent::JobStateChanged {
        job_id,
        state: state.job.state,
        detail,
        at: Utc::now(),
    });
}

#[cfg(test)]
#[path = "tests/upload_tests.rs"]
mod tests;
