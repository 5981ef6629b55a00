use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use shared::protocol::{
    HealthResponse, FIELD_AUDIO, FIELD_IMAGE, HEALTH_PATH, TEST_UPLOAD_PATH, UPLOAD_PATH,
};
use tracing::debug;
use url::Url;

use crate::{error::ClientError, media::FileHandle, upload::UploadPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Upload,
    TestUpload,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Self::Upload => UPLOAD_PATH,
            Self::TestUpload => TEST_UPLOAD_PATH,
        }
    }
}

/// Status and raw body of a response that made it back over the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait RenderTransport: Send + Sync {
    async fn post_form(
        &self,
        endpoint: Endpoint,
        payload: &UploadPayload,
    ) -> Result<RawResponse, ClientError>;
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ClientError>;
    async fn health(&self) -> Result<HealthResponse, ClientError>;
}

pub struct MissingRenderTransport;

#[async_trait]
impl RenderTransport for MissingRenderTransport {
    async fn post_form(
        &self,
        endpoint: Endpoint,
        _payload: &UploadPayload,
    ) -> Result<RawResponse, ClientError> {
        Err(ClientError::Transport(format!(
            "render service is unavailable for {}",
            endpoint.path()
        )))
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ClientError> {
        Err(ClientError::Transport(format!(
            "render service is unavailable for {url}"
        )))
    }

    async fn health(&self) -> Result<HealthResponse, ClientError> {
        Err(ClientError::Transport("render service is unavailable".into()))
    }
}

pub struct HttpRenderTransport {
    http: Client,
    origin: Url,
}

impl HttpRenderTransport {
    pub fn new(origin: Url, request_timeout: Duration) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { http, origin })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    fn endpoint_url(&self, path: &str) -> Result<Url, ClientError> {
        self.origin
            .join(path)
            .map_err(|err| ClientError::Transport(format!("invalid endpoint {path}: {err}")))
    }
}

fn file_part(file: &FileHandle) -> Result<Part, ClientError> {
    let part = Part::bytes(file.bytes.clone()).file_name(file.name.clone());
    if file.declared_type.is_empty() {
        return Ok(part);
    }
    part.mime_str(&file.declared_type).map_err(ClientError::from)
}

pub(crate) fn multipart_form(payload: &UploadPayload) -> Result<Form, ClientError> {
    let mut form = Form::new()
        .part(FIELD_IMAGE, file_part(&payload.image)?)
        .part(FIELD_AUDIO, file_part(&payload.audio)?);
    for (name, value) in payload.text_fields() {
        form = form.text(name, value);
    }
    Ok(form)
}

#[async_trait]
impl RenderTransport for HttpRenderTransport {
    async fn post_form(
        &self,
        endpoint: Endpoint,
        payload: &UploadPayload,
    ) -> Result<RawResponse, ClientError> {
        let url = self.endpoint_url(endpoint.path())?;
        debug!(%url, image = %payload.image.name, audio = %payload.audio.name, "posting form");
        let response = self
            .http
            .post(url)
            .multipart(multipart_form(payload)?)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        debug!(status, size = body.len(), "form response received");
        Ok(RawResponse { status, body })
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ClientError> {
        let bytes = self
            .http
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }

    async fn health(&self) -> Result<HealthResponse, ClientError> {
        let url = self.endpoint_url(HEALTH_PATH)?;
        let response = self.http.get(url).send().await?.error_for_status()?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|err| ClientError::MalformedResponse(format!("health body: {err}")))
    }
}
