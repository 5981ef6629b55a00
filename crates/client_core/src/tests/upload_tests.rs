use super::*;
use std::{collections::BTreeMap, time::Duration};

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use shared::{
    domain::NaturalSize,
    protocol::{HealthResponse, ReceivedFile},
};
use tokio::{net::TcpListener, sync::broadcast::error::TryRecvError};

use crate::{
    coordinates::{DisplayRect, ImageViewport},
    progress::ProgressJitter,
    transport::{HttpRenderTransport, MissingRenderTransport},
    AnimatorClient, Intent,
};

const VIDEO_BYTES: &[u8] = b"\x00\x00\x00\x18ftypmp42";

struct FixedJitter(f64);

impl ProgressJitter for FixedJitter {
    fn next_increment(&self, _max: f64) -> f64 {
        self.0
    }
}

#[derive(Debug, Clone, Default)]
struct CapturedForm {
    files: BTreeMap<String, (String, Vec<u8>)>,
    fields: BTreeMap<String, String>,
}

#[derive(Clone)]
struct Reply {
    status: StatusCode,
    body: String,
    delay: Duration,
}

impl Reply {
    fn new(status: StatusCode, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone)]
struct ServerState {
    captured: Arc<Mutex<Vec<CapturedForm>>>,
    reply: Reply,
}

async fn read_form(mut multipart: Multipart) -> CapturedForm {
    let mut form = CapturedForm::default();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let bytes = field.bytes().await.unwrap_or_default();
                form.files.insert(name, (file_name, bytes.to_vec()));
            }
            None => {
                let text = field.text().await.unwrap_or_default();
                form.fields.insert(name, text);
            }
        }
    }
    form
}

async fn handle_upload(
    State(state): State<ServerState>,
    multipart: Multipart,
) -> (StatusCode, String) {
    let form = read_form(multipart).await;
    state.captured.lock().await.push(form);
    tokio::time::sleep(state.reply.delay).await;
    (state.reply.status, state.reply.body.clone())
}

async fn handle_test_upload(
    State(state): State<ServerState>,
    multipart: Multipart,
) -> Json<TestUploadResponse> {
    let form = read_form(multipart).await;
    state.captured.lock().await.push(form.clone());
    Json(TestUploadResponse {
        success: Some(true),
        total_files: Some(form.files.len()),
        files_received: form
            .files
            .into_iter()
            .map(|(key, (filename, bytes))| {
                (
                    key,
                    ReceivedFile {
                        filename,
                        content_type: None,
                        size: bytes.len() as u64,
                    },
                )
            })
            .collect(),
        form_data: form.fields,
    })
}

async fn handle_download() -> Vec<u8> {
    VIDEO_BYTES.to_vec()
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
    })
}

async fn spawn_render_server(reply: Reply) -> (Url, Arc<Mutex<Vec<CapturedForm>>>) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let captured = Arc::new(Mutex::new(Vec::new()));
    let state = ServerState {
        captured: Arc::clone(&captured),
        reply,
    };
    let app = Router::new()
        .route("/upload", post(handle_upload))
        .route("/test-upload", post(handle_test_upload))
        .route("/videos/:name", get(handle_download))
        .route("/health", get(handle_health))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let origin = Url::parse(&format!("http://{addr}")).expect("origin");
    (origin, captured)
}

fn test_settings(origin: Url) -> ClientSettings {
    ClientSettings {
        service_origin: origin,
        default_style: StyleMode::Standard,
        progress_tick: Duration::from_millis(5),
        completion_delay: Duration::from_millis(20),
        request_timeout: Duration::from_secs(10),
        ..ClientSettings::default()
    }
}

fn http_client(origin: Url) -> AnimatorClient {
    let settings = test_settings(origin);
    let transport =
        HttpRenderTransport::new(settings.service_origin.clone(), settings.request_timeout)
            .expect("transport");
    AnimatorClient::new_with_dependencies(
        settings,
        Arc::new(transport),
        Arc::new(FixedJitter(7.0)),
    )
}

fn portrait() -> FileHandle {
    FileHandle::new("portrait.png", "image/png", vec![0x89, b'P', b'N', b'G'])
}

fn voice() -> FileHandle {
    FileHandle::new("voice.mp3", "audio/mpeg", vec![0xff, 0xfb, 0x90])
}

async fn select_both(client: &AnimatorClient) {
    client
        .dispatch(Intent::SelectImage(portrait()))
        .await
        .expect("image");
    client
        .dispatch(Intent::SelectAudio(voice()))
        .await
        .expect("audio");
}

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => return events,
        }
    }
}

fn position_of_state(events: &[SessionEvent], wanted: JobState) -> Option<usize> {
    events.iter().position(
        |event| matches!(event, SessionEvent::JobStateChanged { state, .. } if *state == wanted),
    )
}

#[tokio::test]
async fn standard_submit_with_calibrated_mouth_resolves_video_url() {
    let (origin, captured) = spawn_render_server(Reply::new(
        StatusCode::OK,
        r#"{"success":true,"video_url":"/videos/out1.mp4"}"#,
    ))
    .await;
    let client = http_client(origin.clone());
    select_both(&client).await;
    client
        .dispatch(Intent::ToggleManual(true))
        .await
        .expect("toggle");
    // 800x600 portrait shown at 400x300, offset (32, 48).
    let viewport = ImageViewport::new(
        DisplayRect::new(32.0, 48.0, 400.0, 300.0),
        NaturalSize::new(800, 600),
    )
    .expect("laid out");
    client
        .dispatch(Intent::ClickImage {
            viewport,
            client_x: 232.0,
            client_y: 273.0,
        })
        .await
        .expect("click");

    let output = client.submit().await.expect("submit");
    assert_eq!(output.video_url.as_str(), format!("{origin}videos/out1.mp4"));

    let forms = captured.lock().await;
    assert_eq!(forms.len(), 1);
    let form = &forms[0];
    assert_eq!(form.fields.get("style").map(String::as_str), Some("standard"));
    assert_eq!(form.fields.get("mouth_x").map(String::as_str), Some("400"));
    assert_eq!(form.fields.get("mouth_y").map(String::as_str), Some("450"));
    assert_eq!(
        form.files.get("image").map(|(name, _)| name.as_str()),
        Some("portrait.png")
    );
    assert_eq!(
        form.files.get("audio").map(|(_, bytes)| bytes.as_slice()),
        Some(&[0xff, 0xfb, 0x90][..])
    );

    let snapshot = client.snapshot().await;
    assert_eq!(snapshot.job.state, JobState::Complete);
    assert_eq!(snapshot.job.progress_percent, 100.0);
    assert_eq!(snapshot.job.result_video_url, Some(output.video_url));
    assert!(client.controls().await.can_download);
}

#[tokio::test]
async fn non_standard_style_omits_mouth_fields() {
    let (origin, captured) = spawn_render_server(Reply::new(
        StatusCode::OK,
        r#"{"success":true,"video_url":"/videos/out2.mp4"}"#,
    ))
    .await;
    let client = http_client(origin);
    select_both(&client).await;
    client
        .dispatch(Intent::ToggleManual(true))
        .await
        .expect("toggle");
    let identity = ImageViewport::identity(NaturalSize::new(800, 600)).expect("laid out");
    client
        .dispatch(Intent::ClickImage {
            viewport: identity,
            client_x: 100.0,
            client_y: 100.0,
        })
        .await
        .expect("click");
    client
        .dispatch(Intent::SelectStyle(StyleMode::Canadian))
        .await
        .expect("style");

    client.submit().await.expect("submit");

    let forms = captured.lock().await;
    let fields = &forms[0].fields;
    assert_eq!(fields.get("style").map(String::as_str), Some("canadian"));
    assert!(!fields.contains_key("mouth_x"));
    assert!(!fields.contains_key("mouth_y"));
    assert_eq!(
        client.snapshot().await.mouth_position,
        Some(NativePoint::new(100, 100))
    );
}

#[tokio::test]
async fn simulated_progress_caps_at_ninety_and_completes_at_hundred() {
    let (origin, _captured) = spawn_render_server(
        Reply::new(
            StatusCode::OK,
            r#"{"success":true,"video_url":"/videos/slow.mp4"}"#,
        )
        .delayed(Duration::from_millis(200)),
    )
    .await;
    let client = http_client(origin);
    select_both(&client).await;
    let mut rx = client.subscribe_events();

    client.submit().await.expect("submit");
    let events = drain(&mut rx);
    let settled_at = client.snapshot().await.job.settled_at.expect("settled");

    let complete_at = position_of_state(&events, JobState::Complete).expect("complete event");
    let hundred_at = events
        .iter()
        .position(|event| {
            matches!(event, SessionEvent::Progress { percent, .. } if *percent == 100.0)
        })
        .expect("100% event");
    assert!(hundred_at < complete_at);

    let simulated: Vec<_> = events[..hundred_at]
        .iter()
        .filter_map(|event| match event {
            SessionEvent::Progress { percent, at, .. } => Some((*percent, *at)),
            _ => None,
        })
        .collect();
    assert!(!simulated.is_empty(), "ticker never reported progress");
    for (percent, at) in &simulated {
        assert!(*percent <= 90.0, "reported {percent} before settlement");
        assert!(*at <= settled_at);
    }
    assert!(simulated.windows(2).all(|pair| pair[0].0 <= pair[1].0));
    assert!(!events[hundred_at + 1..]
        .iter()
        .any(|event| matches!(event, SessionEvent::Progress { .. })));

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(drain(&mut rx).is_empty(), "events after completion");
}

#[tokio::test]
async fn server_error_fails_and_resets_form() {
    let (origin, _captured) = spawn_render_server(
        Reply::new(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"render failure"}"#)
            .delayed(Duration::from_millis(40)),
    )
    .await;
    let client = http_client(origin);
    select_both(&client).await;
    let mut rx = client.subscribe_events();

    let err = client.submit().await.expect_err("must fail");
    match &err {
        ClientError::ServerReported { status, message } => {
            assert_eq!(*status, 500);
            assert!(message.contains("render failure"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let events = drain(&mut rx);
    let failed_at = position_of_state(&events, JobState::Failed).expect("failed event");
    match &events[failed_at] {
        SessionEvent::JobStateChanged {
            detail: Some(detail),
            ..
        } => {
            assert!(detail.contains("render failure"));
            assert!(detail.contains("ffmpeg"));
            assert!(detail.contains("too large"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(events.get(failed_at + 1), Some(&SessionEvent::Reset));
    assert!(!events[failed_at..]
        .iter()
        .any(|event| matches!(event, SessionEvent::Progress { .. })));

    let snapshot = client.snapshot().await;
    let notice = snapshot.last_failure.clone().expect("failure notice kept");
    assert!(notice.contains("render failure"));
    assert_eq!(
        snapshot,
        SessionState {
            last_failure: Some(notice),
            ..SessionState::new(StyleMode::Standard)
        }
    );
    assert!(!client.controls().await.can_submit);

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(drain(&mut rx).is_empty(), "events after failure");
}

#[tokio::test]
async fn unparseable_error_body_uses_status_message() {
    let (origin, _captured) =
        spawn_render_server(Reply::new(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>")).await;
    let client = http_client(origin);
    select_both(&client).await;

    let err = client.submit().await.expect_err("must fail");
    assert_eq!(err.to_string(), "Server error: 502");
}

#[tokio::test]
async fn malformed_success_body_fails() {
    let (origin, _captured) = spawn_render_server(Reply::new(StatusCode::OK, "not json")).await;
    let client = http_client(origin);
    select_both(&client).await;

    let err = client.submit().await.expect_err("must fail");
    assert!(matches!(err, ClientError::MalformedResponse(_)));
    assert!(client.snapshot().await.media.image.is_none());
}

#[tokio::test]
async fn reported_failure_in_success_status_fails() {
    let (origin, _captured) = spawn_render_server(Reply::new(
        StatusCode::OK,
        r#"{"success":false,"error":"no face found"}"#,
    ))
    .await;
    let client = http_client(origin);
    select_both(&client).await;

    let err = client.submit().await.expect_err("must fail");
    assert!(matches!(
        &err,
        ClientError::ServerReported { status: 200, message } if message == "no face found"
    ));
}

#[tokio::test]
async fn network_failure_fails_and_resets() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let client = http_client(Url::parse(&format!("http://{addr}")).expect("origin"));
    select_both(&client).await;
    let err = client.submit().await.expect_err("must fail");
    assert!(matches!(err, ClientError::Transport(_)));
    assert_eq!(client.snapshot().await.job.state, JobState::Idle);
    assert!(client.snapshot().await.media.audio.is_none());
}

#[tokio::test]
async fn submit_without_both_files_is_rejected_without_state_change() {
    let client = AnimatorClient::new_with_dependencies(
        test_settings(Url::parse("http://127.0.0.1:9").expect("origin")),
        Arc::new(MissingRenderTransport),
        Arc::new(FixedJitter(1.0)),
    );
    client
        .dispatch(Intent::SelectImage(portrait()))
        .await
        .expect("image");
    let mut rx = client.subscribe_events();
    let before = client.snapshot().await;

    let err = client.submit().await.expect_err("incomplete");
    assert!(matches!(
        err,
        ClientError::Precondition(PreconditionError::IncompleteSelection)
    ));
    assert_eq!(client.snapshot().await, before);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn second_submit_while_uploading_is_rejected() {
    let (origin, _captured) = spawn_render_server(
        Reply::new(
            StatusCode::OK,
            r#"{"success":true,"video_url":"/videos/out3.mp4"}"#,
        )
        .delayed(Duration::from_millis(150)),
    )
    .await;
    let client = Arc::new(http_client(origin));
    select_both(&client).await;

    let first = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.submit().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(client.controls().await.submit_in_flight);
    assert_eq!(
        client.dispatch(Intent::Reset).await.expect("reset"),
        crate::Transition::Ignored
    );
    let err = client.submit().await.expect_err("in flight");
    assert!(matches!(
        err,
        ClientError::Precondition(PreconditionError::UploadInFlight)
    ));

    first.await.expect("join").expect("first submit");
}

#[tokio::test]
async fn dropped_submit_stops_progress_and_releases_job() {
    let (origin, _captured) = spawn_render_server(
        Reply::new(
            StatusCode::OK,
            r#"{"success":true,"video_url":"/videos/late.mp4"}"#,
        )
        .delayed(Duration::from_secs(5)),
    )
    .await;
    let client = http_client(origin);
    select_both(&client).await;
    let mut rx = client.subscribe_events();

    let outcome = tokio::time::timeout(Duration::from_millis(50), client.submit()).await;
    assert!(outcome.is_err(), "submit finished before the timeout");
    tokio::time::sleep(Duration::from_millis(20)).await;

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|event| matches!(event, SessionEvent::Progress { .. })));
    let failed_at = position_of_state(&events, JobState::Failed).expect("failed event");
    assert!(!events[failed_at..]
        .iter()
        .any(|event| matches!(event, SessionEvent::Progress { .. })));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(drain(&mut rx).is_empty(), "progress after the submit was dropped");

    let snapshot = client.snapshot().await;
    assert_eq!(snapshot.job, UploadJob::default());
    assert_eq!(snapshot.last_failure.as_deref(), Some(ABANDONED_NOTICE));
    assert!(snapshot.media.is_complete());

    let controls = client.controls().await;
    assert!(controls.can_submit);
    assert!(!controls.submit_in_flight);
    assert_eq!(
        client.dispatch(Intent::Reset).await.expect("reset"),
        crate::Transition::Applied
    );
    assert_eq!(client.snapshot().await.last_failure, None);
}

#[tokio::test]
async fn test_submit_reports_echo_without_touching_job() {
    let (origin, captured) = spawn_render_server(Reply::new(StatusCode::OK, "{}")).await;
    let client = http_client(origin);
    select_both(&client).await;
    let mut rx = client.subscribe_events();

    let report = client.test_submit().await.expect("probe");
    assert_eq!(report.status, 200);
    assert_eq!(
        report.response.form_data.get("style").map(String::as_str),
        Some("standard")
    );
    assert_eq!(
        report.response.files_received.get("audio").map(|f| f.filename.as_str()),
        Some("voice.mp3")
    );
    assert_eq!(captured.lock().await.len(), 1);

    let snapshot = client.snapshot().await;
    assert_eq!(snapshot.job, UploadJob::default());
    assert!(snapshot.media.is_complete());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn download_saves_completed_video_under_default_name() {
    let (origin, _captured) = spawn_render_server(Reply::new(
        StatusCode::OK,
        r#"{"success":true,"video_url":"/videos/out4.mp4"}"#,
    ))
    .await;
    let client = http_client(origin);
    let dir = tempfile::tempdir().expect("tempdir");

    let err = client
        .download_result(dir.path())
        .await
        .expect_err("nothing rendered yet");
    assert!(matches!(
        err,
        ClientError::Precondition(PreconditionError::NoResult)
    ));

    select_both(&client).await;
    client.submit().await.expect("submit");

    let saved = client.download_result(dir.path()).await.expect("download");
    assert_eq!(saved, dir.path().join("talking_head.mp4"));
    assert_eq!(tokio::fs::read(&saved).await.expect("read"), VIDEO_BYTES);

    let explicit = dir.path().join("mine.mp4");
    let saved = client.download_result(&explicit).await.expect("download");
    assert_eq!(saved, explicit);
}

#[tokio::test]
async fn health_check_reads_status() {
    let (origin, _captured) = spawn_render_server(Reply::new(StatusCode::OK, "{}")).await;
    let client = http_client(origin);
    assert!(client.check_health().await.expect("health").is_ok());
}

#[test]
fn interpret_response_taxonomy() {
    let ok = RawResponse {
        status: 200,
        body: br#"{"success":true,"video_url":"/download/a.mp4"}"#.to_vec(),
    };
    assert_eq!(interpret_response(&ok).expect("ok"), "/download/a.mp4");

    let missing_url = RawResponse {
        status: 200,
        body: br#"{"success":true}"#.to_vec(),
    };
    assert!(matches!(
        interpret_response(&missing_url),
        Err(ClientError::MalformedResponse(_))
    ));

    let no_flag = RawResponse {
        status: 200,
        body: br#"{"video_url":"/download/a.mp4"}"#.to_vec(),
    };
    assert!(matches!(
        interpret_response(&no_flag),
        Err(ClientError::MalformedResponse(_))
    ));

    let failed_without_message = RawResponse {
        status: 200,
        body: br#"{"success":false}"#.to_vec(),
    };
    assert_eq!(
        interpret_response(&failed_without_message)
            .expect_err("failed")
            .to_string(),
        "Processing failed"
    );

    let not_found = RawResponse {
        status: 404,
        body: Vec::new(),
    };
    assert_eq!(
        interpret_response(&not_found).expect_err("404").to_string(),
        "Server error: 404"
    );
}

#[test]
fn resolve_video_url_joins_against_origin() {
    let origin = Url::parse("http://localhost:5000").expect("origin");
    assert_eq!(
        resolve_video_url(&origin, "/videos/out1.mp4")
            .expect("resolve")
            .as_str(),
        "http://localhost:5000/videos/out1.mp4"
    );
    assert_eq!(
        resolve_video_url(&origin, "https://cdn.example/v.mp4")
            .expect("resolve")
            .as_str(),
        "https://cdn.example/v.mp4"
    );
}

#[tokio::test]
async fn missing_transport_fails_as_transport_error() {
    let client = AnimatorClient::new_with_dependencies(
        test_settings(Url::parse("http://127.0.0.1:9").expect("origin")),
        Arc::new(MissingRenderTransport),
        Arc::new(FixedJitter(1.0)),
    );
    select_both(&client).await;
    let err = client.submit().await.expect_err("unavailable");
    assert!(matches!(err, ClientError::Transport(_)));
    assert!(client.failure_notice(&err).contains("http://127.0.0.1:9/"));
}
