use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    config::parse_origin,
    coordinates::ImageViewport,
    load_settings, AnimatorClient, FileHandle, Intent, JobState, SessionEvent,
    Transition,
};
use shared::domain::{NativePoint, NaturalSize, StyleMode};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "animator",
    about = "Send a portrait and a voice clip to the talking-head render service"
)]
struct Args {
    /// Render service origin, overriding animator.toml and the environment.
    #[arg(long, global = true)]
    server_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a video and save it.
    Render(RenderArgs),
    /// Send the same payload to the diagnostic endpoint and print the echo.
    Probe(MediaArgs),
    /// Check that the render service is reachable.
    Health,
}

#[derive(clap::Args, Debug)]
struct MediaArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    audio: PathBuf,
    /// standard, canadian or nutcracker.
    #[arg(long)]
    style: Option<StyleMode>,
}

#[derive(clap::Args, Debug)]
struct RenderArgs {
    #[command(flatten)]
    media: MediaArgs,
    /// Mouth anchor in native image pixels, e.g. 400,450 (standard style only).
    #[arg(long, value_parser = parse_point, requires = "image_size")]
    mouth: Option<NativePoint>,
    /// Native size of the image, e.g. 800x600.
    #[arg(long, value_parser = parse_size)]
    image_size: Option<NaturalSize>,
    /// File or directory to save the video to.
    #[arg(long, default_value = ".")]
    output: PathBuf,
}

fn parse_point(raw: &str) -> Result<NativePoint, String> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y but got '{raw}'"))?;
    let x = x.trim().parse().map_err(|_| format!("invalid x in '{raw}'"))?;
    let y = y.trim().parse().map_err(|_| format!("invalid y in '{raw}'"))?;
    Ok(NativePoint::new(x, y))
}

fn parse_size(raw: &str) -> Result<NaturalSize, String> {
    let (w, h) = raw
        .to_ascii_lowercase()
        .split_once('x')
        .map(|(w, h)| (w.trim().to_string(), h.trim().to_string()))
        .ok_or_else(|| format!("expected WIDTHxHEIGHT but got '{raw}'"))?;
    let size = NaturalSize::new(
        w.parse().map_err(|_| format!("invalid width in '{raw}'"))?,
        h.parse().map_err(|_| format!("invalid height in '{raw}'"))?,
    );
    if size.is_empty() {
        return Err(format!("image size must be positive, got '{raw}'"));
    }
    Ok(size)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(raw) = &args.server_url {
        settings.service_origin =
            parse_origin(raw).with_context(|| format!("invalid --server-url '{raw}'"))?;
    }
    let client = AnimatorClient::new(settings).context("failed to build render client")?;

    match args.command {
        Command::Render(render) => run_render(&client, render).await,
        Command::Probe(media) => run_probe(&client, media).await,
        Command::Health => {
            let health = client
                .check_health()
                .await
                .context("render service is not reachable")?;
            println!("Render service status: {}", health.status);
            Ok(())
        }
    }
}

async fn select_media(client: &AnimatorClient, media: &MediaArgs) -> Result<()> {
    let image = FileHandle::from_path(&media.image)
        .await
        .with_context(|| format!("failed to read image '{}'", media.image.display()))?;
    let audio = FileHandle::from_path(&media.audio)
        .await
        .with_context(|| format!("failed to read audio '{}'", media.audio.display()))?;
    client.dispatch(Intent::SelectImage(image)).await?;
    client.dispatch(Intent::SelectAudio(audio)).await?;
    if let Some(style) = media.style {
        client.dispatch(Intent::SelectStyle(style)).await?;
    }
    Ok(())
}

async fn calibrate(client: &AnimatorClient, mouth: NativePoint, size: NaturalSize) -> Result<()> {
    client.dispatch(Intent::ImageLoaded(size)).await?;
    client.dispatch(Intent::ToggleManual(true)).await?;
    let viewport = ImageViewport::identity(size)?;
    let transition = client
        .dispatch(Intent::ClickImage {
            viewport,
            client_x: mouth.x as f64,
            client_y: mouth.y as f64,
        })
        .await?;
    if transition == Transition::Ignored {
        warn!(style = %client.style().await, "mouth position only applies to the standard style; ignoring --mouth");
        return Ok(());
    }
    if let Some(feedback) = client.snapshot().await.feedback() {
        println!("Mouth position {mouth}: {}", feedback.message());
    }
    Ok(())
}

async fn run_render(client: &AnimatorClient, render: RenderArgs) -> Result<()> {
    select_media(client, &render.media).await?;
    if let (Some(mouth), Some(size)) = (render.mouth, render.image_size) {
        calibrate(client, mouth, size).await?;
    }

    let mut events = client.subscribe_events();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::Progress { percent, phase, .. } => {
                    println!("[{percent:>5.1}%] {}", phase.label());
                }
                SessionEvent::JobStateChanged {
                    state: JobState::Complete,
                    ..
                } => break,
                _ => {}
            }
        }
    });

    let output = match client.submit().await {
        Ok(output) => output,
        Err(err) => {
            printer.abort();
            if err.is_workflow_failure() {
                eprintln!("{}", client.failure_notice(&err));
            }
            return Err(err).context("render failed");
        }
    };
    let _ = printer.await;

    println!("Video ready: {}", output.video_url);
    let saved = client
        .download_result(&render.output)
        .await
        .context("failed to save the rendered video")?;
    println!("Saved to {}", saved.display());
    Ok(())
}

async fn run_probe(client: &AnimatorClient, media: MediaArgs) -> Result<()> {
    select_media(client, &media).await?;
    let report = client.test_submit().await.context("test upload failed")?;
    println!("Test upload successful (HTTP {})", report.status);
    for (field, file) in &report.response.files_received {
        println!("  file {field}: {} ({} bytes)", file.filename, file.size);
    }
    for (field, value) in &report.response.form_data {
        println!("  field {field}: {value}");
    }
    Ok(())
}
