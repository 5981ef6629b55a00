use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use shared::domain::StyleMode;
use tracing::warn;
use url::Url;

pub const DEFAULT_SETTINGS_FILE: &str = "animator.toml";
pub const DEFAULT_DOWNLOAD_FILE_NAME: &str = "talking_head.mp4";

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub service_origin: Url,
    pub default_style: StyleMode,
    pub progress_tick: Duration,
    pub progress_max_increment: f64,
    pub progress_cap: f64,
    pub completion_delay: Duration,
    pub request_timeout: Duration,
    pub download_file_name: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            service_origin: Url::parse("http://localhost:5000").expect("static origin url"),
            default_style: StyleMode::Canadian,
            progress_tick: Duration::from_millis(500),
            progress_max_increment: 15.0,
            progress_cap: 90.0,
            completion_delay: Duration::from_millis(500),
            request_timeout: Duration::from_secs(300),
            download_file_name: DEFAULT_DOWNLOAD_FILE_NAME.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    service_origin: Option<String>,
    default_style: Option<String>,
    progress_tick_ms: Option<u64>,
    completion_delay_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
    download_file_name: Option<String>,
}

pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then `path` if it exists, then environment overrides read
/// through `env`. Unusable values are skipped with a warning.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file_settings(&mut settings, file_cfg),
            Err(err) => warn!(path = %path.display(), error = %err, "ignoring unreadable settings file"),
        }
    }

    if let Some(v) = env("ANIMATOR_SERVICE_URL") {
        set_origin(&mut settings, &v);
    }
    if let Some(v) = env("APP__SERVICE_ORIGIN") {
        set_origin(&mut settings, &v);
    }
    if let Some(v) = env("APP__DEFAULT_STYLE") {
        set_style(&mut settings, &v);
    }
    if let Some(v) = env("APP__PROGRESS_TICK_MS") {
        if let Some(ms) = parse_positive(&v, "APP__PROGRESS_TICK_MS") {
            settings.progress_tick = Duration::from_millis(ms);
        }
    }
    if let Some(v) = env("APP__COMPLETION_DELAY_MS") {
        match v.trim().parse::<u64>() {
            Ok(ms) => settings.completion_delay = Duration::from_millis(ms),
            Err(_) => warn!(value = %v, "ignoring invalid APP__COMPLETION_DELAY_MS"),
        }
    }
    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        if let Some(secs) = parse_positive(&v, "APP__REQUEST_TIMEOUT_SECS") {
            settings.request_timeout = Duration::from_secs(secs);
        }
    }

    settings
}

fn apply_file_settings(settings: &mut ClientSettings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.service_origin {
        set_origin(settings, &v);
    }
    if let Some(v) = file_cfg.default_style {
        set_style(settings, &v);
    }
    if let Some(ms) = file_cfg.progress_tick_ms.filter(|ms| *ms > 0) {
        settings.progress_tick = Duration::from_millis(ms);
    }
    if let Some(ms) = file_cfg.completion_delay_ms {
        settings.completion_delay = Duration::from_millis(ms);
    }
    if let Some(secs) = file_cfg.request_timeout_secs.filter(|secs| *secs > 0) {
        settings.request_timeout = Duration::from_secs(secs);
    }
    if let Some(name) = file_cfg.download_file_name.filter(|n| !n.trim().is_empty()) {
        settings.download_file_name = name;
    }
}

pub fn parse_origin(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn set_origin(settings: &mut ClientSettings, raw: &str) {
    match parse_origin(raw) {
        Some(url) => settings.service_origin = url,
        None => warn!(value = %raw, "ignoring invalid service origin"),
    }
}

fn set_style(settings: &mut ClientSettings, raw: &str) {
    match raw.parse::<StyleMode>() {
        Ok(style) => settings.default_style = style,
        Err(err) => warn!(error = %err, "ignoring invalid default style"),
    }
}

fn parse_positive(raw: &str, key: &str) -> Option<u64> {
    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 => Some(v),
        _ => {
            warn!(key, value = %raw, "ignoring non-positive or invalid value");
            None
        }
    }
}
