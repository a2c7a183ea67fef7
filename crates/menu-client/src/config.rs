use crate::error::{ClientError, ClientResult};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub api: ApiSettings,
    pub push: PushSettings,
    pub cache: CacheSettings,
    pub session: SessionSettings,
    pub viewer: ViewerSettings,
    pub preview: PreviewSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiSettings {
    /// Backend origin; endpoints live under `{base_url}/api`.
    pub base_url: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PushSettings {
    /// Event-stream endpoint. Empty disables live updates.
    pub url: String,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub handshake_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheSettings {
    pub media_capacity: usize,
    pub media_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionSettings {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ViewerSettings {
    pub frontend_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PreviewSettings {
    pub target_size: f32,
    pub auto_rotate: bool,
    pub rotation_step: f32,
    pub frame_interval_ms: u64,
    pub max_model_bytes: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
    pub directory: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Settings {
    /// Defaults, then `config/menu-client.*`, then `MENU_SECTION__KEY`
    /// environment overrides.
    pub fn load() -> ClientResult<Self> {
        dotenvy::dotenv().ok();

        let config = Self::builder()?
            .add_source(File::with_name("config/menu-client").required(false))
            // Example: MENU_API__BASE_URL=https://menu.example.com
            .add_source(
                Environment::with_prefix("MENU")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Built-in defaults only; used by tests and as the base layer of `load`.
    pub fn defaults() -> ClientResult<Self> {
        let settings: Settings = Self::builder()?.build()?.try_deserialize()?;
        Ok(settings)
    }

    fn builder() -> ClientResult<config::ConfigBuilder<config::builder::DefaultState>> {
        let session_path = default_session_path();
        let builder = Config::builder()
            .set_default("api.base_url", "http://localhost:5000")?
            .set_default("api.timeout_ms", 5000)?
            .set_default("push.url", "http://localhost:5000/events")?
            .set_default("push.max_attempts", 5)?
            .set_default("push.base_delay_ms", 1000)?
            .set_default("push.max_delay_ms", 5000)?
            .set_default("push.handshake_timeout_ms", 5000)?
            .set_default("cache.media_capacity", 512)?
            .set_default("cache.media_ttl_secs", 300)?
            .set_default("session.path", session_path.to_string_lossy().to_string())?
            .set_default("viewer.frontend_url", "http://localhost:5173")?
            .set_default("preview.target_size", 30.0)?
            .set_default("preview.auto_rotate", true)?
            .set_default("preview.rotation_step", 0.002)?
            .set_default("preview.frame_interval_ms", 16)?
            .set_default("preview.max_model_bytes", 10 * 1024 * 1024)?
            .set_default("logging.level", "info,menu_client=debug")?
            .set_default("logging.format", "pretty")?
            .set_default("logging.directory", "logs")?;
        Ok(builder)
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(ClientError::Config("api.base_url must not be empty".into()));
        }
        if self.viewer.frontend_url.trim().is_empty() {
            return Err(ClientError::Config(
                "viewer.frontend_url must not be empty".into(),
            ));
        }
        if self.cache.media_capacity == 0 {
            return Err(ClientError::Config(
                "cache.media_capacity must be greater than zero".into(),
            ));
        }
        if self.push.max_attempts == 0 {
            return Err(ClientError::Config(
                "push.max_attempts must be greater than zero".into(),
            ));
        }
        if self.preview.target_size <= 0.0 || !self.preview.target_size.is_finite() {
            return Err(ClientError::Config(
                "preview.target_size must be a positive number".into(),
            ));
        }
        if self.preview.frame_interval_ms == 0 {
            return Err(ClientError::Config(
                "preview.frame_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl PushSettings {
    pub fn enabled(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

impl CacheSettings {
    pub fn media_ttl(&self) -> Duration {
        Duration::from_secs(self.media_ttl_secs)
    }
}

impl ViewerSettings {
    /// Public viewer link for a restaurant, as encoded in the QR code.
    pub fn menu_url(&self, restaurant_id: &str) -> String {
        format!("{}/menu/{}", self.frontend_url.trim_end_matches('/'), restaurant_id)
    }
}

fn default_session_path() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".menu-client")
        .join("session.json")
}
