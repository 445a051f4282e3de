//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for the server, external tools, processing limits, and the job
//! queue. Every section defaults sensibly so a completely empty `{}` file is
//! valid. Environment variables override individual fields after load (see
//! [`Config::apply_env`]).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub tools: ToolsConfig,
    pub limits: LimitsConfig,
    pub queue: QueueConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Internal(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist, then apply environment
    /// overrides.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let mut config = match path {
            None => Self::default(),
            Some(path) => match std::fs::read_to_string(path) {
                Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                    tracing::warn!("Failed to parse config file {}: {e}", path.display());
                    Self::default()
                }),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::info!("No config file at {}; using defaults", path.display());
                    Self::default()
                }
                Err(e) => {
                    tracing::warn!("Failed to read config file {}: {e}", path.display());
                    Self::default()
                }
            },
        };
        config.apply_env();
        config
    }

    /// Apply `TEMPOFORGE_*` environment overrides on top of the loaded file.
    ///
    /// Unparseable values are logged and ignored rather than failing startup.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("TEMPOFORGE_FFMPEG") {
            self.tools.ffmpeg_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("TEMPOFORGE_FFPROBE") {
            self.tools.ffprobe_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("TEMPOFORGE_TEMP_DIR") {
            self.server.temp_dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("TEMPOFORGE_MAX_UPLOAD_BYTES") {
            match v.parse::<u64>() {
                Ok(n) => self.server.max_upload_bytes = n,
                Err(e) => tracing::warn!("Ignoring TEMPOFORGE_MAX_UPLOAD_BYTES={v}: {e}"),
            }
        }
        if let Ok(v) = std::env::var("TEMPOFORGE_MAX_DURATION_SECS") {
            match v.parse::<u64>() {
                Ok(n) => self.limits.max_duration_secs = n,
                Err(e) => tracing::warn!("Ignoring TEMPOFORGE_MAX_DURATION_SECS={v}: {e}"),
            }
        }
        if let Ok(v) = std::env::var("TEMPOFORGE_QUEUE_WORKERS") {
            match v.parse::<usize>() {
                Ok(0) => {
                    // Explicit opt-out: degrade to synchronous execution.
                    self.queue.enabled = false;
                    self.queue.workers = 0;
                }
                Ok(n) => {
                    self.queue.enabled = true;
                    self.queue.workers = n;
                }
                Err(e) => tracing::warn!("Ignoring TEMPOFORGE_QUEUE_WORKERS={v}: {e}"),
            }
        }
    }

    /// Whether jobs run on background workers (`false` means the degraded
    /// synchronous mode, decided once at startup).
    pub fn asynchronous(&self) -> bool {
        self.queue.enabled && self.queue.workers > 0
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }
        if self.server.max_upload_bytes == 0 {
            warnings.push("server.max_upload_bytes is 0; every upload will be rejected".into());
        }
        if self.limits.allowed_formats.is_empty() {
            warnings.push("limits.allowed_formats is empty; every upload will be rejected".into());
        }
        if !self.asynchronous() {
            warnings.push(
                "queue is disabled; transforms will run synchronously on request workers".into(),
            );
        }
        if self.limits.result_ttl_secs == 0 {
            warnings.push("limits.result_ttl_secs is 0; results expire immediately".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upload size ceiling enforced at the HTTP boundary, before any
    /// artifact is written.
    pub max_upload_bytes: u64,
    /// Root directory for temporary artifacts (system temp dir if unset).
    pub temp_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            max_upload_bytes: 100 * 1024 * 1024,
            temp_dir: None,
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Processing limits and validation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Ceiling on the probed input duration, in seconds.
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u64,
    /// Budget for one job's transform execution, in seconds.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,
    /// Retention window for terminal job results, in seconds.
    #[serde(default = "default_result_ttl")]
    pub result_ttl_secs: u64,
    /// Accepted input file extensions (lowercase, no dot).
    #[serde(default = "default_allowed_formats")]
    pub allowed_formats: Vec<String>,
}

fn default_max_duration() -> u64 {
    720
}
fn default_job_timeout() -> u64 {
    600
}
fn default_result_ttl() -> u64 {
    300
}
fn default_allowed_formats() -> Vec<String> {
    vec!["mp3".into(), "wav".into()]
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: default_max_duration(),
            job_timeout_secs: default_job_timeout(),
            result_ttl_secs: default_result_ttl(),
            allowed_formats: default_allowed_formats(),
        }
    }
}

impl LimitsConfig {
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }

    /// Check an extension (lowercase, no dot) against the allow-list.
    pub fn format_allowed(&self, extension: &str) -> bool {
        self.allowed_formats.iter().any(|f| f == extension)
    }
}

/// Background job queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub enabled: bool,
    /// Number of concurrent transform workers.
    pub workers: usize,
    /// Bounded queue depth; submissions beyond this are rejected.
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: 2,
            capacity: 64,
        }
    }
}
