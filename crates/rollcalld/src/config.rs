use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Daemon configuration.
///
/// Resolved in three layers: built-in defaults, then the TOML file named by
/// `ROLLCALL_CONFIG` (if set), then `ROLLCALL_*` environment variables.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address for the WebSocket + HTTP listener.
    pub listen_addr: String,
    /// Directory containing the SCRFD and ArcFace ONNX files.
    pub model_dir: PathBuf,
    /// Directory for the per-session CSV logs.
    pub log_dir: PathBuf,
    /// Base URL of the document store holding the roster and attendance.
    pub store_url: Option<String>,
    /// Bearer token for the document store.
    pub store_token: Option<String>,
    pub roster_collection: String,
    pub attendance_collection: String,
    /// Local roster JSON file; used instead of the store when set.
    pub roster_file: Option<PathBuf>,
    /// Maximum Euclidean embedding distance for a positive match.
    ///
    /// ArcFace embeddings are unit vectors, so a tolerance `t` accepts a face
    /// whose cosine similarity to its roster photo is at least `1 - t²/2`.
    /// The default 0.5 demands 0.875; live camera frames against ID photos
    /// usually land between 0.5 and 0.7, i.e. distances of 0.77 to 1.0.
    pub tolerance: f32,
    /// Number of frame worker threads, each with its own encoder.
    pub workers: usize,
    /// Frames allowed to wait for a worker before new ones are dropped.
    pub frame_queue_depth: usize,
    pub publish_timeout_secs: u64,
    /// Keep published attendance in memory instead of writing to the store.
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        Self {
            listen_addr: "0.0.0.0:5000".to_string(),
            model_dir: data_dir.join("models"),
            log_dir: PathBuf::from("attendance_logs"),
            store_url: None,
            store_token: None,
            roster_collection: "students".to_string(),
            attendance_collection: "attendance".to_string(),
            roster_file: None,
            tolerance: rollcall_core::DEFAULT_TOLERANCE,
            workers: 1,
            frame_queue_depth: 4,
            publish_timeout_secs: 10,
            dry_run: false,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("listen_addr", &self.listen_addr)
            .field("model_dir", &self.model_dir)
            .field("log_dir", &self.log_dir)
            .field("store_url", &self.store_url)
            .field(
                "store_token",
                if self.store_token.is_some() { &"<redacted>" } else { &"<not set>" },
            )
            .field("roster_collection", &self.roster_collection)
            .field("attendance_collection", &self.attendance_collection)
            .field("roster_file", &self.roster_file)
            .field("tolerance", &self.tolerance)
            .field("workers", &self.workers)
            .field("frame_queue_depth", &self.frame_queue_depth)
            .field("publish_timeout_secs", &self.publish_timeout_secs)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

/// Below this tolerance the ONNX encoder rejects most live faces
/// (cosine similarity above ~0.6 required).
pub const ARCFACE_MIN_USEFUL_TOLERANCE: f32 = 0.9;

/// Cosine similarity the SCRFD + ArcFace pipeline is commonly tuned to accept.
pub const ARCFACE_SUGGESTED_SIMILARITY: f32 = 0.40;

impl Config {
    /// True when `tolerance` is too strict for ArcFace embeddings.
    pub fn tolerance_too_strict_for_arcface(&self) -> bool {
        self.tolerance < ARCFACE_MIN_USEFUL_TOLERANCE
    }

    /// Load configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var("ROLLCALL_CONFIG").ok().map(PathBuf::from);
        Self::resolve(file.as_deref(), |key| std::env::var(key).ok())
    }

    /// Layer an optional TOML file and an environment lookup over the defaults.
    pub fn resolve(
        file: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match file {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&text)?
            }
            None => Self::default(),
        };

        if let Some(v) = env("ROLLCALL_LISTEN_ADDR") {
            config.listen_addr = v;
        }
        if let Some(v) = env("ROLLCALL_MODEL_DIR") {
            config.model_dir = PathBuf::from(v);
        }
        if let Some(v) = env("ROLLCALL_LOG_DIR") {
            config.log_dir = PathBuf::from(v);
        }
        if let Some(v) = env("ROLLCALL_STORE_URL") {
            config.store_url = Some(v);
        }
        if let Some(v) = env("ROLLCALL_STORE_TOKEN") {
            config.store_token = Some(v);
        }
        if let Some(v) = env("ROLLCALL_ROSTER_COLLECTION") {
            config.roster_collection = v;
        }
        if let Some(v) = env("ROLLCALL_ATTENDANCE_COLLECTION") {
            config.attendance_collection = v;
        }
        if let Some(v) = env("ROLLCALL_ROSTER_FILE") {
            config.roster_file = Some(PathBuf::from(v));
        }
        config.tolerance = env_parse(&env, "ROLLCALL_TOLERANCE", config.tolerance);
        config.workers = env_parse(&env, "ROLLCALL_WORKERS", config.workers);
        config.frame_queue_depth =
            env_parse(&env, "ROLLCALL_FRAME_QUEUE_DEPTH", config.frame_queue_depth);
        config.publish_timeout_secs =
            env_parse(&env, "ROLLCALL_PUBLISH_TIMEOUT_SECS", config.publish_timeout_secs);
        if let Some(v) = env("ROLLCALL_DRY_RUN") {
            config.dry_run = v != "0" && !v.eq_ignore_ascii_case("false");
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "tolerance must be a positive number, got {}",
                self.tolerance
            )));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.frame_queue_depth == 0 {
            return Err(ConfigError::Invalid("frame_queue_depth must be at least 1".into()));
        }
        if !self.dry_run && self.store_url.is_none() {
            return Err(ConfigError::Invalid(
                "store_url is required unless dry_run is enabled".into(),
            ));
        }
        if self.dry_run && self.roster_file.is_none() && self.store_url.is_none() {
            return Err(ConfigError::Invalid(
                "dry_run needs a roster_file or a store_url to load the roster from".into(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str, current: T) -> T {
    match env(key) {
        Some(raw) => match raw.parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring unparsable environment override");
                current
            }
        },
        None => current,
    }
}
