use faceverify_core::DistanceMetric;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 5001);

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:5001).
    pub bind_addr: SocketAddr,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Embedding comparison metric.
    pub metric: DistanceMetric,
    /// Decision cutoff; `None` uses the metric's default.
    pub threshold: Option<f32>,
    /// Directory for per-request temporary image files.
    pub temp_dir: PathBuf,
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
    /// Pending verify requests the engine queue holds before callers wait.
    pub queue_depth: usize,
}

impl Config {
    /// Load configuration from `FACEVERIFY_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            bind_addr: parse_var(&var, "FACEVERIFY_BIND_ADDR")
                .unwrap_or_else(|| SocketAddr::from(DEFAULT_BIND_ADDR)),
            model_dir: var("FACEVERIFY_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(faceverify_core::default_model_dir),
            metric: parse_var(&var, "FACEVERIFY_DISTANCE_METRIC").unwrap_or_default(),
            threshold: parse_var(&var, "FACEVERIFY_THRESHOLD"),
            temp_dir: var("FACEVERIFY_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            max_body_bytes: parse_var(&var, "FACEVERIFY_MAX_BODY_BYTES").unwrap_or(16 * 1024 * 1024),
            queue_depth: parse_var(&var, "FACEVERIFY_QUEUE_DEPTH")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(16),
        }
    }
}

/// Parse an environment value, treating unparseable input as unset.
fn parse_var<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}
