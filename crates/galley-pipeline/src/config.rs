use std::fs;
use std::path::{Path, PathBuf};

use galley_core::AnchorRange;
use serde::{Deserialize, Serialize};

/// Stall ceiling bounds. Streams are allowed to be slow, not silent
/// forever; operators can tune within this window only.
const MIN_STREAM_TIMEOUT_MS: u64 = 120_000;
const MAX_STREAM_TIMEOUT_MS: u64 = 180_000;

/// Pipeline tuning knobs. Every field has a default so a missing or
/// partial config file still yields a working setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Whole-stream ceiling in milliseconds. Clamped to 120-180s when
    /// loaded from a file.
    #[serde(default = "default_stream_timeout_ms")]
    pub stream_timeout_ms: u64,

    /// How long to wait before the first recovery lookup, giving the
    /// backend time to finish persisting.
    #[serde(default = "default_recovery_grace_ms")]
    pub recovery_grace_ms: u64,

    /// Delay between recovery lookups.
    #[serde(default = "default_recovery_retry_ms")]
    pub recovery_retry_ms: u64,

    /// Store lookups per recovery pass. Bounded; recovery must never
    /// poll indefinitely.
    #[serde(default = "default_recovery_attempts")]
    pub recovery_attempts: u32,

    /// Window of the overall progress bar this pipeline's phase owns.
    #[serde(default)]
    pub anchor: AnchorRange,

    /// Once streaming has begun, displayed progress never sits below
    /// this.
    #[serde(default = "default_progress_floor")]
    pub progress_floor: u8,

    /// Displayed progress never exceeds this until the final unit
    /// lands.
    #[serde(default = "default_progress_cap")]
    pub progress_cap: u8,

    /// How many unannounced units a stream may append beyond its
    /// declared total before the session is treated as faulted.
    #[serde(default = "default_max_appended")]
    pub max_appended: usize,

    /// Upper bound on skeleton count growth from `skeleton_count`
    /// events.
    #[serde(default = "default_max_units")]
    pub max_units: usize,

    /// Optional webhook for completion reward grants.
    #[serde(default)]
    pub rewards_webhook: Option<String>,
}

fn default_stream_timeout_ms() -> u64 {
    150_000
}

fn default_recovery_grace_ms() -> u64 {
    2_000
}

fn default_recovery_retry_ms() -> u64 {
    1_500
}

fn default_recovery_attempts() -> u32 {
    2
}

fn default_progress_floor() -> u8 {
    10
}

fn default_progress_cap() -> u8 {
    90
}

fn default_max_appended() -> usize {
    8
}

fn default_max_units() -> usize {
    100
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            stream_timeout_ms: default_stream_timeout_ms(),
            recovery_grace_ms: default_recovery_grace_ms(),
            recovery_retry_ms: default_recovery_retry_ms(),
            recovery_attempts: default_recovery_attempts(),
            anchor: AnchorRange::default(),
            progress_floor: default_progress_floor(),
            progress_cap: default_progress_cap(),
            max_appended: default_max_appended(),
            max_units: default_max_units(),
            rewards_webhook: None,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        config_dir.join("galley").join("pipeline.json")
    } else {
        PathBuf::from(".galley-pipeline.json")
    }
}

impl PipelineConfig {
    /// Load from the given path, or the default location. Missing or
    /// unreadable files fall back to defaults rather than failing.
    pub fn load(path: Option<&Path>) -> Self {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path(),
        };
        if !path.exists() {
            return Self::default();
        }
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("could not read config {}: {e}", path.display());
                return Self::default();
            }
        };
        let mut config: PipelineConfig = match serde_json::from_str(&content) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("could not parse config {}: {e}", path.display());
                return Self::default();
            }
        };
        config.stream_timeout_ms = config
            .stream_timeout_ms
            .clamp(MIN_STREAM_TIMEOUT_MS, MAX_STREAM_TIMEOUT_MS);
        config
    }
}
