use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::smoothing::DEFAULT_SMOOTHING_FACTOR;

pub const DEFAULT_CONFIG_PATH: &str = "vd_module.json";

/// Longest single wait a tick may block for, whatever the config says.
pub const MAX_WAIT_TIMEOUT_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Name of the streamer's shared memory section.
    pub face_state_map_name: String,
    /// Name of the event the streamer signals after each write.
    pub face_state_event_name: String,
    /// Upper bound on a single wait for the streamer, in milliseconds. Capped
    /// at [`MAX_WAIT_TIMEOUT_MS`].
    pub wait_timeout_ms: u64,
    /// Weight of the previous value in the exponential smoother.
    pub smoothing_factor: f32,
    /// Without a signal for this long, tracking is reported lost even if the
    /// last flags were valid. 0 disables the check.
    pub stale_signal_timeout_ms: u64,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            face_state_map_name: "VirtualDesktop.FaceState".to_string(),
            face_state_event_name: "VirtualDesktop.FaceStateEvent".to_string(),
            wait_timeout_ms: 50,
            smoothing_factor: DEFAULT_SMOOTHING_FACTOR,
            stale_signal_timeout_ms: 10_000,
        }
    }
}

impl ModuleConfig {
    /// Reads `path` when it exists, defaults otherwise.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        serde_json::from_str(&text).with_context(|| format!("Invalid config {:?}", path))
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms.min(MAX_WAIT_TIMEOUT_MS))
    }

    pub fn stale_signal_timeout(&self) -> Option<Duration> {
        (self.stale_signal_timeout_ms > 0)
            .then(|| Duration::from_millis(self.stale_signal_timeout_ms))
    }
}
