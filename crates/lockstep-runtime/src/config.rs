//! Replica configuration
//!
//! Built in code from `Default` or a preset, or loaded from JSON:
//!
//! ```json
//! {
//!   "framerate": 30,
//!   "wrap_mode": "clamp",
//!   "freshness": "changed",
//!   "tick_interval": "16ms",
//!   "max_inbound_buffer": 256,
//!   "max_outbound_buffer": 256,
//!   "log_format": "json"
//! }
//! ```
//!
//! Every key is optional; missing keys keep their defaults.

use std::time::Duration;

use lockstep_core::{LockstepError, LockstepResult, WrapMode};
use lockstep_state::{FreshnessPolicy, PlayerConfig};
use serde::{Deserialize, Serialize};

use crate::LogFormat;

/// Replica configuration
#[derive(Clone, Debug)]
pub struct ReplicaConfig {
    /// Sync player settings
    pub player: PlayerConfig,
    /// Host loop tick interval
    pub tick_interval: Duration,
    /// Maximum queued inbound frames; newly arriving frames are dropped beyond this
    pub max_inbound_buffer: usize,
    /// Maximum queued outbound frames; oldest dropped beyond this
    pub max_outbound_buffer: usize,
    pub log_format: LogFormat,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        ReplicaConfig {
            player: PlayerConfig::default(),
            tick_interval: Duration::from_millis(16),
            max_inbound_buffer: 256,
            max_outbound_buffer: 256,
            log_format: LogFormat::Pretty,
        }
    }
}

/// On-disk shape of [`ReplicaConfig`]
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ReplicaConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    framerate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    wrap_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    freshness: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tick_interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_inbound_buffer: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_outbound_buffer: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_format: Option<String>,
}

impl ReplicaConfig {
    /// Fast ticks for small sessions on a LAN
    pub fn low_latency() -> Self {
        ReplicaConfig {
            tick_interval: Duration::from_millis(8),
            ..ReplicaConfig::default()
        }
    }

    /// Slow ticks and short queues for constrained hosts
    pub fn low_bandwidth() -> Self {
        ReplicaConfig {
            tick_interval: Duration::from_millis(33),
            max_inbound_buffer: 64,
            max_outbound_buffer: 64,
            ..ReplicaConfig::default()
        }
    }

    /// Parse a JSON document; missing keys keep their defaults
    pub fn from_json_str(json: &str) -> LockstepResult<Self> {
        let file: ReplicaConfigFile = serde_json::from_str(json)
            .map_err(|e| LockstepError::InvalidConfig(e.to_string()))?;

        let mut config = ReplicaConfig::default();

        if let Some(framerate) = file.framerate {
            config.player.framerate = framerate;
        }
        if let Some(mode) = file.wrap_mode {
            config.player.base_wrap_mode = parse_wrap_mode(&mode)?;
        }
        if let Some(freshness) = file.freshness {
            config.player.freshness = parse_freshness(&freshness)?;
        }
        if let Some(interval) = file.tick_interval {
            config.tick_interval = humantime::parse_duration(&interval).map_err(|e| {
                LockstepError::InvalidConfig(format!("tick_interval {:?}: {}", interval, e))
            })?;
        }
        if let Some(n) = file.max_inbound_buffer {
            config.max_inbound_buffer = n;
        }
        if let Some(n) = file.max_outbound_buffer {
            config.max_outbound_buffer = n;
        }
        if let Some(format) = file.log_format {
            config.log_format = LogFormat::parse(&format).ok_or_else(|| {
                LockstepError::InvalidConfig(format!("unknown log_format {:?}", format))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Serialize to the JSON shape accepted by [`ReplicaConfig::from_json_str`]
    pub fn to_json_string(&self) -> LockstepResult<String> {
        let file = ReplicaConfigFile {
            framerate: Some(self.player.framerate),
            wrap_mode: Some(wrap_mode_name(self.player.base_wrap_mode).to_string()),
            freshness: Some(freshness_name(self.player.freshness).to_string()),
            tick_interval: Some(humantime::format_duration(self.tick_interval).to_string()),
            max_inbound_buffer: Some(self.max_inbound_buffer),
            max_outbound_buffer: Some(self.max_outbound_buffer),
            log_format: Some(self.log_format.as_str().to_string()),
        };
        serde_json::to_string_pretty(&file).map_err(|e| LockstepError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> LockstepResult<()> {
        if !self.player.framerate.is_finite() || self.player.framerate <= 0.0 {
            return Err(LockstepError::InvalidConfig(format!(
                "framerate must be positive, got {}",
                self.player.framerate
            )));
        }
        if self.tick_interval.is_zero() {
            return Err(LockstepError::InvalidConfig(
                "tick_interval must be non-zero".into(),
            ));
        }
        if self.max_inbound_buffer == 0 || self.max_outbound_buffer == 0 {
            return Err(LockstepError::InvalidConfig(
                "frame buffers must hold at least one frame".into(),
            ));
        }
        Ok(())
    }
}

fn parse_wrap_mode(s: &str) -> LockstepResult<WrapMode> {
    match s.to_ascii_lowercase().as_str() {
        "clamp" | "clamp_at_end" | "hold" => Ok(WrapMode::ClampAtEnd),
        "loop" => Ok(WrapMode::Loop),
        _ => Err(LockstepError::InvalidConfig(format!(
            "unknown wrap_mode {:?}",
            s
        ))),
    }
}

fn wrap_mode_name(mode: WrapMode) -> &'static str {
    match mode {
        WrapMode::ClampAtEnd => "clamp",
        WrapMode::Loop => "loop",
    }
}

fn parse_freshness(s: &str) -> LockstepResult<FreshnessPolicy> {
    match s.to_ascii_lowercase().as_str() {
        "changed" => Ok(FreshnessPolicy::Changed),
        "newer" => Ok(FreshnessPolicy::Newer),
        _ => Err(LockstepError::InvalidConfig(format!(
            "unknown freshness {:?}",
            s
        ))),
    }
}

fn freshness_name(policy: FreshnessPolicy) -> &'static str {
    match policy {
        FreshnessPolicy::Changed => "changed",
        FreshnessPolicy::Newer => "newer",
    }
}
