//! User configuration
//!
//! Read from `--config` or `<config dir>/stepviz/config.toml`. Every section
//! and key is optional; anything left out keeps its default.
//!
//! ```toml
//! [playback]
//! speed_ms = 600
//!
//! [trace]
//! python = "/usr/bin/python3"
//! max_events = 2000
//! ```

use crate::playback::{PlaybackOptions, DEFAULT_SPEED_MS, MIN_SPEED_MS};
use crate::sandbox::SandboxConfig;
use crate::simulator::DEFAULT_MAX_LITERAL_PROPERTIES;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub playback: PlaybackConfig,
    pub sandbox: SandboxSection,
    pub trace: TraceConfig,
    pub output: OutputConfig,
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Delay between steps while playing
    pub speed_ms: u64,
    /// Fastest allowed playback speed
    pub min_speed_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        PlaybackConfig {
            speed_ms: DEFAULT_SPEED_MS,
            min_speed_ms: MIN_SPEED_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    pub step_timeout_ms: u64,
    pub active_budget_ms: u64,
    pub max_steps: usize,
    pub max_call_depth: usize,
}

impl Default for SandboxSection {
    fn default() -> Self {
        let defaults = SandboxConfig::default();
        SandboxSection {
            step_timeout_ms: defaults.step_timeout.as_millis() as u64,
            active_budget_ms: defaults.active_budget.as_millis() as u64,
            max_steps: defaults.max_steps,
            max_call_depth: defaults.max_call_depth,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Trace Python with the external interpreter; the simulator otherwise
    pub enabled: bool,
    pub python: String,
    pub timeout_ms: u64,
    pub max_events: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        TraceConfig {
            enabled: true,
            python: "python3".to_string(),
            timeout_ms: 5000,
            max_events: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output entries kept before the oldest are dropped
    pub capacity: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig { capacity: 500 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub max_literal_properties: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            max_literal_properties: DEFAULT_MAX_LITERAL_PROPERTIES,
        }
    }
}

impl Config {
    /// `<config dir>/stepviz/config.toml`, when the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("stepviz").join("config.toml"))
    }

    /// Load from `path`, or from the default location when `None`.
    ///
    /// An explicit path must exist; a missing default file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => {
                    debug!("no config file, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Config is not valid TOML")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        debug!(path = %path.display(), "saved configuration");
        Ok(())
    }

    pub fn sandbox_config(&self) -> SandboxConfig {
        SandboxConfig {
            step_timeout: Duration::from_millis(self.sandbox.step_timeout_ms),
            active_budget: Duration::from_millis(self.sandbox.active_budget_ms),
            max_steps: self.sandbox.max_steps,
            max_call_depth: self.sandbox.max_call_depth,
        }
    }

    pub fn playback_options(&self) -> PlaybackOptions {
        PlaybackOptions {
            speed_ms: self.playback.speed_ms,
            min_speed_ms: self.playback.min_speed_ms,
            output_capacity: self.output.capacity,
            sandbox: self.sandbox_config(),
            entry_point: None,
            args: Vec::new(),
            full_trace: self.trace.enabled,
            python: self.trace.python.clone(),
            trace_timeout: Duration::from_millis(self.trace.timeout_ms),
            max_events: self.trace.max_events,
            max_literal_properties: self.simulator.max_literal_properties,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml("[playback]\nspeed_ms = 300\n\n[trace]\nenabled = false\n")
            .expect("valid config");
        assert_eq!(config.playback.speed_ms, 300);
        assert_eq!(config.playback.min_speed_ms, MIN_SPEED_MS);
        assert!(!config.trace.enabled);
        assert_eq!(config.trace.python, "python3");
        assert_eq!(config.output.capacity, 500);
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(Config::from_toml("").expect("empty config"), Config::default());
    }

    #[test]
    fn test_rejects_bad_types() {
        assert!(Config::from_toml("[sandbox]\nmax_steps = \"lots\"\n").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.sandbox.max_steps = 42;
        config.trace.python = "python3.12".to_string();
        config.save(&path).expect("saved");

        let loaded = Config::load(Some(&path)).expect("loaded");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(Config::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_options_follow_sections() {
        let mut config = Config::default();
        config.sandbox.step_timeout_ms = 250;
        config.trace.max_events = 99;
        let options = config.playback_options();
        assert_eq!(options.sandbox.step_timeout, Duration::from_millis(250));
        assert_eq!(options.max_events, 99);
        assert!(options.full_trace);
    }
}
