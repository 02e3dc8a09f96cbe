//! Configuration of the congestion core.
//!
//! Every section falls back to its defaults, so an empty file is a valid
//! configuration:
//!
//! ```toml
//! tick-interval-ms = 10
//!
//! [path]
//! max-bytes-per-second = 250000
//! monitoring-interval = 4
//!
//! [distributor]
//! pace-to-target = true
//!
//! [receiver]
//! lossy-threshold = 0.05
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::distributor::DistributorConfig;
use crate::errors::{CongestionError, Result};
use crate::path::PathConfig;
use crate::report::ReceiverConfig;

/// Default period of the core's tick: window refresh, queue flush, receiver
/// reports and the distribution round.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CoreConfig {
    pub tick_interval_ms: u64,
    /// Applied to every path added to the core.
    pub path: PathConfig,
    pub distributor: DistributorConfig,
    pub receiver: ReceiverConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL.as_millis() as u64,
            path: PathConfig::default(),
            distributor: DistributorConfig::default(),
            receiver: ReceiverConfig::default(),
        }
    }
}

impl CoreConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a `.toml` or `.json` configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = ?path, "Reading configuration file");
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Self::from_json_str(&content),
            ext => Err(CongestionError::Config(format!(
                "invalid configuration file extension: {}",
                ext.unwrap_or("<none>")
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(CongestionError::Config("tick-interval-ms must be positive".into()));
        }
        if self.path.max_queued_packets == 0 {
            return Err(CongestionError::Config("path.max-queued-packets must be positive".into()));
        }
        let distributor = &self.distributor;
        for (name, value) in [
            ("distributor.monitored-cap", distributor.monitored_cap),
            ("distributor.stable-cap", distributor.stable_cap),
            ("distributor.pacing-hint-threshold", distributor.pacing_hint_threshold),
            ("receiver.lossy-threshold", self.receiver.lossy_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CongestionError::Config(format!("{name} must be within [0, 1], got {value}")));
            }
        }
        if distributor.pacing_headroom < 1.0 {
            return Err(CongestionError::Config(format!(
                "distributor.pacing-headroom must be at least 1, got {}",
                distributor.pacing_headroom
            )));
        }
        if self.receiver.owd_window_capacity == 0 {
            return Err(CongestionError::Config("receiver.owd-window-capacity must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_empty_config_is_default() -> testresult::TestResult {
        assert_eq!(CoreConfig::from_toml_str("")?, CoreConfig::default());
        Ok(())
    }

    #[test]
    fn test_sections_override_defaults() -> testresult::TestResult {
        let config = CoreConfig::from_toml_str(
            r#"
            tick-interval-ms = 20

            [path]
            max-bytes-per-second = 125000
            monitoring-interval = 5

            [distributor]
            pace-to-target = true
            pacing-headroom = 1.5

            [receiver]
            lossy-threshold = 0.1
            "#,
        )?;
        assert_eq!(config.tick_interval(), Duration::from_millis(20));
        assert_eq!(config.path.max_bytes_per_second, 125_000);
        assert_eq!(config.path.monitoring_interval, 5);
        assert_eq!(config.path.max_queued_packets, PathConfig::default().max_queued_packets);
        assert!(config.distributor.pace_to_target);
        assert_eq!(config.distributor.pacing_headroom, 1.5);
        assert_eq!(config.receiver.lossy_threshold, 0.1);
        Ok(())
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for content in [
            "tick-interval-ms = 0",
            "[distributor]\nmonitored-cap = 1.5",
            "[distributor]\npacing-headroom = 0.5",
            "[receiver]\nlossy-threshold = -0.1",
            "[path]\nmax-queued-packets = 0",
        ] {
            assert!(
                matches!(CoreConfig::from_toml_str(content), Err(CongestionError::Config(_))),
                "accepted {content:?}"
            );
        }
        assert!(matches!(
            CoreConfig::from_toml_str("tick-interval-ms = \"fast\""),
            Err(CongestionError::TomlParse(_))
        ));
    }

    #[test]
    fn test_load_from_file() -> testresult::TestResult {
        let dir = tempfile::tempdir()?;

        let toml_path = dir.path().join("core.toml");
        std::fs::File::create(&toml_path)?.write_all(b"tick-interval-ms = 5\n")?;
        assert_eq!(CoreConfig::load(&toml_path)?.tick_interval_ms, 5);

        let config = CoreConfig {
            tick_interval_ms: 15,
            ..Default::default()
        };
        let json_path = dir.path().join("core.json");
        std::fs::write(&json_path, serde_json::to_string(&config)?)?;
        assert_eq!(CoreConfig::load(&json_path)?, config);

        let other = dir.path().join("core.yaml");
        std::fs::write(&other, "")?;
        assert!(matches!(CoreConfig::load(&other), Err(CongestionError::Config(_))));
        assert!(matches!(
            CoreConfig::load(dir.path().join("missing.toml")),
            Err(CongestionError::Io(_))
        ));
        Ok(())
    }

    #[test]
    fn test_toml_round_trip() -> testresult::TestResult {
        let mut config = CoreConfig::default();
        config.path.max_bytes_per_second = 64_000;
        config.distributor.pace_to_target = true;
        let encoded = toml::to_string(&config)?;
        assert_eq!(CoreConfig::from_toml_str(&encoded)?, config);
        Ok(())
    }
}
