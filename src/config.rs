//! Node Configuration
//!
//! Loaded from a TOML file; every field has a default so an empty file is a
//! valid single-node configuration.
//!
//! ```toml
//! introducer = "127.0.0.1:7000"
//! tick_period_ms = 1000
//! suspect_timeout = 5
//! remove_timeout = 20
//! fanout = 4
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::membership::detector::{DEFAULT_REMOVE_TIMEOUT, DEFAULT_SUSPECT_TIMEOUT, FailureDetector};
use crate::membership::gossip::{DEFAULT_FANOUT, GossipDisseminator};
use crate::membership::types::{NodeId, Tick};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Well-known node that new members send their join request to.
    #[serde(default = "default_introducer")]
    pub introducer: NodeId,

    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,

    /// Ticks without a heartbeat increase before a peer is suspected.
    #[serde(default = "default_suspect_timeout")]
    pub suspect_timeout: Tick,

    /// Ticks without a heartbeat increase before a peer is removed.
    #[serde(default = "default_remove_timeout")]
    pub remove_timeout: Tick,

    /// Peers contacted per gossip round.
    #[serde(default = "default_fanout")]
    pub fanout: usize,
}

fn default_introducer() -> NodeId {
    NodeId::localhost(7000)
}
fn default_tick_period_ms() -> u64 {
    1000
}
fn default_suspect_timeout() -> Tick {
    DEFAULT_SUSPECT_TIMEOUT
}
fn default_remove_timeout() -> Tick {
    DEFAULT_REMOVE_TIMEOUT
}
fn default_fanout() -> usize {
    DEFAULT_FANOUT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            introducer: default_introducer(),
            tick_period_ms: default_tick_period_ms(),
            suspect_timeout: default_suspect_timeout(),
            remove_timeout: default_remove_timeout(),
            fanout: default_fanout(),
        }
    }
}

impl Config {
    pub fn with_introducer(introducer: NodeId) -> Self {
        Self {
            introducer,
            ..Default::default()
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.introducer.is_routable() {
            return Err(ConfigError::Invalid(format!(
                "introducer {} is not a routable address",
                self.introducer
            )));
        }
        if self.tick_period_ms == 0 {
            return Err(ConfigError::Invalid("tick_period_ms must be at least 1".into()));
        }
        if self.suspect_timeout == 0 {
            return Err(ConfigError::Invalid("suspect_timeout must be at least 1".into()));
        }
        if self.remove_timeout <= self.suspect_timeout {
            return Err(ConfigError::Invalid(format!(
                "remove_timeout ({}) must be greater than suspect_timeout ({})",
                self.remove_timeout, self.suspect_timeout
            )));
        }
        if self.fanout == 0 {
            return Err(ConfigError::Invalid("fanout must be at least 1".into()));
        }
        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    pub fn detector(&self) -> FailureDetector {
        FailureDetector::new(self.suspect_timeout, self.remove_timeout)
    }

    pub fn disseminator(&self) -> GossipDisseminator {
        GossipDisseminator::new(self.fanout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.suspect_timeout, 5);
        assert_eq!(config.remove_timeout, 20);
        assert_eq!(config.fanout, 4);
        assert_eq!(config.tick_period(), Duration::from_secs(1));
    }

    #[test]
    fn test_parse_overrides() {
        let config = Config::parse(
            r#"
            introducer = "10.0.0.1:9000"
            tick_period_ms = 250
            suspect_timeout = 3
            remove_timeout = 12
            fanout = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.introducer, "10.0.0.1:9000".parse().unwrap());
        assert_eq!(config.tick_period(), Duration::from_millis(250));
        assert_eq!(config.detector(), FailureDetector::new(3, 12));
        assert_eq!(config.disseminator().fanout(), 2);
    }

    #[test]
    fn test_remove_must_exceed_suspect() {
        let err = Config::parse("suspect_timeout = 5\nremove_timeout = 5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_zero_fanout_rejected() {
        assert!(matches!(
            Config::parse("fanout = 0"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_bad_introducer_is_parse_error() {
        assert!(matches!(
            Config::parse(r#"introducer = "not-an-address""#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(matches!(
            Config::parse("fan_out = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fanout = 6").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.fanout, 6);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Config::load("/nonexistent/gossip.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
