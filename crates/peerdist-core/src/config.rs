//! peerdist.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::DEFAULT_REVIEWS_PER_STUDENT;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerdistConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub distribution: DistributionConfig,
    #[serde(default)]
    pub roster: RosterConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the redb database file.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/peerdist/peerdist.redb"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Reviews each student gives unless the prompt overrides it.
    #[serde(default = "default_reviews_per_student")]
    pub reviews_per_student: u32,
    /// Seconds between distribution cycles in `run` mode.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            reviews_per_student: default_reviews_per_student(),
            interval_secs: default_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterConfig {
    /// Directory holding LMS roster and submission exports.
    pub dir: PathBuf,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/var/lib/peerdist/roster"),
        }
    }
}

fn default_reviews_per_student() -> u32 {
    DEFAULT_REVIEWS_PER_STUDENT
}

fn default_interval_secs() -> u64 {
    300
}

impl PeerdistConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PeerdistConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the distributor cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.distribution.reviews_per_student == 0 {
            anyhow::bail!("distribution.reviews_per_student must be at least 1");
        }
        if self.distribution.interval_secs == 0 {
            anyhow::bail!("distribution.interval_secs must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PeerdistConfig::default();
        assert_eq!(config.distribution.reviews_per_student, 3);
        assert_eq!(config.distribution.interval_secs, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_empty() {
        let config: PeerdistConfig = toml::from_str("").unwrap();
        assert_eq!(config, PeerdistConfig::default());
    }

    #[test]
    fn test_parse_partial() {
        let toml_str = r#"
[store]
path = "/tmp/pd.redb"

[distribution]
reviews_per_student = 2
"#;
        let config: PeerdistConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.store.path, PathBuf::from("/tmp/pd.redb"));
        assert_eq!(config.distribution.reviews_per_student, 2);
        assert_eq!(config.distribution.interval_secs, 300);
    }

    #[test]
    fn test_zero_reviews_rejected() {
        let mut config = PeerdistConfig::default();
        config.distribution.reviews_per_student = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peerdist.toml");
        let mut config = PeerdistConfig::default();
        config.distribution.interval_secs = 60;
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let loaded = PeerdistConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
