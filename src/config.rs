use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub listen: String,
    #[serde(default = "default_freshness", with = "duration_str")]
    pub freshness: Duration,
    #[serde(default = "default_refresh_interval", with = "duration_str")]
    pub refresh_interval: Duration,
    #[serde(default = "default_auto_refresh")]
    pub auto_refresh: bool,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default, with = "opt_duration_str")]
    pub background_collection: Option<Duration>,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceKind {
    File,
    Memory,
    None,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_persistence_kind")]
    pub kind: PersistenceKind,
    #[serde(default = "default_persistence_path")]
    pub path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            kind: default_persistence_kind(),
            path: default_persistence_path(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            freshness: default_freshness(),
            refresh_interval: default_refresh_interval(),
            auto_refresh: default_auto_refresh(),
            history_capacity: default_history_capacity(),
            background_collection: None,
            persistence: PersistenceConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Validation("listen is required".to_string()));
        }
        if SocketAddr::from_str(&self.listen).is_err() {
            return Err(ConfigError::Validation(
                "listen must be a host:port socket address".to_string(),
            ));
        }
        if self.freshness.is_zero() {
            return Err(ConfigError::Validation(
                "freshness must be greater than zero".to_string(),
            ));
        }
        if self.refresh_interval < Duration::from_millis(100) {
            return Err(ConfigError::Validation(
                "refresh_interval must be at least 100ms".to_string(),
            ));
        }
        if self.history_capacity < 1 {
            return Err(ConfigError::Validation(
                "history_capacity must be >= 1".to_string(),
            ));
        }
        if let Some(interval) = self.background_collection {
            if interval < Duration::from_millis(100) {
                return Err(ConfigError::Validation(
                    "background_collection must be at least 100ms".to_string(),
                ));
            }
        }
        if self.persistence.kind == PersistenceKind::File
            && self.persistence.path.as_os_str().is_empty()
        {
            return Err(ConfigError::Validation(
                "persistence.path is required for kind: file".to_string(),
            ));
        }

        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

mod opt_duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| humantime::parse_duration(&text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

const fn default_freshness() -> Duration {
    crate::store::DEFAULT_FRESHNESS
}

const fn default_refresh_interval() -> Duration {
    crate::scheduler::DEFAULT_REFRESH_INTERVAL
}

const fn default_auto_refresh() -> bool {
    true
}

const fn default_history_capacity() -> usize {
    crate::state::HISTORY_CAPACITY
}

const fn default_persistence_kind() -> PersistenceKind {
    PersistenceKind::File
}

fn default_persistence_path() -> PathBuf {
    PathBuf::from("./metrics.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        cfg.validate().expect("default config must validate");
        assert_eq!(cfg.freshness, Duration::from_secs(10));
        assert_eq!(cfg.refresh_interval, Duration::from_millis(5000));
        assert_eq!(cfg.history_capacity, 24);
        assert!(cfg.auto_refresh);
    }

    #[test]
    fn example_yaml_parses_and_validates() {
        let cfg: Config = serde_yaml::from_str(Config::example_yaml()).expect("example parses");
        cfg.validate().expect("example validates");
        assert_eq!(cfg.listen, "127.0.0.1:8080");
        assert_eq!(cfg.persistence.kind, PersistenceKind::File);
        assert!(cfg.background_collection.is_none());
    }

    #[test]
    fn durations_use_humantime_syntax() {
        let cfg: Config = serde_yaml::from_str(
            "listen: \"0.0.0.0:9000\"\nfreshness: 30s\nrefresh_interval: 1500ms\nbackground_collection: 1m\npersistence:\n  kind: none\n",
        )
        .expect("parse");
        assert_eq!(cfg.freshness, Duration::from_secs(30));
        assert_eq!(cfg.refresh_interval, Duration::from_millis(1500));
        assert_eq!(cfg.background_collection, Some(Duration::from_secs(60)));
        assert_eq!(cfg.persistence.kind, PersistenceKind::None);
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = Config {
            listen: "not-an-address".to_string(),
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));

        cfg = Config {
            refresh_interval: Duration::from_millis(10),
            ..Config::default()
        };
        assert!(cfg.validate().is_err());

        cfg = Config {
            history_capacity: 0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());

        cfg = Config::default();
        cfg.persistence.path = PathBuf::new();
        assert!(cfg.validate().is_err());
        cfg.persistence.kind = PersistenceKind::Memory;
        cfg.validate().expect("path is irrelevant for memory persistence");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Config::load_from_file("/nonexistent/sysdash.yaml").expect_err("must fail");
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
