//! Merit configuration.
//!
//! Loaded from `~/.merit/config.toml`, or from the file named by
//! `MERIT_CONFIG`. A missing file means every setting takes its default.

use std::path::PathBuf;
use std::time::Duration;
use std::{env, fs, io};

use serde::{Deserialize, Serialize};

use crate::model::Role;
use crate::review::RolePolicy;

/// Merit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Acting identity when neither `--as` nor `MERIT_IDENTITY` is given.
    pub default_identity: Option<String>,

    /// Acting role when neither `--role` nor `MERIT_ROLE` is given.
    pub default_role: Option<Role>,

    /// `SQLite` database file. Defaults to `~/.merit/merit.sqlite`.
    pub database: Option<PathBuf>,

    /// How long a store call waits for the database lock.
    pub store_timeout_ms: u64,

    /// How often a conflicting save is retried before the actor sees it.
    pub conflict_retries: u32,

    /// Which roles review each stage and which may override.
    pub policy: RolePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_identity: None,
            default_role: None,
            database: None,
            store_timeout_ms: 5000,
            conflict_retries: 3,
            policy: RolePolicy::default(),
        }
    }
}

impl Config {
    /// Load config from `MERIT_CONFIG` or `~/.merit/config.toml`.
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, String> {
        let Some(path) = Self::path() else {
            return Ok(Self::default());
        };

        let contents = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(format!("failed to read {}: {e}", path.display())),
        };

        Self::parse(&contents).map_err(|e| format!("invalid config at {}: {e}", path.display()))
    }

    /// Parse config from TOML text.
    pub fn parse(contents: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(contents).map_err(|e| e.to_string())?;

        if config
            .default_identity
            .as_deref()
            .is_some_and(|id| id.trim().is_empty())
        {
            return Err("default-identity is set but empty".to_string());
        }
        if config.store_timeout_ms == 0 {
            return Err("store-timeout-ms must be greater than zero".to_string());
        }

        Ok(config)
    }

    /// The config file path: `MERIT_CONFIG`, else `~/.merit/config.toml`.
    pub fn path() -> Option<PathBuf> {
        if let Ok(path) = env::var("MERIT_CONFIG")
            && !path.is_empty()
        {
            return Some(PathBuf::from(path));
        }
        dirs::home_dir().map(|h| h.join(".merit").join("config.toml"))
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.store_timeout(), Duration::from_secs(5));
        assert_eq!(config.conflict_retries, 3);
    }

    #[test]
    fn full_config_parses() {
        let config = Config::parse(
            r#"
            default-identity = "teacherA"
            default-role = "teacher"
            database = "/var/lib/merit/merit.sqlite"
            store-timeout-ms = 250
            conflict-retries = 5

            [policy]
            stage3 = ["admin"]
            "#,
        )
        .unwrap();

        assert_eq!(config.default_identity.as_deref(), Some("teacherA"));
        assert_eq!(config.default_role, Some(Role::Teacher));
        assert_eq!(
            config.database,
            Some(PathBuf::from("/var/lib/merit/merit.sqlite"))
        );
        assert_eq!(config.store_timeout(), Duration::from_millis(250));
        assert_eq!(config.conflict_retries, 5);
        assert_eq!(config.policy.stage3, [Role::Admin]);
        assert_eq!(config.policy.stage1, [Role::Teacher]);
    }

    #[test]
    fn empty_identity_is_rejected() {
        let err = Config::parse(r#"default-identity = """#).unwrap_err();
        assert!(err.contains("default-identity"));
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!(Config::parse(r#"default-role = "dean""#).is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(Config::parse("store-timeout-ms = 0").is_err());
    }
}
