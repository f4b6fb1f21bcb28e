use std::env;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use wbo_backup_core::retention::{DEFAULT_MAX_COPIES, DEFAULT_MIN_INTERVAL_MS};
use wbo_backup_core::RetentionPolicy;

const DEFAULT_LISTEN: &str = "127.0.0.1:8089";
const DEFAULT_BOARD_DIR: &str = "./server-data";
const DEFAULT_BACKUP_DIR: &str = "./backups";
const DEFAULT_CYCLE_INTERVAL_SECS: u64 = 60 * 60;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub backup: BackupConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub board_dir: Option<String>,
    pub backup_dir: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct BackupConfig {
    pub enabled: Option<bool>,
    pub max_copies: Option<i64>,
    pub min_interval_ms: Option<i64>,
    pub cycle_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SecurityConfig {
    pub api_token: Option<String>,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading config file {path:?}"))?;
    toml::from_str(&contents).with_context(|| format!("parsing config file {path:?}"))
}

/// Effective daemon settings: environment first, then config file, then defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub listen: String,
    pub board_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub enabled: bool,
    pub policy: RetentionPolicy,
    pub cycle_interval: Duration,
    pub api_token: Option<String>,
}

impl Settings {
    pub fn resolve(cfg: &Config) -> Result<Self> {
        Self::resolve_with(cfg, |key| env::var(key).ok())
    }

    pub fn resolve_with(cfg: &Config, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let listen = env("WBO_BACKUP_LISTEN")
            .or_else(|| cfg.server.listen.clone())
            .unwrap_or_else(|| DEFAULT_LISTEN.to_owned());

        let board_dir = env("WBO_HISTORY_DIR")
            .or_else(|| cfg.storage.board_dir.clone())
            .unwrap_or_else(|| DEFAULT_BOARD_DIR.to_owned());

        let backup_dir = env("WBO_BACKUP_DIR")
            .or_else(|| cfg.storage.backup_dir.clone())
            .unwrap_or_else(|| DEFAULT_BACKUP_DIR.to_owned());

        let enabled = parse_env::<bool>(&env, "WBO_BACKUP_ENABLED")?
            .or(cfg.backup.enabled)
            .unwrap_or(true);

        // Negative counts mean the same as zero: backups off.
        let max_copies = parse_env::<i64>(&env, "WBO_BACKUP_COPIES")?
            .or(cfg.backup.max_copies)
            .map(|n| usize::try_from(n).unwrap_or(0))
            .unwrap_or(DEFAULT_MAX_COPIES);

        let min_interval_ms = parse_env::<i64>(&env, "WBO_BACKUP_INTERVAL_MS")?
            .or(cfg.backup.min_interval_ms)
            .unwrap_or(DEFAULT_MIN_INTERVAL_MS);
        if min_interval_ms < 0 {
            bail!("backup interval must not be negative, got {min_interval_ms}ms");
        }

        let cycle_secs = parse_env::<u64>(&env, "WBO_BACKUP_CYCLE_SECS")?
            .or(cfg.backup.cycle_interval_secs)
            .unwrap_or(DEFAULT_CYCLE_INTERVAL_SECS);
        if cycle_secs == 0 {
            bail!("backup cycle interval must be at least one second");
        }

        let api_token = env("WBO_BACKUP_API_TOKEN")
            .or_else(|| cfg.security.api_token.clone())
            .filter(|token| !token.is_empty());

        Ok(Self {
            listen,
            board_dir: PathBuf::from(board_dir),
            backup_dir: PathBuf::from(backup_dir),
            enabled,
            policy: RetentionPolicy {
                max_copies,
                min_interval_ms,
            },
            cycle_interval: Duration::from_secs(cycle_secs),
            api_token,
        })
    }
}

fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    env(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| anyhow!("invalid {key}={raw:?}: {e}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_config_or_env() {
        let settings = Settings::resolve_with(&Config::default(), env_of(&[])).unwrap();
        assert_eq!(settings.listen, DEFAULT_LISTEN);
        assert_eq!(settings.board_dir, PathBuf::from("./server-data"));
        assert_eq!(settings.backup_dir, PathBuf::from("./backups"));
        assert!(settings.enabled);
        assert_eq!(settings.policy, RetentionPolicy::default());
        assert_eq!(settings.cycle_interval, Duration::from_secs(3600));
        assert!(settings.api_token.is_none());
    }

    #[test]
    fn config_file_values_are_used() {
        let cfg: Config = toml::from_str(
            r#"
            [storage]
            board_dir = "/srv/wbo/boards"
            backup_dir = "/srv/wbo/backups"

            [backup]
            enabled = false
            max_copies = 3
            min_interval_ms = 60000
            cycle_interval_secs = 30
            "#,
        )
        .unwrap();
        let settings = Settings::resolve_with(&cfg, env_of(&[])).unwrap();
        assert_eq!(settings.board_dir, PathBuf::from("/srv/wbo/boards"));
        assert_eq!(settings.backup_dir, PathBuf::from("/srv/wbo/backups"));
        assert!(!settings.enabled);
        assert_eq!(settings.policy.max_copies, 3);
        assert_eq!(settings.policy.min_interval_ms, 60_000);
        assert_eq!(settings.cycle_interval, Duration::from_secs(30));
    }

    #[test]
    fn environment_overrides_config_file() {
        let cfg: Config = toml::from_str("[backup]\nmax_copies = 3\n").unwrap();
        let settings = Settings::resolve_with(
            &cfg,
            env_of(&[
                ("WBO_BACKUP_COPIES", "7"),
                ("WBO_BACKUP_ENABLED", "false"),
                ("WBO_HISTORY_DIR", "/tmp/boards"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.policy.max_copies, 7);
        assert!(!settings.enabled);
        assert_eq!(settings.board_dir, PathBuf::from("/tmp/boards"));
    }

    #[test]
    fn negative_copies_disable_backups() {
        let settings =
            Settings::resolve_with(&Config::default(), env_of(&[("WBO_BACKUP_COPIES", "-1")])).unwrap();
        assert!(settings.policy.is_disabled());
    }

    #[test]
    fn malformed_env_values_are_rejected() {
        let err = Settings::resolve_with(&Config::default(), env_of(&[("WBO_BACKUP_COPIES", "ten")]))
            .unwrap_err();
        assert!(err.to_string().contains("WBO_BACKUP_COPIES"));

        let err = Settings::resolve_with(&Config::default(), env_of(&[("WBO_BACKUP_CYCLE_SECS", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("cycle interval"));
    }

    #[test]
    fn empty_api_token_means_no_auth() {
        let settings =
            Settings::resolve_with(&Config::default(), env_of(&[("WBO_BACKUP_API_TOKEN", "")])).unwrap();
        assert!(settings.api_token.is_none());
    }
}
