//! Configuration file management for storymap.
//!
//! A TOML config file lives at `~/.config/storymap/config.toml`; the database
//! URL is resolved with the chain CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use storymap_db::config::DbConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the storymap config directory.
///
/// Always XDG layout: `$XDG_CONFIG_HOME/storymap` or `~/.config/storymap`,
/// also on macOS.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("storymap");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("storymap")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file at `path`.
pub fn load_config_from(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    toml::from_str(&contents).context("failed to parse config file")
}

pub fn load_config() -> Result<ConfigFile> {
    load_config_from(&config_path())
}

/// Write `config` to `path`, creating parent directories. The file is
/// readable by the owner only on Unix since the URL may hold a password.
pub fn save_config_to(config: &ConfigFile, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

pub fn save_config(config: &ConfigFile) -> Result<()> {
    save_config_to(config, &config_path())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration.
#[derive(Debug)]
pub struct StorymapConfig {
    pub db_config: DbConfig,
}

impl StorymapConfig {
    /// `cli_db_url` > `STORYMAP_DATABASE_URL` > `database.url` from the
    /// config file > [`DbConfig::DEFAULT_URL`]. The pool size always comes
    /// from the environment.
    pub fn resolve(cli_db_url: Option<&str>) -> Self {
        let db_url = if let Some(url) = cli_db_url {
            url.to_owned()
        } else if let Ok(url) = std::env::var(DbConfig::ENV_VAR) {
            url
        } else if let Ok(cfg) = load_config() {
            cfg.database.url
        } else {
            DbConfig::DEFAULT_URL.to_owned()
        };

        Self {
            db_config: DbConfig::new(db_url)
                .with_max_connections(DbConfig::env_max_connections()),
        }
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::lock_env;

    /// Point the config lookup at an empty temp dir for the closure.
    fn with_xdg<T>(dir: &Path, f: impl FnOnce() -> T) -> T {
        let orig = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", dir) };
        let out = f();
        match orig {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }
        out
    }

    #[test]
    fn save_and_load_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("storymap").join("config.toml");
        let original = ConfigFile {
            database: DatabaseSection {
                url: "postgresql://testhost:5432/maps".into(),
            },
        };

        save_config_to(&original, &path).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), original);
    }

    #[cfg(unix)]
    #[test]
    fn saved_config_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        let cfg = ConfigFile {
            database: DatabaseSection {
                url: "postgresql://localhost/maps".into(),
            },
        };
        save_config_to(&cfg, &path).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn cli_flag_overrides_env() {
        let _lock = lock_env();
        unsafe { std::env::set_var(DbConfig::ENV_VAR, "postgresql://env:5432/envdb") };

        let config = StorymapConfig::resolve(Some("postgresql://cli:5432/clidb"));
        assert_eq!(config.db_config.database_url, "postgresql://cli:5432/clidb");

        unsafe { std::env::remove_var(DbConfig::ENV_VAR) };
    }

    #[test]
    fn env_overrides_config_file() {
        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = ConfigFile {
            database: DatabaseSection {
                url: "postgresql://file:5432/filedb".into(),
            },
        };
        save_config_to(&cfg, &tmp.path().join("storymap").join("config.toml")).unwrap();

        unsafe { std::env::set_var(DbConfig::ENV_VAR, "postgresql://env:5432/envdb") };
        let config = with_xdg(tmp.path(), || StorymapConfig::resolve(None));
        unsafe { std::env::remove_var(DbConfig::ENV_VAR) };

        assert_eq!(config.db_config.database_url, "postgresql://env:5432/envdb");
    }

    #[test]
    fn config_file_used_when_env_unset() {
        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = ConfigFile {
            database: DatabaseSection {
                url: "postgresql://file:5432/filedb".into(),
            },
        };
        save_config_to(&cfg, &tmp.path().join("storymap").join("config.toml")).unwrap();

        unsafe { std::env::remove_var(DbConfig::ENV_VAR) };
        let config = with_xdg(tmp.path(), || StorymapConfig::resolve(None));
        assert_eq!(config.db_config.database_url, "postgresql://file:5432/filedb");
    }

    #[test]
    fn default_url_when_nothing_set() {
        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();

        unsafe { std::env::remove_var(DbConfig::ENV_VAR) };
        let config = with_xdg(tmp.path(), || StorymapConfig::resolve(None));
        assert_eq!(config.db_config.database_url, DbConfig::DEFAULT_URL);
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("storymap/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
