//! Optional TOML configuration.
//!
//! ```toml
//! [database]
//! url = "sqlite:app.db"
//!
//! [migrations]
//! dir = "migrations"
//! bundle = "migrations.bundle.json"
//! strict_checksums = false
//! ```
//!
//! Command-line flags and `DATABASE_URL` take precedence over the file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "stepwise.toml";

/// Database used when nothing else is configured.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:db.sqlite3";

/// Scripts directory used when nothing else is configured.
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Connection settings.
    pub database: DatabaseConfig,
    /// Script discovery and engine settings.
    pub migrations: MigrationsConfig,
}

/// `[database]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// sqlx connection URL.
    pub url: Option<String>,
}

/// `[migrations]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationsConfig {
    /// Scripts directory.
    pub dir: Option<PathBuf>,
    /// Packed bundle to read instead of the directory.
    pub bundle: Option<PathBuf>,
    /// Fail instead of warn when applied scripts changed.
    pub strict_checksums: bool,
}

impl Config {
    /// Parses configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    /// Reads `path` if given, else the default file if it exists, else
    /// returns the defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::load(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Connection URL from `flag`, then the file, then the default.
    #[must_use]
    pub fn database_url(&self, flag: Option<&str>) -> String {
        flag.map(str::to_string)
            .or_else(|| self.database.url.clone())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string())
    }

    /// Scripts directory from `flag`, then the file, then the default.
    #[must_use]
    pub fn migrations_dir(&self, flag: Option<&Path>) -> PathBuf {
        flag.map(Path::to_path_buf)
            .or_else(|| self.migrations.dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MIGRATIONS_DIR))
    }

    /// Bundle path from `flag`, then the file.
    #[must_use]
    pub fn bundle(&self, flag: Option<&Path>) -> Option<PathBuf> {
        flag.map(Path::to_path_buf)
            .or_else(|| self.migrations.bundle.clone())
    }
}
