//! Error types for the migration engine.

use std::path::PathBuf;

use crate::history::Direction;

/// Errors that can occur while collecting or applying migrations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// A script name has no leading `<version>_` token.
    #[error("Invalid migration version in file name '{filename}'")]
    InvalidVersion {
        /// The offending file name.
        filename: String,
    },

    /// The requested target version is not part of the migration set.
    #[error("Unknown target version {0}")]
    UnknownTargetVersion(i64),

    /// The history table holds no rows yet.
    #[error("No migration history found")]
    HistoryNotFound,

    /// The history refers to a version missing from the migration set.
    #[error("History references version {0}, which is not in the migration set")]
    UnknownAppliedVersion(i64),

    /// Two scripts declare the same version.
    #[error("Duplicate migration version {version}: '{first}' and '{second}'")]
    DuplicateVersion {
        /// The shared version.
        version: i64,
        /// The script already in the set.
        first: String,
        /// The script that was rejected.
        second: String,
    },

    /// A script body failed to execute. The whole walk was rolled back.
    #[error("Failed to run {direction} script '{filename}' (version {version}): {source}")]
    Execution {
        /// Version of the failing script.
        version: i64,
        /// File name of the failing script.
        filename: String,
        /// Which body was being executed.
        direction: Direction,
        /// The driver error.
        #[source]
        source: sqlx::Error,
    },

    /// The database could not be reached or the history table not created.
    #[error("History store unavailable: {0}")]
    StoreUnavailable(#[source] sqlx::Error),

    /// Database error while reading or writing history.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A script changed after it was applied.
    #[error(
        "Checksum mismatch for '{filename}' (version {version}): recorded {recorded}, current {current}"
    )]
    ChecksumMismatch {
        /// Version of the drifted script.
        version: i64,
        /// File name of the drifted script.
        filename: String,
        /// Checksum stored in history.
        recorded: String,
        /// Checksum of the script as read now.
        current: String,
    },

    /// IO error (reading/writing migration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a migration file.
    #[error("Failed to parse migration file '{path}': {message}")]
    Parse {
        /// Path to the migration file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Migration file already exists.
    #[error("Migration file already exists: {0}")]
    MigrationExists(PathBuf),

    /// No migrations directory found.
    #[error("Migrations directory not found: {0}")]
    MigrationsDirNotFound(PathBuf),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file could not be parsed.
    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
