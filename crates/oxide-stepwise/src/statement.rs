//! Migration script parsing.
//!
//! A script is plain SQL. Lines before any marker form the up body; a
//! `-- Down` line switches to the down body and a `-- Up` line switches
//! back. The version comes from the leading `<digits>_` of the file name.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::{MigrateError, Result};

/// Line prefix that starts the down body.
pub const DOWN_MARKER: &str = "-- Down";

/// Line prefix that (re)starts the up body.
pub const UP_MARKER: &str = "-- Up";

/// File extension of migration scripts.
pub const SCRIPT_EXTENSION: &str = "sql";

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+)_").expect("version pattern is valid"));

/// One parsed migration script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateStatement {
    /// Ordering key taken from the file name. Always positive.
    pub version: i64,
    /// Original file name, stored verbatim in history.
    pub filename: String,
    /// Forward-change SQL.
    pub up: String,
    /// Reverse-change SQL. Empty for irreversible migrations.
    pub down: String,
    /// Hex SHA-256 of the raw script bytes.
    pub checksum: String,
}

impl MigrateStatement {
    /// Parses a script from its file name and raw contents.
    pub fn parse(filename: impl Into<String>, raw: &[u8]) -> Result<Self> {
        let filename = filename.into();
        let version = parse_version(&filename)?;

        let text = std::str::from_utf8(raw).map_err(|e| MigrateError::Parse {
            path: filename.clone().into(),
            message: e.to_string(),
        })?;
        let (up, down) = split_bodies(text);

        Ok(Self {
            version,
            filename,
            up,
            down,
            checksum: checksum(raw),
        })
    }

    /// Returns whether the script has a non-blank down body.
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        !self.down.trim().is_empty()
    }
}

/// Extracts the version from a script's file name.
///
/// Only the last path component is considered. It must start with one or
/// more digits followed by `_`, and the number must be positive.
pub fn parse_version(filename: &str) -> Result<i64> {
    let invalid = || MigrateError::InvalidVersion {
        filename: filename.to_string(),
    };

    let base = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(invalid)?;

    let digits = VERSION_RE
        .captures(base)
        .and_then(|c| c.get(1))
        .ok_or_else(invalid)?;

    match digits.as_str().parse::<i64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(invalid()),
    }
}

fn split_bodies(text: &str) -> (String, String) {
    let mut up = String::new();
    let mut down = String::new();
    let mut in_down = false;

    for line in text.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.starts_with(DOWN_MARKER) {
            in_down = true;
            continue;
        }
        if line.starts_with(UP_MARKER) {
            in_down = false;
            continue;
        }

        let target = if in_down { &mut down } else { &mut up };
        target.push_str(line);
        target.push('\n');
    }

    (up, down)
}

/// Hex SHA-256 of a script's raw bytes.
#[must_use]
pub fn checksum(raw: &[u8]) -> String {
    format!("{:x}", Sha256::digest(raw))
}
