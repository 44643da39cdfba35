//! Script directory scaffolding for the `init` and `new` commands.

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::info;

use crate::error::{MigrateError, Result};
use crate::set::MigrationSetBuilder;
use crate::statement::{DOWN_MARKER, SCRIPT_EXTENSION, UP_MARKER};

/// How a new script's version is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Numbering {
    /// Local time as `YYYYMMDDHHMMSS`.
    #[default]
    Timestamp,
    /// One above the highest existing version.
    Sequence,
}

/// Creates the scripts directory. Returns `false` if it already existed.
pub fn init_dir(dir: &Path) -> Result<bool> {
    if dir.is_dir() {
        info!(path = %dir.display(), "Directory already exists");
        return Ok(false);
    }
    std::fs::create_dir_all(dir)?;
    info!(path = %dir.display(), "Created directory");
    Ok(true)
}

/// Creates an empty up/down script in `dir` and returns its path.
pub fn new_script(dir: &Path, name: &str, numbering: Numbering) -> Result<PathBuf> {
    if !dir.is_dir() {
        return Err(MigrateError::MigrationsDirNotFound(dir.to_path_buf()));
    }

    let version = match numbering {
        Numbering::Timestamp => Local::now().format("%Y%m%d%H%M%S").to_string(),
        Numbering::Sequence => next_sequence(dir)?.to_string(),
    };

    create_script(dir, &version, name)
}

fn create_script(dir: &Path, version: &str, name: &str) -> Result<PathBuf> {
    let filename = format!("{version}_{}.{SCRIPT_EXTENSION}", script_slug(name));
    let path = dir.join(&filename);
    if path.exists() {
        return Err(MigrateError::MigrationExists(path));
    }

    std::fs::write(&path, format!("{UP_MARKER}\n\n{DOWN_MARKER}\n"))?;
    info!(filename = %filename, "Created new migration script");
    Ok(path)
}

fn next_sequence(dir: &Path) -> Result<i64> {
    let set = MigrationSetBuilder::directory(dir).build()?;
    Ok(set.tail().map_or(1, |tail| tail.version() + 1))
}

fn script_slug(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::MigrateStatement;

    #[test]
    fn test_init_dir_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("migrations");
        assert!(init_dir(&dir).unwrap());
        assert!(dir.is_dir());
        assert!(!init_dir(&dir).unwrap());
    }

    #[test]
    fn test_new_script_sequence() {
        let dir = tempfile::tempdir().unwrap();

        let first = new_script(dir.path(), "create users", Numbering::Sequence).unwrap();
        assert_eq!(first.file_name().unwrap(), "1_create_users.sql");

        std::fs::write(dir.path().join("7_existing.sql"), "SELECT 1;").unwrap();
        let next = new_script(dir.path(), "add email", Numbering::Sequence).unwrap();
        assert_eq!(next.file_name().unwrap(), "8_add_email.sql");
    }

    #[test]
    fn test_new_script_template_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = new_script(dir.path(), "init", Numbering::Timestamp).unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        let raw = std::fs::read(&path).unwrap();
        let st = MigrateStatement::parse(name, &raw).unwrap();
        assert!(st.version >= 20_000_101_000_000);
        assert_eq!(st.up.trim(), "");
        assert_eq!(st.down.trim(), "");
    }

    #[test]
    fn test_new_script_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("20240101000000_same.sql"), "keep me").unwrap();

        let result = create_script(dir.path(), "20240101000000", "same");
        assert!(matches!(result, Err(MigrateError::MigrationExists(_))));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("20240101000000_same.sql")).unwrap(),
            "keep me"
        );
    }

    #[test]
    fn test_new_script_requires_dir() {
        let root = tempfile::tempdir().unwrap();
        let result = new_script(&root.path().join("missing"), "x", Numbering::Sequence);
        assert!(matches!(result, Err(MigrateError::MigrationsDirNotFound(_))));
    }
}
