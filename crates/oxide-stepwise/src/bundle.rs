//! Script bundles.
//!
//! A bundle is a read-only list of `(path, contents)` entries that stands in
//! for a scripts directory. Bundles are packed to JSON by the CLI, or built
//! from a `rust_embed` type so the scripts ship inside the binary.

use std::path::Path;

use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};
use crate::set::has_script_extension;

/// One script inside a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundledScript {
    /// Path of the script relative to the bundle root.
    pub path: String,
    /// Raw script text.
    pub contents: String,
}

impl BundledScript {
    /// Creates a bundle entry.
    #[must_use]
    pub fn new(path: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

/// A read-only tree of migration scripts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptBundle {
    scripts: Vec<BundledScript>,
}

impl ScriptBundle {
    /// Creates a bundle from entries.
    #[must_use]
    pub fn new(scripts: Vec<BundledScript>) -> Self {
        Self { scripts }
    }

    /// Entries in the order they were added.
    #[must_use]
    pub fn entries(&self) -> &[BundledScript] {
        &self.scripts
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    /// Returns whether the bundle has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Reads the `*.sql` files directly inside `dir`, sorted by file name.
    ///
    /// Subdirectories are not descended into.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(MigrateError::MigrationsDirNotFound(dir.to_path_buf()));
        }

        let mut scripts = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !has_script_extension(&name) {
                continue;
            }

            let path = entry.path();
            let raw = std::fs::read(&path)?;
            let contents = String::from_utf8(raw).map_err(|e| MigrateError::Parse {
                path,
                message: e.to_string(),
            })?;
            scripts.push(BundledScript::new(name, contents));
        }

        scripts.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(Self { scripts })
    }

    /// Collects every `*.sql` file of an embedded folder, nested ones included.
    pub fn from_embed<E: RustEmbed>() -> Result<Self> {
        let mut paths: Vec<String> = E::iter()
            .map(|p| p.into_owned())
            .filter(|p| has_script_extension(p))
            .collect();
        paths.sort();

        let mut scripts = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(file) = E::get(&path) else {
                continue;
            };
            let contents =
                String::from_utf8(file.data.into_owned()).map_err(|e| MigrateError::Parse {
                    path: path.clone().into(),
                    message: e.to_string(),
                })?;
            scripts.push(BundledScript::new(path, contents));
        }
        Ok(Self { scripts })
    }

    /// Loads a bundle previously written with [`ScriptBundle::write_json`].
    pub fn read_json(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Writes the bundle as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }
}
