//! The ordered migration set.
//!
//! Statements are kept in a vector sorted by version. Navigation happens
//! through [`MigrationNode`] handles, which are an index plus a borrow of
//! the set, so walks in either direction always terminate.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::bundle::ScriptBundle;
use crate::error::{MigrateError, Result};
use crate::statement::{MigrateStatement, SCRIPT_EXTENSION};

/// A version-ordered collection of migration statements.
#[derive(Debug, Clone, Default)]
pub struct MigrationSet {
    statements: Vec<MigrateStatement>,
}

impl MigrationSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a statement at its sorted position.
    ///
    /// Fails with [`MigrateError::DuplicateVersion`] if the version is
    /// already present.
    pub fn add(&mut self, statement: MigrateStatement) -> Result<()> {
        match self
            .statements
            .binary_search_by_key(&statement.version, |s| s.version)
        {
            Ok(idx) => Err(MigrateError::DuplicateVersion {
                version: statement.version,
                first: self.statements[idx].filename.clone(),
                second: statement.filename,
            }),
            Err(idx) => {
                self.statements.insert(idx, statement);
                Ok(())
            }
        }
    }

    /// Finds the node with exactly this version.
    #[must_use]
    pub fn find(&self, version: i64) -> Option<MigrationNode<'_>> {
        self.position(version).map(|index| self.node(index))
    }

    /// Returns the statement with this version.
    #[must_use]
    pub fn get(&self, version: i64) -> Option<&MigrateStatement> {
        self.position(version).map(|idx| &self.statements[idx])
    }

    /// Returns the smallest-version node.
    #[must_use]
    pub fn head(&self) -> Option<MigrationNode<'_>> {
        (!self.statements.is_empty()).then(|| self.node(0))
    }

    /// Returns the largest-version node.
    #[must_use]
    pub fn tail(&self) -> Option<MigrationNode<'_>> {
        self.statements
            .len()
            .checked_sub(1)
            .map(|index| self.node(index))
    }

    /// Discards every statement.
    pub fn reset(&mut self) {
        self.statements.clear();
    }

    /// Number of statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Returns whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Iterates statements in ascending version order.
    pub fn iter(&self) -> std::slice::Iter<'_, MigrateStatement> {
        self.statements.iter()
    }

    /// Versions in ascending order.
    #[must_use]
    pub fn versions(&self) -> Vec<i64> {
        self.statements.iter().map(|s| s.version).collect()
    }

    pub(crate) fn as_slice(&self) -> &[MigrateStatement] {
        &self.statements
    }

    pub(crate) fn position(&self, version: i64) -> Option<usize> {
        self.statements
            .binary_search_by_key(&version, |s| s.version)
            .ok()
    }

    fn node(&self, index: usize) -> MigrationNode<'_> {
        MigrationNode { set: self, index }
    }
}

impl<'a> IntoIterator for &'a MigrationSet {
    type Item = &'a MigrateStatement;
    type IntoIter = std::slice::Iter<'a, MigrateStatement>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A position inside a [`MigrationSet`].
#[derive(Debug, Clone, Copy)]
pub struct MigrationNode<'a> {
    set: &'a MigrationSet,
    index: usize,
}

impl<'a> MigrationNode<'a> {
    /// The statement at this position.
    #[must_use]
    pub fn statement(&self) -> &'a MigrateStatement {
        &self.set.statements[self.index]
    }

    /// Shorthand for `statement().version`.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.statement().version
    }

    /// The next higher version, if any.
    #[must_use]
    pub fn next(&self) -> Option<Self> {
        let index = self.index + 1;
        (index < self.set.len()).then(|| self.set.node(index))
    }

    /// The next lower version, if any.
    #[must_use]
    pub fn previous(&self) -> Option<Self> {
        self.index.checked_sub(1).map(|index| self.set.node(index))
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }
}

/// Where migration scripts are read from.
#[derive(Debug, Clone)]
pub enum ScriptSource {
    /// `*.sql` files directly inside a directory.
    Directory(PathBuf),
    /// A packed or compiled-in bundle of scripts.
    Bundle(ScriptBundle),
}

/// Builds a [`MigrationSet`] from a [`ScriptSource`].
#[derive(Debug, Clone)]
pub struct MigrationSetBuilder {
    source: ScriptSource,
}

impl MigrationSetBuilder {
    /// Creates a builder for the given source.
    #[must_use]
    pub fn new(source: ScriptSource) -> Self {
        Self { source }
    }

    /// Shorthand for a directory source.
    #[must_use]
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self::new(ScriptSource::Directory(path.into()))
    }

    /// Shorthand for a bundle source.
    #[must_use]
    pub fn bundle(bundle: ScriptBundle) -> Self {
        Self::new(ScriptSource::Bundle(bundle))
    }

    /// Reads, parses and orders every script of the source.
    ///
    /// Scripts without a valid version are skipped. Duplicate versions are
    /// an error.
    pub fn build(self) -> Result<MigrationSet> {
        let bundle = match self.source {
            ScriptSource::Directory(dir) => ScriptBundle::from_dir(&dir)?,
            ScriptSource::Bundle(bundle) => bundle,
        };

        let mut set = MigrationSet::new();
        for entry in bundle.entries() {
            if !has_script_extension(&entry.path) {
                debug!(path = %entry.path, "Skipping non-script entry");
                continue;
            }
            match MigrateStatement::parse(entry.path.as_str(), entry.contents.as_bytes()) {
                Ok(statement) => set.add(statement)?,
                Err(MigrateError::InvalidVersion { filename }) => {
                    warn!(filename = %filename, "Skipping script without a valid version");
                }
                Err(e) => return Err(e),
            }
        }

        debug!(count = set.len(), "Migration set built");
        Ok(set)
    }
}

pub(crate) fn has_script_extension(path: &str) -> bool {
    std::path::Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(SCRIPT_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::BundledScript;

    fn statement(version: i64) -> MigrateStatement {
        MigrateStatement::parse(format!("{version}_m.sql"), b"SELECT 1;").unwrap()
    }

    fn set_of(versions: &[i64]) -> MigrationSet {
        let mut set = MigrationSet::new();
        for v in versions {
            set.add(statement(*v)).unwrap();
        }
        set
    }

    fn walk_forward(set: &MigrationSet) -> Vec<i64> {
        let mut out = Vec::new();
        let mut node = set.head();
        while let Some(n) = node {
            out.push(n.version());
            node = n.next();
        }
        out
    }

    fn walk_backward(set: &MigrationSet) -> Vec<i64> {
        let mut out = Vec::new();
        let mut node = set.tail();
        while let Some(n) = node {
            out.push(n.version());
            node = n.previous();
        }
        out
    }

    #[test]
    fn test_add_keeps_order() {
        let orders: [&[i64]; 4] = [
            &[1, 2, 3, 4],
            &[4, 3, 2, 1],
            &[3, 1, 4, 2],
            &[2, 4, 1, 3],
        ];
        for order in orders {
            let set = set_of(order);
            assert_eq!(walk_forward(&set), vec![1, 2, 3, 4], "order {order:?}");
            assert_eq!(walk_backward(&set), vec![4, 3, 2, 1], "order {order:?}");
            assert_eq!(set.versions(), vec![1, 2, 3, 4]);
        }
    }

    #[test]
    fn test_head_and_tail() {
        let set = set_of(&[20, 5, 300, 7]);
        assert_eq!(set.head().unwrap().version(), 5);
        assert_eq!(set.tail().unwrap().version(), 300);

        let empty = MigrationSet::new();
        assert!(empty.head().is_none());
        assert!(empty.tail().is_none());
    }

    #[test]
    fn test_find() {
        let set = set_of(&[1, 3, 5]);
        for v in [1, 3, 5] {
            assert_eq!(set.find(v).unwrap().version(), v);
        }
        for v in [0, 2, 4, 6, -1] {
            assert!(set.find(v).is_none());
        }
        assert_eq!(set.get(3).unwrap().filename, "3_m.sql");
    }

    #[test]
    fn test_node_links() {
        let set = set_of(&[1, 2, 3]);
        let middle = set.find(2).unwrap();
        assert_eq!(middle.previous().unwrap().version(), 1);
        assert_eq!(middle.next().unwrap().version(), 3);
        assert!(set.head().unwrap().previous().is_none());
        assert!(set.tail().unwrap().next().is_none());
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut set = set_of(&[1, 2]);
        let err = set
            .add(MigrateStatement::parse("2_other.sql", b"").unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            MigrateError::DuplicateVersion { version: 2, .. }
        ));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_reset() {
        let mut set = set_of(&[1, 2]);
        set.reset();
        assert!(set.is_empty());
        assert!(set.head().is_none());
        set.add(statement(9)).unwrap();
        assert_eq!(set.versions(), vec![9]);
    }

    #[test]
    fn test_builder_from_bundle_skips_invalid() {
        let bundle = ScriptBundle::new(vec![
            BundledScript::new("sql/002_b.sql", "CREATE TABLE b (id INTEGER);"),
            BundledScript::new("sql/readme.sql", "-- not a migration"),
            BundledScript::new("sql/nested/001_a.sql", "CREATE TABLE a (id INTEGER);"),
            BundledScript::new("sql/notes.txt", "ignored"),
        ]);

        let set = MigrationSetBuilder::bundle(bundle).build().unwrap();
        assert_eq!(set.versions(), vec![1, 2]);
        assert_eq!(set.head().unwrap().statement().filename, "sql/nested/001_a.sql");
    }

    #[test]
    fn test_builder_rejects_duplicates() {
        let bundle = ScriptBundle::new(vec![
            BundledScript::new("1_a.sql", ""),
            BundledScript::new("01_b.sql", ""),
        ]);
        let result = MigrationSetBuilder::bundle(bundle).build();
        assert!(matches!(
            result,
            Err(MigrateError::DuplicateVersion { version: 1, .. })
        ));
    }
}
