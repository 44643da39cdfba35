#![allow(dead_code)]

use std::path::Path;

use oxide_stepwise::prelude::*;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("Failed to create in-memory SQLite pool")
}

pub fn write_script(dir: &Path, filename: &str, up: &str, down: &str) {
    let text = format!("{up}\n-- Down\n{down}\n");
    std::fs::write(dir.join(filename), text)
        .unwrap_or_else(|e| panic!("Failed to write {filename}: {e}"));
}

pub fn build_dir(dir: &Path) -> MigrationSet {
    MigrationSetBuilder::directory(dir)
        .build()
        .unwrap_or_else(|e| panic!("Failed to build set from {}: {e}", dir.display()))
}

pub async fn table_exists(pool: &SqlitePool, name: &str) -> bool {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_optional(pool)
            .await
            .unwrap();
    row.is_some()
}

/// `(version, direction)` of every history row, oldest first.
pub async fn history_steps(migrator: &Migrator) -> Vec<(i64, Direction)> {
    migrator
        .history()
        .all()
        .await
        .unwrap()
        .into_iter()
        .map(|r| (r.version, r.direction))
        .collect()
}
