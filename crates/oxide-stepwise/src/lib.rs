//! Versioned, reversible SQL script migrations.
//!
//! `oxide-stepwise` keeps a database schema in step with a directory of
//! plain SQL scripts:
//! - Each script carries an up body and an optional down body
//! - Scripts are ordered by the numeric version prefix of their file name
//! - Every executed step is appended to a `schema_version` history table
//! - A walk (up or down) runs in one transaction and either fully commits
//!   or leaves the database untouched
//!
//! # Architecture
//!
//! - **Statement** - Parses a script into up/down bodies plus a checksum
//! - **Set** - Version-ordered collection built from a directory or bundle
//! - **History** - The persisted `schema_version` table
//! - **Engine** - Resolves the current position and walks to a target
//! - **Bundle** - Packed or compiled-in script trees
//!
//! # Script format
//!
//! ```sql
//! -- 0002_create_posts.sql
//! CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT NOT NULL);
//! -- Down
//! DROP TABLE posts;
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_stepwise::prelude::*;
//!
//! let set = MigrationSetBuilder::directory("migrations").build()?;
//! let migrator = Migrator::new(pool, set);
//!
//! // Apply everything
//! migrator.up().await?;
//!
//! // Revert back to version 1
//! migrator.down(1).await?;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! oxide-stepwise init
//! oxide-stepwise new create_users --seq
//! oxide-stepwise migrate up
//! oxide-stepwise migrate down --version 1
//! oxide-stepwise status
//! ```

pub mod bundle;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod scaffold;
pub mod set;
pub mod statement;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::bundle::{BundledScript, ScriptBundle};
    pub use crate::config::Config;
    pub use crate::engine::{
        ChecksumDrift, MigrationReport, MigrationStatus, Migrator, Outcome, Position,
    };
    pub use crate::error::{MigrateError, Result};
    pub use crate::history::{Direction, HistoryRecord, MigrationHistory};
    pub use crate::scaffold::Numbering;
    pub use crate::set::{MigrationNode, MigrationSet, MigrationSetBuilder, ScriptSource};
    pub use crate::statement::MigrateStatement;
}
