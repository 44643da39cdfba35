//! Migration engine.
//!
//! The engine derives the current position from the history table, works
//! out which scripts lie between it and the requested target, and runs
//! them inside a single transaction, recording one history row per step.

use std::collections::BTreeMap;
use std::fmt;

use sqlx::sqlite::SqlitePool;
use tracing::{debug, info, warn};

use crate::error::{MigrateError, Result};
use crate::history::{Direction, HistoryRecord, MigrationHistory};
use crate::set::MigrationSet;
use crate::statement::MigrateStatement;

/// Where the schema stands relative to the known migration set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// No history rows exist yet.
    Uninitialized,
    /// History exists but every known migration has been reversed.
    Unwound,
    /// The schema is at this known version.
    AtVersion(i64),
    /// History records a version above every known script.
    AheadOfKnown(i64),
}

impl Position {
    /// The version the schema is at, if it is a known one.
    #[must_use]
    pub fn version(self) -> Option<i64> {
        match self {
            Self::AtVersion(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("uninitialized"),
            Self::Unwound => f.write_str("all migrations reverted"),
            Self::AtVersion(v) => write!(f, "version {v}"),
            Self::AheadOfKnown(v) => write!(f, "version {v} (ahead of known scripts)"),
        }
    }
}

/// What an engine call ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The schema was already at the target.
    AlreadyAt(i64),
    /// Steps were executed and committed.
    Migrated {
        /// Direction of the walk.
        direction: Direction,
        /// Executed versions, in execution order.
        versions: Vec<i64>,
    },
    /// History is ahead of the local scripts; nothing was done.
    SchemaAhead {
        /// Version found in history.
        recorded: i64,
        /// Highest version in the set.
        latest_known: i64,
    },
    /// There was nothing to execute.
    NothingToDo,
}

/// Result of one engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Position before the call.
    pub from: Position,
    /// What happened.
    pub outcome: Outcome,
}

impl MigrationReport {
    fn new(from: Position, outcome: Outcome) -> Self {
        Self { from, outcome }
    }

    /// Versions executed by this call, in order.
    #[must_use]
    pub fn executed(&self) -> &[i64] {
        match &self.outcome {
            Outcome::Migrated { versions, .. } => versions,
            _ => &[],
        }
    }
}

/// A script whose current checksum differs from the recorded one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumDrift {
    /// Version of the script.
    pub version: i64,
    /// File name of the script.
    pub filename: String,
    /// Checksum stored in history.
    pub recorded: String,
    /// Checksum of the script as read now.
    pub current: String,
}

impl From<ChecksumDrift> for MigrateError {
    fn from(d: ChecksumDrift) -> Self {
        Self::ChecksumMismatch {
            version: d.version,
            filename: d.filename,
            recorded: d.recorded,
            current: d.current,
        }
    }
}

/// Snapshot of history against the known set.
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Every history row, oldest first.
    pub history: Vec<HistoryRecord>,
    /// Current position.
    pub position: Position,
    /// Known versions above the current position.
    pub pending: Vec<i64>,
}

/// Applies and reverts migrations against a database.
pub struct Migrator {
    pool: SqlitePool,
    set: MigrationSet,
    history: MigrationHistory,
    strict_checksums: bool,
}

impl Migrator {
    /// Creates a migrator over an already built set.
    #[must_use]
    pub fn new(pool: SqlitePool, set: MigrationSet) -> Self {
        let history = MigrationHistory::new(pool.clone());
        Self {
            pool,
            set,
            history,
            strict_checksums: false,
        }
    }

    /// Refuses to walk when an applied script has changed since it ran.
    #[must_use]
    pub fn strict_checksums(mut self, enabled: bool) -> Self {
        self.strict_checksums = enabled;
        self
    }

    /// Returns the migration set.
    #[must_use]
    pub fn set(&self) -> &MigrationSet {
        &self.set
    }

    /// Returns the migration history.
    #[must_use]
    pub fn history(&self) -> &MigrationHistory {
        &self.history
    }

    /// Ensures the history table exists.
    pub async fn init(&self) -> Result<()> {
        self.history.ensure_table().await
    }

    /// Works out the current position from the last history row.
    pub async fn position(&self) -> Result<Position> {
        self.init().await?;

        let last = match self.history.last().await {
            Ok(record) => record,
            Err(MigrateError::HistoryNotFound) => return Ok(Position::Uninitialized),
            Err(e) => return Err(e),
        };

        let Some(tail) = self.set.tail() else {
            return Ok(Position::AheadOfKnown(last.version));
        };
        if last.version > tail.version() {
            return Ok(Position::AheadOfKnown(last.version));
        }

        let node = self
            .set
            .find(last.version)
            .ok_or(MigrateError::UnknownAppliedVersion(last.version))?;

        Ok(match last.direction {
            Direction::Up => Position::AtVersion(node.version()),
            Direction::Down => node
                .previous()
                .map_or(Position::Unwound, |prev| Position::AtVersion(prev.version())),
        })
    }

    /// Converges the schema to `target`, walking up or down as needed.
    pub async fn ensure_schema(&self, target: i64) -> Result<MigrationReport> {
        let target_idx = self
            .set
            .position(target)
            .ok_or(MigrateError::UnknownTargetVersion(target))?;

        let from = self.position().await?;
        let statements = self.set.as_slice();

        match from {
            Position::Uninitialized | Position::Unwound => {
                info!(target_version = target, "Bootstrapping schema from the first migration");
                self.walk(from, Direction::Up, &statements[..=target_idx])
                    .await
            }
            Position::AtVersion(v) if v == target => {
                info!(version = v, "Schema already at target version");
                Ok(MigrationReport::new(from, Outcome::AlreadyAt(v)))
            }
            Position::AtVersion(v) => {
                let current_idx = self.index_of(v)?;
                if v < target {
                    self.walk(
                        from,
                        Direction::Up,
                        &statements[current_idx + 1..=target_idx],
                    )
                    .await
                } else {
                    self.walk(
                        from,
                        Direction::Down,
                        &statements[target_idx + 1..=current_idx],
                    )
                    .await
                }
            }
            Position::AheadOfKnown(recorded) => Ok(self.report_ahead(from, recorded)),
        }
    }

    /// Converges to the newest known version.
    pub async fn up(&self) -> Result<MigrationReport> {
        match self.set.tail() {
            Some(tail) => self.ensure_schema(tail.version()).await,
            None => {
                info!("No migrations known, nothing to apply");
                Ok(MigrationReport::new(
                    self.position().await?,
                    Outcome::NothingToDo,
                ))
            }
        }
    }

    /// Alias of [`Migrator::up`].
    pub async fn ensure_head(&self) -> Result<MigrationReport> {
        self.up().await
    }

    /// Reverts every migration above `target`, newest first.
    pub async fn down(&self, target: i64) -> Result<MigrationReport> {
        let target_idx = self
            .set
            .position(target)
            .ok_or(MigrateError::UnknownTargetVersion(target))?;

        let from = self.position().await?;
        match from {
            Position::AtVersion(v) if v > target => {
                let current_idx = self.index_of(v)?;
                self.walk(
                    from,
                    Direction::Down,
                    &self.set.as_slice()[target_idx + 1..=current_idx],
                )
                .await
            }
            Position::AtVersion(v) => {
                info!(
                    current = v,
                    target_version = target,
                    "Schema is not above the target version, nothing to revert"
                );
                Ok(MigrationReport::new(from, Outcome::AlreadyAt(v)))
            }
            Position::Uninitialized | Position::Unwound => {
                info!("No applied migrations to revert");
                Ok(MigrationReport::new(from, Outcome::NothingToDo))
            }
            Position::AheadOfKnown(recorded) => Ok(self.report_ahead(from, recorded)),
        }
    }

    /// Reverts everything from the current position back through the first
    /// migration.
    pub async fn drop_all(&self) -> Result<MigrationReport> {
        let from = self.position().await?;
        let current_idx = match from {
            Position::AtVersion(v) => self.index_of(v)?,
            Position::AheadOfKnown(recorded) => match self.set.tail() {
                Some(tail) => {
                    warn!(
                        recorded,
                        latest_known = tail.version(),
                        "Schema is ahead of known scripts, unwinding from the latest known one"
                    );
                    tail.index()
                }
                None => return Ok(MigrationReport::new(from, Outcome::NothingToDo)),
            },
            Position::Uninitialized | Position::Unwound => {
                info!("No applied migrations to drop");
                return Ok(MigrationReport::new(from, Outcome::NothingToDo));
            }
        };

        self.walk(
            from,
            Direction::Down,
            &self.set.as_slice()[..=current_idx],
        )
        .await
    }

    /// Compares the checksum of every applied script with its current text.
    ///
    /// Only the most recent row of each version counts, and only when it is
    /// an up step: a reverted script may be edited freely before it is
    /// applied again.
    pub async fn verify(&self) -> Result<Vec<ChecksumDrift>> {
        self.init().await?;
        self.drifts().await
    }

    async fn drifts(&self) -> Result<Vec<ChecksumDrift>> {
        let mut latest: BTreeMap<i64, HistoryRecord> = BTreeMap::new();
        for record in self.history.all().await? {
            latest.insert(record.version, record);
        }

        let drifts = latest
            .into_values()
            .filter(|record| record.direction == Direction::Up)
            .filter_map(|record| {
                let current = self.set.get(record.version)?;
                (current.checksum != record.checksum).then(|| ChecksumDrift {
                    version: record.version,
                    filename: current.filename.clone(),
                    recorded: record.checksum,
                    current: current.checksum.clone(),
                })
            })
            .collect();
        Ok(drifts)
    }

    /// Returns history, position and pending versions.
    pub async fn status(&self) -> Result<MigrationStatus> {
        let position = self.position().await?;
        let history = self.history.all().await?;

        let pending = match position {
            Position::Uninitialized | Position::Unwound => self.set.versions(),
            Position::AtVersion(v) => self
                .set
                .iter()
                .map(|s| s.version)
                .filter(|version| *version > v)
                .collect(),
            Position::AheadOfKnown(_) => Vec::new(),
        };

        Ok(MigrationStatus {
            history,
            position,
            pending,
        })
    }

    fn index_of(&self, version: i64) -> Result<usize> {
        self.set
            .position(version)
            .ok_or(MigrateError::UnknownAppliedVersion(version))
    }

    fn report_ahead(&self, from: Position, recorded: i64) -> MigrationReport {
        let latest_known = self.set.tail().map_or(0, |t| t.version());
        warn!(
            recorded,
            latest_known, "Database schema is ahead of the known migration set, no action taken"
        );
        MigrationReport::new(
            from,
            Outcome::SchemaAhead {
                recorded,
                latest_known,
            },
        )
    }

    /// Called from walks only, after `position` has created the table.
    async fn check_drift(&self) -> Result<()> {
        let drifts = self.drifts().await?;
        for drift in &drifts {
            warn!(
                version = drift.version,
                filename = %drift.filename,
                recorded = %drift.recorded,
                current = %drift.current,
                "Applied script has changed since it ran"
            );
        }
        if self.strict_checksums {
            if let Some(drift) = drifts.into_iter().next() {
                return Err(drift.into());
            }
        }
        Ok(())
    }

    /// Runs `steps` in one transaction.
    ///
    /// `steps` is in ascending version order; a down walk executes it in
    /// reverse.
    async fn walk(
        &self,
        from: Position,
        direction: Direction,
        steps: &[MigrateStatement],
    ) -> Result<MigrationReport> {
        if steps.is_empty() {
            return Ok(MigrationReport::new(from, Outcome::NothingToDo));
        }
        self.check_drift().await?;

        let ordered: Vec<&MigrateStatement> = match direction {
            Direction::Up => steps.iter().collect(),
            Direction::Down => steps.iter().rev().collect(),
        };

        info!(
            direction = %direction,
            from = %from,
            steps = ordered.len(),
            "Starting migration"
        );

        let mut tx = self.pool.begin().await?;
        let mut versions = Vec::with_capacity(ordered.len());

        for statement in ordered {
            let body = match direction {
                Direction::Up => &statement.up,
                Direction::Down => &statement.down,
            };

            if body.trim().is_empty() {
                debug!(version = statement.version, "Empty script body, recording only");
            } else {
                debug!(sql = %body, "Executing SQL");
                if let Err(source) = sqlx::raw_sql(body).execute(&mut *tx).await {
                    warn!(
                        version = statement.version,
                        filename = %statement.filename,
                        "Migration failed, rolling back"
                    );
                    if let Err(e) = tx.rollback().await {
                        warn!(error = %e, "Rollback failed, dropping the transaction");
                    }
                    return Err(MigrateError::Execution {
                        version: statement.version,
                        filename: statement.filename.clone(),
                        direction,
                        source,
                    });
                }
            }

            MigrationHistory::record(&mut tx, statement, direction, body).await?;
            info!(
                version = statement.version,
                filename = %statement.filename,
                direction = %direction,
                "Migrated script"
            );
            versions.push(statement.version);
        }

        tx.commit().await?;
        info!(steps = versions.len(), "Migration committed");

        Ok(MigrationReport::new(
            from,
            Outcome::Migrated {
                direction,
                versions,
            },
        ))
    }
}
