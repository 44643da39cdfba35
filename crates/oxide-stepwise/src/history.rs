//! Migration history tracking.
//!
//! This module manages the `schema_version` table. Every executed step, up
//! or down, appends one row; the most recent row decides where the schema
//! currently stands.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqlitePool};

use crate::error::{MigrateError, Result};
use crate::statement::MigrateStatement;

/// SQL to create the history table (SQLite).
pub const CREATE_HISTORY_TABLE_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    version INTEGER NOT NULL,
    filename TEXT NOT NULL,
    checksum TEXT NOT NULL,
    direction TEXT NOT NULL,
    statement TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

const SELECT_COLUMNS: &str =
    "SELECT id, version, filename, checksum, direction, statement, created_at FROM schema_version";

type RecordRow = (i64, i64, String, String, String, String, String);

/// Which body of a script was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// The forward change.
    Up,
    /// The reverse change.
    Down,
}

impl Direction {
    /// Value stored in the `direction` column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            other => Err(format!("unknown direction '{other}'")),
        }
    }
}

/// One persisted history row.
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    /// Insertion id; higher means more recent.
    pub id: i64,
    /// Version of the script.
    pub version: i64,
    /// File name of the script.
    pub filename: String,
    /// Checksum of the script when the step ran.
    pub checksum: String,
    /// Which body was executed.
    pub direction: Direction,
    /// The SQL text that was executed.
    pub statement: String,
    /// When the step was recorded.
    pub created_at: DateTime<Utc>,
}

impl HistoryRecord {
    fn from_row(row: RecordRow) -> Result<Self> {
        let (id, version, filename, checksum, direction, statement, created_at) = row;
        let direction = direction
            .parse()
            .map_err(|e: String| MigrateError::Database(sqlx::Error::Decode(e.into())))?;

        Ok(Self {
            id,
            version,
            filename,
            checksum,
            direction,
            statement,
            created_at: parse_timestamp(&created_at),
        })
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            // SQLite datetime format fallback
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|dt| dt.and_utc())
                .unwrap_or_else(|_| Utc::now())
        })
}

/// Manages the migration history in the database.
#[derive(Debug, Clone)]
pub struct MigrationHistory {
    pool: SqlitePool,
}

impl MigrationHistory {
    /// Creates a new migration history manager.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Ensures the history table exists.
    pub async fn ensure_table(&self) -> Result<()> {
        sqlx::query(CREATE_HISTORY_TABLE_SQL)
            .execute(&self.pool)
            .await
            .map_err(MigrateError::StoreUnavailable)?;
        Ok(())
    }

    /// Appends a row for one executed step.
    ///
    /// Runs on the caller's connection so the row commits or rolls back
    /// together with the script itself.
    pub async fn record(
        conn: &mut SqliteConnection,
        statement: &MigrateStatement,
        direction: Direction,
        executed: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO schema_version (version, filename, checksum, direction, statement) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(statement.version)
        .bind(&statement.filename)
        .bind(&statement.checksum)
        .bind(direction.as_str())
        .bind(executed)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Returns the most recent row.
    ///
    /// Fails with [`MigrateError::HistoryNotFound`] when the table is empty.
    pub async fn last(&self) -> Result<HistoryRecord> {
        let row: Option<RecordRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT 1"))
                .fetch_optional(&self.pool)
                .await?;

        row.map_or(Err(MigrateError::HistoryNotFound), HistoryRecord::from_row)
    }

    /// Returns every row, oldest first.
    pub async fn all(&self) -> Result<Vec<HistoryRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(HistoryRecord::from_row).collect()
    }

    /// Counts history rows.
    pub async fn count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM schema_version")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory SQLite pool")
    }

    fn statement(version: i64) -> MigrateStatement {
        MigrateStatement::parse(
            format!("{version:03}_step.sql"),
            b"CREATE TABLE t (id INTEGER);\n-- Down\nDROP TABLE t;\n",
        )
        .unwrap()
    }

    async fn record(pool: &SqlitePool, st: &MigrateStatement, direction: Direction) {
        let mut conn = pool.acquire().await.unwrap();
        let body = match direction {
            Direction::Up => &st.up,
            Direction::Down => &st.down,
        };
        MigrationHistory::record(&mut conn, st, direction, body)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ensure_table() {
        let pool = create_test_pool().await;
        let history = MigrationHistory::new(pool);

        history.ensure_table().await.unwrap();
        // Should be idempotent
        history.ensure_table().await.unwrap();
        assert_eq!(history.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_last_on_empty_table() {
        let pool = create_test_pool().await;
        let history = MigrationHistory::new(pool);
        history.ensure_table().await.unwrap();

        assert!(matches!(
            history.last().await,
            Err(MigrateError::HistoryNotFound)
        ));
        assert!(history.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_and_read_back() {
        let pool = create_test_pool().await;
        let history = MigrationHistory::new(pool.clone());
        history.ensure_table().await.unwrap();

        let first = statement(1);
        let second = statement(2);
        record(&pool, &first, Direction::Up).await;
        record(&pool, &second, Direction::Up).await;
        record(&pool, &second, Direction::Down).await;

        let all = history.all().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(
            all.iter().map(|r| r.version).collect::<Vec<_>>(),
            vec![1, 2, 2]
        );
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));

        let last = history.last().await.unwrap();
        assert_eq!(last.version, 2);
        assert_eq!(last.direction, Direction::Down);
        assert_eq!(last.filename, "002_step.sql");
        assert_eq!(last.statement, "DROP TABLE t;\n");
        assert_eq!(last.checksum, second.checksum);
        assert_eq!(history.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_record_rolls_back_with_transaction() {
        let pool = create_test_pool().await;
        let history = MigrationHistory::new(pool.clone());
        history.ensure_table().await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        MigrationHistory::record(&mut tx, &statement(1), Direction::Up, "SELECT 1;")
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(history.count().await.unwrap(), 0);
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("up".parse::<Direction>().unwrap(), Direction::Up);
        assert_eq!("down".parse::<Direction>().unwrap(), Direction::Down);
        assert!("sideways".parse::<Direction>().is_err());
        assert_eq!(Direction::Down.to_string(), "down");
    }

    #[test]
    fn test_parse_sqlite_timestamp() {
        let ts = parse_timestamp("2024-01-02 03:04:05");
        assert_eq!(ts.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-01-02 03:04:05");
    }
}
