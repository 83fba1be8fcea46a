//! SQLite-backed analytics store.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::warn;

use crate::error::Result;

use super::AnalyticsSink;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS points_history (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    login       TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    points      INTEGER NOT NULL,
    reason      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_points_history_login ON points_history (login, recorded_at);

CREATE TABLE IF NOT EXISTS annotations (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    login       TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    kind        TEXT NOT NULL,
    text        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_annotations_login ON annotations (login, recorded_at);
"#;

/// Analytics store; one database file per mining account.
pub struct SqliteAnalytics {
    pool: SqlitePool,
}

impl SqliteAnalytics {
    /// Open (creating if needed) the database under `dir`.
    pub async fn open(dir: impl AsRef<Path>, username: &str) -> Result<Self> {
        let dir = dir.as_ref().join(username);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("analytics.db");

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(sqlx::Error::from)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        Self::bootstrap(pool).await
    }

    /// In-memory store, used by tests.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::bootstrap(pool).await
    }

    async fn bootstrap(pool: SqlitePool) -> Result<Self> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn points_rows(&self, login: &str) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM points_history WHERE login = ?")
                .bind(login)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    pub async fn annotation_rows(&self, login: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM annotations WHERE login = ?")
            .bind(login)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl AnalyticsSink for SqliteAnalytics {
    async fn record_points(&self, login: &str, points: u64, reason: &str) {
        let result = sqlx::query(
            "INSERT INTO points_history (login, recorded_at, points, reason) VALUES (?, ?, ?, ?)",
        )
        .bind(login)
        .bind(Utc::now().to_rfc3339())
        .bind(points as i64)
        .bind(reason)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(login, error = %e, "failed to record points sample");
        }
    }

    async fn record_annotation(&self, login: &str, kind: &str, text: &str) {
        let result = sqlx::query(
            "INSERT INTO annotations (login, recorded_at, kind, text) VALUES (?, ?, ?, ?)",
        )
        .bind(login)
        .bind(Utc::now().to_rfc3339())
        .bind(kind)
        .bind(text)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(login, error = %e, "failed to record annotation");
        }
    }
}
