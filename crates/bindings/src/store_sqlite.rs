//! SQLite-backed binding store using sqlx.

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions},
};

use courier_common::{ChannelId, ChannelRecord};

use crate::store::{BindOutcome, BindingStore, RemoveOutcome};

/// SQLite-backed persistence for the binding graph and settings.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new store with its own connection pool and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("failed to connect to SQLite")?;

        run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a store using an existing pool (migrations must already be run).
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn remove_channel(&self, id: ChannelId, table: Table) -> Result<RemoveOutcome> {
        let (channel_table, binding_column) = match table {
            Table::Sources => ("sources", "source_id"),
            Table::Targets => ("targets", "target_id"),
        };

        let name: Option<String> =
            sqlx::query(&format!("SELECT name FROM {channel_table} WHERE id = ?"))
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?
                .map(|row| row.get("name"));

        let bindings = sqlx::query(&format!("DELETE FROM bindings WHERE {binding_column} = ?"))
            .bind(id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();

        let removed = sqlx::query(&format!("DELETE FROM {channel_table} WHERE id = ?"))
            .bind(id.0)
            .execute(&self.pool)
            .await?
            .rows_affected()
            > 0;

        Ok(RemoveOutcome {
            removed,
            bindings_removed: bindings as usize,
            name: name.unwrap_or_else(|| id.to_string()),
        })
    }

    async fn upsert_channel(&self, record: &ChannelRecord, table: Table) -> Result<()> {
        let channel_table = match table {
            Table::Sources => "sources",
            Table::Targets => "targets",
        };
        sqlx::query(&format!(
            "INSERT INTO {channel_table} (id, name, username) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, username = excluded.username",
        ))
        .bind(record.id.0)
        .bind(&record.name)
        .bind(&record.username)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_channels(&self, table: Table) -> Result<Vec<ChannelRecord>> {
        let channel_table = match table {
            Table::Sources => "sources",
            Table::Targets => "targets",
        };
        let rows = sqlx::query(&format!(
            "SELECT id, name, username FROM {channel_table} ORDER BY name COLLATE NOCASE",
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ChannelRecord {
                id: ChannelId(row.get("id")),
                name: row.get("name"),
                username: row.get("username"),
            })
            .collect())
    }
}

#[derive(Clone, Copy)]
enum Table {
    Sources,
    Targets,
}

/// Create tables if they don't exist. Idempotent, run at startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS sources (
            id       INTEGER PRIMARY KEY,
            name     TEXT NOT NULL,
            username TEXT
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS targets (
            id       INTEGER PRIMARY KEY,
            name     TEXT NOT NULL,
            username TEXT
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS bindings (
            source_id INTEGER NOT NULL,
            target_id INTEGER NOT NULL,
            UNIQUE(source_id, target_id)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS settings (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

const REPOST_STEP_KEY: &str = "repost_step";

#[async_trait]
impl BindingStore for SqliteStore {
    async fn targets_for(&self, source: ChannelId) -> Result<Vec<ChannelId>> {
        let rows = sqlx::query("SELECT target_id FROM bindings WHERE source_id = ?")
            .bind(source.0)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| ChannelId(row.get("target_id")))
            .collect())
    }

    async fn upsert_source(&self, record: &ChannelRecord) -> Result<()> {
        self.upsert_channel(record, Table::Sources).await
    }

    async fn upsert_target(&self, record: &ChannelRecord) -> Result<()> {
        self.upsert_channel(record, Table::Targets).await
    }

    async fn remove_source(&self, id: ChannelId) -> Result<RemoveOutcome> {
        self.remove_channel(id, Table::Sources).await
    }

    async fn remove_target(&self, id: ChannelId) -> Result<RemoveOutcome> {
        self.remove_channel(id, Table::Targets).await
    }

    async fn list_sources(&self) -> Result<Vec<ChannelRecord>> {
        self.list_channels(Table::Sources).await
    }

    async fn list_targets(&self) -> Result<Vec<ChannelRecord>> {
        self.list_channels(Table::Targets).await
    }

    async fn bind(&self, source: ChannelId, targets: &[ChannelId]) -> Result<BindOutcome> {
        let mut outcome = BindOutcome::default();
        for target in targets {
            let inserted = sqlx::query(
                "INSERT OR IGNORE INTO bindings (source_id, target_id) VALUES (?, ?)",
            )
            .bind(source.0)
            .bind(target.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
            if inserted > 0 {
                outcome.added += 1;
            } else {
                outcome.existing += 1;
            }
        }
        Ok(outcome)
    }

    async fn unbind(&self, source: ChannelId, target: ChannelId) -> Result<bool> {
        let removed = sqlx::query("DELETE FROM bindings WHERE source_id = ? AND target_id = ?")
            .bind(source.0)
            .bind(target.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(removed > 0)
    }

    async fn bindings(&self) -> Result<Vec<(ChannelId, ChannelId)>> {
        let rows = sqlx::query("SELECT source_id, target_id FROM bindings")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (ChannelId(row.get("source_id")), ChannelId(row.get("target_id"))))
            .collect())
    }

    async fn repost_step(&self) -> Result<Option<u32>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(REPOST_STEP_KEY)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let value: String = row.get("value");
                Ok(Some(value.parse().context("invalid repost_step setting")?))
            },
            None => Ok(None),
        }
    }

    async fn set_repost_step(&self, step: u32) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(REPOST_STEP_KEY)
        .bind(step.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
