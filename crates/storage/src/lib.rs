use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::{
    domain::{Congruency, ItemId, PageNumber, ParticipantId},
    protocol::ChoiceRecord,
};

pub mod catalog;
pub mod csv_log;
pub mod remote_log;

pub use catalog::{Catalog, CatalogError, CatalogWarning, MAX_PAGES};
pub use csv_log::CsvChoiceLog;
pub use remote_log::RemoteChoiceLog;

/// Durable destination for logged choices.
#[async_trait]
pub trait ChoiceSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn append(&self, record: &ChoiceRecord) -> Result<()>;
}

/// SQLite-backed choice log.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredChoice {
    pub row_id: i64,
    pub record: ChoiceRecord,
    pub created_at: String,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every in-memory connection is its own database, so keep exactly one.
        let max_connections = if database_url.starts_with("sqlite::memory:") {
            1
        } else {
            5
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn insert_choice(&self, record: &ChoiceRecord) -> Result<i64> {
        let rec = sqlx::query(
            "INSERT INTO choices (
                timestamp_et, participant_id, page,
                chosen_internal_id, chosen_title, chosen_vid_id,
                control_internal_id, control_vid_id,
                treated_internal_id, treated_vid_id,
                treated_image_congruency, treated_text_congruency
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&record.timestamp_et)
        .bind(record.participant_id.as_str())
        .bind(i64::from(record.page.0))
        .bind(record.chosen_internal_id.as_str())
        .bind(&record.chosen_title)
        .bind(&record.chosen_vid_id)
        .bind(record.control_internal_id.as_ref().map(ItemId::as_str))
        .bind(record.control_vid_id.as_deref())
        .bind(record.treated_internal_id.as_ref().map(ItemId::as_str))
        .bind(record.treated_vid_id.as_deref())
        .bind(record.treated_image_congruency.map(Congruency::as_str))
        .bind(record.treated_text_congruency.map(Congruency::as_str))
        .fetch_one(&self.pool)
        .await
        .context("failed to insert choice row")?;
        Ok(rec.get::<i64, _>(0))
    }

    pub async fn list_choices(&self, participant: Option<&str>) -> Result<Vec<StoredChoice>> {
        let rows = sqlx::query(
            "SELECT id, timestamp_et, participant_id, page,
                    chosen_internal_id, chosen_title, chosen_vid_id,
                    control_internal_id, control_vid_id,
                    treated_internal_id, treated_vid_id,
                    treated_image_congruency, treated_text_congruency,
                    created_at
             FROM choices
             WHERE (?1 IS NULL OR participant_id = ?1)
             ORDER BY id ASC",
        )
        .bind(participant)
        .fetch_all(&self.pool)
        .await
        .context("failed to list choices")?;

        rows.into_iter()
            .map(|row| -> Result<StoredChoice> {
                let page: i64 = row.try_get("page")?;
                let record = ChoiceRecord {
                    timestamp_et: row.try_get("timestamp_et")?,
                    participant_id: ParticipantId(row.try_get("participant_id")?),
                    page: PageNumber(u32::try_from(page).context("page out of range")?),
                    chosen_internal_id: ItemId(row.try_get("chosen_internal_id")?),
                    chosen_title: row.try_get("chosen_title")?,
                    chosen_vid_id: row.try_get("chosen_vid_id")?,
                    control_internal_id: row
                        .try_get::<Option<String>, _>("control_internal_id")?
                        .map(ItemId),
                    control_vid_id: row.try_get("control_vid_id")?,
                    treated_internal_id: row
                        .try_get::<Option<String>, _>("treated_internal_id")?
                        .map(ItemId),
                    treated_vid_id: row.try_get("treated_vid_id")?,
                    treated_image_congruency: parse_congruency(
                        row.try_get("treated_image_congruency")?,
                    ),
                    treated_text_congruency: parse_congruency(
                        row.try_get("treated_text_congruency")?,
                    ),
                };
                Ok(StoredChoice {
                    row_id: row.try_get("id")?,
                    record,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ChoiceSink for Storage {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn append(&self, record: &ChoiceRecord) -> Result<()> {
        self.insert_choice(record).await?;
        Ok(())
    }
}

fn parse_congruency(raw: Option<String>) -> Option<Congruency> {
    match raw.as_deref() {
        Some("more") => Some(Congruency::More),
        Some("less") => Some(Congruency::Less),
        _ => None,
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
