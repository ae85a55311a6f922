use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use shared::protocol::ChoiceRecord;
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};

use crate::ChoiceSink;

pub const CSV_HEADER: [&str; 6] = [
    "timestamp_et",
    "participant_id",
    "page",
    "video_id",
    "video_title",
    "video_vid_id",
];

/// Append-only CSV file, one row per logged page.
pub struct CsvChoiceLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvChoiceLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn encode_rows(record: &ChoiceRecord, with_header: bool) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if with_header {
        writer.write_record(CSV_HEADER)?;
    }
    let page = record.page.to_string();
    writer.write_record([
        record.timestamp_et.as_str(),
        record.participant_id.as_str(),
        page.as_str(),
        record.chosen_internal_id.as_str(),
        record.chosen_title.as_str(),
        record.chosen_vid_id.as_str(),
    ])?;
    writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("failed to encode csv row: {}", err.error()))
}

#[async_trait]
impl ChoiceSink for CsvChoiceLog {
    fn name(&self) -> &'static str {
        "csv"
    }

    async fn append(&self, record: &ChoiceRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("failed to create log directory '{}'", parent.display())
            })?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open choice log '{}'", self.path.display()))?;
        let is_new = file.metadata().await?.len() == 0;

        // Header and row go out in one write so readers never see a partial record.
        let bytes = encode_rows(record, is_new)?;
        file.write_all(&bytes)
            .await
            .with_context(|| format!("failed to append to '{}'", self.path.display()))?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/csv_log_tests.rs"]
mod tests;
