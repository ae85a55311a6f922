//! Video metadata catalog: validated items grouped into the ordered page walk.

use std::{
    collections::{BTreeMap, HashSet},
    fmt, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use serde_json::Value;
use shared::domain::{ItemId, PageNumber, VideoItem};
use thiserror::Error;
use tracing::warn;

/// Upper bound on the number of pages in one survey walk.
pub const MAX_PAGES: usize = 10;

/// Items each page is expected to carry.
pub const ITEMS_PER_PAGE: usize = 2;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read metadata file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("metadata is not a valid list of video records: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("record #{index} has no usable `id`")]
    MissingId { index: usize },
    #[error("record `{id}` has no `vid_id`")]
    MissingVidId { id: ItemId },
    #[error("duplicate video id `{0}`")]
    DuplicateId(ItemId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogWarning {
    UnexpectedItemCount { page: PageNumber, count: usize },
    PageOutOfRange { id: ItemId, page: i64 },
    PagesTruncated { dropped: Vec<PageNumber> },
}

impl fmt::Display for CatalogWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogWarning::UnexpectedItemCount { page, count } => write!(
                f,
                "page {page} does not have exactly {ITEMS_PER_PAGE} videos (found {count})"
            ),
            CatalogWarning::PageOutOfRange { id, page } => {
                write!(f, "video `{id}` has page {page}, which is outside the walk")
            }
            CatalogWarning::PagesTruncated { dropped } => {
                let dropped: Vec<String> = dropped.iter().map(ToString::to_string).collect();
                write!(f, "pages beyond the limit were dropped: {}", dropped.join(", "))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawVideoRecord {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    page: Option<i64>,
    #[serde(default)]
    vid_id: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    channel: String,
    #[serde(default)]
    duration: String,
    #[serde(default)]
    views: String,
    #[serde(default)]
    years: String,
    #[serde(default)]
    profile: String,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pages: Vec<PageNumber>,
    items_by_page: BTreeMap<PageNumber, Vec<VideoItem>>,
    warnings: Vec<CatalogWarning>,
}

impl Catalog {
    pub fn load(path: impl AsRef<Path>, max_pages: usize) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw, max_pages)
    }

    pub fn from_json_str(raw: &str, max_pages: usize) -> Result<Self, CatalogError> {
        let records: Vec<RawVideoRecord> = serde_json::from_str(raw)?;
        Self::from_records(records, max_pages)
    }

    fn from_records(records: Vec<RawVideoRecord>, max_pages: usize) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        let mut warnings = Vec::new();
        let mut items_by_page: BTreeMap<PageNumber, Vec<VideoItem>> = BTreeMap::new();

        for (index, record) in records.into_iter().enumerate() {
            let id = record
                .id
                .as_ref()
                .and_then(normalize_id)
                .ok_or(CatalogError::MissingId { index })?;
            if !seen.insert(id.clone()) {
                return Err(CatalogError::DuplicateId(id));
            }
            let vid_id = record
                .vid_id
                .filter(|vid| !vid.trim().is_empty())
                .ok_or_else(|| CatalogError::MissingVidId { id: id.clone() })?;

            let raw_page = record.page.unwrap_or(1);
            let page = match u32::try_from(raw_page) {
                Ok(page) if page >= 1 => PageNumber(page),
                _ => {
                    warnings.push(CatalogWarning::PageOutOfRange { id, page: raw_page });
                    continue;
                }
            };

            items_by_page.entry(page).or_default().push(VideoItem {
                id,
                page,
                vid_id,
                title: record.title,
                channel: record.channel,
                duration: record.duration,
                views: record.views,
                years: record.years,
                profile: record.profile,
            });
        }

        let mut pages: Vec<PageNumber> = items_by_page.keys().copied().collect();
        if pages.len() > max_pages {
            let dropped = pages.split_off(max_pages);
            for page in &dropped {
                items_by_page.remove(page);
            }
            warnings.push(CatalogWarning::PagesTruncated { dropped });
        }

        for (page, items) in &items_by_page {
            if items.len() != ITEMS_PER_PAGE {
                warnings.push(CatalogWarning::UnexpectedItemCount {
                    page: *page,
                    count: items.len(),
                });
            }
        }

        for warning in &warnings {
            warn!(%warning, "catalog warning");
        }

        Ok(Self {
            pages,
            items_by_page,
            warnings,
        })
    }

    pub fn pages(&self) -> &[PageNumber] {
        &self.pages
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn last_page(&self) -> Option<PageNumber> {
        self.pages.last().copied()
    }

    pub fn items_on(&self, page: PageNumber) -> &[VideoItem] {
        self.items_by_page
            .get(&page)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn item_count(&self) -> usize {
        self.items_by_page.values().map(Vec::len).sum()
    }

    pub fn warnings(&self) -> &[CatalogWarning] {
        &self.warnings
    }

    /// Warning text for a page whose item count is off, if any.
    pub fn page_warning(&self, page: PageNumber) -> Option<String> {
        self.warnings.iter().find_map(|warning| match warning {
            CatalogWarning::UnexpectedItemCount { page: p, .. } if *p == page => {
                Some(warning.to_string())
            }
            _ => None,
        })
    }
}

fn normalize_id(value: &Value) -> Option<ItemId> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(ItemId(s.clone())),
        Value::Number(n) => Some(ItemId(n.to_string())),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/catalog_tests.rs"]
mod tests;
