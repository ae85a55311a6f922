use std::{collections::HashMap, fs, path::PathBuf, str::FromStr};

use anyhow::bail;
use tracing::warn;

pub const CONFIG_FILE: &str = "survey.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSinkKind {
    Csv,
    Remote,
    Sqlite,
}

impl FromStr for LogSinkKind {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "csv" | "file" => Ok(Self::Csv),
            "remote" | "http" => Ok(Self::Remote),
            "sqlite" => Ok(Self::Sqlite),
            other => bail!("unknown log sink '{other}' (expected csv, remote or sqlite)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_bind: String,
    pub metadata_path: PathBuf,
    pub log_sink: String,
    pub csv_log_path: PathBuf,
    pub remote_log_url: Option<String>,
    pub remote_log_timeout_ms: u64,
    pub database_url: String,
    pub thumbnail_dir: Option<PathBuf>,
    pub time_zone: String,
    pub max_pages: usize,
    pub rng_seed: Option<u64>,
    pub session_ttl_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8501".into(),
            metadata_path: "video_metadata.json".into(),
            log_sink: "csv".into(),
            csv_log_path: "choices_log.csv".into(),
            remote_log_url: None,
            remote_log_timeout_ms: 5_000,
            database_url: "sqlite://./data/choices.db".into(),
            thumbnail_dir: None,
            time_zone: "America/New_York".into(),
            max_pages: storage::MAX_PAGES,
            rng_seed: None,
            session_ttl_secs: session::DEFAULT_SESSION_TTL.as_secs(),
        }
    }
}

/// Defaults, then `survey.toml` (or `$SURVEY_CONFIG`), then environment variables.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();
    let config_path = std::env::var("SURVEY_CONFIG").unwrap_or_else(|_| CONFIG_FILE.to_string());

    if let Ok(raw) = fs::read_to_string(&config_path) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

pub fn apply_file(settings: &mut Settings, raw: &str) {
    let file_cfg = match toml::from_str::<HashMap<String, toml::Value>>(raw) {
        Ok(cfg) => cfg,
        Err(error) => {
            warn!(%error, "ignoring unreadable config file");
            return;
        }
    };
    let values: HashMap<String, String> = file_cfg
        .into_iter()
        .filter_map(|(key, value)| {
            let text = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                other => {
                    warn!(%key, value = %other, "ignoring non-scalar config value");
                    return None;
                }
            };
            Some((key, text))
        })
        .collect();

    apply(settings, |key| values.get(key).cloned());
}

pub fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("SURVEY_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = lookup("DATABASE_URL") {
        settings.database_url = normalize_database_url(&v);
    }
    apply(settings, |key| lookup(&format!("APP__{}", key.to_ascii_uppercase())));
}

fn apply(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("bind_addr") {
        settings.server_bind = v;
    }
    if let Some(v) = lookup("metadata_path") {
        settings.metadata_path = v.into();
    }
    if let Some(v) = lookup("log_sink") {
        settings.log_sink = v;
    }
    if let Some(v) = lookup("csv_log_path") {
        settings.csv_log_path = v.into();
    }
    if let Some(v) = lookup("remote_log_url") {
        settings.remote_log_url = Some(v);
    }
    if let Some(v) = lookup("remote_log_timeout_ms") {
        parse_into(&mut settings.remote_log_timeout_ms, "remote_log_timeout_ms", &v);
    }
    if let Some(v) = lookup("database_url") {
        settings.database_url = normalize_database_url(&v);
    }
    if let Some(v) = lookup("thumbnail_dir") {
        settings.thumbnail_dir = Some(v.into());
    }
    if let Some(v) = lookup("time_zone") {
        settings.time_zone = v;
    }
    if let Some(v) = lookup("max_pages") {
        parse_into(&mut settings.max_pages, "max_pages", &v);
    }
    if let Some(v) = lookup("session_ttl_secs") {
        parse_into(&mut settings.session_ttl_secs, "session_ttl_secs", &v);
    }
    if let Some(v) = lookup("rng_seed") {
        let mut seed = 0;
        if parse_into(&mut seed, "rng_seed", &v) {
            settings.rng_seed = Some(seed);
        }
    }
}

fn parse_into<T: FromStr>(slot: &mut T, key: &str, raw: &str) -> bool {
    match raw.trim().parse::<T>() {
        Ok(parsed) => {
            *slot = parsed;
            true
        }
        Err(_) => {
            warn!(%key, value = %raw, "invalid config value; keeping previous");
            false
        }
    }
}

pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
