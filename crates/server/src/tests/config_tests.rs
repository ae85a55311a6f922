use super::*;

use std::collections::HashMap;

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_match_the_documented_values() {
    let settings = Settings::default();
    assert_eq!(settings.log_sink, "csv");
    assert_eq!(settings.time_zone, "America/New_York");
    assert_eq!(settings.max_pages, 10);
    assert_eq!(settings.remote_log_timeout_ms, 5_000);
    assert!(settings.rng_seed.is_none());
    assert_eq!(settings.session_ttl_secs, 7_200);
}

#[test]
fn file_values_are_overridden_by_environment() {
    let mut settings = Settings::default();
    apply_file(
        &mut settings,
        r#"
            bind_addr = "0.0.0.0:9000"
            metadata_path = "meta/videos.json"
            log_sink = "sqlite"
            max_pages = 4
            rng_seed = "12"
        "#,
    );
    assert_eq!(settings.server_bind, "0.0.0.0:9000");
    assert_eq!(settings.metadata_path, PathBuf::from("meta/videos.json"));
    assert_eq!(settings.max_pages, 4);
    assert_eq!(settings.rng_seed, Some(12));

    apply_env(
        &mut settings,
        env_of(&[
            ("SURVEY_BIND", "127.0.0.1:1234"),
            ("APP__LOG_SINK", "remote"),
            ("APP__REMOTE_LOG_URL", "https://example.test/hook"),
            ("APP__TIME_ZONE", "Europe/Berlin"),
            ("APP__SESSION_TTL_SECS", "900"),
        ]),
    );
    assert_eq!(settings.server_bind, "127.0.0.1:1234");
    assert_eq!(settings.log_sink, "remote");
    assert_eq!(
        settings.remote_log_url.as_deref(),
        Some("https://example.test/hook")
    );
    assert_eq!(settings.time_zone, "Europe/Berlin");
    assert_eq!(settings.session_ttl_secs, 900);
}

#[test]
fn app_bind_addr_wins_over_survey_bind() {
    let mut settings = Settings::default();
    apply_env(
        &mut settings,
        env_of(&[("SURVEY_BIND", "127.0.0.1:1"), ("APP__BIND_ADDR", "127.0.0.1:2")]),
    );
    assert_eq!(settings.server_bind, "127.0.0.1:2");
}

#[test]
fn invalid_numbers_keep_previous_values() {
    let mut settings = Settings::default();
    apply_env(
        &mut settings,
        env_of(&[
            ("APP__MAX_PAGES", "lots"),
            ("APP__REMOTE_LOG_TIMEOUT_MS", "-5"),
            ("APP__RNG_SEED", "abc"),
            ("APP__SESSION_TTL_SECS", "soon"),
        ]),
    );
    assert_eq!(settings.session_ttl_secs, 7_200);
    assert_eq!(settings.max_pages, 10);
    assert_eq!(settings.remote_log_timeout_ms, 5_000);
    assert!(settings.rng_seed.is_none());
}

#[test]
fn unreadable_file_is_ignored() {
    let mut settings = Settings::default();
    apply_file(&mut settings, "this is = = not toml");
    assert_eq!(settings.log_sink, "csv");
}

#[test]
fn log_sink_names_parse() {
    assert_eq!("csv".parse::<LogSinkKind>().expect("csv"), LogSinkKind::Csv);
    assert_eq!(" Remote ".parse::<LogSinkKind>().expect("remote"), LogSinkKind::Remote);
    assert_eq!("sqlite".parse::<LogSinkKind>().expect("sqlite"), LogSinkKind::Sqlite);
    assert!("postgres".parse::<LogSinkKind>().is_err());
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(
        normalize_database_url("   "),
        Settings::default().database_url
    );
}

#[test]
fn keeps_windows_absolute_path_with_single_sqlite_colon() {
    assert_eq!(
        normalize_database_url("sqlite:C:\\Users\\alice\\test.db"),
        "sqlite:C:\\Users\\alice\\test.db"
    );
    assert_eq!(
        normalize_database_url("C:\\data\\test.db"),
        "sqlite://C:/data/test.db"
    );
}
