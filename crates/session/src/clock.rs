use chrono::{DateTime, Utc};
use chrono_tz::Tz;

pub const DEFAULT_TIME_ZONE: Tz = chrono_tz::America::New_York;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Wall-clock time in the survey's fixed zone, as written to the log.
pub fn local_timestamp(zone: Tz, at: DateTime<Utc>) -> String {
    at.with_timezone(&zone).format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_time_zone(name: &str) -> Option<Tz> {
    name.trim().parse::<Tz>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_eastern_time_across_daylight_saving() {
        let winter = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        let summer = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap();

        assert_eq!(local_timestamp(DEFAULT_TIME_ZONE, winter), "2025-01-15 07:00:00");
        assert_eq!(local_timestamp(DEFAULT_TIME_ZONE, summer), "2025-07-01 08:00:00");
    }

    #[test]
    fn parses_iana_names() {
        assert_eq!(parse_time_zone("America/New_York"), Some(DEFAULT_TIME_ZONE));
        assert_eq!(parse_time_zone(" Europe/Berlin "), Some(chrono_tz::Europe::Berlin));
        assert_eq!(parse_time_zone("Mars/Olympus"), None);
    }
}
