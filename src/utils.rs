use chrono::{Datelike, Duration, NaiveDate, Weekday};

const KEY_FORMAT: &str = "%Y-%m-%d";

/// Format a date as a `YYYY-MM-DD` calendar-day key
pub fn format_key(date: NaiveDate) -> String {
    date.format(KEY_FORMAT).to_string()
}

/// Parse a calendar-day key, `None` when malformed
pub fn parse_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key.trim(), KEY_FORMAT).ok()
}

/// Shift a key by whole days. An unparsable key shifts from `fallback` instead.
pub fn shift_key(key: &str, delta_days: i64, fallback: NaiveDate) -> String {
    let base = parse_key(key).unwrap_or(fallback);
    let shifted = base
        .checked_add_signed(Duration::days(delta_days))
        .unwrap_or(base);
    format_key(shifted)
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Sun => "星期日",
        Weekday::Mon => "星期一",
        Weekday::Tue => "星期二",
        Weekday::Wed => "星期三",
        Weekday::Thu => "星期四",
        Weekday::Fri => "星期五",
        Weekday::Sat => "星期六",
    }
}

/// Render `"<day>日<weekday>"`, e.g. `30日星期六`. Unparsable input passes through.
pub fn weekday_label(date_str: &str) -> String {
    // Timestamps like `2025-08-30T11:26+08:00` are labelled by their date part.
    let date = parse_key(date_str).or_else(|| date_str.get(..10).and_then(parse_key));

    match date {
        Some(d) => format!("{}日{}", d.day(), weekday_name(d.weekday())),
        None => date_str.to_string(),
    }
}

/// Extract the first `HH:MM` from a timestamp such as `2025-08-30T15:51+08:00`
pub fn extract_clock_time(timestamp: &str) -> String {
    if timestamp.is_empty() {
        return String::new();
    }

    let bytes = timestamp.as_bytes();
    let is_clock = |w: &[u8]| {
        w[0].is_ascii_digit()
            && w[1].is_ascii_digit()
            && w[2] == b':'
            && w[3].is_ascii_digit()
            && w[4].is_ascii_digit()
    };

    match bytes.windows(5).position(is_clock) {
        Some(start) => timestamp[start..start + 5].to_string(),
        None => timestamp.to_string(),
    }
}

/// Label a temperature as `高温 N℃` / `低温 N℃`; empty stays empty
pub fn temp_label(temp: &str, is_high: bool) -> String {
    if temp.is_empty() {
        return String::new();
    }
    let prefix = if is_high { "高温 " } else { "低温 " };
    format!("{}{}℃", prefix, temp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_format_key_zero_pads() {
        assert_eq!(format_key(date(2025, 8, 3)), "2025-08-03");
        assert_eq!(format_key(date(999, 1, 1)), "0999-01-01");
    }

    #[test]
    fn test_parse_key_round_trip() {
        for d in [date(2025, 8, 30), date(2024, 2, 29), date(2000, 12, 31), date(1970, 1, 1)] {
            assert_eq!(parse_key(&format_key(d)), Some(d));
        }
    }

    #[test]
    fn test_parse_key_rejects_garbage() {
        assert_eq!(parse_key(""), None);
        assert_eq!(parse_key("yesterday"), None);
        assert_eq!(parse_key("2025-13-01"), None);
        assert_eq!(parse_key("2025-02-30"), None);
        assert_eq!(parse_key("2025-08-30T10:00"), None);
    }

    #[test]
    fn test_shift_key_rollover() {
        let fallback = date(2030, 1, 1);
        assert_eq!(shift_key("2025-08-30", -1, fallback), "2025-08-29");
        assert_eq!(shift_key("2025-03-01", -1, fallback), "2025-02-28");
        assert_eq!(shift_key("2024-03-01", -1, fallback), "2024-02-29");
        assert_eq!(shift_key("2025-01-01", -1, fallback), "2024-12-31");
        assert_eq!(shift_key("2025-12-31", 1, fallback), "2026-01-01");
    }

    #[test]
    fn test_shift_key_falls_back_on_bad_key() {
        assert_eq!(shift_key("not-a-date", -1, date(2025, 8, 30)), "2025-08-29");
        assert_eq!(shift_key("", 2, date(2025, 8, 30)), "2025-09-01");
    }

    #[test]
    fn test_weekday_label() {
        assert_eq!(weekday_label("2025-08-30"), "30日星期六");
        assert_eq!(weekday_label("2025-08-31"), "31日星期日");
        assert_eq!(weekday_label("2025-09-01"), "1日星期一");
        assert_eq!(weekday_label("2025-08-30T11:26+08:00"), "30日星期六");
    }

    #[test]
    fn test_weekday_label_passes_through() {
        assert_eq!(weekday_label(""), "");
        assert_eq!(weekday_label("someday"), "someday");
    }

    #[test]
    fn test_extract_clock_time() {
        assert_eq!(extract_clock_time("2025-08-30T15:51+08:00"), "15:51");
        assert_eq!(extract_clock_time("2025-08-30 09:05"), "09:05");
        assert_eq!(extract_clock_time(""), "");
        assert_eq!(extract_clock_time("soon"), "soon");
    }

    #[test]
    fn test_temp_label() {
        assert_eq!(temp_label("26", true), "高温 26℃");
        assert_eq!(temp_label("-3", false), "低温 -3℃");
        assert_eq!(temp_label("0", true), "高温 0℃");
        assert_eq!(temp_label("", false), "");
    }
}
