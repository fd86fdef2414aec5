//! XMLTV timestamp parsing
//!
//! XMLTV program boundaries are `YYYYMMDDHHMMSS ±ZZZZ`: fourteen digits of
//! calendar components followed by an explicit UTC-offset token.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};

/// Parse an XMLTV timestamp into UTC.
///
/// Returns `None` when the value is missing components, the offset token is
/// absent or malformed, or the digits do not form a valid calendar date
/// (e.g. month 13). Callers treat `None` as "keep the record"; guide data is
/// never silently dropped over a bad timestamp.
pub fn parse_xmltv_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let mut parts = raw.trim().split_whitespace();
    let digits = parts.next()?;
    let offset_token = parts.next()?;

    if digits.len() < 14 || !digits.as_bytes()[..14].iter().all(u8::is_ascii_digit) {
        return None;
    }

    let year: i32 = digits[0..4].parse().ok()?;
    let month: u32 = digits[4..6].parse().ok()?;
    let day: u32 = digits[6..8].parse().ok()?;
    let hour: u32 = digits[8..10].parse().ok()?;
    let minute: u32 = digits[10..12].parse().ok()?;
    let second: u32 = digits[12..14].parse().ok()?;

    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;

    let offset = parse_offset_token(offset_token)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a `±HHMM` offset token into a fixed offset
fn parse_offset_token(token: &str) -> Option<FixedOffset> {
    let bytes = token.as_bytes();
    if bytes.len() != 5 || !bytes[1..].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let sign = match bytes[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let hours: i32 = token[1..3].parse().ok()?;
    let minutes: i32 = token[3..5].parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_xmltv_timestamp_utc() {
        let dt = parse_xmltv_timestamp("20231215120000 +0000").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2023, 12, 15, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_xmltv_timestamp_applies_offset() {
        let dt = parse_xmltv_timestamp("20231215120000 +0300").unwrap();
        assert_eq!(dt.hour(), 9);
        let dt = parse_xmltv_timestamp("20231215120000 -0130").unwrap();
        assert_eq!(dt.hour(), 13);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn test_parse_xmltv_timestamp_requires_offset_token() {
        assert!(parse_xmltv_timestamp("20231215120000").is_none());
        assert!(parse_xmltv_timestamp("20231215120000 UTC").is_none());
    }

    #[test]
    fn test_parse_xmltv_timestamp_rejects_invalid_calendar_date() {
        assert!(parse_xmltv_timestamp("20231315120000 +0000").is_none());
        assert!(parse_xmltv_timestamp("20230230120000 +0000").is_none());
        assert!(parse_xmltv_timestamp("20231215250000 +0000").is_none());
    }

    #[test]
    fn test_parse_xmltv_timestamp_rejects_short_values() {
        assert!(parse_xmltv_timestamp("2023121512 +0000").is_none());
        assert!(parse_xmltv_timestamp("").is_none());
    }
}
