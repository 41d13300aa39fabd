//! Tolerant date parsing for dates `mail-parser` rejects and for MBOX separators.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Parse an email date string in various common formats.
///
/// Supports RFC 2822, ISO 8601, asctime and a few broken real-world variants.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    let collapsed = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");
    let candidate = replace_named_tz(&strip_day_of_week(&collapsed));

    const FORMATS: [&str; 8] = [
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M:%S",
        "%b %d %H:%M:%S %Y %z",
        "%b %d %H:%M:%S %Y",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
    ];

    for fmt in FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&candidate, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(ndt) = NaiveDateTime::parse_from_str(&candidate, fmt) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }

    None
}

/// Date carried by an MBOX `From ` separator line.
///
/// `From alice@example.com Thu Jan  4 10:00:00 2024` → 2024-01-04T10:00:00Z
pub fn separator_date(line: &str) -> Option<DateTime<Utc>> {
    let rest = line.trim().strip_prefix("From ")?;
    let mut tokens = rest.split_whitespace();
    tokens.next()?; // envelope sender
    let date = tokens.collect::<Vec<_>>().join(" ");
    parse_date(&date)
}

fn strip_day_of_week(s: &str) -> String {
    const DAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    for day in DAYS {
        if let Some(rest) = s.strip_prefix(day) {
            return rest.trim_start_matches(',').trim().to_string();
        }
    }
    s.to_string()
}

fn replace_named_tz(s: &str) -> String {
    const TZS: [(&str, &str); 11] = [
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("CET", "+0100"),
        ("CEST", "+0200"),
        ("AEST", "+1000"),
        ("AEDT", "+1100"),
    ];
    for (name, offset) in TZS {
        if let Some(head) = s.strip_suffix(name) {
            if head.ends_with(' ') {
                return format!("{head}{offset}");
            }
        }
    }
    s.to_string()
}
