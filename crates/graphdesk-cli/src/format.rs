use chrono::{DateTime, Local, NaiveDateTime, Utc};

/// Input formats accepted for event start/end times
const DATE_TIME_INPUT_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"];

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format an optional string, returning a default if None
pub fn format_optional(value: Option<&str>, default: &str) -> String {
    value.filter(|v| !v.is_empty()).unwrap_or(default).to_string()
}

/// Show a received timestamp in the user's local time
pub fn format_received(received: Option<DateTime<Utc>>) -> String {
    match received {
        Some(dt) => dt.with_timezone(&Local).format("%b %d, %Y %H:%M").to_string(),
        None => "-".to_string(),
    }
}

/// Parse a wall-clock time given on the command line
pub fn parse_date_time(input: &str) -> Result<NaiveDateTime, String> {
    let input = input.trim();
    DATE_TIME_INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .ok_or_else(|| format!("invalid date/time '{}', expected e.g. 2024-05-02T12:00", input))
}

/// Split `address[:Display Name]`
pub fn parse_attendee(input: &str) -> (String, Option<String>) {
    match input.split_once(':') {
        Some((address, name)) if !name.trim().is_empty() => {
            (address.trim().to_string(), Some(name.trim().to_string()))
        }
        Some((address, _)) => (address.trim().to_string(), None),
        None => (input.trim().to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("Hello", 10), "Hello");
        assert_eq!(truncate_string("Hello World", 8), "Hello...");
        assert_eq!(truncate_string("Hi", 2), "Hi");
        assert_eq!(truncate_string("Grüße aus Köln", 6), "Grü...");
    }

    #[test]
    fn test_format_optional() {
        assert_eq!(format_optional(Some("Quarterly"), "(no subject)"), "Quarterly");
        assert_eq!(format_optional(Some(""), "(no subject)"), "(no subject)");
        assert_eq!(format_optional(None, "(no subject)"), "(no subject)");
    }

    #[test]
    fn test_format_received_missing() {
        assert_eq!(format_received(None), "-");
    }

    #[test]
    fn test_parse_date_time_formats() {
        let with_seconds = parse_date_time("2024-05-02T12:00:30").unwrap();
        assert_eq!(with_seconds.second(), 30);
        assert_eq!(parse_date_time("2024-05-02T12:00").unwrap().hour(), 12);
        assert_eq!(parse_date_time(" 2024-05-02 14:15 ").unwrap().minute(), 15);
        assert!(parse_date_time("tomorrow at noon").is_err());
    }

    #[test]
    fn test_parse_attendee() {
        assert_eq!(
            parse_attendee("samanthab@contoso.com:Samantha Booth"),
            ("samanthab@contoso.com".to_string(), Some("Samantha Booth".to_string()))
        );
        assert_eq!(parse_attendee("adelev@contoso.com"), ("adelev@contoso.com".to_string(), None));
        assert_eq!(parse_attendee("adelev@contoso.com:"), ("adelev@contoso.com".to_string(), None));
    }
}
