//! Timecode parsing and formatting.
//!
//! Scene timestamps come from several collaborators and are not always well
//! formed, so parsing accepts `HH:MM:SS`, `MM:SS`, bare seconds, an optional
//! decimal fraction on the last field, and `;` typed in place of `:`.

/// Format seconds as an `HH:MM:SS` timecode.
///
/// Fractions are floored. Hours are not wrapped, so long inputs produce
/// three-digit hour fields. Negative and non-finite inputs format as zero.
///
/// # Examples
/// ```
/// use vidmeta_models::timestamp::seconds_to_timecode;
/// assert_eq!(seconds_to_timecode(83.9), "00:01:23");
/// assert_eq!(seconds_to_timecode(3661.0), "01:01:01");
/// ```
pub fn seconds_to_timecode(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };

    let hours = total / 3600;
    let mins = (total % 3600) / 60;
    let secs = total % 60;
    format!("{:02}:{:02}:{:02}", hours, mins, secs)
}

/// Parse a timecode into total seconds.
///
/// Supports formats:
/// - `HH:MM:SS` or `HH:MM:SS.mmm`
/// - `MM:SS` or `MM:SS.mmm`
/// - `SS` or `SS.mmm`
///
/// A `;` is read as `:`. Empty higher fields count as zero, but at least one
/// field must carry digits.
///
/// Digits after the `.` are a decimal fraction of a second, not a millisecond
/// count: `30.5` and `30.500` are both 30.5 seconds, and `30.005` is five
/// milliseconds past 30.
///
/// # Examples
/// ```
/// use vidmeta_models::timestamp::timecode_to_seconds;
/// assert_eq!(timecode_to_seconds("01:30:00").unwrap(), 5400.0);
/// assert_eq!(timecode_to_seconds("1;23").unwrap(), 83.0);
/// assert_eq!(timecode_to_seconds("90").unwrap(), 90.0);
/// ```
pub fn timecode_to_seconds(text: &str) -> Result<f64, TimestampError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(TimestampError::Empty);
    }

    let normalized = trimmed.replace(';', ":");
    let parts: Vec<&str> = normalized.split(':').collect();
    if parts.len() > 3 {
        return Err(TimestampError::InvalidFormat(trimmed.to_string()));
    }

    let Some((last, higher)) = parts.split_last() else {
        return Err(TimestampError::Empty);
    };

    let mut found_digits = false;
    let mut total = match parse_seconds_field(last)? {
        Some(secs) => {
            found_digits = true;
            secs
        }
        None => 0.0,
    };

    // Walk minutes then hours.
    const NAMES: [&str; 2] = ["minutes", "hours"];
    for (idx, part) in higher.iter().rev().enumerate() {
        if let Some(value) = parse_whole_field(NAMES[idx], part)? {
            found_digits = true;
            total += value * 60f64.powi(idx as i32 + 1);
        }
    }

    if !found_digits {
        return Err(TimestampError::NoNumericComponent(trimmed.to_string()));
    }
    Ok(total)
}

fn parse_whole_field(name: &'static str, field: &str) -> Result<Option<f64>, TimestampError> {
    let field = field.trim();
    if field.is_empty() {
        return Ok(None);
    }
    if let Some(rest) = field.strip_prefix('-') {
        if is_digits(rest) {
            return Err(TimestampError::Negative(field.to_string()));
        }
    }
    if !is_digits(field) {
        return Err(TimestampError::InvalidValue(name, field.to_string()));
    }
    field
        .parse::<u64>()
        .map(|v| Some(v as f64))
        .map_err(|_| TimestampError::InvalidValue(name, field.to_string()))
}

fn parse_seconds_field(field: &str) -> Result<Option<f64>, TimestampError> {
    let field = field.trim();
    let Some((whole, fraction)) = field.split_once('.') else {
        return parse_whole_field("seconds", field);
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(TimestampError::InvalidValue("seconds", field.to_string()));
    }
    if !fraction.is_empty() && !is_digits(fraction) {
        return Err(TimestampError::InvalidValue("seconds", field.to_string()));
    }

    let whole = parse_whole_field("seconds", whole)?.unwrap_or(0.0);
    let fraction = if fraction.is_empty() {
        0.0
    } else {
        format!("0.{}", fraction)
            .parse::<f64>()
            .map_err(|_| TimestampError::InvalidValue("seconds", field.to_string()))?
    };
    Ok(Some(whole + fraction))
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Timecode parsing error.
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampError {
    /// Timecode string is empty
    Empty,
    /// Timecode contains a negative field
    Negative(String),
    /// Invalid numeric value for a field
    InvalidValue(&'static str, String),
    /// More fields than `HH:MM:SS`
    InvalidFormat(String),
    /// Only separators, no digits
    NoNumericComponent(String),
}

impl std::fmt::Display for TimestampError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Timecode cannot be empty"),
            Self::Negative(value) => write!(f, "Timecode cannot be negative: {}", value),
            Self::InvalidValue(component, value) => {
                write!(f, "Invalid {} value: {}", component, value)
            }
            Self::InvalidFormat(ts) => write!(
                f,
                "Invalid timecode format '{}'. Use HH:MM:SS, MM:SS, or SS (optionally with .mmm)",
                ts
            ),
            Self::NoNumericComponent(ts) => {
                write!(f, "Timecode '{}' has no numeric component", ts)
            }
        }
    }
}

impl std::error::Error for TimestampError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hh_mm_ss() {
        assert_eq!(timecode_to_seconds("00:00:00").unwrap(), 0.0);
        assert_eq!(timecode_to_seconds("00:01:00").unwrap(), 60.0);
        assert_eq!(timecode_to_seconds("01:00:00").unwrap(), 3600.0);
        assert_eq!(timecode_to_seconds("01:30:45").unwrap(), 5445.0);
    }

    #[test]
    fn test_parse_mm_ss_and_bare_seconds() {
        assert_eq!(timecode_to_seconds("05:30").unwrap(), 330.0);
        assert_eq!(timecode_to_seconds("90").unwrap(), 90.0);
        assert_eq!(timecode_to_seconds(" 7 ").unwrap(), 7.0);
    }

    #[test]
    fn test_parse_fraction() {
        let result = timecode_to_seconds("00:00:30.500").unwrap();
        assert!((result - 30.5).abs() < 1e-9);
        let result = timecode_to_seconds("12.25").unwrap();
        assert!((result - 12.25).abs() < 1e-9);
        let result = timecode_to_seconds("01:02.5").unwrap();
        assert!((result - 62.5).abs() < 1e-9);
    }

    #[test]
    fn test_fraction_is_decimal_not_millisecond_count() {
        let half = timecode_to_seconds("00:00:30.5").unwrap();
        assert!((half - 30.5).abs() < 1e-9);
        let five_ms = timecode_to_seconds("00:00:30.005").unwrap();
        assert!((five_ms - 30.005).abs() < 1e-9);
        assert_eq!(
            timecode_to_seconds("00:00:30.5").unwrap(),
            timecode_to_seconds("00:00:30.500").unwrap()
        );
    }

    #[test]
    fn test_semicolon_is_read_as_colon() {
        assert_eq!(timecode_to_seconds("1;23").unwrap(), 83.0);
        assert_eq!(timecode_to_seconds("00;01;05").unwrap(), 65.0);
    }

    #[test]
    fn test_missing_higher_fields_default_to_zero() {
        assert_eq!(timecode_to_seconds(":30").unwrap(), 30.0);
        assert_eq!(timecode_to_seconds("::5").unwrap(), 5.0);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(timecode_to_seconds(""), Err(TimestampError::Empty)));
        assert!(matches!(timecode_to_seconds("  "), Err(TimestampError::Empty)));
        assert!(matches!(
            timecode_to_seconds("abc"),
            Err(TimestampError::InvalidValue(_, _))
        ));
        assert!(matches!(
            timecode_to_seconds("1:2:3:4"),
            Err(TimestampError::InvalidFormat(_))
        ));
        assert!(matches!(
            timecode_to_seconds("::"),
            Err(TimestampError::NoNumericComponent(_))
        ));
        assert!(matches!(
            timecode_to_seconds("-5"),
            Err(TimestampError::Negative(_))
        ));
        assert!(timecode_to_seconds("inf").is_err());
        assert!(timecode_to_seconds("1e3").is_err());
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(seconds_to_timecode(0.0), "00:00:00");
        assert_eq!(seconds_to_timecode(90.0), "00:01:30");
        assert_eq!(seconds_to_timecode(59.999), "00:00:59");
        assert_eq!(seconds_to_timecode(3661.0), "01:01:01");
        assert_eq!(seconds_to_timecode(360_000.0), "100:00:00");
        assert_eq!(seconds_to_timecode(-4.0), "00:00:00");
        assert_eq!(seconds_to_timecode(f64::NAN), "00:00:00");
    }

    #[test]
    fn test_whole_second_round_trip() {
        for x in [0.0, 0.4, 5.0, 59.9, 61.5, 3599.99, 3600.0, 86_399.7, 400_000.2] {
            let back = timecode_to_seconds(&seconds_to_timecode(x)).unwrap();
            assert_eq!(back, x.floor(), "round trip for {}", x);
        }
    }
}
