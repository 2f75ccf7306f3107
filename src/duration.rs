//! Human-readable durations ("5m", "1h", "1d") for TTL and backoff settings.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{de, Deserialize, Deserializer, Serializer};

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 60 * SECS_PER_MINUTE;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;

/// Parse a duration string such as `"300s"`, `"5m"`, `"1h"` or `"1d"`.
///
/// Input is trimmed and case-insensitive. Only whole, non-negative numbers are accepted.
///
/// ```
/// use portfolio_sync::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
/// assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86_400));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_ascii_lowercase();
    let Some(unit) = s.chars().last() else {
        bail!("Duration is empty");
    };
    let multiplier = match unit {
        'd' => SECS_PER_DAY,
        'h' => SECS_PER_HOUR,
        'm' => SECS_PER_MINUTE,
        's' => 1,
        _ => bail!("Duration must end with d, h, m, or s"),
    };

    let number = &s[..s.len() - 1];
    let value: u64 = number
        .parse()
        .with_context(|| format!("Invalid number in duration: {number:?}"))?;
    let secs = value
        .checked_mul(multiplier)
        .context("Duration is too large")?;

    Ok(Duration::from_secs(secs))
}

/// Format a duration using the largest unit that divides it evenly.
///
/// ```
/// use portfolio_sync::duration::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(3600)), "1h");
/// assert_eq!(format_duration(Duration::from_secs(90)), "90s");
/// ```
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    for (unit, size) in [("d", SECS_PER_DAY), ("h", SECS_PER_HOUR), ("m", SECS_PER_MINUTE)] {
        if secs >= size && secs % size == 0 {
            return format!("{}{unit}", secs / size);
        }
    }
    format!("{secs}s")
}

/// Serde deserializer for duration strings.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(de::Error::custom)
}

/// Serde serializer that writes durations back in the same human form.
pub fn serialize_duration<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[test]
    fn parses_each_unit() {
        assert_eq!(parse_duration("300s").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1H").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration(" 1d ").unwrap(), Duration::from_secs(86_400));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("1w").is_err());
        assert!(parse_duration("-1m").is_err());
        assert!(parse_duration("1.5h").is_err());
        assert!(parse_duration(&format!("{}d", u64::MAX)).is_err());
    }

    #[test]
    fn formats_with_largest_even_unit() {
        assert_eq!(format_duration(Duration::from_secs(86_400)), "1d");
        assert_eq!(format_duration(Duration::from_secs(300)), "5m");
        assert_eq!(format_duration(Duration::from_secs(3700)), "3700s");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn serde_helpers_use_human_form() {
        #[derive(Serialize, Deserialize)]
        struct Ttl {
            #[serde(
                serialize_with = "serialize_duration",
                deserialize_with = "deserialize_duration"
            )]
            ttl: Duration,
        }

        let parsed: Ttl = toml::from_str(r#"ttl = "1h""#).unwrap();
        assert_eq!(parsed.ttl, Duration::from_secs(3600));
        assert_eq!(toml::to_string(&parsed).unwrap().trim(), r#"ttl = "1h""#);
    }
}
