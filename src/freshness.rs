//! Freshness classes, their TTLs, and staleness checks.
//!
//! Every cache in the crate asks a [`FreshnessPolicy`] whether a value is still usable
//! instead of hard-coding durations.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::duration::format_duration;

pub const QUOTE_TTL: Duration = Duration::from_secs(300);
pub const FX_TTL: Duration = Duration::from_secs(300);
pub const HISTORICAL_SERIES_TTL: Duration = Duration::from_secs(3600);
pub const FUNDAMENTALS_TTL: Duration = Duration::from_secs(86_400);

/// Kind of upstream data, each with its own time-to-live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataClass {
    Quote,
    Fx,
    HistoricalSeries,
    Fundamentals,
}

impl DataClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataClass::Quote => "quote",
            DataClass::Fx => "fx",
            DataClass::HistoricalSeries => "historical_series",
            DataClass::Fundamentals => "fundamentals",
        }
    }
}

impl fmt::Display for DataClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TTL table for every [`DataClass`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub quote: Duration,
    pub fx: Duration,
    pub historical_series: Duration,
    pub fundamentals: Duration,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            quote: QUOTE_TTL,
            fx: FX_TTL,
            historical_series: HISTORICAL_SERIES_TTL,
            fundamentals: FUNDAMENTALS_TTL,
        }
    }
}

impl FreshnessPolicy {
    pub fn ttl(&self, class: DataClass) -> Duration {
        match class {
            DataClass::Quote => self.quote,
            DataClass::Fx => self.fx,
            DataClass::HistoricalSeries => self.historical_series,
            DataClass::Fundamentals => self.fundamentals,
        }
    }

    /// `now - last_fetched_at >= ttl`. Never-fetched data is always stale.
    pub fn is_stale(
        &self,
        last_fetched_at: Option<DateTime<Utc>>,
        class: DataClass,
        now: DateTime<Utc>,
    ) -> bool {
        self.check(last_fetched_at, class, now).is_stale
    }

    pub fn check(
        &self,
        last_fetched_at: Option<DateTime<Utc>>,
        class: DataClass,
        now: DateTime<Utc>,
    ) -> StalenessCheck {
        let threshold = self.ttl(class);
        match last_fetched_at {
            Some(at) => {
                // A timestamp in the future counts as age zero.
                let age = (now - at).to_std().unwrap_or(Duration::ZERO);
                if age >= threshold {
                    StalenessCheck::stale(age, threshold)
                } else {
                    StalenessCheck::fresh(age, threshold)
                }
            }
            None => StalenessCheck::missing(threshold),
        }
    }
}

/// Result of a staleness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalenessCheck {
    pub is_stale: bool,
    pub age: Option<Duration>,
    pub threshold: Duration,
}

impl StalenessCheck {
    pub fn stale(age: Duration, threshold: Duration) -> Self {
        Self {
            is_stale: true,
            age: Some(age),
            threshold,
        }
    }

    pub fn fresh(age: Duration, threshold: Duration) -> Self {
        Self {
            is_stale: false,
            age: Some(age),
            threshold,
        }
    }

    pub fn missing(threshold: Duration) -> Self {
        Self {
            is_stale: true,
            age: None,
            threshold,
        }
    }
}

/// Log a staleness decision for one key of one data class.
pub fn log_staleness(class: DataClass, key: &str, check: &StalenessCheck) {
    let status = if check.is_stale { "stale" } else { "fresh" };
    let age = check
        .age
        .map(format_duration)
        .unwrap_or_else(|| "never".to_string());

    debug!(
        class = %class,
        key = key,
        age = %age,
        threshold = %format_duration(check.threshold),
        status = status,
        "freshness check"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    #[test]
    fn default_ttls() {
        let policy = FreshnessPolicy::default();
        assert_eq!(policy.ttl(DataClass::Quote), Duration::from_secs(300));
        assert_eq!(policy.ttl(DataClass::Fx), Duration::from_secs(300));
        assert_eq!(policy.ttl(DataClass::HistoricalSeries), Duration::from_secs(3600));
        assert_eq!(policy.ttl(DataClass::Fundamentals), Duration::from_secs(86_400));
    }

    #[test]
    fn never_fetched_is_stale() {
        let check = FreshnessPolicy::default().check(None, DataClass::Quote, now());
        assert!(check.is_stale);
        assert!(check.age.is_none());
    }

    #[test]
    fn stale_exactly_at_ttl() {
        let policy = FreshnessPolicy::default();
        let at = now() - chrono::Duration::seconds(300);
        assert!(policy.is_stale(Some(at), DataClass::Quote, now()));

        let just_inside = now() - chrono::Duration::seconds(299);
        assert!(!policy.is_stale(Some(just_inside), DataClass::Quote, now()));
    }

    #[test]
    fn fundamentals_use_their_own_ttl() {
        let policy = FreshnessPolicy::default();
        let at = now() - chrono::Duration::hours(23);
        assert!(!policy.is_stale(Some(at), DataClass::Fundamentals, now()));
        assert!(policy.is_stale(Some(at), DataClass::HistoricalSeries, now()));
    }

    #[test]
    fn future_timestamp_is_fresh() {
        let policy = FreshnessPolicy::default();
        let at = now() + chrono::Duration::seconds(30);
        let check = policy.check(Some(at), DataClass::Fx, now());
        assert!(!check.is_stale);
        assert_eq!(check.age, Some(Duration::ZERO));
    }
}
