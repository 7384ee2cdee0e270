use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use crate::ValidationError;

const MILLIS_PER_MINUTE: i128 = 60_000;
const MILLIS_PER_HOUR: i128 = 3_600_000;
const MILLIS_PER_DAY: i128 = 86_400_000;

/// RFC3339 timestamp guaranteed to be UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let parsed = OffsetDateTime::parse(input, &Rfc3339).map_err(|_| {
            ValidationError::TimestampNotUtc {
                value: input.to_owned(),
            }
        })?;

        Self::from_offset_datetime(parsed).map_err(|_| ValidationError::TimestampNotUtc {
            value: input.to_owned(),
        })
    }

    pub fn from_offset_datetime(value: OffsetDateTime) -> Result<Self, ValidationError> {
        if value.offset() != UtcOffset::UTC {
            return Err(ValidationError::TimestampNotUtc {
                value: value
                    .format(&Rfc3339)
                    .unwrap_or_else(|_| String::from("<unformattable>")),
            });
        }

        Ok(Self(value))
    }

    pub fn into_inner(self) -> OffsetDateTime {
        self.0
    }

    pub fn format_rfc3339(self) -> String {
        self.0
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.0.unix_timestamp().to_string())
    }

    /// Milliseconds since the unix epoch.
    pub fn unix_millis(self) -> i128 {
        self.0.unix_timestamp_nanos() / 1_000_000
    }

    /// Hours elapsed since the unix epoch, used to rotate batches.
    pub fn hour_index(self) -> u64 {
        let hours = self.unix_millis().div_euclid(MILLIS_PER_HOUR);
        u64::try_from(hours).unwrap_or(0)
    }

    /// Position inside the current UTC hour.
    pub fn millis_into_hour(self) -> u64 {
        self.unix_millis().rem_euclid(MILLIS_PER_HOUR) as u64
    }

    /// Adds a duration, saturating at the representable maximum.
    pub fn saturating_add(self, duration: Duration) -> Self {
        time::Duration::try_from(duration)
            .ok()
            .and_then(|delta| self.0.checked_add(delta))
            .map(Self)
            .unwrap_or(self)
    }

    /// Time elapsed from `earlier` to `self`, zero when `earlier` is in the future.
    pub fn duration_since(self, earlier: Self) -> Duration {
        let delta = self.0 - earlier.0;
        if delta.is_negative() {
            return Duration::ZERO;
        }
        Duration::try_from(delta).unwrap_or(Duration::ZERO)
    }

    /// Start of the next UTC minute.
    pub fn next_minute_boundary(self) -> Self {
        self.next_boundary(MILLIS_PER_MINUTE)
    }

    /// Next UTC midnight.
    pub fn next_day_boundary(self) -> Self {
        self.next_boundary(MILLIS_PER_DAY)
    }

    fn next_boundary(self, period_ms: i128) -> Self {
        let next = (self.unix_millis().div_euclid(period_ms) + 1) * period_ms;
        OffsetDateTime::from_unix_timestamp_nanos(next * 1_000_000)
            .map(Self)
            .unwrap_or(self)
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl Serialize for UtcDateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format_rfc3339())
    }
}

impl<'de> Deserialize<'de> for UtcDateTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(input: &str) -> UtcDateTime {
        UtcDateTime::parse(input).expect("must parse")
    }

    #[test]
    fn parses_utc_timestamp() {
        let parsed = ts("2024-01-01T00:00:00Z");
        assert_eq!(parsed.format_rfc3339(), "2024-01-01T00:00:00Z");
    }

    #[test]
    fn rejects_non_utc_timestamp() {
        let err = UtcDateTime::parse("2024-01-01T01:00:00+01:00").expect_err("must fail");
        assert!(matches!(err, ValidationError::TimestampNotUtc { .. }));
    }

    #[test]
    fn boundaries_align_to_utc_minute_and_midnight() {
        let value = ts("2024-03-10T13:45:12.500Z");

        assert_eq!(value.next_minute_boundary(), ts("2024-03-10T13:46:00Z"));
        assert_eq!(value.next_day_boundary(), ts("2024-03-11T00:00:00Z"));
        assert_eq!(value.millis_into_hour(), 45 * 60_000 + 12_500);
    }

    #[test]
    fn duration_since_saturates_at_zero() {
        let earlier = ts("2024-01-01T00:00:00Z");
        let later = earlier.saturating_add(Duration::from_millis(1_500));

        assert_eq!(later.duration_since(earlier), Duration::from_millis(1_500));
        assert_eq!(earlier.duration_since(later), Duration::ZERO);
    }
}
