//! [`GenTime`]: a UTC instant bounded to sane TSA generation times.
//!
//! Seconds-since-epoch, stringified in JSON to dodge JS `Number` precision
//! loss, extended with the bounds `TSTInfo.gen_time` must satisfy: not
//! before year 2000, not more than one hour past "now" (clock-skew
//! tolerance).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::time::SystemTime;

/// Unix seconds marking 2000-01-01T00:00:00Z, the lower bound for any
/// `gen_time` this mediator will accept.
pub const YEAR_2000_UNIX_SECS: u64 = 946_684_800;

/// Clock-skew tolerance: a token's `gen_time` may be at most this far in
/// the future relative to the validator's "now".
pub const MAX_FUTURE_SKEW_SECS: u64 = 3600;

/// A UTC instant, seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq)]
pub struct GenTime(u64);

impl Serialize for GenTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for GenTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let secs = s
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom("gen_time must be a non-negative integer"))?;
        Ok(GenTime(secs))
    }
}

impl Display for GenTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl GenTime {
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_secs();
        Self(now)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Checks `[year 2000, reference + 1h]` (§4.5 check 6, §8 boundary
    /// behavior: exactly `now + 3600` is accepted, `now + 3601` is not).
    pub fn in_bounds_relative_to(&self, reference: GenTime) -> bool {
        self.0 >= YEAR_2000_UNIX_SECS && self.0 <= reference.0.saturating_add(MAX_FUTURE_SKEW_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_exactly_one_hour_future_is_accepted() {
        let reference = GenTime::from_secs(1_000_000);
        let exactly = GenTime::from_secs(1_000_000 + MAX_FUTURE_SKEW_SECS);
        let one_over = GenTime::from_secs(1_000_000 + MAX_FUTURE_SKEW_SECS + 1);
        assert!(exactly.in_bounds_relative_to(reference));
        assert!(!one_over.in_bounds_relative_to(reference));
    }

    #[test]
    fn before_year_2000_is_rejected() {
        let reference = GenTime::now();
        let too_old = GenTime::from_secs(YEAR_2000_UNIX_SECS - 1);
        assert!(!too_old.in_bounds_relative_to(reference));
        let exactly_2000 = GenTime::from_secs(YEAR_2000_UNIX_SECS);
        assert!(exactly_2000.in_bounds_relative_to(reference));
    }
}
