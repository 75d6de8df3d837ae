//! Relative date intervals used by the `less_than` / `greater_than` predicates.
//!
//! Accepted forms are `"<N> days"` and `"<N> months"`. A month is 30 days.
//! Any other unit parses into [`Interval::Unsupported`], which never matches.

use chrono::{DateTime, TimeDelta, Utc};

/// Days counted per month.
pub const DAYS_PER_MONTH: i64 = 30;

/// A parsed `"<N> <unit>"` interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interval {
    Days(u32),
    Months(u32),
    /// Well-formed amount with a unit we do not evaluate (e.g. `"1 weeks"`).
    Unsupported { amount: u32, unit: String },
}

impl Interval {
    /// Parse an interval string.
    ///
    /// Fails only when the value does not have the `<number> <unit>` shape;
    /// unknown units are accepted and become [`Interval::Unsupported`].
    pub fn parse(value: &str) -> Result<Self, String> {
        let mut parts = value.split_whitespace();
        let (Some(amount), Some(unit)) = (parts.next(), parts.next()) else {
            return Err(format!(
                "expected '<number> days' or '<number> months', got '{value}'"
            ));
        };
        let amount: u32 = amount
            .parse()
            .map_err(|_| format!("'{amount}' is not a non-negative whole number"))?;

        Ok(match unit {
            "days" => Self::Days(amount),
            "months" => Self::Months(amount),
            other => Self::Unsupported {
                amount,
                unit: other.to_string(),
            },
        })
    }

    /// Length of the interval in days, or `None` for unsupported units.
    pub fn days(&self) -> Option<i64> {
        match self {
            Self::Days(n) => Some(i64::from(*n)),
            Self::Months(n) => Some(i64::from(*n) * DAYS_PER_MONTH),
            Self::Unsupported { .. } => None,
        }
    }

    /// `now` minus the interval, or `None` for unsupported units.
    ///
    /// Intervals reaching past the representable range clamp to the earliest
    /// representable instant.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let days = self.days()?;
        Some(
            TimeDelta::try_days(days)
                .and_then(|delta| now.checked_sub_signed(delta))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        )
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Days(n) => write!(f, "{n} days"),
            Self::Months(n) => write!(f, "{n} months"),
            Self::Unsupported { amount, unit } => write!(f, "{amount} {unit}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_days_and_months() {
        assert_eq!(Interval::parse("1 days").unwrap(), Interval::Days(1));
        assert_eq!(Interval::parse("  3   months ").unwrap(), Interval::Months(3));
    }

    #[test]
    fn test_parse_unknown_unit_is_unsupported() {
        let i = Interval::parse("1 weeks").unwrap();
        assert!(matches!(i, Interval::Unsupported { amount: 1, .. }));
        assert_eq!(i.days(), None);
        assert_eq!(i.cutoff(Utc::now()), None);
    }

    #[test]
    fn test_parse_rejects_bad_shape() {
        assert!(Interval::parse("").is_err());
        assert!(Interval::parse("7").is_err());
        assert!(Interval::parse("seven days").is_err());
        assert!(Interval::parse("-1 days").is_err());
    }

    #[test]
    fn test_months_are_thirty_days() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap();
        let cutoff = Interval::Months(1).cutoff(now).unwrap();
        assert_eq!(cutoff, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_huge_interval_clamps() {
        let cutoff = Interval::Months(u32::MAX).cutoff(Utc::now()).unwrap();
        assert_eq!(cutoff, DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_display() {
        assert_eq!(Interval::Days(2).to_string(), "2 days");
        assert_eq!(Interval::parse("4 weeks").unwrap().to_string(), "4 weeks");
    }
}
