//! Expiry check with clock-skew tolerance.
//!
//! The check is a pure function of an injected `now`, so boundaries can be
//! tested exactly. It answers a yes/no question; callers decide what an
//! expired token means for them.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Default tolerance for clock drift between the provider and this host.
pub const DEFAULT_SKEW: Duration = Duration::from_secs(1);

/// Returns `true` iff `now` is strictly before `exp + skew`.
///
/// - `now == exp` with zero skew is expired
/// - `now == exp` with any positive skew is still valid
/// - an `exp` outside the representable date range is expired
/// - a deadline that overflows once skew is added is valid
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use chrono::DateTime;
/// use oidc_jwkset::expiry::is_valid;
///
/// let now = DateTime::from_timestamp(1_000, 0).unwrap();
/// assert!(!is_valid(now, Duration::ZERO, 1_000));
/// assert!(is_valid(now, Duration::from_secs(1), 1_000));
/// ```
#[must_use]
pub fn is_valid(now: DateTime<Utc>, skew: Duration, exp: i64) -> bool {
    let Some(expiry) = DateTime::from_timestamp(exp, 0) else {
        return false;
    };
    let Ok(skew) = TimeDelta::from_std(skew) else {
        return true;
    };
    match expiry.checked_add_signed(skew) {
        Some(deadline) => now < deadline,
        None => true,
    }
}

/// [`is_valid`] against the system clock.
#[must_use]
pub fn is_valid_now(skew: Duration, exp: i64) -> bool {
    is_valid(Utc::now(), skew, exp)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[rstest]
    #[case::equal_no_skew(1_000, 0, 1_000, false)]
    #[case::one_before_no_skew(999, 0, 1_000, true)]
    #[case::after_no_skew(1_001, 0, 1_000, false)]
    #[case::equal_with_skew(1_000, 1, 1_000, true)]
    #[case::inside_skew(1_004, 5, 1_000, true)]
    #[case::at_skew_boundary(1_005, 5, 1_000, false)]
    fn test_is_valid(#[case] now: i64, #[case] skew: u64, #[case] exp: i64, #[case] valid: bool) {
        assert_eq!(is_valid(at(now), Duration::from_secs(skew), exp), valid);
    }

    #[test]
    fn test_sub_second_precision() {
        let now = DateTime::from_timestamp(999, 999_000_000).unwrap();
        assert!(is_valid(now, Duration::ZERO, 1_000));

        let now = DateTime::from_timestamp(1_000, 1).unwrap();
        assert!(is_valid(now, Duration::from_millis(1), 1_000));
        assert!(!is_valid(now, Duration::ZERO, 1_000));
    }

    #[test]
    fn test_unrepresentable_expiry_is_expired() {
        assert!(!is_valid(Utc::now(), DEFAULT_SKEW, i64::MAX));
    }

    #[test]
    fn test_overflowing_skew_is_valid() {
        assert!(is_valid(Utc::now(), Duration::MAX, 0));
    }

    #[test]
    fn test_is_valid_now() {
        let now = Utc::now().timestamp();
        assert!(is_valid_now(DEFAULT_SKEW, now + 60));
        assert!(!is_valid_now(Duration::ZERO, now - 60));
    }
}
