use chrono::{DateTime, Duration, Utc};

/// Epoch values above this are milliseconds, anything at or below is seconds.
pub const MILLISECOND_THRESHOLD: f64 = 10_000_000_000.0;
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 60;

/// Decides whether a stored access token must be treated as expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    margin: Duration,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            margin: Duration::seconds(DEFAULT_REFRESH_MARGIN_SECS),
        }
    }
}

impl ExpiryPolicy {
    pub fn with_margin(margin: Duration) -> Self {
        Self { margin }
    }

    pub fn margin(&self) -> Duration {
        self.margin
    }

    pub fn is_expired(&self, expiry_date: Option<f64>) -> bool {
        self.is_expired_at(expiry_date, Utc::now())
    }

    /// An absent expiry never expires; otherwise the token is expired once
    /// `now + margin` has passed its (unit-normalized) expiry.
    pub fn is_expired_at(&self, expiry_date: Option<f64>, now: DateTime<Utc>) -> bool {
        let Some(expiry_date) = expiry_date else {
            return false;
        };
        let expiry_seconds = normalize_epoch_seconds(expiry_date);
        let deadline = (now + self.margin).timestamp_millis() as f64 / 1000.0;
        expiry_seconds < deadline
    }
}

pub fn normalize_epoch_seconds(value: f64) -> f64 {
    if value > MILLISECOND_THRESHOLD {
        value / 1000.0
    } else {
        value
    }
}

pub fn expiry_datetime(expiry_date: f64) -> Option<DateTime<Utc>> {
    if !expiry_date.is_finite() {
        return None;
    }
    let millis = (normalize_epoch_seconds(expiry_date) * 1000.0).round() as i64;
    DateTime::<Utc>::from_timestamp_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch_seconds(date: DateTime<Utc>) -> f64 {
        date.timestamp() as f64
    }

    #[test]
    fn absent_expiry_never_expires() {
        assert!(!ExpiryPolicy::default().is_expired(None));
    }

    #[test]
    fn margin_boundary_treats_near_expiry_as_expired() {
        let policy = ExpiryPolicy::default();
        let now = Utc::now();
        assert!(policy.is_expired_at(Some(epoch_seconds(now + Duration::seconds(30))), now));
        assert!(!policy.is_expired_at(Some(epoch_seconds(now + Duration::seconds(120))), now));
        assert!(policy.is_expired_at(Some(epoch_seconds(now - Duration::hours(1))), now));
    }

    #[test]
    fn seconds_and_milliseconds_agree() {
        let policy = ExpiryPolicy::default();
        let now = Utc::now();
        for offset in [-86_400, -61, -1, 0, 30, 59, 61, 120, 3_600, 86_400 * 30] {
            let seconds = epoch_seconds(now) + offset as f64;
            assert_eq!(
                policy.is_expired_at(Some(seconds), now),
                policy.is_expired_at(Some(seconds * 1000.0), now),
                "offset {} disagreed between units",
                offset
            );
        }
    }

    #[test]
    fn current_wall_clock_respects_margin() {
        let policy = ExpiryPolicy::default();
        let in_thirty = (Utc::now() + Duration::seconds(30)).timestamp_millis() as f64;
        let in_two_minutes = (Utc::now() + Duration::seconds(120)).timestamp_millis() as f64;
        assert!(policy.is_expired(Some(in_thirty)));
        assert!(!policy.is_expired(Some(in_two_minutes)));
    }

    #[test]
    fn custom_margin_moves_the_boundary() {
        let policy = ExpiryPolicy::with_margin(Duration::minutes(5));
        let now = Utc::now();
        assert!(policy.is_expired_at(Some(epoch_seconds(now + Duration::seconds(120))), now));
        assert_eq!(policy.margin(), Duration::minutes(5));
    }

    #[test]
    fn expiry_datetime_normalizes_units() {
        let from_seconds = expiry_datetime(1_800_000_000.0).expect("seconds");
        let from_millis = expiry_datetime(1_800_000_000_000.0).expect("millis");
        assert_eq!(from_seconds, from_millis);
        assert!(expiry_datetime(f64::NAN).is_none());
    }
}
