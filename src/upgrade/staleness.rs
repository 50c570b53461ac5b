//! Decides whether a release check is due.

use chrono::{DateTime, Utc};

/// Returns `true` if a release check should run now.
///
/// Due when any of the following holds:
/// - `force` is set
/// - there is no recorded check
/// - the installed binary speaks a different protocol than required
/// - at least `threshold_days` whole calendar days passed since `last_checked_at`
pub fn is_check_due(
    last_checked_at: Option<DateTime<Utc>>,
    threshold_days: u32,
    protocol_mismatch: bool,
    force: bool,
) -> bool {
    is_check_due_at(Utc::now(), last_checked_at, threshold_days, protocol_mismatch, force)
}

/// [`is_check_due`] evaluated against an explicit clock.
pub fn is_check_due_at(
    now: DateTime<Utc>,
    last_checked_at: Option<DateTime<Utc>>,
    threshold_days: u32,
    protocol_mismatch: bool,
    force: bool,
) -> bool {
    if force || protocol_mismatch {
        return true;
    }
    let Some(last) = last_checked_at else {
        return true;
    };

    // Calendar dates, so a check late yesterday counts as one day ago.
    let elapsed = now.date_naive().signed_duration_since(last.date_naive()).num_days();
    elapsed >= i64::from(threshold_days)
}

/// Whole calendar days since `last_checked_at`, if any check was recorded.
pub fn days_since(now: DateTime<Utc>, last_checked_at: Option<DateTime<Utc>>) -> Option<i64> {
    last_checked_at.map(|last| now.date_naive().signed_duration_since(last.date_naive()).num_days())
}
