//! Expiry arithmetic.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::credential::Credential;

/// Returns true iff `now + within >= credential.expiration()`.
///
/// A zero threshold means "already expired or expiring at this instant".
/// Thresholds too large to represent count as expiring.
pub fn will_expire_within(credential: &Credential, within: Duration, now: DateTime<Utc>) -> bool {
    chrono::Duration::from_std(within)
        .ok()
        .and_then(|within| now.checked_add_signed(within))
        .is_none_or(|deadline| deadline >= credential.expiration())
}

/// Time left before `credential` expires, zero if it already has.
pub fn remaining(credential: &Credential, now: DateTime<Utc>) -> Duration {
    (credential.expiration() - now).to_std().unwrap_or(Duration::ZERO)
}
