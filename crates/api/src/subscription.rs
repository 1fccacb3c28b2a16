//! Subscription window and access gating.
//!
//! A dentist starts on a free trial. Every captured payment pushes the expiry
//! forward by one renewal period. Once `expires_at` has passed the account is
//! expired, whether or not the background sweeper has persisted that yet.
//!
//! ```text
//! register ──▶ Trial ──capture──▶ Active ──capture──▶ Active
//!                │                  │
//!                └──── expiry ──────┴──▶ Expired ──capture──▶ Active
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{ServiceError, SubscriptionResponse};

/// Length of the free trial granted at registration.
pub const TRIAL_DAYS: i64 = 30;

/// Length of the window bought by one captured payment.
pub const RENEWAL_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Active => "active",
            Self::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "trial" => Some(Self::Trial),
            "active" => Some(Self::Active),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored subscription state of one dentist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    pub status: SubscriptionStatus,
    pub expires_at: DateTime<Utc>,
}

impl Subscription {
    /// Free trial starting at `now`.
    pub fn start_trial(now: DateTime<Utc>) -> Self {
        Self {
            status: SubscriptionStatus::Trial,
            expires_at: now + Duration::days(TRIAL_DAYS),
        }
    }

    /// Status after applying the clock: anything past its expiry is `Expired`.
    pub fn effective_status(&self, now: DateTime<Utc>) -> SubscriptionStatus {
        if now < self.expires_at {
            self.status
        } else {
            SubscriptionStatus::Expired
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.effective_status(now) != SubscriptionStatus::Expired
    }

    /// Apply one captured payment.
    ///
    /// Time left on a running window is kept; a lapsed window restarts at `now`.
    pub fn extend(&self, now: DateTime<Utc>) -> Self {
        let base = self.expires_at.max(now);
        Self {
            status: SubscriptionStatus::Active,
            expires_at: base + Duration::days(RENEWAL_DAYS),
        }
    }

    /// Whole days left in the window, 0 once expired.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        if now >= self.expires_at {
            return 0;
        }
        (self.expires_at - now).num_days()
    }

    /// Whether the sweeper should persist this row as expired.
    pub fn needs_deactivation(&self, now: DateTime<Utc>) -> bool {
        self.status != SubscriptionStatus::Expired && now >= self.expires_at
    }

    pub fn to_response(&self, now: DateTime<Utc>) -> SubscriptionResponse {
        SubscriptionResponse {
            status: self.effective_status(now),
            active: self.is_active(now),
            expires_at: crate::format_datetime(self.expires_at),
            days_remaining: self.days_remaining(now),
        }
    }
}

/// Gate for everything except auth and billing.
pub fn require_active(sub: &Subscription, now: DateTime<Utc>) -> Result<(), ServiceError> {
    if sub.is_active(now) {
        Ok(())
    } else {
        Err(ServiceError::PaymentRequired(
            "subscription expired; capture a payment to continue".into(),
        ))
    }
}

/// Check what a gateway reported as captured against the subscription price.
pub fn check_capture(
    amount_cents: i64,
    currency: &str,
    price_cents: i64,
    expected_currency: &str,
) -> Result<(), ServiceError> {
    if !currency.eq_ignore_ascii_case(expected_currency) {
        return Err(ServiceError::BadRequest(format!(
            "payment currency {currency} does not match {expected_currency}"
        )));
    }
    if amount_cents < price_cents {
        return Err(ServiceError::BadRequest(format!(
            "captured amount {amount_cents} is below the subscription price {price_cents}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn trial_lasts_thirty_days() {
        let sub = Subscription::start_trial(at(1));
        assert_eq!(sub.status, SubscriptionStatus::Trial);
        assert_eq!(sub.expires_at, at(1) + Duration::days(30));
        assert!(sub.is_active(at(1)));
        assert_eq!(sub.days_remaining(at(1)), 30);
        assert!(sub.is_active(sub.expires_at - Duration::seconds(1)));
        assert!(!sub.is_active(sub.expires_at));
    }

    #[test]
    fn expiry_wins_over_stored_status() {
        let sub = Subscription {
            status: SubscriptionStatus::Active,
            expires_at: at(10),
        };
        assert_eq!(sub.effective_status(at(9)), SubscriptionStatus::Active);
        assert_eq!(sub.effective_status(at(10)), SubscriptionStatus::Expired);
        assert_eq!(sub.days_remaining(at(11)), 0);
        assert!(sub.needs_deactivation(at(11)));
        assert!(!sub.needs_deactivation(at(9)));
    }

    #[test]
    fn early_renewal_stacks_on_remaining_time() {
        let sub = Subscription::start_trial(at(1));
        let renewed = sub.extend(at(20));
        assert_eq!(renewed.status, SubscriptionStatus::Active);
        assert_eq!(renewed.expires_at, sub.expires_at + Duration::days(30));
    }

    #[test]
    fn lapsed_renewal_starts_from_now() {
        let sub = Subscription {
            status: SubscriptionStatus::Expired,
            expires_at: at(1),
        };
        let renewed = sub.extend(at(15));
        assert_eq!(renewed.expires_at, at(15) + Duration::days(30));
        assert!(renewed.is_active(at(15)));
        assert!(!sub.needs_deactivation(at(15)));
    }

    #[test]
    fn require_active_maps_to_payment_required() {
        let sub = Subscription::start_trial(at(1));
        assert!(require_active(&sub, at(2)).is_ok());
        let err = require_active(&sub, at(1) + Duration::days(31)).unwrap_err();
        assert_eq!(err.status_code(), 402);
    }

    #[test]
    fn capture_must_cover_price_in_currency() {
        assert!(check_capture(2999, "usd", 2999, "USD").is_ok());
        assert!(check_capture(5000, "USD", 2999, "USD").is_ok());
        assert!(check_capture(2998, "USD", 2999, "USD").is_err());
        assert!(check_capture(2999, "EUR", 2999, "USD").is_err());
    }

    #[test]
    fn response_reports_effective_state() {
        let sub = Subscription::start_trial(at(1));
        let resp = sub.to_response(at(1) + Duration::days(40));
        assert_eq!(resp.status, SubscriptionStatus::Expired);
        assert!(!resp.active);
        assert_eq!(resp.days_remaining, 0);
        assert_eq!(resp.expires_at, "2025-03-31 12:00:00");
    }
}
