//! Dentist account and subscription query builders.

use sea_query::{Asterisk, Expr, Func, Query, SqliteQueryBuilder};

use super::Built;
use super::tables::Dentists;
use crate::SubscriptionStatus;

/// Column order shared by profile lookups.
///
/// `id, email, first_name, last_name, phone, email_verified,
/// subscription_status, subscription_expires_at, created_at`
pub fn get_profile(dentist_id: &str) -> Built {
    Query::select()
        .columns([
            Dentists::Id,
            Dentists::Email,
            Dentists::FirstName,
            Dentists::LastName,
            Dentists::Phone,
            Dentists::EmailVerified,
            Dentists::SubscriptionStatus,
            Dentists::SubscriptionExpiresAt,
            Dentists::CreatedAt,
        ])
        .from(Dentists::Table)
        .and_where(Expr::col(Dentists::Id).eq(dentist_id))
        .build(SqliteQueryBuilder)
}

/// Returns `id, email, password_hash, password_salt, email_verified`.
pub fn get_by_email_for_login(email: &str) -> Built {
    Query::select()
        .columns([
            Dentists::Id,
            Dentists::Email,
            Dentists::PasswordHash,
            Dentists::PasswordSalt,
            Dentists::EmailVerified,
        ])
        .from(Dentists::Table)
        .and_where(Expr::col(Dentists::Email).eq(email))
        .build(SqliteQueryBuilder)
}

/// Returns `id, email_verified`.
pub fn get_by_email(email: &str) -> Built {
    Query::select()
        .columns([Dentists::Id, Dentists::EmailVerified])
        .from(Dentists::Table)
        .and_where(Expr::col(Dentists::Email).eq(email))
        .build(SqliteQueryBuilder)
}

pub fn email_exists(email: &str) -> Built {
    Query::select()
        .expr(Expr::expr(Func::count(Expr::col(Asterisk))).gt(0))
        .from(Dentists::Table)
        .and_where(Expr::col(Dentists::Email).eq(email))
        .build(SqliteQueryBuilder)
}

#[allow(clippy::too_many_arguments)]
pub fn insert(
    id: &str,
    email: &str,
    password_hash: &str,
    password_salt: &str,
    first_name: &str,
    last_name: &str,
    phone: Option<&str>,
    subscription_expires_at: &str,
) -> Built {
    Query::insert()
        .into_table(Dentists::Table)
        .columns([
            Dentists::Id,
            Dentists::Email,
            Dentists::PasswordHash,
            Dentists::PasswordSalt,
            Dentists::FirstName,
            Dentists::LastName,
            Dentists::Phone,
            Dentists::SubscriptionStatus,
            Dentists::SubscriptionExpiresAt,
        ])
        .values_panic([
            id.into(),
            email.into(),
            password_hash.into(),
            password_salt.into(),
            first_name.into(),
            last_name.into(),
            phone.map(str::to_string).into(),
            SubscriptionStatus::Trial.as_str().into(),
            subscription_expires_at.into(),
        ])
        .build(SqliteQueryBuilder)
}

/// Returns `password_hash, password_salt`.
pub fn get_password_fields(dentist_id: &str) -> Built {
    Query::select()
        .columns([Dentists::PasswordHash, Dentists::PasswordSalt])
        .from(Dentists::Table)
        .and_where(Expr::col(Dentists::Id).eq(dentist_id))
        .build(SqliteQueryBuilder)
}

pub fn update_password(dentist_id: &str, password_hash: &str, password_salt: &str) -> Built {
    Query::update()
        .table(Dentists::Table)
        .value(Dentists::PasswordHash, password_hash)
        .value(Dentists::PasswordSalt, password_salt)
        .value(Dentists::UpdatedAt, Expr::cust("datetime('now')"))
        .and_where(Expr::col(Dentists::Id).eq(dentist_id))
        .build(SqliteQueryBuilder)
}

pub fn update_profile(
    dentist_id: &str,
    first_name: &str,
    last_name: &str,
    phone: Option<&str>,
) -> Built {
    Query::update()
        .table(Dentists::Table)
        .value(Dentists::FirstName, first_name)
        .value(Dentists::LastName, last_name)
        .value(Dentists::Phone, phone.map(str::to_string))
        .value(Dentists::UpdatedAt, Expr::cust("datetime('now')"))
        .and_where(Expr::col(Dentists::Id).eq(dentist_id))
        .build(SqliteQueryBuilder)
}

pub fn mark_email_verified(dentist_id: &str) -> Built {
    Query::update()
        .table(Dentists::Table)
        .value(Dentists::EmailVerified, true)
        .value(Dentists::UpdatedAt, Expr::cust("datetime('now')"))
        .and_where(Expr::col(Dentists::Id).eq(dentist_id))
        .build(SqliteQueryBuilder)
}

// ── Subscription ──────────────────────────────────────────────────────────

/// Returns `subscription_status, subscription_expires_at`.
pub fn get_subscription(dentist_id: &str) -> Built {
    Query::select()
        .columns([Dentists::SubscriptionStatus, Dentists::SubscriptionExpiresAt])
        .from(Dentists::Table)
        .and_where(Expr::col(Dentists::Id).eq(dentist_id))
        .build(SqliteQueryBuilder)
}

pub fn set_subscription(dentist_id: &str, status: SubscriptionStatus, expires_at: &str) -> Built {
    Query::update()
        .table(Dentists::Table)
        .value(Dentists::SubscriptionStatus, status.as_str())
        .value(Dentists::SubscriptionExpiresAt, expires_at)
        .value(Dentists::IsActive, status != SubscriptionStatus::Expired)
        .value(Dentists::UpdatedAt, Expr::cust("datetime('now')"))
        .and_where(Expr::col(Dentists::Id).eq(dentist_id))
        .build(SqliteQueryBuilder)
}

/// Persist expiry for every window that ran out at or before `now`.
pub fn deactivate_expired(now: &str) -> Built {
    Query::update()
        .table(Dentists::Table)
        .value(
            Dentists::SubscriptionStatus,
            SubscriptionStatus::Expired.as_str(),
        )
        .value(Dentists::IsActive, false)
        .value(Dentists::UpdatedAt, Expr::cust("datetime('now')"))
        .and_where(Expr::col(Dentists::SubscriptionExpiresAt).lte(now))
        .and_where(
            Expr::col(Dentists::SubscriptionStatus).ne(SubscriptionStatus::Expired.as_str()),
        )
        .build(SqliteQueryBuilder)
}
