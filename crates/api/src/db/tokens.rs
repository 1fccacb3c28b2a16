//! Refresh tokens and one-time email tokens.

use sea_query::{Expr, Query, SqliteQueryBuilder};

use super::Built;
use super::tables::{Dentists, EmailTokens, RefreshTokens};
use crate::EmailTokenPurpose;

// ── Refresh tokens ─────────────────────────────────────────────────────────

pub fn insert_refresh_token(
    id: &str,
    dentist_id: &str,
    token_hash: &str,
    expires_at: &str,
) -> Built {
    Query::insert()
        .into_table(RefreshTokens::Table)
        .columns([
            RefreshTokens::Id,
            RefreshTokens::DentistId,
            RefreshTokens::TokenHash,
            RefreshTokens::ExpiresAt,
        ])
        .values_panic([
            id.into(),
            dentist_id.into(),
            token_hash.into(),
            expires_at.into(),
        ])
        .build(SqliteQueryBuilder)
}

/// Returns `id, dentist_id, expires_at, email`.
pub fn lookup_refresh_token(token_hash: &str) -> Built {
    Query::select()
        .column((RefreshTokens::Table, RefreshTokens::Id))
        .column((RefreshTokens::Table, RefreshTokens::DentistId))
        .column((RefreshTokens::Table, RefreshTokens::ExpiresAt))
        .column((Dentists::Table, Dentists::Email))
        .from(RefreshTokens::Table)
        .inner_join(
            Dentists::Table,
            Expr::col((Dentists::Table, Dentists::Id))
                .equals((RefreshTokens::Table, RefreshTokens::DentistId)),
        )
        .and_where(Expr::col((RefreshTokens::Table, RefreshTokens::TokenHash)).eq(token_hash))
        .build(SqliteQueryBuilder)
}

pub fn delete_refresh_token(token_hash: &str) -> Built {
    Query::delete()
        .from_table(RefreshTokens::Table)
        .and_where(Expr::col(RefreshTokens::TokenHash).eq(token_hash))
        .build(SqliteQueryBuilder)
}

pub fn delete_refresh_token_by_id(id: &str) -> Built {
    Query::delete()
        .from_table(RefreshTokens::Table)
        .and_where(Expr::col(RefreshTokens::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// Revoke every session of a dentist (password reset / change).
pub fn delete_refresh_tokens_for(dentist_id: &str) -> Built {
    Query::delete()
        .from_table(RefreshTokens::Table)
        .and_where(Expr::col(RefreshTokens::DentistId).eq(dentist_id))
        .build(SqliteQueryBuilder)
}

pub fn purge_expired_refresh_tokens(now: &str) -> Built {
    Query::delete()
        .from_table(RefreshTokens::Table)
        .and_where(Expr::col(RefreshTokens::ExpiresAt).lte(now))
        .build(SqliteQueryBuilder)
}

// ── Email tokens ───────────────────────────────────────────────────────────

pub fn insert_email_token(
    id: &str,
    dentist_id: &str,
    purpose: EmailTokenPurpose,
    token_hash: &str,
    expires_at: &str,
) -> Built {
    Query::insert()
        .into_table(EmailTokens::Table)
        .columns([
            EmailTokens::Id,
            EmailTokens::DentistId,
            EmailTokens::Purpose,
            EmailTokens::TokenHash,
            EmailTokens::ExpiresAt,
        ])
        .values_panic([
            id.into(),
            dentist_id.into(),
            purpose.as_str().into(),
            token_hash.into(),
            expires_at.into(),
        ])
        .build(SqliteQueryBuilder)
}

/// Returns `id, dentist_id, expires_at, used_at` for a token of `purpose`.
pub fn lookup_email_token(token_hash: &str, purpose: EmailTokenPurpose) -> Built {
    Query::select()
        .columns([
            EmailTokens::Id,
            EmailTokens::DentistId,
            EmailTokens::ExpiresAt,
            EmailTokens::UsedAt,
        ])
        .from(EmailTokens::Table)
        .and_where(Expr::col(EmailTokens::TokenHash).eq(token_hash))
        .and_where(Expr::col(EmailTokens::Purpose).eq(purpose.as_str()))
        .build(SqliteQueryBuilder)
}

pub fn mark_email_token_used(id: &str, now: &str) -> Built {
    Query::update()
        .table(EmailTokens::Table)
        .value(EmailTokens::UsedAt, now)
        .and_where(Expr::col(EmailTokens::Id).eq(id))
        .and_where(Expr::col(EmailTokens::UsedAt).is_null())
        .build(SqliteQueryBuilder)
}

/// Consume every outstanding token of `purpose` so only the newest link works.
pub fn invalidate_email_tokens(dentist_id: &str, purpose: EmailTokenPurpose, now: &str) -> Built {
    Query::update()
        .table(EmailTokens::Table)
        .value(EmailTokens::UsedAt, now)
        .and_where(Expr::col(EmailTokens::DentistId).eq(dentist_id))
        .and_where(Expr::col(EmailTokens::Purpose).eq(purpose.as_str()))
        .and_where(Expr::col(EmailTokens::UsedAt).is_null())
        .build(SqliteQueryBuilder)
}
