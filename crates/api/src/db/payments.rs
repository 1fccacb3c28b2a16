//! Captured subscription payments.

use sea_query::{Expr, Func, Order, Query, SqliteQueryBuilder};

use super::Built;
use super::tables::Payments;
use crate::PaymentProvider;

pub fn insert(
    id: &str,
    dentist_id: &str,
    provider: PaymentProvider,
    reference: &str,
    amount_cents: i64,
    currency: &str,
) -> Built {
    Query::insert()
        .into_table(Payments::Table)
        .columns([
            Payments::Id,
            Payments::DentistId,
            Payments::Provider,
            Payments::Reference,
            Payments::AmountCents,
            Payments::Currency,
        ])
        .values_panic([
            id.into(),
            dentist_id.into(),
            provider.as_str().into(),
            reference.into(),
            amount_cents.into(),
            currency.into(),
        ])
        .build(SqliteQueryBuilder)
}

/// Returns `id, provider, reference, amount_cents, currency, captured_at`.
pub fn get(dentist_id: &str, id: &str) -> Built {
    Query::select()
        .columns([
            Payments::Id,
            Payments::Provider,
            Payments::Reference,
            Payments::AmountCents,
            Payments::Currency,
            Payments::CapturedAt,
        ])
        .from(Payments::Table)
        .and_where(Expr::col(Payments::Id).eq(id))
        .and_where(Expr::col(Payments::DentistId).eq(dentist_id))
        .build(SqliteQueryBuilder)
}

/// Same columns as [`get`], newest first.
pub fn list(dentist_id: &str) -> Built {
    Query::select()
        .columns([
            Payments::Id,
            Payments::Provider,
            Payments::Reference,
            Payments::AmountCents,
            Payments::Currency,
            Payments::CapturedAt,
        ])
        .from(Payments::Table)
        .and_where(Expr::col(Payments::DentistId).eq(dentist_id))
        .order_by(Payments::CapturedAt, Order::Desc)
        .order_by(Payments::Id, Order::Desc)
        .build(SqliteQueryBuilder)
}

/// A provider reference can only ever be redeemed once, by anyone.
pub fn reference_used(provider: PaymentProvider, reference: &str) -> Built {
    Query::select()
        .expr(Func::count(Expr::col(Payments::Id)))
        .from(Payments::Table)
        .and_where(Expr::col(Payments::Provider).eq(provider.as_str()))
        .and_where(Expr::col(Payments::Reference).eq(reference))
        .build(SqliteQueryBuilder)
}
