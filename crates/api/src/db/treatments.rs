//! Treatment catalogue builders.

use sea_query::{Expr, Func, Order, Query, SelectStatement, SqliteQueryBuilder};

use super::Built;
use super::tables::{ToothTreatments, Treatments};

/// `id, name, description, price_cents, created_at`
fn treatment_columns(q: &mut SelectStatement) -> &mut SelectStatement {
    q.columns([
        Treatments::Id,
        Treatments::Name,
        Treatments::Description,
        Treatments::PriceCents,
        Treatments::CreatedAt,
    ])
}

pub fn insert(
    id: &str,
    dentist_id: &str,
    name: &str,
    description: Option<&str>,
    price_cents: i64,
) -> Built {
    Query::insert()
        .into_table(Treatments::Table)
        .columns([
            Treatments::Id,
            Treatments::DentistId,
            Treatments::Name,
            Treatments::Description,
            Treatments::PriceCents,
        ])
        .values_panic([
            id.into(),
            dentist_id.into(),
            name.into(),
            description.map(str::to_string).into(),
            price_cents.into(),
        ])
        .build(SqliteQueryBuilder)
}

pub fn get(dentist_id: &str, id: &str) -> Built {
    let mut q = Query::select();
    treatment_columns(&mut q);
    q.from(Treatments::Table)
        .and_where(Expr::col(Treatments::Id).eq(id))
        .and_where(Expr::col(Treatments::DentistId).eq(dentist_id))
        .build(SqliteQueryBuilder)
}

pub fn list(dentist_id: &str) -> Built {
    let mut q = Query::select();
    treatment_columns(&mut q);
    q.from(Treatments::Table)
        .and_where(Expr::col(Treatments::DentistId).eq(dentist_id))
        .order_by(Treatments::Name, Order::Asc)
        .build(SqliteQueryBuilder)
}

/// Count other treatments of the dentist already using `name`.
pub fn count_named(dentist_id: &str, name: &str, exclude_id: Option<&str>) -> Built {
    let mut q = Query::select();
    q.expr(Func::count(Expr::col(Treatments::Id)))
        .from(Treatments::Table)
        .and_where(Expr::col(Treatments::DentistId).eq(dentist_id))
        .and_where(Expr::col(Treatments::Name).eq(name));
    if let Some(id) = exclude_id {
        q.and_where(Expr::col(Treatments::Id).ne(id));
    }
    q.build(SqliteQueryBuilder)
}

pub fn update(
    dentist_id: &str,
    id: &str,
    name: &str,
    description: Option<&str>,
    price_cents: i64,
) -> Built {
    Query::update()
        .table(Treatments::Table)
        .value(Treatments::Name, name)
        .value(Treatments::Description, description.map(str::to_string))
        .value(Treatments::PriceCents, price_cents)
        .and_where(Expr::col(Treatments::Id).eq(id))
        .and_where(Expr::col(Treatments::DentistId).eq(dentist_id))
        .build(SqliteQueryBuilder)
}

/// Number of tooth treatments referencing this catalogue entry.
pub fn usage_count(id: &str) -> Built {
    Query::select()
        .expr(Func::count(Expr::col(ToothTreatments::Id)))
        .from(ToothTreatments::Table)
        .and_where(Expr::col(ToothTreatments::TreatmentId).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn delete(dentist_id: &str, id: &str) -> Built {
    Query::delete()
        .from_table(Treatments::Table)
        .and_where(Expr::col(Treatments::Id).eq(id))
        .and_where(Expr::col(Treatments::DentistId).eq(dentist_id))
        .build(SqliteQueryBuilder)
}
