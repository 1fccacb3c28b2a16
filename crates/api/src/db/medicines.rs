//! Medicine catalogue builders.

use sea_query::{Expr, Func, Order, Query, SelectStatement, SqliteQueryBuilder};

use super::Built;
use super::tables::{Medicines, ToothTreatments};

/// `id, name, dosage, description, created_at`
fn medicine_columns(q: &mut SelectStatement) -> &mut SelectStatement {
    q.columns([
        Medicines::Id,
        Medicines::Name,
        Medicines::Dosage,
        Medicines::Description,
        Medicines::CreatedAt,
    ])
}

pub fn insert(
    id: &str,
    dentist_id: &str,
    name: &str,
    dosage: Option<&str>,
    description: Option<&str>,
) -> Built {
    Query::insert()
        .into_table(Medicines::Table)
        .columns([
            Medicines::Id,
            Medicines::DentistId,
            Medicines::Name,
            Medicines::Dosage,
            Medicines::Description,
        ])
        .values_panic([
            id.into(),
            dentist_id.into(),
            name.into(),
            dosage.map(str::to_string).into(),
            description.map(str::to_string).into(),
        ])
        .build(SqliteQueryBuilder)
}

pub fn get(dentist_id: &str, id: &str) -> Built {
    let mut q = Query::select();
    medicine_columns(&mut q);
    q.from(Medicines::Table)
        .and_where(Expr::col(Medicines::Id).eq(id))
        .and_where(Expr::col(Medicines::DentistId).eq(dentist_id))
        .build(SqliteQueryBuilder)
}

pub fn list(dentist_id: &str) -> Built {
    let mut q = Query::select();
    medicine_columns(&mut q);
    q.from(Medicines::Table)
        .and_where(Expr::col(Medicines::DentistId).eq(dentist_id))
        .order_by(Medicines::Name, Order::Asc)
        .build(SqliteQueryBuilder)
}

pub fn count_named(dentist_id: &str, name: &str, exclude_id: Option<&str>) -> Built {
    let mut q = Query::select();
    q.expr(Func::count(Expr::col(Medicines::Id)))
        .from(Medicines::Table)
        .and_where(Expr::col(Medicines::DentistId).eq(dentist_id))
        .and_where(Expr::col(Medicines::Name).eq(name));
    if let Some(id) = exclude_id {
        q.and_where(Expr::col(Medicines::Id).ne(id));
    }
    q.build(SqliteQueryBuilder)
}

pub fn update(
    dentist_id: &str,
    id: &str,
    name: &str,
    dosage: Option<&str>,
    description: Option<&str>,
) -> Built {
    Query::update()
        .table(Medicines::Table)
        .value(Medicines::Name, name)
        .value(Medicines::Dosage, dosage.map(str::to_string))
        .value(Medicines::Description, description.map(str::to_string))
        .and_where(Expr::col(Medicines::Id).eq(id))
        .and_where(Expr::col(Medicines::DentistId).eq(dentist_id))
        .build(SqliteQueryBuilder)
}

pub fn usage_count(id: &str) -> Built {
    Query::select()
        .expr(Func::count(Expr::col(ToothTreatments::Id)))
        .from(ToothTreatments::Table)
        .and_where(Expr::col(ToothTreatments::MedicineId).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn delete(dentist_id: &str, id: &str) -> Built {
    Query::delete()
        .from_table(Medicines::Table)
        .and_where(Expr::col(Medicines::Id).eq(id))
        .and_where(Expr::col(Medicines::DentistId).eq(dentist_id))
        .build(SqliteQueryBuilder)
}
