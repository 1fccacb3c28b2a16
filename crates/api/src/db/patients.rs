//! Patient query builders, including the manual delete cascade.

use sea_query::{Cond, Expr, LikeExpr, Order, Query, SelectStatement, SqliteQueryBuilder};

use super::Built;
use super::tables::{Appointments, PatientTeeth, Patients, ToothTreatments};
use crate::Gender;

/// Validated column values for an insert or a full update.
#[derive(Debug, Clone, Default)]
pub struct PatientValues {
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<String>,
    pub gender: Option<Gender>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

/// `id, first_name, last_name, birth_date, gender, phone, email, address,
/// notes, created_at, updated_at`
fn patient_columns(q: &mut SelectStatement) -> &mut SelectStatement {
    q.columns([
        Patients::Id,
        Patients::FirstName,
        Patients::LastName,
        Patients::BirthDate,
        Patients::Gender,
        Patients::Phone,
        Patients::Email,
        Patients::Address,
        Patients::Notes,
        Patients::CreatedAt,
        Patients::UpdatedAt,
    ])
}

pub fn insert(id: &str, dentist_id: &str, v: &PatientValues) -> Built {
    Query::insert()
        .into_table(Patients::Table)
        .columns([
            Patients::Id,
            Patients::DentistId,
            Patients::FirstName,
            Patients::LastName,
            Patients::BirthDate,
            Patients::Gender,
            Patients::Phone,
            Patients::Email,
            Patients::Address,
            Patients::Notes,
        ])
        .values_panic([
            id.into(),
            dentist_id.into(),
            v.first_name.as_str().into(),
            v.last_name.as_str().into(),
            v.birth_date.clone().into(),
            v.gender.map(|g| g.as_str().to_string()).into(),
            v.phone.clone().into(),
            v.email.clone().into(),
            v.address.clone().into(),
            v.notes.clone().into(),
        ])
        .build(SqliteQueryBuilder)
}

pub fn get(dentist_id: &str, id: &str) -> Built {
    let mut q = Query::select();
    patient_columns(&mut q);
    q.from(Patients::Table)
        .and_where(Expr::col(Patients::Id).eq(id))
        .and_where(Expr::col(Patients::DentistId).eq(dentist_id))
        .build(SqliteQueryBuilder)
}

/// Make `%`, `_` and `\` match literally under `ESCAPE '\'`.
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// List a dentist's patients by name, optionally filtered by a substring of
/// name, phone or email.
pub fn list(dentist_id: &str, search: Option<&str>) -> Built {
    let mut q = Query::select();
    patient_columns(&mut q);
    q.from(Patients::Table)
        .and_where(Expr::col(Patients::DentistId).eq(dentist_id));

    if let Some(term) = search.map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
        let like = || LikeExpr::new(pattern.as_str()).escape('\\');
        q.cond_where(
            Cond::any()
                .add(Expr::col(Patients::FirstName).like(like()))
                .add(Expr::col(Patients::LastName).like(like()))
                .add(Expr::col(Patients::Phone).like(like()))
                .add(Expr::col(Patients::Email).like(like())),
        );
    }

    q.order_by(Patients::LastName, Order::Asc)
        .order_by(Patients::FirstName, Order::Asc)
        .build(SqliteQueryBuilder)
}

pub fn update(dentist_id: &str, id: &str, v: &PatientValues) -> Built {
    Query::update()
        .table(Patients::Table)
        .value(Patients::FirstName, v.first_name.as_str())
        .value(Patients::LastName, v.last_name.as_str())
        .value(Patients::BirthDate, v.birth_date.clone())
        .value(Patients::Gender, v.gender.map(|g| g.as_str().to_string()))
        .value(Patients::Phone, v.phone.clone())
        .value(Patients::Email, v.email.clone())
        .value(Patients::Address, v.address.clone())
        .value(Patients::Notes, v.notes.clone())
        .value(Patients::UpdatedAt, Expr::cust("datetime('now')"))
        .and_where(Expr::col(Patients::Id).eq(id))
        .and_where(Expr::col(Patients::DentistId).eq(dentist_id))
        .build(SqliteQueryBuilder)
}

pub fn exists(dentist_id: &str, id: &str) -> Built {
    Query::select()
        .expr(Expr::val(1))
        .from(Patients::Table)
        .and_where(Expr::col(Patients::Id).eq(id))
        .and_where(Expr::col(Patients::DentistId).eq(dentist_id))
        .build(SqliteQueryBuilder)
}

/// `SELECT id FROM appointments WHERE patient_id = ? AND dentist_id = ?`
fn patient_appointments(dentist_id: &str, patient_id: &str) -> SelectStatement {
    Query::select()
        .column(Appointments::Id)
        .from(Appointments::Table)
        .and_where(Expr::col(Appointments::PatientId).eq(patient_id))
        .and_where(Expr::col(Appointments::DentistId).eq(dentist_id))
        .to_owned()
}

// ── Delete cascade (run in this order, inside one transaction) ─────────────

/// Step 1: tooth treatments recorded in any of the patient's appointments.
pub fn delete_tooth_treatments(dentist_id: &str, patient_id: &str) -> Built {
    Query::delete()
        .from_table(ToothTreatments::Table)
        .and_where(
            Expr::col(ToothTreatments::AppointmentId)
                .in_subquery(patient_appointments(dentist_id, patient_id)),
        )
        .build(SqliteQueryBuilder)
}

/// Step 2: the patient's appointments.
pub fn delete_appointments(dentist_id: &str, patient_id: &str) -> Built {
    Query::delete()
        .from_table(Appointments::Table)
        .and_where(Expr::col(Appointments::PatientId).eq(patient_id))
        .and_where(Expr::col(Appointments::DentistId).eq(dentist_id))
        .build(SqliteQueryBuilder)
}

/// Step 3: the patient's chart slots.
pub fn delete_teeth(dentist_id: &str, patient_id: &str) -> Built {
    let owned = Query::select()
        .column(Patients::Id)
        .from(Patients::Table)
        .and_where(Expr::col(Patients::Id).eq(patient_id))
        .and_where(Expr::col(Patients::DentistId).eq(dentist_id))
        .to_owned();
    Query::delete()
        .from_table(PatientTeeth::Table)
        .and_where(Expr::col(PatientTeeth::PatientId).in_subquery(owned))
        .build(SqliteQueryBuilder)
}

/// Step 4: the patient row itself.
pub fn delete(dentist_id: &str, id: &str) -> Built {
    Query::delete()
        .from_table(Patients::Table)
        .and_where(Expr::col(Patients::Id).eq(id))
        .and_where(Expr::col(Patients::DentistId).eq(dentist_id))
        .build(SqliteQueryBuilder)
}
