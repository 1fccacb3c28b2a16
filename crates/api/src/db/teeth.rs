//! Per-patient tooth chart builders.
//!
//! Chart slots are created by the `seed_patient_teeth` trigger; these
//! builders only read and update them, always through the owning patient.

use sea_query::{Expr, Order, Query, SqliteQueryBuilder};

use super::Built;
use super::tables::{PatientTeeth, Patients, Teeth};
use crate::ToothCondition;

/// Returns `tooth_number, name, dentition, condition, notes, updated_at`
/// ordered by tooth number.
pub fn chart(dentist_id: &str, patient_id: &str) -> Built {
    Query::select()
        .column((PatientTeeth::Table, PatientTeeth::ToothNumber))
        .column((Teeth::Table, Teeth::Name))
        .column((Teeth::Table, Teeth::Dentition))
        .column((PatientTeeth::Table, PatientTeeth::Condition))
        .column((PatientTeeth::Table, PatientTeeth::Notes))
        .column((PatientTeeth::Table, PatientTeeth::UpdatedAt))
        .from(PatientTeeth::Table)
        .inner_join(
            Teeth::Table,
            Expr::col((Teeth::Table, Teeth::Number))
                .equals((PatientTeeth::Table, PatientTeeth::ToothNumber)),
        )
        .inner_join(
            Patients::Table,
            Expr::col((Patients::Table, Patients::Id))
                .equals((PatientTeeth::Table, PatientTeeth::PatientId)),
        )
        .and_where(Expr::col((PatientTeeth::Table, PatientTeeth::PatientId)).eq(patient_id))
        .and_where(Expr::col((Patients::Table, Patients::DentistId)).eq(dentist_id))
        .order_by((PatientTeeth::Table, PatientTeeth::ToothNumber), Order::Asc)
        .build(SqliteQueryBuilder)
}

/// Returns the `patient_teeth.id` of one slot of an owned patient.
pub fn find_slot(dentist_id: &str, patient_id: &str, tooth_number: u8) -> Built {
    Query::select()
        .column((PatientTeeth::Table, PatientTeeth::Id))
        .from(PatientTeeth::Table)
        .inner_join(
            Patients::Table,
            Expr::col((Patients::Table, Patients::Id))
                .equals((PatientTeeth::Table, PatientTeeth::PatientId)),
        )
        .and_where(Expr::col((PatientTeeth::Table, PatientTeeth::PatientId)).eq(patient_id))
        .and_where(
            Expr::col((PatientTeeth::Table, PatientTeeth::ToothNumber)).eq(i64::from(tooth_number)),
        )
        .and_where(Expr::col((Patients::Table, Patients::DentistId)).eq(dentist_id))
        .build(SqliteQueryBuilder)
}

/// Update one slot by its id (resolve it with [`find_slot`] first).
pub fn update_slot(slot_id: i64, condition: ToothCondition, notes: Option<&str>) -> Built {
    Query::update()
        .table(PatientTeeth::Table)
        .value(PatientTeeth::Condition, condition.as_str())
        .value(PatientTeeth::Notes, notes.map(str::to_string))
        .value(PatientTeeth::UpdatedAt, Expr::cust("datetime('now')"))
        .and_where(Expr::col(PatientTeeth::Id).eq(slot_id))
        .build(SqliteQueryBuilder)
}
