//! Tooth treatment builders.
//!
//! A tooth treatment has no `dentist_id` of its own; ownership flows through
//! its appointment, so every read joins `appointments` and filters there.

use sea_query::{Expr, Order, Query, SelectStatement, SqliteQueryBuilder};

use super::Built;
use super::tables::{Appointments, Medicines, PatientTeeth, ToothTreatments, Treatments};

/// `id, appointment_id, appointment_starts_at, tooth_number, treatment_id,
/// treatment_name, medicine_id, medicine_name, notes, price_cents, created_at`
fn entry_select(dentist_id: &str) -> SelectStatement {
    Query::select()
        .column((ToothTreatments::Table, ToothTreatments::Id))
        .column((ToothTreatments::Table, ToothTreatments::AppointmentId))
        .column((Appointments::Table, Appointments::StartsAt))
        .column((PatientTeeth::Table, PatientTeeth::ToothNumber))
        .column((ToothTreatments::Table, ToothTreatments::TreatmentId))
        .column((Treatments::Table, Treatments::Name))
        .column((ToothTreatments::Table, ToothTreatments::MedicineId))
        .column((Medicines::Table, Medicines::Name))
        .column((ToothTreatments::Table, ToothTreatments::Notes))
        .column((ToothTreatments::Table, ToothTreatments::PriceCents))
        .column((ToothTreatments::Table, ToothTreatments::CreatedAt))
        .from(ToothTreatments::Table)
        .inner_join(
            Appointments::Table,
            Expr::col((Appointments::Table, Appointments::Id))
                .equals((ToothTreatments::Table, ToothTreatments::AppointmentId)),
        )
        .inner_join(
            PatientTeeth::Table,
            Expr::col((PatientTeeth::Table, PatientTeeth::Id))
                .equals((ToothTreatments::Table, ToothTreatments::PatientToothId)),
        )
        .inner_join(
            Treatments::Table,
            Expr::col((Treatments::Table, Treatments::Id))
                .equals((ToothTreatments::Table, ToothTreatments::TreatmentId)),
        )
        .left_join(
            Medicines::Table,
            Expr::col((Medicines::Table, Medicines::Id))
                .equals((ToothTreatments::Table, ToothTreatments::MedicineId)),
        )
        .and_where(Expr::col((Appointments::Table, Appointments::DentistId)).eq(dentist_id))
        .to_owned()
}

#[allow(clippy::too_many_arguments)]
pub fn insert(
    id: &str,
    appointment_id: &str,
    patient_tooth_id: i64,
    treatment_id: &str,
    medicine_id: Option<&str>,
    notes: Option<&str>,
    price_cents: i64,
) -> Built {
    Query::insert()
        .into_table(ToothTreatments::Table)
        .columns([
            ToothTreatments::Id,
            ToothTreatments::AppointmentId,
            ToothTreatments::PatientToothId,
            ToothTreatments::TreatmentId,
            ToothTreatments::MedicineId,
            ToothTreatments::Notes,
            ToothTreatments::PriceCents,
        ])
        .values_panic([
            id.into(),
            appointment_id.into(),
            patient_tooth_id.into(),
            treatment_id.into(),
            medicine_id.map(str::to_string).into(),
            notes.map(str::to_string).into(),
            price_cents.into(),
        ])
        .build(SqliteQueryBuilder)
}

pub fn get(dentist_id: &str, appointment_id: &str, id: &str) -> Built {
    entry_select(dentist_id)
        .and_where(Expr::col((ToothTreatments::Table, ToothTreatments::Id)).eq(id))
        .and_where(
            Expr::col((ToothTreatments::Table, ToothTreatments::AppointmentId)).eq(appointment_id),
        )
        .build(SqliteQueryBuilder)
}

pub fn list_for_appointment(dentist_id: &str, appointment_id: &str) -> Built {
    entry_select(dentist_id)
        .and_where(
            Expr::col((ToothTreatments::Table, ToothTreatments::AppointmentId)).eq(appointment_id),
        )
        .order_by((PatientTeeth::Table, PatientTeeth::ToothNumber), Order::Asc)
        .order_by((ToothTreatments::Table, ToothTreatments::CreatedAt), Order::Asc)
        .build(SqliteQueryBuilder)
}

/// Full treatment history of a patient, newest appointment first.
pub fn list_for_patient(dentist_id: &str, patient_id: &str) -> Built {
    entry_select(dentist_id)
        .and_where(Expr::col((Appointments::Table, Appointments::PatientId)).eq(patient_id))
        .order_by((Appointments::Table, Appointments::StartsAt), Order::Desc)
        .order_by((PatientTeeth::Table, PatientTeeth::ToothNumber), Order::Asc)
        .build(SqliteQueryBuilder)
}

/// Delete by id; resolve ownership with [`get`] first.
pub fn delete(id: &str) -> Built {
    Query::delete()
        .from_table(ToothTreatments::Table)
        .and_where(Expr::col(ToothTreatments::Id).eq(id))
        .build(SqliteQueryBuilder)
}
