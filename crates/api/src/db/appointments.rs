//! Appointment query builders.

use sea_query::{Alias, Expr, Func, Order, Query, SelectStatement, SqliteQueryBuilder};

use super::Built;
use super::tables::{Appointments, Patients, ToothTreatments};
use crate::AppointmentStatus;

/// Filters for [`list`]; times are in storage format.
#[derive(Debug, Default)]
pub struct AppointmentFilter {
    pub patient_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub status: Option<AppointmentStatus>,
}

/// `id, patient_id, patient_name, starts_at, ends_at, status, reason, notes, created_at`
fn appointment_select() -> SelectStatement {
    Query::select()
        .column((Appointments::Table, Appointments::Id))
        .column((Appointments::Table, Appointments::PatientId))
        .expr_as(
            Expr::cust("\"patients\".\"first_name\" || ' ' || \"patients\".\"last_name\""),
            Alias::new("patient_name"),
        )
        .column((Appointments::Table, Appointments::StartsAt))
        .column((Appointments::Table, Appointments::EndsAt))
        .column((Appointments::Table, Appointments::Status))
        .column((Appointments::Table, Appointments::Reason))
        .column((Appointments::Table, Appointments::Notes))
        .column((Appointments::Table, Appointments::CreatedAt))
        .from(Appointments::Table)
        .inner_join(
            Patients::Table,
            Expr::col((Patients::Table, Patients::Id))
                .equals((Appointments::Table, Appointments::PatientId)),
        )
        .to_owned()
}

pub fn insert(
    id: &str,
    dentist_id: &str,
    patient_id: &str,
    starts_at: &str,
    ends_at: &str,
    reason: Option<&str>,
    notes: Option<&str>,
) -> Built {
    Query::insert()
        .into_table(Appointments::Table)
        .columns([
            Appointments::Id,
            Appointments::DentistId,
            Appointments::PatientId,
            Appointments::StartsAt,
            Appointments::EndsAt,
            Appointments::Status,
            Appointments::Reason,
            Appointments::Notes,
        ])
        .values_panic([
            id.into(),
            dentist_id.into(),
            patient_id.into(),
            starts_at.into(),
            ends_at.into(),
            AppointmentStatus::Scheduled.as_str().into(),
            reason.map(str::to_string).into(),
            notes.map(str::to_string).into(),
        ])
        .build(SqliteQueryBuilder)
}

pub fn get(dentist_id: &str, id: &str) -> Built {
    appointment_select()
        .and_where(Expr::col((Appointments::Table, Appointments::Id)).eq(id))
        .and_where(Expr::col((Appointments::Table, Appointments::DentistId)).eq(dentist_id))
        .build(SqliteQueryBuilder)
}

pub fn list(dentist_id: &str, filter: &AppointmentFilter) -> Built {
    let mut q = appointment_select();
    q.and_where(Expr::col((Appointments::Table, Appointments::DentistId)).eq(dentist_id));
    if let Some(ref patient_id) = filter.patient_id {
        q.and_where(
            Expr::col((Appointments::Table, Appointments::PatientId)).eq(patient_id.as_str()),
        );
    }
    if let Some(ref from) = filter.from {
        q.and_where(Expr::col((Appointments::Table, Appointments::EndsAt)).gt(from.as_str()));
    }
    if let Some(ref to) = filter.to {
        q.and_where(Expr::col((Appointments::Table, Appointments::StartsAt)).lt(to.as_str()));
    }
    if let Some(status) = filter.status {
        q.and_where(Expr::col((Appointments::Table, Appointments::Status)).eq(status.as_str()));
    }
    q.order_by((Appointments::Table, Appointments::StartsAt), Order::Asc)
        .build(SqliteQueryBuilder)
}

/// Count non-cancelled appointments of the dentist intersecting
/// `[starts_at, ends_at)`, ignoring `exclude_id` (the one being edited).
pub fn count_overlapping(
    dentist_id: &str,
    starts_at: &str,
    ends_at: &str,
    exclude_id: Option<&str>,
) -> Built {
    let mut q = Query::select();
    q.expr(Func::count(Expr::col(Appointments::Id)))
        .from(Appointments::Table)
        .and_where(Expr::col(Appointments::DentistId).eq(dentist_id))
        .and_where(Expr::col(Appointments::Status).ne(AppointmentStatus::Cancelled.as_str()))
        .and_where(Expr::col(Appointments::StartsAt).lt(ends_at))
        .and_where(Expr::col(Appointments::EndsAt).gt(starts_at));
    if let Some(id) = exclude_id {
        q.and_where(Expr::col(Appointments::Id).ne(id));
    }
    q.build(SqliteQueryBuilder)
}

#[allow(clippy::too_many_arguments)]
pub fn update(
    dentist_id: &str,
    id: &str,
    starts_at: &str,
    ends_at: &str,
    status: AppointmentStatus,
    reason: Option<&str>,
    notes: Option<&str>,
) -> Built {
    Query::update()
        .table(Appointments::Table)
        .value(Appointments::StartsAt, starts_at)
        .value(Appointments::EndsAt, ends_at)
        .value(Appointments::Status, status.as_str())
        .value(Appointments::Reason, reason.map(str::to_string))
        .value(Appointments::Notes, notes.map(str::to_string))
        .value(Appointments::UpdatedAt, Expr::cust("datetime('now')"))
        .and_where(Expr::col(Appointments::Id).eq(id))
        .and_where(Expr::col(Appointments::DentistId).eq(dentist_id))
        .build(SqliteQueryBuilder)
}

/// First half of deleting an appointment: its tooth treatments.
pub fn delete_tooth_treatments(dentist_id: &str, id: &str) -> Built {
    let owned = Query::select()
        .column(Appointments::Id)
        .from(Appointments::Table)
        .and_where(Expr::col(Appointments::Id).eq(id))
        .and_where(Expr::col(Appointments::DentistId).eq(dentist_id))
        .to_owned();
    Query::delete()
        .from_table(ToothTreatments::Table)
        .and_where(Expr::col(ToothTreatments::AppointmentId).in_subquery(owned))
        .build(SqliteQueryBuilder)
}

pub fn delete(dentist_id: &str, id: &str) -> Built {
    Query::delete()
        .from_table(Appointments::Table)
        .and_where(Expr::col(Appointments::Id).eq(id))
        .and_where(Expr::col(Appointments::DentistId).eq(dentist_id))
        .build(SqliteQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_uses_half_open_interval() {
        let (sql, values) = count_overlapping("d1", "2025-01-01 09:00:00", "2025-01-01 10:00:00", None);
        assert!(sql.contains("\"starts_at\" < ?"));
        assert!(sql.contains("\"ends_at\" > ?"));
        assert!(sql.contains("\"status\" <> ?"));
        assert_eq!(values.0.len(), 4);

        let (sql, values) =
            count_overlapping("d1", "2025-01-01 09:00:00", "2025-01-01 10:00:00", Some("a1"));
        assert!(sql.contains("\"id\" <> ?"));
        assert_eq!(values.0.len(), 5);
    }

    #[test]
    fn list_applies_only_given_filters() {
        let (_, values) = list("d1", &AppointmentFilter::default());
        assert_eq!(values.0.len(), 1);
        let filter = AppointmentFilter {
            patient_id: Some("p1".into()),
            status: Some(AppointmentStatus::Scheduled),
            ..Default::default()
        };
        let (sql, values) = list("d1", &filter);
        assert!(sql.contains("\"appointments\".\"patient_id\" = ?"));
        assert_eq!(values.0.len(), 3);
    }
}
