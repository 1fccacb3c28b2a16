use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use dentalcare_api::db::appointments::AppointmentFilter;
use dentalcare_api::{
    AppointmentListQuery, AppointmentResponse, AppointmentStatus, CreateAppointmentRequest,
    ListAppointmentsResponse, OkResponse, UpdateAppointmentRequest, db, format_datetime,
    parse_datetime, service,
};

use crate::error::ApiErr;
use crate::routes::auth::ActiveDentist;
use crate::routes::patients::ensure_patient;
use crate::storage::{Db, appointment_from_row, sq_count, sq_execute, sq_query_map, sq_query_opt};

const REASON_MAX: usize = 200;
const NOTES_MAX: usize = 2000;

pub(crate) fn load_appointment(
    conn: &Connection,
    dentist_id: &str,
    id: &str,
) -> Result<AppointmentResponse, ApiErr> {
    sq_query_opt(conn, db::appointments::get(dentist_id, id), appointment_from_row)
        .map_err(ApiErr::from_db("load appointment"))?
        .ok_or_else(|| ApiErr::not_found("appointment not found"))
}

fn ensure_free(
    conn: &Connection,
    dentist_id: &str,
    starts_at: &str,
    ends_at: &str,
    exclude_id: Option<&str>,
) -> Result<(), ApiErr> {
    let clashes = sq_count(
        conn,
        db::appointments::count_overlapping(dentist_id, starts_at, ends_at, exclude_id),
    )
    .map_err(ApiErr::from_db("check overlap"))?;
    if clashes > 0 {
        return Err(ApiErr::conflict(
            "the time slot overlaps another appointment",
        ));
    }
    Ok(())
}

fn stored_time(value: &str) -> Result<DateTime<Utc>, ApiErr> {
    parse_datetime(value)
        .ok_or_else(|| ApiErr::from_db("appointment time")(format!("bad stored value {value:?}")))
}

/// POST /api/appointments
pub async fn create_appointment(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<AppointmentResponse>), ApiErr> {
    let (starts_at, ends_at) = service::validate_window(
        service::parse_client_datetime("starts_at", &req.starts_at)?,
        service::parse_client_datetime("ends_at", &req.ends_at)?,
    )?;
    let reason = service::validate_text("reason", req.reason.as_deref(), REASON_MAX)?;
    let notes = service::validate_text("notes", req.notes.as_deref(), NOTES_MAX)?;
    let id = Uuid::new_v4().to_string();

    let conn = store.conn();
    ensure_patient(&conn, &dentist.dentist_id, &req.patient_id)?;
    ensure_free(&conn, &dentist.dentist_id, &starts_at, &ends_at, None)?;
    sq_execute(
        &conn,
        db::appointments::insert(
            &id,
            &dentist.dentist_id,
            &req.patient_id,
            &starts_at,
            &ends_at,
            reason.as_deref(),
            notes.as_deref(),
        ),
    )
    .map_err(ApiErr::from_db("insert appointment"))?;

    let appointment = load_appointment(&conn, &dentist.dentist_id, &id)?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

/// GET /api/appointments?patient_id=&from=&to=&status=
pub async fn list_appointments(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
    Query(q): Query<AppointmentListQuery>,
) -> Result<Json<ListAppointmentsResponse>, ApiErr> {
    let bound = |field: &str, value: Option<String>| -> Result<Option<String>, ApiErr> {
        value
            .filter(|v| !v.trim().is_empty())
            .map(|v| service::parse_client_datetime(field, &v).map(format_datetime))
            .transpose()
            .map_err(ApiErr::from)
    };
    let filter = AppointmentFilter {
        patient_id: q.patient_id.filter(|p| !p.is_empty()),
        from: bound("from", q.from)?,
        to: bound("to", q.to)?,
        status: q.status,
    };

    let conn = store.conn();
    let appointments = sq_query_map(
        &conn,
        db::appointments::list(&dentist.dentist_id, &filter),
        appointment_from_row,
    )
    .map_err(ApiErr::from_db("list appointments"))?;
    Ok(Json(ListAppointmentsResponse { appointments }))
}

/// GET /api/appointments/{id}
pub async fn get_appointment(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
    Path(id): Path<String>,
) -> Result<Json<AppointmentResponse>, ApiErr> {
    let conn = store.conn();
    load_appointment(&conn, &dentist.dentist_id, &id).map(Json)
}

/// PUT /api/appointments/{id}
///
/// Times move only while scheduled; status only leaves `scheduled`.
pub async fn update_appointment(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
    Path(id): Path<String>,
    Json(req): Json<UpdateAppointmentRequest>,
) -> Result<Json<AppointmentResponse>, ApiErr> {
    let conn = store.conn();
    let current = load_appointment(&conn, &dentist.dentist_id, &id)?;

    let status = req.status.unwrap_or(current.status);
    if !current.status.can_transition_to(status) {
        return Err(ApiErr::bad_request(format!(
            "a {} appointment cannot become {status}",
            current.status
        )));
    }

    let reschedule = req.starts_at.is_some() || req.ends_at.is_some();
    if reschedule && current.status != AppointmentStatus::Scheduled {
        return Err(ApiErr::bad_request(
            "only scheduled appointments can be rescheduled",
        ));
    }

    let starts_at = match req.starts_at {
        Some(ref v) => service::parse_client_datetime("starts_at", v)?,
        None => stored_time(&current.starts_at)?,
    };
    let ends_at = match req.ends_at {
        Some(ref v) => service::parse_client_datetime("ends_at", v)?,
        None => stored_time(&current.ends_at)?,
    };
    let (starts_at, ends_at) = service::validate_window(starts_at, ends_at)?;
    if reschedule && status != AppointmentStatus::Cancelled {
        ensure_free(&conn, &dentist.dentist_id, &starts_at, &ends_at, Some(&id))?;
    }

    let reason = match req.reason {
        Some(ref v) => service::validate_text("reason", Some(v), REASON_MAX)?,
        None => current.reason,
    };
    let notes = match req.notes {
        Some(ref v) => service::validate_text("notes", Some(v), NOTES_MAX)?,
        None => current.notes,
    };

    sq_execute(
        &conn,
        db::appointments::update(
            &dentist.dentist_id,
            &id,
            &starts_at,
            &ends_at,
            status,
            reason.as_deref(),
            notes.as_deref(),
        ),
    )
    .map_err(ApiErr::from_db("update appointment"))?;

    if status != current.status {
        tracing::info!(appointment_id = %id, from = %current.status, to = %status, "appointment status changed");
    }
    load_appointment(&conn, &dentist.dentist_id, &id).map(Json)
}

/// DELETE /api/appointments/{id}: also removes its tooth treatments.
pub async fn delete_appointment(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ApiErr> {
    let mut conn = store.conn();
    let tx = conn
        .transaction()
        .map_err(ApiErr::from_db("begin delete appointment"))?;
    load_appointment(&tx, &dentist.dentist_id, &id)?;
    sq_execute(
        &tx,
        db::appointments::delete_tooth_treatments(&dentist.dentist_id, &id),
    )
    .map_err(ApiErr::from_db("delete appointment treatments"))?;
    sq_execute(&tx, db::appointments::delete(&dentist.dentist_id, &id))
        .map_err(ApiErr::from_db("delete appointment"))?;
    tx.commit()
        .map_err(ApiErr::from_db("commit delete appointment"))?;
    Ok(Json(OkResponse { ok: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestApp;

    fn slot(patient_id: &str, starts_at: &str, ends_at: &str) -> CreateAppointmentRequest {
        CreateAppointmentRequest {
            patient_id: patient_id.into(),
            starts_at: starts_at.into(),
            ends_at: ends_at.into(),
            reason: Some("checkup".into()),
            notes: None,
        }
    }

    async fn book(
        app: &TestApp,
        dentist: &ActiveDentist,
        req: CreateAppointmentRequest,
    ) -> Result<AppointmentResponse, ApiErr> {
        create_appointment(State(app.state.db.clone()), dentist.clone(), Json(req))
            .await
            .map(|(_, Json(a))| a)
    }

    #[tokio::test]
    async fn create_normalizes_times_to_utc() {
        let app = TestApp::new();
        let dentist = app.active("d1");
        app.patient("d1", "p1", "Ada", "Lovelace");

        let a = book(
            &app,
            &dentist,
            slot("p1", "2025-06-02T11:00:00+02:00", "2025-06-02T09:30"),
        )
        .await
        .unwrap();
        assert_eq!(a.starts_at, "2025-06-02 09:00:00");
        assert_eq!(a.ends_at, "2025-06-02 09:30:00");
        assert_eq!(a.status, AppointmentStatus::Scheduled);
        assert_eq!(a.patient_name, "Ada Lovelace");

        let backwards = book(&app, &dentist, slot("p1", "2025-06-02T10:00", "2025-06-02T09:00"))
            .await
            .unwrap_err();
        assert_eq!(backwards.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn overlapping_slots_conflict_but_touching_ones_do_not() {
        let app = TestApp::new();
        let dentist = app.active("d1");
        app.patient("d1", "p1", "Ada", "Lovelace");
        app.patient("d1", "p2", "Alan", "Turing");

        let first = book(&app, &dentist, slot("p1", "2025-06-02T09:00", "2025-06-02T10:00"))
            .await
            .unwrap();
        let clash = book(&app, &dentist, slot("p2", "2025-06-02T09:30", "2025-06-02T10:30"))
            .await
            .unwrap_err();
        assert_eq!(clash.status(), StatusCode::CONFLICT);
        book(&app, &dentist, slot("p2", "2025-06-02T10:00", "2025-06-02T11:00"))
            .await
            .unwrap();

        // Cancelling frees the slot.
        let _ = update_appointment(
            State(app.state.db.clone()),
            dentist.clone(),
            Path(first.id),
            Json(UpdateAppointmentRequest {
                status: Some(AppointmentStatus::Cancelled),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        book(&app, &dentist, slot("p2", "2025-06-02T09:00", "2025-06-02T10:00"))
            .await
            .unwrap();

        // Another dentist's calendar is independent.
        let other = app.active("d2");
        app.patient("d2", "q1", "Grace", "Hopper");
        book(&app, &other, slot("q1", "2025-06-02T09:00", "2025-06-02T10:00"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn foreign_patient_is_not_found() {
        let app = TestApp::new();
        app.dentist("d2");
        app.patient("d2", "q1", "Grace", "Hopper");
        let dentist = app.active("d1");
        let err = book(&app, &dentist, slot("q1", "2025-06-02T09:00", "2025-06-02T10:00"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn status_only_leaves_scheduled() {
        let app = TestApp::new();
        let dentist = app.active("d1");
        app.patient("d1", "p1", "Ada", "Lovelace");
        let a = book(&app, &dentist, slot("p1", "2025-06-02T09:00", "2025-06-02T10:00"))
            .await
            .unwrap();

        let update = |req: UpdateAppointmentRequest| {
            update_appointment(
                State(app.state.db.clone()),
                dentist.clone(),
                Path(a.id.clone()),
                Json(req),
            )
        };

        let Json(done) = update(UpdateAppointmentRequest {
            status: Some(AppointmentStatus::Completed),
            notes: Some("all good".into()),
            ..Default::default()
        })
        .await
        .unwrap();
        assert_eq!(done.status, AppointmentStatus::Completed);
        assert_eq!(done.reason.as_deref(), Some("checkup"));

        let err = update(UpdateAppointmentRequest {
            status: Some(AppointmentStatus::Cancelled),
            ..Default::default()
        })
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = update(UpdateAppointmentRequest {
            starts_at: Some("2025-06-03T09:00".into()),
            ends_at: Some("2025-06-03T10:00".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reschedule_ignores_itself_when_checking_overlap() {
        let app = TestApp::new();
        let dentist = app.active("d1");
        app.patient("d1", "p1", "Ada", "Lovelace");
        let a = book(&app, &dentist, slot("p1", "2025-06-02T09:00", "2025-06-02T10:00"))
            .await
            .unwrap();

        let Json(moved) = update_appointment(
            State(app.state.db.clone()),
            dentist,
            Path(a.id),
            Json(UpdateAppointmentRequest {
                ends_at: Some("2025-06-02T10:30".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(moved.starts_at, "2025-06-02 09:00:00");
        assert_eq!(moved.ends_at, "2025-06-02 10:30:00");
    }

    #[tokio::test]
    async fn list_filters_by_window_and_status() {
        let app = TestApp::new();
        let dentist = app.active("d1");
        app.patient("d1", "p1", "Ada", "Lovelace");
        for (s, e) in [
            ("2025-06-02T09:00", "2025-06-02T10:00"),
            ("2025-06-03T09:00", "2025-06-03T10:00"),
            ("2025-06-04T09:00", "2025-06-04T10:00"),
        ] {
            book(&app, &dentist, slot("p1", s, e)).await.unwrap();
        }

        let Json(window) = list_appointments(
            State(app.state.db.clone()),
            dentist.clone(),
            Query(AppointmentListQuery {
                from: Some("2025-06-03T00:00".into()),
                to: Some("2025-06-04T00:00".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(window.appointments.len(), 1);
        assert_eq!(window.appointments[0].starts_at, "2025-06-03 09:00:00");

        let Json(completed) = list_appointments(
            State(app.state.db.clone()),
            dentist.clone(),
            Query(AppointmentListQuery {
                status: Some(AppointmentStatus::Completed),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert!(completed.appointments.is_empty());

        let bad = list_appointments(
            State(app.state.db.clone()),
            dentist,
            Query(AppointmentListQuery {
                from: Some("yesterday".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }
}
