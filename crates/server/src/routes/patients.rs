use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use dentalcare_api::db::patients::PatientValues;
use dentalcare_api::{
    CreatePatientRequest, ListPatientsResponse, OkResponse, PatientListQuery, PatientResponse,
    UpdatePatientRequest, db, service,
};

use crate::error::ApiErr;
use crate::routes::auth::ActiveDentist;
use crate::storage::{Db, patient_from_row, sq_execute, sq_query_map, sq_query_opt};

const ADDRESS_MAX: usize = 200;
const NOTES_MAX: usize = 2000;

/// 404 unless `patient_id` belongs to `dentist_id`.
pub(crate) fn ensure_patient(
    conn: &Connection,
    dentist_id: &str,
    patient_id: &str,
) -> Result<(), ApiErr> {
    sq_query_opt(conn, db::patients::exists(dentist_id, patient_id), |_| Ok(()))
        .map_err(ApiErr::from_db("check patient"))?
        .ok_or_else(|| ApiErr::not_found("patient not found"))
}

fn load_patient(conn: &Connection, dentist_id: &str, id: &str) -> Result<PatientResponse, ApiErr> {
    sq_query_opt(conn, db::patients::get(dentist_id, id), patient_from_row)
        .map_err(ApiErr::from_db("load patient"))?
        .ok_or_else(|| ApiErr::not_found("patient not found"))
}

/// POST /api/patients
pub async fn create_patient(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
    Json(req): Json<CreatePatientRequest>,
) -> Result<(StatusCode, Json<PatientResponse>), ApiErr> {
    let values = PatientValues {
        first_name: service::validate_name("first_name", &req.first_name)?,
        last_name: service::validate_name("last_name", &req.last_name)?,
        birth_date: service::validate_birth_date(
            req.birth_date.as_deref(),
            Utc::now().date_naive(),
        )?,
        gender: req.gender,
        phone: service::validate_phone(req.phone.as_deref())?,
        email: service::validate_optional_email(req.email.as_deref())?,
        address: service::validate_text("address", req.address.as_deref(), ADDRESS_MAX)?,
        notes: service::validate_text("notes", req.notes.as_deref(), NOTES_MAX)?,
    };
    let id = Uuid::new_v4().to_string();

    let conn = store.conn();
    sq_execute(&conn, db::patients::insert(&id, &dentist.dentist_id, &values))
        .map_err(ApiErr::from_db("insert patient"))?;
    let patient = load_patient(&conn, &dentist.dentist_id, &id)?;
    Ok((StatusCode::CREATED, Json(patient)))
}

/// GET /api/patients?search=
pub async fn list_patients(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
    Query(q): Query<PatientListQuery>,
) -> Result<Json<ListPatientsResponse>, ApiErr> {
    let conn = store.conn();
    let patients = sq_query_map(
        &conn,
        db::patients::list(&dentist.dentist_id, q.search.as_deref()),
        patient_from_row,
    )
    .map_err(ApiErr::from_db("list patients"))?;
    Ok(Json(ListPatientsResponse { patients }))
}

/// GET /api/patients/{id}
pub async fn get_patient(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
    Path(id): Path<String>,
) -> Result<Json<PatientResponse>, ApiErr> {
    let conn = store.conn();
    load_patient(&conn, &dentist.dentist_id, &id).map(Json)
}

/// PUT /api/patients/{id}: absent fields are kept, blank optional fields cleared.
pub async fn update_patient(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
    Path(id): Path<String>,
    Json(req): Json<UpdatePatientRequest>,
) -> Result<Json<PatientResponse>, ApiErr> {
    let conn = store.conn();
    let current = load_patient(&conn, &dentist.dentist_id, &id)?;

    let values = PatientValues {
        first_name: match req.first_name {
            Some(ref v) => service::validate_name("first_name", v)?,
            None => current.first_name,
        },
        last_name: match req.last_name {
            Some(ref v) => service::validate_name("last_name", v)?,
            None => current.last_name,
        },
        birth_date: match req.birth_date {
            Some(ref v) => service::validate_birth_date(Some(v), Utc::now().date_naive())?,
            None => current.birth_date,
        },
        gender: req.gender.unwrap_or(current.gender),
        phone: match req.phone {
            Some(ref v) => service::validate_phone(Some(v))?,
            None => current.phone,
        },
        email: match req.email {
            Some(ref v) => service::validate_optional_email(Some(v))?,
            None => current.email,
        },
        address: match req.address {
            Some(ref v) => service::validate_text("address", Some(v), ADDRESS_MAX)?,
            None => current.address,
        },
        notes: match req.notes {
            Some(ref v) => service::validate_text("notes", Some(v), NOTES_MAX)?,
            None => current.notes,
        },
    };

    sq_execute(&conn, db::patients::update(&dentist.dentist_id, &id, &values))
        .map_err(ApiErr::from_db("update patient"))?;
    load_patient(&conn, &dentist.dentist_id, &id).map(Json)
}

/// DELETE /api/patients/{id}: removes the patient's whole record.
pub async fn delete_patient(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ApiErr> {
    let dentist_id = dentist.dentist_id.as_str();
    let mut conn = store.conn();
    let tx = conn
        .transaction()
        .map_err(ApiErr::from_db("begin delete patient"))?;

    ensure_patient(&tx, dentist_id, &id)?;
    for step in [
        db::patients::delete_tooth_treatments(dentist_id, &id),
        db::patients::delete_appointments(dentist_id, &id),
        db::patients::delete_teeth(dentist_id, &id),
        db::patients::delete(dentist_id, &id),
    ] {
        sq_execute(&tx, step).map_err(ApiErr::from_db("delete patient"))?;
    }
    tx.commit().map_err(ApiErr::from_db("commit delete patient"))?;

    tracing::info!(dentist_id, patient_id = %id, "patient deleted");
    Ok(Json(OkResponse { ok: true }))
}
