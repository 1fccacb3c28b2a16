use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rusqlite::Connection;
use uuid::Uuid;

use dentalcare_api::{
    CreateMedicineRequest, ListMedicinesResponse, MedicineResponse, OkResponse,
    UpdateMedicineRequest, db, service,
};

use crate::error::ApiErr;
use crate::routes::auth::ActiveDentist;
use crate::storage::{
    Db, conflict_or_db, medicine_from_row, sq_count, sq_execute, sq_query_map, sq_query_opt,
};

const DOSAGE_MAX: usize = 200;
const DESCRIPTION_MAX: usize = 1000;
const DUPLICATE_NAME: &str = "a medicine with this name already exists";

pub(crate) fn load_medicine(
    conn: &Connection,
    dentist_id: &str,
    id: &str,
) -> Result<MedicineResponse, ApiErr> {
    sq_query_opt(conn, db::medicines::get(dentist_id, id), medicine_from_row)
        .map_err(ApiErr::from_db("load medicine"))?
        .ok_or_else(|| ApiErr::not_found("medicine not found"))
}

fn ensure_unique_name(
    conn: &Connection,
    dentist_id: &str,
    name: &str,
    exclude_id: Option<&str>,
) -> Result<(), ApiErr> {
    let taken = sq_count(conn, db::medicines::count_named(dentist_id, name, exclude_id))
        .map_err(ApiErr::from_db("check medicine name"))?;
    if taken > 0 {
        return Err(ApiErr::conflict(DUPLICATE_NAME));
    }
    Ok(())
}

/// POST /api/medicines
pub async fn create_medicine(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
    Json(req): Json<CreateMedicineRequest>,
) -> Result<(StatusCode, Json<MedicineResponse>), ApiErr> {
    let name = service::validate_name("name", &req.name)?;
    let dosage = service::validate_text("dosage", req.dosage.as_deref(), DOSAGE_MAX)?;
    let description =
        service::validate_text("description", req.description.as_deref(), DESCRIPTION_MAX)?;
    let id = Uuid::new_v4().to_string();

    let conn = store.conn();
    ensure_unique_name(&conn, &dentist.dentist_id, &name, None)?;
    sq_execute(
        &conn,
        db::medicines::insert(
            &id,
            &dentist.dentist_id,
            &name,
            dosage.as_deref(),
            description.as_deref(),
        ),
    )
    .map_err(conflict_or_db(DUPLICATE_NAME, "insert medicine"))?;
    let medicine = load_medicine(&conn, &dentist.dentist_id, &id)?;
    Ok((StatusCode::CREATED, Json(medicine)))
}

/// GET /api/medicines
pub async fn list_medicines(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
) -> Result<Json<ListMedicinesResponse>, ApiErr> {
    let conn = store.conn();
    let medicines = sq_query_map(
        &conn,
        db::medicines::list(&dentist.dentist_id),
        medicine_from_row,
    )
    .map_err(ApiErr::from_db("list medicines"))?;
    Ok(Json(ListMedicinesResponse { medicines }))
}

/// GET /api/medicines/{id}
pub async fn get_medicine(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
    Path(id): Path<String>,
) -> Result<Json<MedicineResponse>, ApiErr> {
    let conn = store.conn();
    load_medicine(&conn, &dentist.dentist_id, &id).map(Json)
}

/// PUT /api/medicines/{id}
pub async fn update_medicine(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
    Path(id): Path<String>,
    Json(req): Json<UpdateMedicineRequest>,
) -> Result<Json<MedicineResponse>, ApiErr> {
    let conn = store.conn();
    let current = load_medicine(&conn, &dentist.dentist_id, &id)?;

    let name = match req.name {
        Some(ref v) => service::validate_name("name", v)?,
        None => current.name,
    };
    let dosage = match req.dosage {
        Some(ref v) => service::validate_text("dosage", Some(v), DOSAGE_MAX)?,
        None => current.dosage,
    };
    let description = match req.description {
        Some(ref v) => service::validate_text("description", Some(v), DESCRIPTION_MAX)?,
        None => current.description,
    };

    ensure_unique_name(&conn, &dentist.dentist_id, &name, Some(&id))?;
    sq_execute(
        &conn,
        db::medicines::update(
            &dentist.dentist_id,
            &id,
            &name,
            dosage.as_deref(),
            description.as_deref(),
        ),
    )
    .map_err(conflict_or_db(DUPLICATE_NAME, "update medicine"))?;
    load_medicine(&conn, &dentist.dentist_id, &id).map(Json)
}

/// DELETE /api/medicines/{id}
pub async fn delete_medicine(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ApiErr> {
    let mut conn = store.conn();
    let tx = conn
        .transaction()
        .map_err(ApiErr::from_db("begin delete medicine"))?;
    load_medicine(&tx, &dentist.dentist_id, &id)?;
    let uses = sq_count(&tx, db::medicines::usage_count(&id))
        .map_err(ApiErr::from_db("count medicine usage"))?;
    if uses > 0 {
        return Err(ApiErr::conflict(format!(
            "medicine is used by {uses} tooth treatment(s)"
        )));
    }
    sq_execute(&tx, db::medicines::delete(&dentist.dentist_id, &id))
        .map_err(ApiErr::from_db("delete medicine"))?;
    tx.commit()
        .map_err(ApiErr::from_db("commit delete medicine"))?;
    Ok(Json(OkResponse { ok: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestApp;

    fn amoxicillin() -> CreateMedicineRequest {
        CreateMedicineRequest {
            name: "Amoxicillin".into(),
            dosage: Some("500mg every 8h".into()),
            description: None,
        }
    }

    #[tokio::test]
    async fn create_list_and_clear_dosage() {
        let app = TestApp::new();
        let dentist = app.active("d1");
        let (_, Json(m)) =
            create_medicine(State(app.state.db.clone()), dentist.clone(), Json(amoxicillin()))
                .await
                .unwrap();
        let _ = create_medicine(
            State(app.state.db.clone()),
            dentist.clone(),
            Json(CreateMedicineRequest {
                name: "Ibuprofen".into(),
                dosage: None,
                description: Some("  ".into()),
            }),
        )
        .await
        .unwrap();

        let Json(list) = list_medicines(State(app.state.db.clone()), dentist.clone())
            .await
            .unwrap();
        let names: Vec<_> = list.medicines.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Amoxicillin", "Ibuprofen"]);
        assert_eq!(list.medicines[1].description, None);

        let Json(cleared) = update_medicine(
            State(app.state.db.clone()),
            dentist,
            Path(m.id),
            Json(UpdateMedicineRequest {
                dosage: Some(String::new()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(cleared.name, "Amoxicillin");
        assert_eq!(cleared.dosage, None);
    }

    #[tokio::test]
    async fn duplicate_name_conflicts() {
        let app = TestApp::new();
        let dentist = app.active("d1");
        let _ = create_medicine(State(app.state.db.clone()), dentist.clone(), Json(amoxicillin()))
            .await
            .unwrap();
        let err = create_medicine(State(app.state.db.clone()), dentist, Json(amoxicillin()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn foreign_medicine_is_not_found() {
        let app = TestApp::new();
        let (_, Json(m)) =
            create_medicine(State(app.state.db.clone()), app.active("d1"), Json(amoxicillin()))
                .await
                .unwrap();
        let err = update_medicine(
            State(app.state.db.clone()),
            app.active("d2"),
            Path(m.id),
            Json(UpdateMedicineRequest::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
