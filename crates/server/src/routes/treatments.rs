use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rusqlite::Connection;
use uuid::Uuid;

use dentalcare_api::{
    CreateTreatmentRequest, ListTreatmentsResponse, OkResponse, TreatmentResponse,
    UpdateTreatmentRequest, db, service,
};

use crate::error::ApiErr;
use crate::routes::auth::ActiveDentist;
use crate::storage::{
    Db, conflict_or_db, sq_count, sq_execute, sq_query_map, sq_query_opt, treatment_from_row,
};

const DESCRIPTION_MAX: usize = 1000;
const DUPLICATE_NAME: &str = "a treatment with this name already exists";

pub(crate) fn load_treatment(
    conn: &Connection,
    dentist_id: &str,
    id: &str,
) -> Result<TreatmentResponse, ApiErr> {
    sq_query_opt(conn, db::treatments::get(dentist_id, id), treatment_from_row)
        .map_err(ApiErr::from_db("load treatment"))?
        .ok_or_else(|| ApiErr::not_found("treatment not found"))
}

fn ensure_unique_name(
    conn: &Connection,
    dentist_id: &str,
    name: &str,
    exclude_id: Option<&str>,
) -> Result<(), ApiErr> {
    let taken = sq_count(conn, db::treatments::count_named(dentist_id, name, exclude_id))
        .map_err(ApiErr::from_db("check treatment name"))?;
    if taken > 0 {
        return Err(ApiErr::conflict(DUPLICATE_NAME));
    }
    Ok(())
}

/// POST /api/treatments
pub async fn create_treatment(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
    Json(req): Json<CreateTreatmentRequest>,
) -> Result<(StatusCode, Json<TreatmentResponse>), ApiErr> {
    let name = service::validate_name("name", &req.name)?;
    let description =
        service::validate_text("description", req.description.as_deref(), DESCRIPTION_MAX)?;
    let price_cents = service::validate_price_cents(req.price_cents)?;
    let id = Uuid::new_v4().to_string();

    let conn = store.conn();
    ensure_unique_name(&conn, &dentist.dentist_id, &name, None)?;
    sq_execute(
        &conn,
        db::treatments::insert(
            &id,
            &dentist.dentist_id,
            &name,
            description.as_deref(),
            price_cents,
        ),
    )
    .map_err(conflict_or_db(DUPLICATE_NAME, "insert treatment"))?;
    let treatment = load_treatment(&conn, &dentist.dentist_id, &id)?;
    Ok((StatusCode::CREATED, Json(treatment)))
}

/// GET /api/treatments
pub async fn list_treatments(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
) -> Result<Json<ListTreatmentsResponse>, ApiErr> {
    let conn = store.conn();
    let treatments = sq_query_map(
        &conn,
        db::treatments::list(&dentist.dentist_id),
        treatment_from_row,
    )
    .map_err(ApiErr::from_db("list treatments"))?;
    Ok(Json(ListTreatmentsResponse { treatments }))
}

/// GET /api/treatments/{id}
pub async fn get_treatment(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
    Path(id): Path<String>,
) -> Result<Json<TreatmentResponse>, ApiErr> {
    let conn = store.conn();
    load_treatment(&conn, &dentist.dentist_id, &id).map(Json)
}

/// PUT /api/treatments/{id}
///
/// Changing the price leaves already recorded tooth treatments untouched.
pub async fn update_treatment(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
    Path(id): Path<String>,
    Json(req): Json<UpdateTreatmentRequest>,
) -> Result<Json<TreatmentResponse>, ApiErr> {
    let conn = store.conn();
    let current = load_treatment(&conn, &dentist.dentist_id, &id)?;

    let name = match req.name {
        Some(ref v) => service::validate_name("name", v)?,
        None => current.name,
    };
    let description = match req.description {
        Some(ref v) => service::validate_text("description", Some(v), DESCRIPTION_MAX)?,
        None => current.description,
    };
    let price_cents = match req.price_cents {
        Some(v) => service::validate_price_cents(v)?,
        None => current.price_cents,
    };

    ensure_unique_name(&conn, &dentist.dentist_id, &name, Some(&id))?;
    sq_execute(
        &conn,
        db::treatments::update(
            &dentist.dentist_id,
            &id,
            &name,
            description.as_deref(),
            price_cents,
        ),
    )
    .map_err(conflict_or_db(DUPLICATE_NAME, "update treatment"))?;
    load_treatment(&conn, &dentist.dentist_id, &id).map(Json)
}

/// DELETE /api/treatments/{id}: refused while any tooth treatment uses it.
pub async fn delete_treatment(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ApiErr> {
    let mut conn = store.conn();
    let tx = conn
        .transaction()
        .map_err(ApiErr::from_db("begin delete treatment"))?;
    load_treatment(&tx, &dentist.dentist_id, &id)?;
    let uses = sq_count(&tx, db::treatments::usage_count(&id))
        .map_err(ApiErr::from_db("count treatment usage"))?;
    if uses > 0 {
        return Err(ApiErr::conflict(format!(
            "treatment is used by {uses} tooth treatment(s)"
        )));
    }
    sq_execute(&tx, db::treatments::delete(&dentist.dentist_id, &id))
        .map_err(ApiErr::from_db("delete treatment"))?;
    tx.commit()
        .map_err(ApiErr::from_db("commit delete treatment"))?;
    Ok(Json(OkResponse { ok: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestApp;

    fn filling(price_cents: i64) -> CreateTreatmentRequest {
        CreateTreatmentRequest {
            name: "Filling".into(),
            description: Some("composite".into()),
            price_cents,
        }
    }

    #[tokio::test]
    async fn names_are_unique_per_dentist() {
        let app = TestApp::new();
        let d1 = app.active("d1");
        let d2 = app.active("d2");

        let (status, Json(t)) =
            create_treatment(State(app.state.db.clone()), d1.clone(), Json(filling(8000)))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(t.price_cents, 8000);

        let err = create_treatment(State(app.state.db.clone()), d1.clone(), Json(filling(9000)))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let _ = create_treatment(State(app.state.db.clone()), d2, Json(filling(9000)))
            .await
            .unwrap();

        let err = create_treatment(State(app.state.db.clone()), d1, Json(filling(-1)))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_keeps_absent_fields_and_rejects_taken_names() {
        let app = TestApp::new();
        let dentist = app.active("d1");
        let (_, Json(t)) =
            create_treatment(State(app.state.db.clone()), dentist.clone(), Json(filling(8000)))
                .await
                .unwrap();
        let _ = create_treatment(
            State(app.state.db.clone()),
            dentist.clone(),
            Json(CreateTreatmentRequest {
                name: "Crown".into(),
                description: None,
                price_cents: 60000,
            }),
        )
        .await
        .unwrap();

        let Json(updated) = update_treatment(
            State(app.state.db.clone()),
            dentist.clone(),
            Path(t.id.clone()),
            Json(UpdateTreatmentRequest {
                price_cents: Some(8500),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "Filling");
        assert_eq!(updated.description.as_deref(), Some("composite"));
        assert_eq!(updated.price_cents, 8500);

        // Renaming to itself is fine, to a sibling is not.
        let _ = update_treatment(
            State(app.state.db.clone()),
            dentist.clone(),
            Path(t.id.clone()),
            Json(UpdateTreatmentRequest {
                name: Some("Filling".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        let err = update_treatment(
            State(app.state.db.clone()),
            dentist,
            Path(t.id),
            Json(UpdateTreatmentRequest {
                name: Some("Crown".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn foreign_treatments_are_not_found() {
        let app = TestApp::new();
        let owner = app.active("d1");
        let (_, Json(t)) = create_treatment(State(app.state.db.clone()), owner, Json(filling(1)))
            .await
            .unwrap();

        let other = app.active("d2");
        let err = get_treatment(State(app.state.db.clone()), other.clone(), Path(t.id.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let err = delete_treatment(State(app.state.db.clone()), other, Path(t.id))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unused_treatment_can_be_deleted() {
        let app = TestApp::new();
        let dentist = app.active("d1");
        let (_, Json(t)) =
            create_treatment(State(app.state.db.clone()), dentist.clone(), Json(filling(1)))
                .await
                .unwrap();
        let _ = delete_treatment(State(app.state.db.clone()), dentist.clone(), Path(t.id))
            .await
            .unwrap();
        let Json(list) = list_treatments(State(app.state.db.clone()), dentist)
            .await
            .unwrap();
        assert!(list.treatments.is_empty());
    }
}
