use axum::{
    Json,
    extract::{Path, State},
};

use dentalcare_api::teeth::is_valid_tooth_number;
use dentalcare_api::{
    PatientToothResponse, ToothChartResponse, TreatmentHistoryResponse, UpdateToothRequest, db,
    service,
};

use crate::error::ApiErr;
use crate::routes::auth::ActiveDentist;
use crate::routes::patients::ensure_patient;
use crate::storage::{
    Db, sq_execute, sq_query_map, sq_query_opt, tooth_from_row, tooth_treatment_from_row,
};

const TOOTH_NOTES_MAX: usize = 1000;

/// GET /api/patients/{id}/teeth: all 52 slots in FDI order.
pub async fn get_chart(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
    Path(patient_id): Path<String>,
) -> Result<Json<ToothChartResponse>, ApiErr> {
    let conn = store.conn();
    ensure_patient(&conn, &dentist.dentist_id, &patient_id)?;
    let teeth = sq_query_map(
        &conn,
        db::teeth::chart(&dentist.dentist_id, &patient_id),
        tooth_from_row,
    )
    .map_err(ApiErr::from_db("load tooth chart"))?;
    Ok(Json(ToothChartResponse { patient_id, teeth }))
}

/// PUT /api/patients/{id}/teeth/{number}
pub async fn update_tooth(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
    Path((patient_id, number)): Path<(String, u8)>,
    Json(req): Json<UpdateToothRequest>,
) -> Result<Json<PatientToothResponse>, ApiErr> {
    if !is_valid_tooth_number(number) {
        return Err(ApiErr::bad_request(format!(
            "{number} is not an FDI tooth number"
        )));
    }
    let notes = service::validate_text("notes", req.notes.as_deref(), TOOTH_NOTES_MAX)?;

    let conn = store.conn();
    ensure_patient(&conn, &dentist.dentist_id, &patient_id)?;
    let slot_id: i64 = sq_query_opt(
        &conn,
        db::teeth::find_slot(&dentist.dentist_id, &patient_id, number),
        |r| r.get(0),
    )
    .map_err(ApiErr::from_db("find tooth slot"))?
    .ok_or_else(|| ApiErr::not_found("tooth not found"))?;

    sq_execute(
        &conn,
        db::teeth::update_slot(slot_id, req.condition, notes.as_deref()),
    )
    .map_err(ApiErr::from_db("update tooth"))?;

    let chart = sq_query_map(
        &conn,
        db::teeth::chart(&dentist.dentist_id, &patient_id),
        tooth_from_row,
    )
    .map_err(ApiErr::from_db("load tooth chart"))?;
    chart
        .into_iter()
        .find(|t| t.tooth_number == number)
        .map(Json)
        .ok_or_else(|| ApiErr::not_found("tooth not found"))
}

/// GET /api/patients/{id}/history: every tooth treatment, newest first.
pub async fn history(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
    Path(patient_id): Path<String>,
) -> Result<Json<TreatmentHistoryResponse>, ApiErr> {
    let conn = store.conn();
    ensure_patient(&conn, &dentist.dentist_id, &patient_id)?;
    let entries = sq_query_map(
        &conn,
        db::tooth_treatments::list_for_patient(&dentist.dentist_id, &patient_id),
        tooth_treatment_from_row,
    )
    .map_err(ApiErr::from_db("load treatment history"))?;
    Ok(Json(TreatmentHistoryResponse {
        patient_id,
        entries,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestApp;
    use axum::http::StatusCode;
    use dentalcare_api::{Dentition, ToothCondition};

    #[tokio::test]
    async fn chart_has_every_slot() {
        let app = TestApp::new();
        let dentist = app.active("d1");
        app.patient("d1", "p1", "Ada", "Lovelace");

        let Json(chart) = get_chart(State(app.state.db.clone()), dentist, Path("p1".into()))
            .await
            .unwrap();
        assert_eq!(chart.teeth.len(), 52);
        let primary = chart
            .teeth
            .iter()
            .filter(|t| t.dentition == Dentition::Primary)
            .count();
        assert_eq!(primary, 20);
        assert_eq!(chart.teeth.last().unwrap().tooth_number, 85);
    }

    #[tokio::test]
    async fn update_sets_condition_and_notes() {
        let app = TestApp::new();
        let dentist = app.active("d1");
        app.patient("d1", "p1", "Ada", "Lovelace");

        let Json(tooth) = update_tooth(
            State(app.state.db.clone()),
            dentist.clone(),
            Path(("p1".into(), 36)),
            Json(UpdateToothRequest {
                condition: ToothCondition::RootCanal,
                notes: Some("mesial canal calcified".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(tooth.tooth_number, 36);
        assert_eq!(tooth.name, "lower left first molar");
        assert_eq!(tooth.condition, ToothCondition::RootCanal);

        let Json(chart) = get_chart(State(app.state.db.clone()), dentist, Path("p1".into()))
            .await
            .unwrap();
        let changed: Vec<_> = chart
            .teeth
            .iter()
            .filter(|t| t.condition != ToothCondition::Healthy)
            .map(|t| t.tooth_number)
            .collect();
        assert_eq!(changed, [36]);
    }

    #[tokio::test]
    async fn invalid_numbers_and_foreign_patients() {
        let app = TestApp::new();
        let dentist = app.active("d1");
        app.dentist("d2");
        app.patient("d2", "p2", "Alan", "Turing");
        app.patient("d1", "p1", "Ada", "Lovelace");

        for number in [0, 19, 49, 56, 90] {
            let err = update_tooth(
                State(app.state.db.clone()),
                dentist.clone(),
                Path(("p1".into(), number)),
                Json(UpdateToothRequest {
                    condition: ToothCondition::Missing,
                    notes: None,
                }),
            )
            .await
            .unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "tooth {number}");
        }

        let err = get_chart(State(app.state.db.clone()), dentist.clone(), Path("p2".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let err = history(State(app.state.db.clone()), dentist, Path("p2".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
