use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use dentalcare_api::teeth::is_valid_tooth_number;
use dentalcare_api::{
    AppointmentStatus, CreateToothTreatmentRequest, ListToothTreatmentsResponse, OkResponse,
    ToothTreatmentResponse, db, service,
};

use crate::error::ApiErr;
use crate::routes::appointments::load_appointment;
use crate::routes::auth::ActiveDentist;
use crate::routes::medicines::load_medicine;
use crate::routes::treatments::load_treatment;
use crate::storage::{Db, sq_execute, sq_query_map, sq_query_opt, tooth_treatment_from_row};

const NOTES_MAX: usize = 1000;

/// POST /api/appointments/{id}/treatments
pub async fn create_entry(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
    Path(appointment_id): Path<String>,
    Json(req): Json<CreateToothTreatmentRequest>,
) -> Result<(StatusCode, Json<ToothTreatmentResponse>), ApiErr> {
    if !is_valid_tooth_number(req.tooth_number) {
        return Err(ApiErr::bad_request(format!(
            "{} is not an FDI tooth number",
            req.tooth_number
        )));
    }
    let notes = service::validate_text("notes", req.notes.as_deref(), NOTES_MAX)?;
    let price_override = req
        .price_cents
        .map(service::validate_price_cents)
        .transpose()?;
    let medicine_id = req
        .medicine_id
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty());
    let dentist_id = dentist.dentist_id.as_str();
    let id = Uuid::new_v4().to_string();

    let conn = store.conn();
    let appointment = load_appointment(&conn, dentist_id, &appointment_id)?;
    if appointment.status == AppointmentStatus::Cancelled {
        return Err(ApiErr::bad_request(
            "cannot record treatments on a cancelled appointment",
        ));
    }
    let treatment = load_treatment(&conn, dentist_id, &req.treatment_id)?;
    if let Some(medicine_id) = medicine_id {
        load_medicine(&conn, dentist_id, medicine_id)?;
    }
    let slot_id: i64 = sq_query_opt(
        &conn,
        db::teeth::find_slot(dentist_id, &appointment.patient_id, req.tooth_number),
        |r| r.get(0),
    )
    .map_err(ApiErr::from_db("find tooth slot"))?
    .ok_or_else(|| ApiErr::not_found("tooth not found"))?;

    sq_execute(
        &conn,
        db::tooth_treatments::insert(
            &id,
            &appointment_id,
            slot_id,
            &treatment.id,
            medicine_id,
            notes.as_deref(),
            price_override.unwrap_or(treatment.price_cents),
        ),
    )
    .map_err(ApiErr::from_db("insert tooth treatment"))?;

    let entry = sq_query_opt(
        &conn,
        db::tooth_treatments::get(dentist_id, &appointment_id, &id),
        tooth_treatment_from_row,
    )
    .map_err(ApiErr::from_db("load tooth treatment"))?
    .ok_or_else(|| ApiErr::internal("tooth treatment vanished after insert"))?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// GET /api/appointments/{id}/treatments
pub async fn list_entries(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
    Path(appointment_id): Path<String>,
) -> Result<Json<ListToothTreatmentsResponse>, ApiErr> {
    let conn = store.conn();
    load_appointment(&conn, &dentist.dentist_id, &appointment_id)?;
    let entries = sq_query_map(
        &conn,
        db::tooth_treatments::list_for_appointment(&dentist.dentist_id, &appointment_id),
        tooth_treatment_from_row,
    )
    .map_err(ApiErr::from_db("list tooth treatments"))?;
    Ok(Json(ListToothTreatmentsResponse { entries }))
}

/// DELETE /api/appointments/{id}/treatments/{entry_id}
pub async fn delete_entry(
    State(store): State<Db>,
    ActiveDentist(dentist): ActiveDentist,
    Path((appointment_id, entry_id)): Path<(String, String)>,
) -> Result<Json<OkResponse>, ApiErr> {
    let conn = store.conn();
    sq_query_opt(
        &conn,
        db::tooth_treatments::get(&dentist.dentist_id, &appointment_id, &entry_id),
        |_| Ok(()),
    )
    .map_err(ApiErr::from_db("load tooth treatment"))?
    .ok_or_else(|| ApiErr::not_found("tooth treatment not found"))?;
    sq_execute(&conn, db::tooth_treatments::delete(&entry_id))
        .map_err(ApiErr::from_db("delete tooth treatment"))?;
    Ok(Json(OkResponse { ok: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::{appointments, medicines, teeth, treatments};
    use crate::test_support::TestApp;
    use dentalcare_api::{
        CreateAppointmentRequest, CreateMedicineRequest, CreateTreatmentRequest,
        UpdateAppointmentRequest,
    };

    struct Visit {
        app: TestApp,
        dentist: ActiveDentist,
        appointment_id: String,
        treatment_id: String,
        medicine_id: String,
    }

    async fn visit() -> Visit {
        let app = TestApp::new();
        let dentist = app.active("d1");
        app.patient("d1", "p1", "Ada", "Lovelace");
        let db = || State(app.state.db.clone());

        let (_, Json(appointment)) = appointments::create_appointment(
            db(),
            dentist.clone(),
            Json(CreateAppointmentRequest {
                patient_id: "p1".into(),
                starts_at: "2025-06-02T09:00".into(),
                ends_at: "2025-06-02T10:00".into(),
                reason: None,
                notes: None,
            }),
        )
        .await
        .unwrap();
        let (_, Json(treatment)) = treatments::create_treatment(
            db(),
            dentist.clone(),
            Json(CreateTreatmentRequest {
                name: "Filling".into(),
                description: None,
                price_cents: 8000,
            }),
        )
        .await
        .unwrap();
        let (_, Json(medicine)) = medicines::create_medicine(
            db(),
            dentist.clone(),
            Json(CreateMedicineRequest {
                name: "Lidocaine".into(),
                dosage: Some("2%".into()),
                description: None,
            }),
        )
        .await
        .unwrap();

        Visit {
            app,
            dentist,
            appointment_id: appointment.id,
            treatment_id: treatment.id,
            medicine_id: medicine.id,
        }
    }

    impl Visit {
        fn db(&self) -> State<Db> {
            State(self.app.state.db.clone())
        }

        fn request(&self, tooth_number: u8) -> CreateToothTreatmentRequest {
            CreateToothTreatmentRequest {
                tooth_number,
                treatment_id: self.treatment_id.clone(),
                medicine_id: Some(self.medicine_id.clone()),
                notes: None,
                price_cents: None,
            }
        }

        async fn record(
            &self,
            req: CreateToothTreatmentRequest,
        ) -> Result<ToothTreatmentResponse, ApiErr> {
            create_entry(
                self.db(),
                self.dentist.clone(),
                Path(self.appointment_id.clone()),
                Json(req),
            )
            .await
            .map(|(_, Json(e))| e)
        }
    }

    #[tokio::test]
    async fn entry_defaults_to_catalogue_price() {
        let v = visit().await;
        let entry = v.record(v.request(36)).await.unwrap();
        assert_eq!(entry.tooth_number, 36);
        assert_eq!(entry.price_cents, 8000);
        assert_eq!(entry.treatment_name, "Filling");
        assert_eq!(entry.medicine_name.as_deref(), Some("Lidocaine"));
        assert_eq!(entry.appointment_starts_at, "2025-06-02 09:00:00");

        let discounted = v
            .record(CreateToothTreatmentRequest {
                price_cents: Some(5000),
                medicine_id: None,
                ..v.request(85)
            })
            .await
            .unwrap();
        assert_eq!(discounted.price_cents, 5000);
        assert_eq!(discounted.medicine_id, None);

        let Json(list) = list_entries(v.db(), v.dentist.clone(), Path(v.appointment_id.clone()))
            .await
            .unwrap();
        let teeth: Vec<_> = list.entries.iter().map(|e| e.tooth_number).collect();
        assert_eq!(teeth, [36, 85]);

        let Json(history) = teeth::history(v.db(), v.dentist.clone(), Path("p1".into()))
            .await
            .unwrap();
        assert_eq!(history.entries.len(), 2);
    }

    #[tokio::test]
    async fn rejects_bad_teeth_and_foreign_catalogue_rows() {
        let v = visit().await;
        let err = v.record(v.request(19)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = v
            .record(CreateToothTreatmentRequest {
                treatment_id: "nope".into(),
                ..v.request(11)
            })
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = v
            .record(CreateToothTreatmentRequest {
                medicine_id: Some("nope".into()),
                ..v.request(11)
            })
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        // Another dentist cannot see the appointment at all.
        let err = list_entries(v.db(), v.app.active("d2"), Path(v.appointment_id.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cancelled_appointments_take_no_entries() {
        let v = visit().await;
        let _ = appointments::update_appointment(
            v.db(),
            v.dentist.clone(),
            Path(v.appointment_id.clone()),
            Json(UpdateAppointmentRequest {
                status: Some(AppointmentStatus::Cancelled),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        let err = v.record(v.request(11)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn catalogue_rows_in_use_cannot_be_deleted() {
        let v = visit().await;
        let entry = v.record(v.request(21)).await.unwrap();

        let err = treatments::delete_treatment(v.db(), v.dentist.clone(), Path(v.treatment_id.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        let err = medicines::delete_medicine(v.db(), v.dentist.clone(), Path(v.medicine_id.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let _ = delete_entry(
            v.db(),
            v.dentist.clone(),
            Path((v.appointment_id.clone(), entry.id.clone())),
        )
        .await
        .unwrap();
        let err = delete_entry(
            v.db(),
            v.dentist.clone(),
            Path((v.appointment_id.clone(), entry.id)),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let _ = treatments::delete_treatment(v.db(), v.dentist.clone(), Path(v.treatment_id.clone()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn deleting_the_appointment_removes_its_entries() {
        let v = visit().await;
        v.record(v.request(11)).await.unwrap();
        let _ = appointments::delete_appointment(v.db(), v.dentist.clone(), Path(v.appointment_id.clone()))
            .await
            .unwrap();

        let Json(history) = teeth::history(v.db(), v.dentist.clone(), Path("p1".into()))
            .await
            .unwrap();
        assert!(history.entries.is_empty());
        let _ = medicines::delete_medicine(v.db(), v.dentist.clone(), Path(v.medicine_id.clone()))
            .await
            .unwrap();
    }
}
