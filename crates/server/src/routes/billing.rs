use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use dentalcare_api::{
    CapturePaymentRequest, CapturePaymentResponse, ListPaymentsResponse, PaymentProvider,
    SubscriptionDetailResponse, db, format_datetime, subscription::check_capture,
};

use crate::AppState;
use crate::error::ApiErr;
use crate::payments::{CapturedPayment, validate_reference};
use crate::routes::auth::AuthDentist;
use crate::storage::{
    Db, conflict_or_db, payment_from_row, sq_count, sq_execute, sq_query_map, sq_query_row,
    subscription_from_row,
};

const DUPLICATE_PAYMENT: &str = "payment reference already used";

/// GET /api/subscription: reachable while expired so the client can renew.
pub async fn get_subscription(
    State(state): State<AppState>,
    dentist: AuthDentist,
) -> Json<SubscriptionDetailResponse> {
    Json(SubscriptionDetailResponse {
        subscription: dentist.subscription.to_response(Utc::now()),
        price_cents: state.config.subscription_price_cents,
        currency: state.config.subscription_currency.clone(),
        providers: state.gateways.providers(),
    })
}

/// POST /api/payments/capture: confirm a provider payment and extend the window.
pub async fn capture_payment(
    State(state): State<AppState>,
    dentist: AuthDentist,
    Json(req): Json<CapturePaymentRequest>,
) -> Result<Json<CapturePaymentResponse>, ApiErr> {
    let reference = req.reference.trim().to_string();
    validate_reference(&reference)?;

    {
        let conn = state.db.conn();
        let used = sq_count(&conn, db::payments::reference_used(req.provider, &reference))
            .map_err(ApiErr::from_db("check payment reference"))?;
        if used > 0 {
            return Err(ApiErr::conflict(DUPLICATE_PAYMENT));
        }
    }

    let captured = state.gateways.capture(req.provider, &reference).await?;
    check_capture(
        captured.amount_cents,
        &captured.currency,
        state.config.subscription_price_cents,
        &state.config.subscription_currency,
    )?;

    let response = record_capture(
        &state.db,
        &dentist.dentist_id,
        req.provider,
        &reference,
        &captured,
        Utc::now(),
    )?;
    tracing::info!(
        dentist_id = %dentist.dentist_id,
        provider = %req.provider,
        amount_cents = captured.amount_cents,
        expires_at = %response.subscription.expires_at,
        "payment captured"
    );
    Ok(Json(response))
}

/// Insert the payment and extend the subscription in one transaction.
///
/// The subscription is re-read inside the transaction so two captures
/// landing together both count.
pub fn record_capture(
    store: &Db,
    dentist_id: &str,
    provider: PaymentProvider,
    reference: &str,
    captured: &CapturedPayment,
    now: DateTime<Utc>,
) -> Result<CapturePaymentResponse, ApiErr> {
    let payment_id = Uuid::new_v4().to_string();

    let mut conn = store.conn();
    let tx = conn
        .transaction()
        .map_err(ApiErr::from_db("begin capture"))?;

    let current = sq_query_row(&tx, db::dentists::get_subscription(dentist_id), |r| {
        subscription_from_row(r, 0)
    })
    .map_err(ApiErr::from_db("load subscription"))?;
    let extended = current.extend(now);

    sq_execute(
        &tx,
        db::payments::insert(
            &payment_id,
            dentist_id,
            provider,
            reference,
            captured.amount_cents,
            &captured.currency,
        ),
    )
    .map_err(conflict_or_db(DUPLICATE_PAYMENT, "insert payment"))?;
    sq_execute(
        &tx,
        db::dentists::set_subscription(
            dentist_id,
            extended.status,
            &format_datetime(extended.expires_at),
        ),
    )
    .map_err(ApiErr::from_db("extend subscription"))?;

    let payment = sq_query_row(&tx, db::payments::get(dentist_id, &payment_id), payment_from_row)
        .map_err(ApiErr::from_db("load payment"))?;
    tx.commit().map_err(ApiErr::from_db("commit capture"))?;

    Ok(CapturePaymentResponse {
        payment,
        subscription: extended.to_response(now),
    })
}

/// GET /api/payments
pub async fn list_payments(
    State(store): State<Db>,
    dentist: AuthDentist,
) -> Result<Json<ListPaymentsResponse>, ApiErr> {
    let conn = store.conn();
    let payments = sq_query_map(&conn, db::payments::list(&dentist.dentist_id), payment_from_row)
        .map_err(ApiErr::from_db("list payments"))?;
    Ok(Json(ListPaymentsResponse { payments }))
}
