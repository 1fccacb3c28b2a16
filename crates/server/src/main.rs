mod config;
mod error;
mod mailer;
mod payments;
mod routes;
mod storage;
mod sweeper;
#[cfg(test)]
mod test_support;

use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::AppConfig;
use mailer::{LogMailer, Mailer};
use payments::Gateways;
use storage::Db;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: AppConfig,
    pub mailer: Arc<dyn Mailer>,
    pub gateways: Gateways,
}

impl FromRef<AppState> for Db {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

fn api_router(max_attachment_bytes: usize) -> Router<AppState> {
    Router::new()
        // Health
        .route("/health", get(routes::health::health))
        // Auth
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/verify-email", post(routes::auth::verify_email))
        .route(
            "/auth/resend-verification",
            post(routes::auth::resend_verification),
        )
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/refresh", post(routes::auth::refresh))
        .route("/auth/logout", post(routes::auth::logout))
        .route("/auth/forgot-password", post(routes::auth::forgot_password))
        .route("/auth/reset-password", post(routes::auth::reset_password))
        .route("/auth/password", put(routes::auth::change_password))
        .route(
            "/auth/me",
            get(routes::auth::me).put(routes::auth::update_me),
        )
        // Billing
        .route("/subscription", get(routes::billing::get_subscription))
        .route("/payments/capture", post(routes::billing::capture_payment))
        .route("/payments", get(routes::billing::list_payments))
        // Patients
        .route(
            "/patients",
            get(routes::patients::list_patients).post(routes::patients::create_patient),
        )
        .route(
            "/patients/{id}",
            get(routes::patients::get_patient)
                .put(routes::patients::update_patient)
                .delete(routes::patients::delete_patient),
        )
        .route("/patients/{id}/teeth", get(routes::teeth::get_chart))
        .route(
            "/patients/{id}/teeth/{number}",
            put(routes::teeth::update_tooth),
        )
        .route("/patients/{id}/history", get(routes::teeth::history))
        // Appointments
        .route(
            "/appointments",
            get(routes::appointments::list_appointments)
                .post(routes::appointments::create_appointment),
        )
        .route(
            "/appointments/{id}",
            get(routes::appointments::get_appointment)
                .put(routes::appointments::update_appointment)
                .delete(routes::appointments::delete_appointment),
        )
        .route(
            "/appointments/{id}/treatments",
            get(routes::tooth_treatments::list_entries)
                .post(routes::tooth_treatments::create_entry),
        )
        .route(
            "/appointments/{id}/treatments/{entry_id}",
            axum::routing::delete(routes::tooth_treatments::delete_entry),
        )
        // Catalogues
        .route(
            "/treatments",
            get(routes::treatments::list_treatments).post(routes::treatments::create_treatment),
        )
        .route(
            "/treatments/{id}",
            get(routes::treatments::get_treatment)
                .put(routes::treatments::update_treatment)
                .delete(routes::treatments::delete_treatment),
        )
        .route(
            "/medicines",
            get(routes::medicines::list_medicines).post(routes::medicines::create_medicine),
        )
        .route(
            "/medicines/{id}",
            get(routes::medicines::get_medicine)
                .put(routes::medicines::update_medicine)
                .delete(routes::medicines::delete_medicine),
        )
        // Contact form (multipart; leave headroom over the attachment cap for the text fields)
        .route(
            "/contact",
            post(routes::contact::submit).layer(DefaultBodyLimit::max(max_attachment_bytes + 64 * 1024)),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dentalcare_server=info,tower_http=info".into()),
        )
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!("data directory: {}", config.data_dir.display());

    // Initialize database
    let db = storage::init_db(&config.data_dir)?;
    tracing::info!("database initialized");

    if !config.require_email_verification {
        tracing::warn!("REQUIRE_EMAIL_VERIFICATION is off; unverified dentists can log in");
    }

    let gateways = Gateways::new(config.paypal.clone(), config.stripe.clone());
    if gateways.providers().is_empty() {
        tracing::warn!("no payment provider configured; subscriptions cannot be renewed");
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let sweeper = tokio::spawn(sweeper::run_subscription_sweeper(
        db.clone(),
        config.sweep_interval_secs,
        shutdown_rx,
    ));

    let port = config.port;
    let base_url = config.base_url.clone();
    let state = AppState {
        db,
        mailer: Arc::new(LogMailer),
        gateways,
        config,
    };

    let app = Router::new()
        .nest("/api", api_router(state.config.contact_max_attachment_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    tracing::info!("starting server at {base_url}");

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = sweeper.await;

    Ok(())
}
