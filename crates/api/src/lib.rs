//! Shared API types, crypto, subscription rules, and SQL builders for dentalcare.
//!
//! This crate is the **single source of truth** for all API request/response
//! types. Everything that touches a database or secret material lives behind
//! the `backend` feature so the plain types stay dependency-light for clients.

use serde::{Deserialize, Serialize};

#[cfg(feature = "backend")]
pub mod crypto;
#[cfg(feature = "backend")]
pub mod db;
#[cfg(feature = "backend")]
pub mod service;
pub mod subscription;
pub mod teeth;

pub use subscription::{Subscription, SubscriptionStatus};
pub use teeth::Dentition;

// ─── Shared Enums ────────────────────────────────────────────────────────────

/// Lifecycle of an appointment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Self::Scheduled),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Only a scheduled appointment can move, and only to a terminal state.
    pub fn can_transition_to(&self, next: Self) -> bool {
        *self == next || (*self == Self::Scheduled && next != Self::Scheduled)
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clinical condition recorded on a tooth chart slot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToothCondition {
    #[default]
    Healthy,
    Decayed,
    Filled,
    Crowned,
    Missing,
    Extracted,
    Implant,
    RootCanal,
}

impl ToothCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Decayed => "decayed",
            Self::Filled => "filled",
            Self::Crowned => "crowned",
            Self::Missing => "missing",
            Self::Extracted => "extracted",
            Self::Implant => "implant",
            Self::RootCanal => "root_canal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "healthy" => Some(Self::Healthy),
            "decayed" => Some(Self::Decayed),
            "filled" => Some(Self::Filled),
            "crowned" => Some(Self::Crowned),
            "missing" => Some(Self::Missing),
            "extracted" => Some(Self::Extracted),
            "implant" => Some(Self::Implant),
            "root_canal" => Some(Self::RootCanal),
            _ => None,
        }
    }
}

impl std::fmt::Display for ToothCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment processor used to capture a subscription payment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
    Paypal,
    Stripe,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paypal => "paypal",
            Self::Stripe => "stripe",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "paypal" => Some(Self::Paypal),
            "stripe" => Some(Self::Stripe),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a one-time emailed token authorizes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmailTokenPurpose {
    VerifyEmail,
    ResetPassword,
}

impl EmailTokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VerifyEmail => "verify_email",
            Self::ResetPassword => "reset_password",
        }
    }

    /// Token lifetime in seconds.
    pub fn ttl_secs(&self) -> i64 {
        match self {
            Self::VerifyEmail => 24 * 3600,
            Self::ResetPassword => 3600,
        }
    }
}

impl std::fmt::Display for EmailTokenPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Utilities ───────────────────────────────────────────────────────────────

/// Storage and wire format for timestamps (always UTC).
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_datetime(dt: chrono::DateTime<chrono::Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Parse a timestamp written by [`format_datetime`] (or SQLite `datetime('now')`).
pub fn parse_datetime(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

// ─── Auth ────────────────────────────────────────────────────────────────────

/// Email + password registration of a new dentist.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Returned on successful registration.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub dentist_id: String,
    pub email: String,
    pub subscription: SubscriptionResponse,
    pub email_verification_required: bool,
}

/// Email + password login.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Returned on successful login / refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthTokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub dentist_id: String,
    pub email: String,
}

/// Refresh token request.
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Logout request (invalidate refresh token).
#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

/// Redeem an email verification token.
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

/// Request carrying only an email address (resend verification, forgot password).
#[derive(Debug, Serialize, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

/// Redeem a password reset token.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

/// Change password for an authenticated dentist.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Profile of the authenticated dentist.
#[derive(Debug, Serialize, Deserialize)]
pub struct DentistProfileResponse {
    pub dentist_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email_verified: bool,
    pub created_at: String,
    pub subscription: SubscriptionResponse,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

/// Generic success response.
#[derive(Debug, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

// ─── Billing ─────────────────────────────────────────────────────────────────

/// Current subscription window as seen by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    pub status: SubscriptionStatus,
    pub active: bool,
    pub expires_at: String,
    pub days_remaining: i64,
}

/// Subscription window plus what it costs to extend it.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionDetailResponse {
    #[serde(flatten)]
    pub subscription: SubscriptionResponse,
    pub price_cents: i64,
    pub currency: String,
    pub providers: Vec<PaymentProvider>,
}

/// Confirm a payment that the client approved with a provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct CapturePaymentRequest {
    pub provider: PaymentProvider,
    /// PayPal order id or Stripe payment intent id.
    pub reference: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub id: String,
    pub provider: PaymentProvider,
    pub reference: String,
    pub amount_cents: i64,
    pub currency: String,
    pub captured_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CapturePaymentResponse {
    pub payment: PaymentResponse,
    pub subscription: SubscriptionResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListPaymentsResponse {
    pub payments: Vec<PaymentResponse>,
}

// ─── Patients ────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CreatePatientRequest {
    pub first_name: String,
    pub last_name: String,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Distinguish an absent field (`None`) from an explicit `null` (`Some(None)`).
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdatePatientRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birth_date: Option<String>,
    /// Absent keeps the stored value; `null` clears it.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub gender: Option<Option<Gender>>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientResponse {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<String>,
    pub gender: Option<Gender>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PatientListQuery {
    pub search: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListPatientsResponse {
    pub patients: Vec<PatientResponse>,
}

// ─── Tooth chart ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientToothResponse {
    pub tooth_number: u8,
    pub name: String,
    pub dentition: Dentition,
    pub condition: ToothCondition,
    pub notes: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToothChartResponse {
    pub patient_id: String,
    pub teeth: Vec<PatientToothResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateToothRequest {
    pub condition: ToothCondition,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TreatmentHistoryResponse {
    pub patient_id: String,
    pub entries: Vec<ToothTreatmentResponse>,
}

// ─── Appointments ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: String,
    /// RFC 3339, or `YYYY-MM-DDTHH:MM[:SS]` interpreted as UTC.
    pub starts_at: String,
    pub ends_at: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub starts_at: Option<String>,
    pub ends_at: Option<String>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub status: Option<AppointmentStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentResponse {
    pub id: String,
    pub patient_id: String,
    pub patient_name: String,
    pub starts_at: String,
    pub ends_at: String,
    pub status: AppointmentStatus,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AppointmentListQuery {
    pub patient_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub status: Option<AppointmentStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListAppointmentsResponse {
    pub appointments: Vec<AppointmentResponse>,
}

// ─── Treatments & medicines ──────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTreatmentRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price_cents: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateTreatmentRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreatmentResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListTreatmentsResponse {
    pub treatments: Vec<TreatmentResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateMedicineRequest {
    pub name: String,
    #[serde(default)]
    pub dosage: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateMedicineRequest {
    pub name: Option<String>,
    pub dosage: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicineResponse {
    pub id: String,
    pub name: String,
    pub dosage: Option<String>,
    pub description: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListMedicinesResponse {
    pub medicines: Vec<MedicineResponse>,
}

// ─── Tooth treatments ────────────────────────────────────────────────────────

/// Record a treatment performed on one tooth during an appointment.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateToothTreatmentRequest {
    pub tooth_number: u8,
    pub treatment_id: String,
    #[serde(default)]
    pub medicine_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Defaults to the catalogue price of the treatment.
    #[serde(default)]
    pub price_cents: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToothTreatmentResponse {
    pub id: String,
    pub appointment_id: String,
    pub appointment_starts_at: String,
    pub tooth_number: u8,
    pub treatment_id: String,
    pub treatment_name: String,
    pub medicine_id: Option<String>,
    pub medicine_name: Option<String>,
    pub notes: Option<String>,
    pub price_cents: i64,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListToothTreatmentsResponse {
    pub entries: Vec<ToothTreatmentResponse>,
}

// ─── Health ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// ─── Service Error ───────────────────────────────────────────────────────────

/// Framework-agnostic error returned by service functions.
///
/// The server maps each variant to an HTTP status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    BadRequest(String),
    Unauthorized(String),
    PaymentRequired(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl ServiceError {
    /// HTTP status code as a `u16`.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::PaymentRequired(_) => 402,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Internal(_) => 500,
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::PaymentRequired(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::Internal(m) => m,
        }
    }

    /// Build a closure that wraps a DB/IO error into `Internal`.
    pub fn from_db<E: std::fmt::Display>(context: &str) -> impl FnOnce(E) -> Self + '_ {
        move |e| Self::Internal(format!("{context}: {e}"))
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ServiceError {}

/// JSON error shape `{ "error": "..." }` returned by all error responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

impl From<&ServiceError> for ApiError {
    fn from(e: &ServiceError) -> Self {
        Self {
            error: e.message().to_string(),
        }
    }
}
