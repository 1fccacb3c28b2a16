//! Shared business rules: framework-agnostic pure functions.
//!
//! Route handlers stay thin adapters: they validate through these helpers,
//! then run the query builders from [`crate::db`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::{AuthTokenResponse, EmailTokenPurpose, ServiceError, crypto, format_datetime};

// ─── Validation ─────────────────────────────────────────────────────────────

/// Validate and normalize an email address. Returns the lowercased, trimmed email.
pub fn validate_email(email: &str) -> Result<String, ServiceError> {
    let email = email.trim().to_lowercase();
    let valid_shape = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid_shape || email.len() > 254 || email.contains(char::is_whitespace) {
        return Err(ServiceError::BadRequest("invalid email address".into()));
    }
    Ok(email)
}

/// Validate a password (8-128 characters).
pub fn validate_password(password: &str) -> Result<(), ServiceError> {
    let len = password.chars().count();
    if len < 8 {
        return Err(ServiceError::BadRequest(
            "password must be at least 8 characters".into(),
        ));
    }
    if len > 128 {
        return Err(ServiceError::BadRequest(
            "password must be at most 128 characters".into(),
        ));
    }
    Ok(())
}

/// Validate a required name-like field. Returns the trimmed value.
pub fn validate_name(field: &str, value: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.chars().count() > 100 {
        return Err(ServiceError::BadRequest(format!(
            "{field} must be 1-100 characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Normalize optional free text: trims, maps blank to `None`, enforces `max` chars.
pub fn validate_text(
    field: &str,
    value: Option<&str>,
    max: usize,
) -> Result<Option<String>, ServiceError> {
    let Some(trimmed) = value.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if trimmed.chars().count() > max {
        return Err(ServiceError::BadRequest(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(Some(trimmed.to_string()))
}

/// Validate an optional phone number (digits, spaces, `+-()`).
pub fn validate_phone(phone: Option<&str>) -> Result<Option<String>, ServiceError> {
    let Some(phone) = validate_text("phone", phone, 32)? else {
        return Ok(None);
    };
    let allowed = |c: char| c.is_ascii_digit() || " +-()".contains(c);
    if !phone.chars().all(allowed) || !phone.chars().any(|c| c.is_ascii_digit()) {
        return Err(ServiceError::BadRequest("invalid phone number".into()));
    }
    Ok(Some(phone))
}

/// Validate an optional contact email on a patient record.
pub fn validate_optional_email(email: Option<&str>) -> Result<Option<String>, ServiceError> {
    match email.map(str::trim).filter(|s| !s.is_empty()) {
        Some(email) => validate_email(email).map(Some),
        None => Ok(None),
    }
}

pub fn validate_price_cents(price_cents: i64) -> Result<i64, ServiceError> {
    if price_cents < 0 {
        return Err(ServiceError::BadRequest(
            "price_cents must not be negative".into(),
        ));
    }
    Ok(price_cents)
}

/// Validate an optional `YYYY-MM-DD` birth date that is not in the future.
pub fn validate_birth_date(
    value: Option<&str>,
    today: NaiveDate,
) -> Result<Option<String>, ServiceError> {
    let Some(value) = value.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| ServiceError::BadRequest("birth_date must be YYYY-MM-DD".into()))?;
    if date > today {
        return Err(ServiceError::BadRequest(
            "birth_date must not be in the future".into(),
        ));
    }
    Ok(Some(date.format("%Y-%m-%d").to_string()))
}

// ─── Time ───────────────────────────────────────────────────────────────────

/// Parse a client-supplied timestamp into UTC.
///
/// Accepts RFC 3339 (any offset) or a naive `YYYY-MM-DDTHH:MM[:SS]`, which is
/// taken as UTC.
pub fn parse_client_datetime(field: &str, value: &str) -> Result<DateTime<Utc>, ServiceError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ServiceError::BadRequest(format!("{field} is not a valid date-time")))
}

/// Validate an appointment window and return it in storage format.
pub fn validate_window(
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
) -> Result<(String, String), ServiceError> {
    if ends_at <= starts_at {
        return Err(ServiceError::BadRequest(
            "ends_at must be after starts_at".into(),
        ));
    }
    if ends_at - starts_at > chrono::Duration::hours(12) {
        return Err(ServiceError::BadRequest(
            "appointments cannot be longer than 12 hours".into(),
        ));
    }
    Ok((format_datetime(starts_at), format_datetime(ends_at)))
}

pub fn unix_seconds(now: DateTime<Utc>) -> u64 {
    u64::try_from(now.timestamp()).unwrap_or(0)
}

// ─── Auth Token Resolution ──────────────────────────────────────────────────

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, ServiceError> {
    header
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ServiceError::Unauthorized("missing or invalid Authorization header".into()))
}

// ─── Token Bundle ───────────────────────────────────────────────────────────

/// Everything needed to persist a refresh token and answer a login.
pub struct TokenBundle {
    /// SHA-256 hash of the refresh token (stored in DB).
    pub token_hash: String,
    /// UUID primary key for the refresh_tokens row.
    pub token_id: String,
    /// Refresh token expiry in storage format.
    pub expires_at: String,
    /// Ready-to-return API response.
    pub response: AuthTokenResponse,
}

/// Build an access JWT and a fresh refresh token for `dentist_id`.
pub fn prepare_token_bundle(
    jwt_secret: &str,
    dentist_id: &str,
    email: &str,
    now: DateTime<Utc>,
) -> Result<TokenBundle, ServiceError> {
    let access_token = crypto::sign_jwt(dentist_id, jwt_secret, unix_seconds(now))?;
    let refresh_token = crypto::generate_token()?;
    let expires_at = now
        .checked_add_signed(chrono::Duration::seconds(
            crypto::REFRESH_EXPIRY_SECS as i64,
        ))
        .ok_or_else(|| ServiceError::Internal("timestamp overflow".into()))?;

    Ok(TokenBundle {
        token_hash: crypto::hash_token(&refresh_token),
        token_id: uuid::Uuid::new_v4().to_string(),
        expires_at: format_datetime(expires_at),
        response: AuthTokenResponse {
            access_token,
            refresh_token,
            expires_in: crypto::JWT_EXPIRY_SECS,
            dentist_id: dentist_id.to_string(),
            email: email.to_string(),
        },
    })
}

/// One-time token delivered by email; only `token_hash` is persisted.
pub struct EmailToken {
    pub id: String,
    pub token: String,
    pub token_hash: String,
    pub expires_at: String,
}

pub fn prepare_email_token(
    purpose: EmailTokenPurpose,
    now: DateTime<Utc>,
) -> Result<EmailToken, ServiceError> {
    let token = crypto::generate_token()?;
    Ok(EmailToken {
        id: uuid::Uuid::new_v4().to_string(),
        token_hash: crypto::hash_token(&token),
        expires_at: format_datetime(now + chrono::Duration::seconds(purpose.ttl_secs())),
        token,
    })
}

/// Link placed in verification / reset emails.
pub fn email_link(frontend_url: &str, purpose: EmailTokenPurpose, token: &str) -> String {
    let path = match purpose {
        EmailTokenPurpose::VerifyEmail => "verify-email",
        EmailTokenPurpose::ResetPassword => "reset-password",
    };
    format!("{}/{path}?token={token}", frontend_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_validate_email() {
        assert_eq!(validate_email("  Dr.Who@Clinic.Example ").unwrap(), "dr.who@clinic.example");
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@clinic.example").is_err());
        assert!(validate_email("a@localhost").is_err());
        assert!(validate_email("a b@clinic.example").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_validate_name_and_text() {
        assert_eq!(validate_name("first_name", "  Ada ").unwrap(), "Ada");
        assert!(validate_name("first_name", "   ").is_err());
        assert!(validate_name("first_name", &"x".repeat(101)).is_err());
        assert_eq!(validate_text("notes", Some("  "), 10).unwrap(), None);
        assert!(validate_text("notes", Some("12345678901"), 10).is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert_eq!(
            validate_phone(Some(" +1 (555) 010-9999 ")).unwrap().as_deref(),
            Some("+1 (555) 010-9999")
        );
        assert_eq!(validate_phone(None).unwrap(), None);
        assert!(validate_phone(Some("call me")).is_err());
        assert!(validate_phone(Some("+-()")).is_err());
    }

    #[test]
    fn test_birth_date() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(
            validate_birth_date(Some("1990-02-03"), today).unwrap().as_deref(),
            Some("1990-02-03")
        );
        assert!(validate_birth_date(Some("2030-01-01"), today).is_err());
        assert!(validate_birth_date(Some("03/02/1990"), today).is_err());
        assert_eq!(validate_birth_date(Some(""), today).unwrap(), None);
    }

    #[test]
    fn test_parse_client_datetime() {
        let expected = Utc.with_ymd_and_hms(2025, 5, 1, 9, 30, 0).unwrap();
        assert_eq!(parse_client_datetime("t", "2025-05-01T09:30:00Z").unwrap(), expected);
        assert_eq!(parse_client_datetime("t", "2025-05-01T11:30:00+02:00").unwrap(), expected);
        assert_eq!(parse_client_datetime("t", "2025-05-01T09:30").unwrap(), expected);
        assert_eq!(parse_client_datetime("t", "2025-05-01 09:30:00").unwrap(), expected);
        assert!(parse_client_datetime("t", "tomorrow").is_err());
    }

    #[test]
    fn test_validate_window() {
        let start = Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap();
        let (s, e) = validate_window(start, start + chrono::Duration::minutes(30)).unwrap();
        assert_eq!(s, "2025-05-01 09:00:00");
        assert_eq!(e, "2025-05-01 09:30:00");
        assert!(validate_window(start, start).is_err());
        assert!(validate_window(start, start + chrono::Duration::hours(13)).is_err());
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(Some("Bearer abc")).unwrap(), "abc");
        assert!(bearer_token(Some("Basic abc")).is_err());
        assert!(bearer_token(Some("Bearer ")).is_err());
        assert!(bearer_token(None).is_err());
    }

    #[test]
    fn test_token_bundle() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let bundle = prepare_token_bundle("secret", "d1", "a@b.example", now).unwrap();
        assert_eq!(bundle.expires_at, "2025-01-08 00:00:00");
        assert_eq!(bundle.token_hash, crypto::hash_token(&bundle.response.refresh_token));
        assert_eq!(
            crypto::verify_jwt(&bundle.response.access_token, "secret", unix_seconds(now)).unwrap(),
            "d1"
        );
    }

    #[test]
    fn test_email_token_and_link() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let token = prepare_email_token(EmailTokenPurpose::ResetPassword, now).unwrap();
        assert_eq!(token.expires_at, "2025-01-01 01:00:00");
        assert_eq!(token.token_hash, crypto::hash_token(&token.token));
        assert_eq!(
            email_link("https://app.example/", EmailTokenPurpose::VerifyEmail, "abc"),
            "https://app.example/verify-email?token=abc"
        );
    }
}
