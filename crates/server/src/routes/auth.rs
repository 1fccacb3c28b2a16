use axum::{
    Json,
    extract::{FromRef, FromRequestParts, State},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use dentalcare_api::{
    AuthTokenResponse, ChangePasswordRequest, DentistProfileResponse, EmailRequest,
    EmailTokenPurpose, LoginRequest, LogoutRequest, OkResponse, RefreshRequest, RegisterRequest,
    RegisterResponse, ResetPasswordRequest, Subscription, UpdateProfileRequest,
    VerifyEmailRequest, crypto, db, format_datetime, parse_datetime, service,
    subscription::require_active,
};

use crate::AppState;
use crate::config::AppConfig;
use crate::error::ApiErr;
use crate::mailer::{self, deliver};
use crate::storage::{Db, conflict_or_db, dentist_from_row, sq_count, sq_execute, sq_query_opt, sq_query_row};

const INVALID_CREDENTIALS: &str = "invalid email or password";
const INVALID_TOKEN: &str = "invalid or expired token";

// ---------------------------------------------------------------------------
// Auth extractors
// ---------------------------------------------------------------------------

/// Dentist authenticated by `Authorization: Bearer <jwt>`.
///
/// Subscription state is loaded but not enforced; see [`ActiveDentist`].
#[derive(Debug, Clone)]
pub struct AuthDentist {
    pub dentist_id: String,
    pub email: String,
    pub subscription: Subscription,
}

impl AuthDentist {
    pub fn load(store: &Db, dentist_id: &str) -> Result<Self, ApiErr> {
        let conn = store.conn();
        let row = sq_query_opt(&conn, db::dentists::get_profile(dentist_id), dentist_from_row)
            .map_err(ApiErr::from_db("load dentist"))?
            .ok_or_else(|| ApiErr::unauthorized("account no longer exists"))?;
        Ok(Self {
            dentist_id: row.id,
            email: row.email,
            subscription: row.subscription,
        })
    }
}

impl<S> FromRequestParts<S> for AuthDentist
where
    S: Send + Sync,
    Db: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiErr;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let token = service::bearer_token(header)?;
        let dentist_id = crypto::verify_jwt(
            token,
            &config.jwt_secret,
            service::unix_seconds(Utc::now()),
        )?;
        Self::load(&Db::from_ref(state), &dentist_id)
    }
}

/// [`AuthDentist`] whose subscription window is still open (402 otherwise).
#[derive(Debug, Clone)]
pub struct ActiveDentist(pub AuthDentist);

impl<S> FromRequestParts<S> for ActiveDentist
where
    S: Send + Sync,
    Db: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiErr;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let dentist = AuthDentist::from_request_parts(parts, state).await?;
        require_active(&dentist.subscription, Utc::now())?;
        Ok(Self(dentist))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ok() -> Json<OkResponse> {
    Json(OkResponse { ok: true })
}

/// Persist a fresh refresh token and return the login response.
fn issue_tokens(
    conn: &Connection,
    jwt_secret: &str,
    dentist_id: &str,
    email: &str,
    now: DateTime<Utc>,
) -> Result<AuthTokenResponse, ApiErr> {
    let bundle = service::prepare_token_bundle(jwt_secret, dentist_id, email, now)?;
    sq_execute(
        conn,
        db::tokens::insert_refresh_token(
            &bundle.token_id,
            dentist_id,
            &bundle.token_hash,
            &bundle.expires_at,
        ),
    )
    .map_err(ApiErr::from_db("insert refresh token"))?;
    Ok(bundle.response)
}

/// Replace any outstanding token of `purpose` with a new one; returns the raw token.
fn issue_email_token(
    conn: &Connection,
    dentist_id: &str,
    purpose: EmailTokenPurpose,
    now: DateTime<Utc>,
) -> Result<String, ApiErr> {
    sq_execute(
        conn,
        db::tokens::invalidate_email_tokens(dentist_id, purpose, &format_datetime(now)),
    )
    .map_err(ApiErr::from_db("invalidate email tokens"))?;
    let token = service::prepare_email_token(purpose, now)?;
    sq_execute(
        conn,
        db::tokens::insert_email_token(
            &token.id,
            dentist_id,
            purpose,
            &token.token_hash,
            &token.expires_at,
        ),
    )
    .map_err(ApiErr::from_db("insert email token"))?;
    Ok(token.token)
}

/// Consume a one-time email token; returns the owning dentist.
fn redeem_email_token(
    conn: &Connection,
    token: &str,
    purpose: EmailTokenPurpose,
    now: DateTime<Utc>,
) -> Result<String, ApiErr> {
    let hash = crypto::hash_token(token.trim());
    let row: Option<(String, String, String, Option<String>)> = sq_query_opt(
        conn,
        db::tokens::lookup_email_token(&hash, purpose),
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
    )
    .map_err(ApiErr::from_db("lookup email token"))?;
    let Some((token_id, dentist_id, expires_at, used_at)) = row else {
        return Err(ApiErr::bad_request(INVALID_TOKEN));
    };
    if used_at.is_some() || parse_datetime(&expires_at).is_none_or(|exp| now >= exp) {
        return Err(ApiErr::bad_request(INVALID_TOKEN));
    }
    let consumed = sq_execute(
        conn,
        db::tokens::mark_email_token_used(&token_id, &format_datetime(now)),
    )
    .map_err(ApiErr::from_db("consume email token"))?;
    if consumed != 1 {
        return Err(ApiErr::bad_request(INVALID_TOKEN));
    }
    Ok(dentist_id)
}

/// `id, email_verified` of the account registered under `email`, if any.
fn find_by_email(store: &Db, email: &str) -> Result<Option<(String, bool)>, ApiErr> {
    let conn = store.conn();
    sq_query_opt(&conn, db::dentists::get_by_email(email), |r| {
        Ok((r.get(0)?, r.get(1)?))
    })
    .map_err(ApiErr::from_db("lookup dentist by email"))
}

fn load_profile(store: &Db, dentist_id: &str) -> Result<DentistProfileResponse, ApiErr> {
    let conn = store.conn();
    let row = sq_query_row(&conn, db::dentists::get_profile(dentist_id), dentist_from_row)
        .map_err(ApiErr::from_db("load profile"))?;
    Ok(DentistProfileResponse {
        dentist_id: row.id,
        email: row.email,
        first_name: row.first_name,
        last_name: row.last_name,
        phone: row.phone,
        email_verified: row.email_verified,
        created_at: row.created_at,
        subscription: row.subscription.to_response(Utc::now()),
    })
}

// ---------------------------------------------------------------------------
// Register / verify
// ---------------------------------------------------------------------------

/// POST /api/auth/register: create a dentist account on a free trial.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiErr> {
    let email = service::validate_email(&req.email)?;
    service::validate_password(&req.password)?;
    let first_name = service::validate_name("first_name", &req.first_name)?;
    let last_name = service::validate_name("last_name", &req.last_name)?;
    let phone = service::validate_phone(req.phone.as_deref())?;

    {
        let conn = state.db.conn();
        let taken = sq_count(&conn, db::dentists::email_exists(&email))
            .map_err(ApiErr::from_db("check email"))?;
        if taken > 0 {
            return Err(ApiErr::conflict("email already registered"));
        }
    }

    let (password_hash, password_salt) = crypto::hash_password(&req.password)?;
    let now = Utc::now();
    let subscription = Subscription::start_trial(now);
    let dentist_id = Uuid::new_v4().to_string();

    let token = {
        let mut conn = state.db.conn();
        let tx = conn
            .transaction()
            .map_err(ApiErr::from_db("begin register"))?;
        sq_execute(
            &tx,
            db::dentists::insert(
                &dentist_id,
                &email,
                &password_hash,
                &password_salt,
                &first_name,
                &last_name,
                phone.as_deref(),
                &format_datetime(subscription.expires_at),
            ),
        )
        .map_err(conflict_or_db(
            "email already registered",
            "insert dentist",
        ))?;
        let token = issue_email_token(&tx, &dentist_id, EmailTokenPurpose::VerifyEmail, now)?;
        tx.commit().map_err(ApiErr::from_db("commit register"))?;
        token
    };

    let link = service::email_link(
        &state.config.frontend_url,
        EmailTokenPurpose::VerifyEmail,
        &token,
    );
    deliver(state.mailer.as_ref(), mailer::verification_mail(&email, &link));
    tracing::info!(dentist_id = %dentist_id, "dentist registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            dentist_id,
            email,
            subscription: subscription.to_response(now),
            email_verification_required: state.config.require_email_verification,
        }),
    ))
}

/// POST /api/auth/verify-email
pub async fn verify_email(
    State(store): State<Db>,
    Json(req): Json<VerifyEmailRequest>,
) -> Result<Json<OkResponse>, ApiErr> {
    let mut conn = store.conn();
    let tx = conn
        .transaction()
        .map_err(ApiErr::from_db("begin verify"))?;
    let dentist_id =
        redeem_email_token(&tx, &req.token, EmailTokenPurpose::VerifyEmail, Utc::now())?;
    sq_execute(&tx, db::dentists::mark_email_verified(&dentist_id))
        .map_err(ApiErr::from_db("mark verified"))?;
    tx.commit().map_err(ApiErr::from_db("commit verify"))?;
    tracing::info!(dentist_id = %dentist_id, "email verified");
    Ok(ok())
}

/// POST /api/auth/resend-verification: answers the same whether or not the
/// address is registered.
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(req): Json<EmailRequest>,
) -> Result<Json<OkResponse>, ApiErr> {
    let Ok(email) = service::validate_email(&req.email) else {
        return Ok(ok());
    };
    let Some((dentist_id, false)) = find_by_email(&state.db, &email)? else {
        return Ok(ok());
    };
    let token = {
        let conn = state.db.conn();
        issue_email_token(&conn, &dentist_id, EmailTokenPurpose::VerifyEmail, Utc::now())?
    };
    let link = service::email_link(
        &state.config.frontend_url,
        EmailTokenPurpose::VerifyEmail,
        &token,
    );
    deliver(state.mailer.as_ref(), mailer::verification_mail(&email, &link));
    Ok(ok())
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthTokenResponse>, ApiErr> {
    let email = service::validate_email(&req.email)
        .map_err(|_| ApiErr::unauthorized(INVALID_CREDENTIALS))?;

    let row: Option<(String, String, String, String, bool)> = {
        let conn = state.db.conn();
        sq_query_opt(&conn, db::dentists::get_by_email_for_login(&email), |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
        })
        .map_err(ApiErr::from_db("login lookup"))?
    };
    let Some((dentist_id, email, hash, salt, verified)) = row else {
        tracing::info!("login failed: unknown email");
        return Err(ApiErr::unauthorized(INVALID_CREDENTIALS));
    };
    if !crypto::verify_password(&req.password, &hash, &salt) {
        tracing::info!(dentist_id = %dentist_id, "login failed: wrong password");
        return Err(ApiErr::unauthorized(INVALID_CREDENTIALS));
    }
    if state.config.require_email_verification && !verified {
        return Err(ApiErr::forbidden("email address not verified"));
    }

    let conn = state.db.conn();
    let tokens = issue_tokens(
        &conn,
        &state.config.jwt_secret,
        &dentist_id,
        &email,
        Utc::now(),
    )?;
    Ok(Json(tokens))
}

/// POST /api/auth/refresh: rotate: the presented token is consumed.
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<AuthTokenResponse>, ApiErr> {
    let hash = crypto::hash_token(req.refresh_token.trim());
    let now = Utc::now();

    let mut conn = state.db.conn();
    let tx = conn
        .transaction()
        .map_err(ApiErr::from_db("begin refresh"))?;
    let row: Option<(String, String, String, String)> =
        sq_query_opt(&tx, db::tokens::lookup_refresh_token(&hash), |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
        })
        .map_err(ApiErr::from_db("lookup refresh token"))?;
    let Some((token_id, dentist_id, expires_at, email)) = row else {
        return Err(ApiErr::unauthorized("invalid refresh token"));
    };

    sq_execute(&tx, db::tokens::delete_refresh_token_by_id(&token_id))
        .map_err(ApiErr::from_db("delete refresh token"))?;
    if parse_datetime(&expires_at).is_none_or(|exp| now >= exp) {
        tx.commit().map_err(ApiErr::from_db("commit refresh"))?;
        return Err(ApiErr::unauthorized("refresh token expired"));
    }

    let tokens = issue_tokens(&tx, &state.config.jwt_secret, &dentist_id, &email, now)?;
    tx.commit().map_err(ApiErr::from_db("commit refresh"))?;
    Ok(Json(tokens))
}

/// POST /api/auth/logout
pub async fn logout(
    State(store): State<Db>,
    Json(req): Json<LogoutRequest>,
) -> Result<Json<OkResponse>, ApiErr> {
    let hash = crypto::hash_token(req.refresh_token.trim());
    let conn = store.conn();
    sq_execute(&conn, db::tokens::delete_refresh_token(&hash))
        .map_err(ApiErr::from_db("logout"))?;
    Ok(ok())
}

// ---------------------------------------------------------------------------
// Passwords
// ---------------------------------------------------------------------------

/// POST /api/auth/forgot-password: answers the same whether or not the
/// address is registered.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<EmailRequest>,
) -> Result<Json<OkResponse>, ApiErr> {
    let Ok(email) = service::validate_email(&req.email) else {
        return Ok(ok());
    };
    let Some((dentist_id, _)) = find_by_email(&state.db, &email)? else {
        return Ok(ok());
    };
    let token = {
        let conn = state.db.conn();
        issue_email_token(&conn, &dentist_id, EmailTokenPurpose::ResetPassword, Utc::now())?
    };
    let link = service::email_link(
        &state.config.frontend_url,
        EmailTokenPurpose::ResetPassword,
        &token,
    );
    deliver(state.mailer.as_ref(), mailer::password_reset_mail(&email, &link));
    tracing::info!(dentist_id = %dentist_id, "password reset requested");
    Ok(ok())
}

/// POST /api/auth/reset-password: also proves ownership of the address and
/// signs out every session.
pub async fn reset_password(
    State(store): State<Db>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<OkResponse>, ApiErr> {
    service::validate_password(&req.new_password)?;
    let (password_hash, password_salt) = crypto::hash_password(&req.new_password)?;

    let mut conn = store.conn();
    let tx = conn
        .transaction()
        .map_err(ApiErr::from_db("begin reset"))?;
    let dentist_id =
        redeem_email_token(&tx, &req.token, EmailTokenPurpose::ResetPassword, Utc::now())?;
    sq_execute(
        &tx,
        db::dentists::update_password(&dentist_id, &password_hash, &password_salt),
    )
    .map_err(ApiErr::from_db("reset password"))?;
    sq_execute(&tx, db::dentists::mark_email_verified(&dentist_id))
        .map_err(ApiErr::from_db("mark verified"))?;
    sq_execute(&tx, db::tokens::delete_refresh_tokens_for(&dentist_id))
        .map_err(ApiErr::from_db("revoke refresh tokens"))?;
    tx.commit().map_err(ApiErr::from_db("commit reset"))?;

    tracing::info!(dentist_id = %dentist_id, "password reset");
    Ok(ok())
}

/// PUT /api/auth/password: signs out every session, like a reset.
pub async fn change_password(
    State(store): State<Db>,
    dentist: AuthDentist,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<OkResponse>, ApiErr> {
    service::validate_password(&req.new_password)?;

    let (hash, salt): (String, String) = {
        let conn = store.conn();
        sq_query_row(
            &conn,
            db::dentists::get_password_fields(&dentist.dentist_id),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .map_err(ApiErr::from_db("load password"))?
    };
    if !crypto::verify_password(&req.current_password, &hash, &salt) {
        return Err(ApiErr::unauthorized("current password is incorrect"));
    }

    let (new_hash, new_salt) = crypto::hash_password(&req.new_password)?;
    let mut conn = store.conn();
    let tx = conn
        .transaction()
        .map_err(ApiErr::from_db("begin change password"))?;
    sq_execute(
        &tx,
        db::dentists::update_password(&dentist.dentist_id, &new_hash, &new_salt),
    )
    .map_err(ApiErr::from_db("update password"))?;
    sq_execute(&tx, db::tokens::delete_refresh_tokens_for(&dentist.dentist_id))
        .map_err(ApiErr::from_db("revoke refresh tokens"))?;
    tx.commit()
        .map_err(ApiErr::from_db("commit change password"))?;

    tracing::info!(dentist_id = %dentist.dentist_id, email = %dentist.email, "password changed");
    Ok(ok())
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// GET /api/auth/me
pub async fn me(
    State(store): State<Db>,
    dentist: AuthDentist,
) -> Result<Json<DentistProfileResponse>, ApiErr> {
    load_profile(&store, &dentist.dentist_id).map(Json)
}

/// PUT /api/auth/me: absent fields are kept; a blank phone clears it.
pub async fn update_me(
    State(store): State<Db>,
    dentist: AuthDentist,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<DentistProfileResponse>, ApiErr> {
    let current = load_profile(&store, &dentist.dentist_id)?;
    let first_name = match req.first_name {
        Some(ref v) => service::validate_name("first_name", v)?,
        None => current.first_name,
    };
    let last_name = match req.last_name {
        Some(ref v) => service::validate_name("last_name", v)?,
        None => current.last_name,
    };
    let phone = match req.phone {
        Some(ref v) => service::validate_phone(Some(v))?,
        None => current.phone,
    };

    {
        let conn = store.conn();
        sq_execute(
            &conn,
            db::dentists::update_profile(
                &dentist.dentist_id,
                &first_name,
                &last_name,
                phone.as_deref(),
            ),
        )
        .map_err(ApiErr::from_db("update profile"))?;
    }
    load_profile(&store, &dentist.dentist_id).map(Json)
}
