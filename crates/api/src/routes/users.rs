//! User registration, confirmation and password reset routes

use axum::{
    extract::{Extension, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    Json,
};
use patos_shared::{AuthError, OrganizationSummary, User};
use serde::Deserialize;
use time::OffsetDateTime;

use crate::{
    auth::{
        generate_otp, read_cookie, validate_password_strength, PasswordResetClaims, Session,
    },
    email::EmailTemplate,
    error::{ApiError, ApiResult},
    state::AppState,
    store::{ProfileEdit, Registration},
};

use super::{clearing_on_unauthorized, found};

const MAX_NAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 254;

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub date_of_birth: Option<OffsetDateTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditUserRequest {
    pub first_name: String,
    pub last_name: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub date_of_birth: Option<OffsetDateTime>,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct OtpQuery {
    pub otp: String,
}

pub(crate) fn normalize_email(raw: &str) -> ApiResult<String> {
    let email = raw.trim().to_lowercase();
    let valid = email.len() <= MAX_EMAIL_LEN
        && email
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && !domain.is_empty() && !domain.contains('@'))
            .unwrap_or(false);
    if !valid {
        return Err(ApiError::Validation("Invalid email address".to_string()));
    }
    Ok(email)
}

fn required_name(field: &str, raw: &str) -> ApiResult<String> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::Validation(format!(
            "{field} must be between 1 and {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

// =============================================================================
// Handlers
// =============================================================================

/// Store a pending registration and email its confirmation link.
/// Registering again before confirming replaces the earlier link.
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<StatusCode> {
    let registration = Registration {
        email: normalize_email(&req.email)?,
        first_name: required_name("firstName", &req.first_name)?,
        last_name: required_name("lastName", &req.last_name)?,
        date_of_birth: req.date_of_birth.map(|d| d.date()),
        password: {
            validate_password_strength(&req.password)?;
            req.password
        },
    };

    let otp = generate_otp(state.config.otp_len).map_err(AuthError::from)?;
    state.credentials.register_pending(&registration, &otp).await?;

    state
        .email
        .send(
            &registration.email,
            EmailTemplate::EmailConfirmation {
                first_name: registration.first_name.clone(),
                otp,
            },
        )
        .await?;

    tracing::info!("Registration pending confirmation");
    Ok(StatusCode::CREATED)
}

/// Confirmation link target. Materializes the user and redirects to the app.
pub async fn confirm_user(State(state): State<AppState>, Query(query): Query<OtpQuery>) -> ApiResult<Response> {
    let user = state.credentials.confirm(&query.otp).await?;

    let template = EmailTemplate::AccountCreated {
        first_name: user.first_name.clone(),
    };
    if let Err(e) = state.email.send(&user.email, template).await {
        tracing::warn!(user_id = %user.id, error = %e, "Account created email not sent");
    }

    found(&state.config.app_host_url, std::iter::empty())
}

pub async fn list_organizations(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<Vec<OrganizationSummary>>> {
    let organizations = state
        .organizations
        .list_user_organizations(session.0.user_id)
        .await?;
    Ok(Json(organizations))
}

/// Replace the caller's names and date of birth. An omitted date of birth clears it.
pub async fn edit_user(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<EditUserRequest>,
) -> ApiResult<Json<User>> {
    let edit = ProfileEdit {
        first_name: required_name("firstName", &req.first_name)?,
        last_name: required_name("lastName", &req.last_name)?,
        date_of_birth: req.date_of_birth.map(|d| d.date()),
    };
    let user = state.credentials.edit_user(session.0.user_id, &edit).await?;

    tracing::info!(user_id = %user.id, "Profile edited");
    Ok(Json(user))
}

/// Email a reset link. Answers the same whether or not the address is known.
pub async fn init_reset_password(
    State(state): State<AppState>,
    Json(req): Json<EmailRequest>,
) -> ApiResult<StatusCode> {
    let email = normalize_email(&req.email)?;

    let user = match state.credentials.find_user_by_email(&email).await {
        Ok(user) => user,
        Err(AuthError::NotFound) => {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(StatusCode::ACCEPTED);
        }
        Err(e) => return Err(e.into()),
    };

    let otp = generate_otp(state.config.otp_len).map_err(AuthError::from)?;
    state.password_resets.init_reset(user.id, &otp).await?;

    state
        .email
        .send(
            &user.email,
            EmailTemplate::PasswordReset {
                first_name: user.first_name.clone(),
                otp,
            },
        )
        .await?;

    Ok(StatusCode::ACCEPTED)
}

/// Reset link target. Trades the OTP for a short-lived reset token cookie.
pub async fn set_password_reset_cookie(
    State(state): State<AppState>,
    Query(query): Query<OtpQuery>,
) -> ApiResult<Response> {
    let reset = state.password_resets.get_valid_reset(&query.otp).await?;

    let ttl = state.config.password_reset_token_ttl;
    let token = state
        .codec
        .issue(&PasswordResetClaims::allow(reset.user_id), ttl)
        .map_err(AuthError::from)?;
    let cookie = state.cookies.password_reset(&token, ttl)?;

    let location = state
        .config
        .app_url("reset-password")
        .map_err(|e| {
            tracing::error!(error = %e, "Invalid reset-password URL");
            ApiError::Internal
        })?;
    found(&location, [cookie])
}

/// Set a new password, authorized by the reset token cookie.
/// A rejected reset token is cleared from the client.
pub async fn reset_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PasswordRequest>,
) -> Response {
    let result = complete_password_reset(&state, &headers, req).await;
    clearing_on_unauthorized(result, [state.cookies.clear_password_reset()])
}

async fn complete_password_reset(
    state: &AppState,
    headers: &HeaderMap,
    req: PasswordRequest,
) -> ApiResult<Response> {
    let token = read_cookie(headers, &state.cookies.settings().password_reset_name)
        .ok_or(ApiError::Unauthorized)?;

    let claims = state
        .codec
        .decode::<PasswordResetClaims>(&token)
        .map_err(AuthError::from)?
        .payload;
    if !claims.allowed {
        return Err(ApiError::Unauthorized);
    }

    validate_password_strength(&req.password)?;
    state
        .password_resets
        .complete_reset(claims.user_id, &req.password)
        .await?;

    tracing::info!(user_id = %claims.user_id, "Password reset via reset token");
    Ok((
        AppendHeaders([(header::SET_COOKIE, state.cookies.clear_password_reset()?)]),
        StatusCode::OK,
    )
        .into_response())
}
