//! Authentication routes

use std::collections::BTreeMap;

use axum::{
    extract::{Extension, Path, Query, State},
    http::{header, HeaderMap},
    response::{AppendHeaders, IntoResponse, Response},
    Json,
};
use patos_shared::{AuthError, OrganizationId};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use time::Duration;

use crate::{
    auth::{
        generate_otp, issue_session, read_cookie, verify_password, OrgScope, Session,
        SessionClaims, TokenClaims,
    },
    email::EmailTemplate,
    error::{ApiError, ApiResult},
    state::AppState,
};

use super::{clearing_on_unauthorized, found};

/// How long the browser has to come back from the provider
const OAUTH_STATE_TTL: Duration = Duration::minutes(10);
const OAUTH_STATE_LEN: usize = 32;

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: String,
    pub state: Option<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Sign `claims` as the caller's session: cookie plus the decoded claims as body.
fn signed_in(state: &AppState, claims: &SessionClaims) -> ApiResult<Response> {
    let auth = state.auth_state();
    let (token, cookie) = issue_session(&auth, claims)?;
    let issued: TokenClaims<SessionClaims> = state.codec.decode(&token).map_err(AuthError::from)?;
    Ok((AppendHeaders([(header::SET_COOKIE, cookie)]), Json(issued)).into_response())
}

/// Password login. Issues an unscoped session; a rejection clears any held one.
pub async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Response {
    let result = password_login(&state, req).await;
    clearing_on_unauthorized(result, [state.cookies.clear_session()])
}

async fn password_login(state: &AppState, req: LoginRequest) -> ApiResult<Response> {
    let email = req.email.trim().to_lowercase();

    let user = match state.credentials.find_user_by_email(&email).await {
        Ok(user) => user,
        Err(AuthError::NotFound) => return Err(ApiError::InvalidCredentials),
        Err(e) => return Err(e.into()),
    };

    if !user.is_active || !verify_password(&req.password, &user.password_hash).map_err(AuthError::from)? {
        tracing::info!(user_id = %user.id, "login: invalid credentials");
        return Err(ApiError::InvalidCredentials);
    }

    tracing::info!(user_id = %user.id, "login: success");
    signed_in(state, &SessionClaims::new(user.id, user.email))
}

/// Claims of the current session
pub async fn validate(Extension(session): Extension<Session>) -> Json<SessionClaims> {
    Json(session.0)
}

pub async fn logout(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(AppendHeaders([(header::SET_COOKIE, state.cookies.clear_session()?)]))
}

/// Re-issue the session scoped to `org_id` with the caller's role there.
pub async fn set_organization(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(org_id): Path<String>,
) -> ApiResult<Response> {
    let organization_id = OrganizationId(org_id);

    let membership = match state
        .organizations
        .find_membership(&organization_id, session.0.user_id)
        .await
    {
        Ok(membership) => membership,
        Err(AuthError::NotFound) => return Err(ApiError::Unauthorized),
        Err(e) => return Err(e.into()),
    };

    let claims = session.0.with_scope(OrgScope {
        organization_id: membership.organization_id,
        is_admin: membership.is_admin,
    });
    tracing::info!(user_id = %claims.user_id, organization_id = %organization_id, "Session scoped to organization");
    signed_in(&state, &claims)
}

/// Provider name to authorization URL. Sets the state cookie checked on callback.
pub async fn providers(State(state): State<AppState>) -> ApiResult<Response> {
    let oauth_state = generate_otp(OAUTH_STATE_LEN).map_err(AuthError::from)?;
    let urls: BTreeMap<String, String> = state.oauth.authorize_urls(&oauth_state)?;
    let cookie = state.cookies.oauth_state(&oauth_state, OAUTH_STATE_TTL)?;

    Ok((AppendHeaders([(header::SET_COOKIE, cookie)]), Json(urls)).into_response())
}

/// Provider redirect target: verify state, exchange the code, sign the user in.
/// A rejection clears both the session and the state cookie.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<OAuthCallbackQuery>,
    headers: HeaderMap,
) -> Response {
    let result = oauth_sign_in(&state, &provider, query, &headers).await;
    clearing_on_unauthorized(
        result,
        [state.cookies.clear_session(), state.cookies.clear_oauth_state()],
    )
}

async fn oauth_sign_in(
    state: &AppState,
    provider: &str,
    query: OAuthCallbackQuery,
    headers: &HeaderMap,
) -> ApiResult<Response> {
    let expected = read_cookie(headers, &state.cookies.settings().oauth_state_name);
    let state_matches = match (expected, query.state) {
        (Some(expected), Some(received)) => bool::from(expected.as_bytes().ct_eq(received.as_bytes())),
        _ => false,
    };
    if !state_matches {
        tracing::warn!(provider = %provider, "OAuth callback with missing or mismatched state");
        return Err(ApiError::Unauthorized);
    }

    let provider = state.oauth.get(provider).ok_or(ApiError::NotFound)?;

    let profile = provider.authenticate(&query.code).await?;
    let login = state.credentials.login_oauth(&profile).await?;

    if login.created {
        let template = EmailTemplate::AccountCreated {
            first_name: login.user.first_name.clone(),
        };
        // Account exists already; a lost welcome email must not block sign-in
        if let Err(e) = state.email.send(&login.user.email, template).await {
            tracing::warn!(user_id = %login.user.id, error = %e, "Welcome email not sent");
        }
    }

    let (_, session_cookie) = issue_session(
        &state.auth_state(),
        &SessionClaims::new(login.user.id, login.user.email),
    )?;

    found(
        &state.config.app_host_url,
        [session_cookie, state.cookies.clear_oauth_state()?],
    )
}
