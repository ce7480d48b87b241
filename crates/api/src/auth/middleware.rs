//! Session authorization middleware
//!
//! Every guarded request goes through the same steps: take the token from the
//! session cookie (or an `Authorization: Bearer` header), decode it, check the
//! organization scope the route asks for, renew it when less than half of the
//! session TTL is left, and hand the claims to the handler as a [`Session`]
//! extension. Any failure, including a 401 produced later by the handler,
//! answers `401` and clears the session cookie.

use std::collections::HashMap;

use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use patos_shared::{AuthError, OrganizationId};
use time::{Duration, OffsetDateTime};

use super::{
    claims::SessionClaims,
    cookie::{read_cookie, CookieWriter},
    jwt::TokenCodec,
};
use crate::error::{ApiError, ApiResult};

/// Path parameter naming the organization on scoped routes
pub const ORG_ID_PARAM: &str = "org_id";

/// Everything the session guard needs, cloned into each middleware layer
#[derive(Clone)]
pub struct AuthState {
    pub codec: TokenCodec,
    pub cookies: CookieWriter,
    pub session_ttl: Duration,
}

/// Claims of the authenticated caller, attached to the request extensions
#[derive(Debug, Clone)]
pub struct Session(pub SessionClaims);

/// What a route demands from the session beyond a valid token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Session,
    Member,
    Admin,
}

/// Outcome of a successful authorization
#[derive(Debug, Clone)]
pub struct Authorization {
    pub claims: SessionClaims,
    /// Fresh token when the presented one was past half of its lifetime
    pub renewed: Option<String>,
}

/// Session token from the cookie, falling back to a bearer header.
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(token) = read_cookie(headers, cookie_name) {
        return Some(token);
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Decide whether `token` grants `access` to a route scoped to `path_org`.
///
/// Pure apart from the clock passed in as `now`.
pub fn authorize(
    auth: &AuthState,
    token: Option<&str>,
    path_org: Option<&OrganizationId>,
    access: Access,
    now: OffsetDateTime,
) -> Result<Authorization, AuthError> {
    let token = token.ok_or(AuthError::Unauthorized)?;
    let decoded = auth.codec.decode::<SessionClaims>(token)?;

    if access != Access::Session {
        let scope = decoded.payload.scope().ok_or(AuthError::Unauthorized)?;
        if path_org != Some(&scope.organization_id) {
            return Err(AuthError::Unauthorized);
        }
        if access == Access::Admin && !scope.is_admin {
            return Err(AuthError::Unauthorized);
        }
    }

    // Remaining < ttl/2 is compared in whole seconds, like exp itself
    let renewed = if decoded.remaining(now).whole_seconds() * 2 < auth.session_ttl.whole_seconds() {
        Some(auth.codec.issue_at(&decoded.payload, auth.session_ttl, now)?)
    } else {
        None
    };

    Ok(Authorization {
        claims: decoded.payload,
        renewed,
    })
}

/// Sign `claims` as a new session and build the cookie carrying it.
pub fn issue_session(auth: &AuthState, claims: &SessionClaims) -> ApiResult<(String, HeaderValue)> {
    let token = auth
        .codec
        .issue(claims, auth.session_ttl)
        .map_err(AuthError::from)?;
    let cookie = auth.cookies.session(&token, auth.session_ttl)?;
    Ok((token, cookie))
}

/// Re-issue the attached session unconditionally, e.g. after an ownership change.
/// The claims are trusted as-is: they were verified earlier in the same request.
pub fn reauthorize(auth: &AuthState, session: &Session) -> ApiResult<HeaderValue> {
    let (_, cookie) = issue_session(auth, &session.0)?;
    tracing::debug!(user_id = %session.0.user_id, "Session reauthorized");
    Ok(cookie)
}

/// Any valid session
pub async fn require_session(State(auth): State<AuthState>, request: Request, next: Next) -> Response {
    guard(&auth, None, Access::Session, request, next).await
}

/// Session scoped to the organization in the path
pub async fn require_org_member(
    State(auth): State<AuthState>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Response {
    let org = params.get(ORG_ID_PARAM).cloned().map(OrganizationId);
    guard(&auth, org, Access::Member, request, next).await
}

/// Admin session scoped to the organization in the path
pub async fn require_org_admin(
    State(auth): State<AuthState>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Response {
    let org = params.get(ORG_ID_PARAM).cloned().map(OrganizationId);
    guard(&auth, org, Access::Admin, request, next).await
}

async fn guard(
    auth: &AuthState,
    path_org: Option<OrganizationId>,
    access: Access,
    mut request: Request,
    next: Next,
) -> Response {
    let token = extract_token(request.headers(), &auth.cookies.settings().session_name);

    let authorization = match authorize(auth, token.as_deref(), path_org.as_ref(), access, OffsetDateTime::now_utc()) {
        Ok(authorization) => authorization,
        Err(e) => {
            tracing::debug!(error = %e, path = %request.uri().path(), "Session rejected");
            return unauthorized(auth);
        }
    };

    let user_id = authorization.claims.user_id;
    request.extensions_mut().insert(Session(authorization.claims));
    let mut response = next.run(request).await;

    if response.status() == StatusCode::UNAUTHORIZED {
        clear_session_cookie(auth, &mut response);
        return response;
    }

    // A handler that already wrote a session cookie (scope change, reauthorize) wins
    if let Some(token) = authorization.renewed {
        if !sets_cookie(&response, &auth.cookies.settings().session_name) {
            match auth.cookies.session(&token, auth.session_ttl) {
                Ok(cookie) => {
                    response.headers_mut().append(header::SET_COOKIE, cookie);
                    tracing::debug!(user_id = %user_id, "Session renewed");
                }
                Err(e) => tracing::warn!(error = %e, "Could not write renewed session cookie"),
            }
        }
    }

    response
}

fn unauthorized(auth: &AuthState) -> Response {
    let mut response = ApiError::Unauthorized.into_response();
    clear_session_cookie(auth, &mut response);
    response
}

fn clear_session_cookie(auth: &AuthState, response: &mut Response) {
    match auth.cookies.clear_session() {
        Ok(cookie) => {
            response.headers_mut().append(header::SET_COOKIE, cookie);
        }
        Err(e) => tracing::warn!(error = %e, "Could not write session clearing cookie"),
    }
}

fn sets_cookie(response: &Response, name: &str) -> bool {
    let prefix = format!("{name}=");
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.starts_with(&prefix))
}
