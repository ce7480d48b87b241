//! API routes

pub mod auth;
pub mod health;
pub mod organizations;
pub mod users;

#[cfg(test)]
mod flow_tests;

use axum::{
    http::{
        header::{self, InvalidHeaderValue},
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use url::Url;

use crate::{
    auth::{require_org_admin, require_org_member, require_session},
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Public API routes (no session required) - under /v1
    let public_api_routes = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/providers", get(auth::providers))
        .route("/auth/:provider/callback", get(auth::oauth_callback))
        .route("/users", put(users::create_user))
        .route("/users/confirm", get(users::confirm_user))
        .route("/users/init-reset-password", post(users::init_reset_password))
        .route("/users/set-password-reset-cookie", get(users::set_password_reset_cookie))
        .route("/users/reset-password", post(users::reset_password))
        .route("/organizations/accept-invite", get(organizations::accept_invite));

    // Any signed-in user
    let session_routes = Router::new()
        .route("/auth/validate", get(auth::validate))
        .route("/auth/set-organization/:org_id", post(auth::set_organization))
        .route("/users/organizations", get(users::list_organizations))
        .route("/users/edit", post(users::edit_user))
        .route("/organizations", put(organizations::create_organization))
        .route_layer(middleware::from_fn_with_state(auth_state.clone(), require_session));

    // Session scoped to the organization in the path
    let member_routes = Router::new()
        .route("/organizations/:org_id", get(organizations::get_organization))
        .route_layer(middleware::from_fn_with_state(auth_state.clone(), require_org_member));

    // Admin of the organization in the path
    let admin_routes = Router::new()
        .route("/organizations/:org_id/invite", put(organizations::invite))
        .route("/organizations/:org_id/owner", post(organizations::transfer_ownership))
        .route("/organizations/:org_id/users/:user_id", delete(organizations::remove_member))
        .route_layer(middleware::from_fn_with_state(auth_state, require_org_admin));

    let api_routes = public_api_routes
        .merge(session_routes)
        .merge(member_routes)
        .merge(admin_routes);

    let cors = cors_layer(&[&state.config.api_host_url, &state.config.app_host_url]);

    Router::new()
        .merge(health_routes)
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Credentialed CORS for the API and web app origins
fn cors_layer(hosts: &[&Url]) -> CorsLayer {
    let origins: Vec<HeaderValue> = hosts
        .iter()
        .filter_map(|url| HeaderValue::from_str(&url.origin().ascii_serialization()).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// `302 Found` to `location`, setting every cookie in `cookies`.
pub(crate) fn found(location: &Url, cookies: impl IntoIterator<Item = HeaderValue>) -> ApiResult<Response> {
    let mut headers = HeaderMap::new();
    headers.insert(header::LOCATION, HeaderValue::from_str(location.as_str())?);
    for cookie in cookies {
        headers.append(header::SET_COOKIE, cookie);
    }
    Ok((StatusCode::FOUND, headers).into_response())
}

/// Render `result`; a 401 also carries every cookie in `clears`.
pub(crate) fn clearing_on_unauthorized(
    result: ApiResult<Response>,
    clears: impl IntoIterator<Item = Result<HeaderValue, InvalidHeaderValue>>,
) -> Response {
    let mut response = result.unwrap_or_else(ApiError::into_response);
    if response.status() != StatusCode::UNAUTHORIZED {
        return response;
    }

    for clear in clears {
        match clear {
            Ok(cookie) => {
                response.headers_mut().append(header::SET_COOKIE, cookie);
            }
            Err(e) => tracing::warn!(error = %e, "Could not write clearing cookie"),
        }
    }
    response
}
