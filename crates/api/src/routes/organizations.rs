//! Organization, membership and invite routes

use axum::{
    extract::{Extension, Path, Query, State},
    http::{header, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    Json,
};
use patos_shared::{AuthError, Membership, Organization, OrganizationId, OrganizationInvite, UserId};
use serde::Deserialize;
use time::OffsetDateTime;

use crate::{
    auth::{generate_otp, otp::ORGANIZATION_ID_LEN, reauthorize, Session},
    email::EmailTemplate,
    error::{ApiError, ApiResult},
    state::AppState,
    store::NewOrganization,
};

use super::users::{normalize_email, OtpQuery};

/// Attempts at drawing an unused organization id
const ORGANIZATION_ID_ATTEMPTS: usize = 5;
const MAX_ORGANIZATION_NAME_LEN: usize = 100;

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrganizationRequest {
    pub organization_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    pub user_email: String,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Deserialize)]
pub struct TransferOwnershipRequest {
    pub email: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// Create an organization owned (and administered) by the caller
pub async fn create_organization(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<CreateOrganizationRequest>,
) -> ApiResult<(StatusCode, Json<Organization>)> {
    let name = req.organization_name.trim();
    if name.is_empty() || name.chars().count() > MAX_ORGANIZATION_NAME_LEN {
        return Err(ApiError::Validation(format!(
            "organizationName must be between 1 and {MAX_ORGANIZATION_NAME_LEN} characters"
        )));
    }

    // Ids are short, so a collision is retried with a fresh draw
    let mut last_err = None;
    for _ in 0..ORGANIZATION_ID_ATTEMPTS {
        let id = generate_otp(ORGANIZATION_ID_LEN).map_err(AuthError::from)?;
        let new = NewOrganization {
            id: OrganizationId(id),
            name: name.to_string(),
            owner_user_id: session.0.user_id,
        };

        match state.organizations.create_organization(&new).await {
            Ok(organization) => {
                tracing::info!(
                    organization_id = %organization.id,
                    owner = %organization.owner_user_id,
                    "Organization created"
                );
                return Ok((StatusCode::CREATED, Json(organization)));
            }
            Err(e @ AuthError::Conflict(_)) => {
                tracing::debug!(organization_id = %new.id, "Organization id taken, drawing again");
                last_err = Some(e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(last_err.map(ApiError::from).unwrap_or(ApiError::Internal))
}

pub async fn get_organization(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
) -> ApiResult<Json<Organization>> {
    let organization = state
        .organizations
        .find_organization(&OrganizationId(org_id))
        .await?;
    Ok(Json(organization))
}

/// Invite a registered user by email. The role is granted on acceptance.
pub async fn invite(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    Json(req): Json<InviteRequest>,
) -> ApiResult<StatusCode> {
    let organization = state
        .organizations
        .find_organization(&OrganizationId(org_id))
        .await?;
    let invitee = state
        .credentials
        .find_user_by_email(&normalize_email(&req.user_email)?)
        .await?;

    let otp = generate_otp(state.config.otp_len).map_err(AuthError::from)?;
    let invite = OrganizationInvite {
        organization_id: organization.id.clone(),
        user_id: invitee.id,
        is_admin: req.is_admin,
        otp: otp.clone(),
        exp: OffsetDateTime::now_utc() + state.config.org_invite_ttl,
    };
    state.organizations.create_invite(&invite).await?;

    state
        .email
        .send(
            &invitee.email,
            EmailTemplate::OrganizationInvite {
                first_name: invitee.first_name.clone(),
                organization_name: organization.name.clone(),
                otp,
            },
        )
        .await?;

    tracing::info!(
        organization_id = %organization.id,
        user_id = %invitee.id,
        is_admin = req.is_admin,
        "Organization invite sent"
    );
    Ok(StatusCode::CREATED)
}

/// Hand the organization to another member. Only the current owner may do this.
pub async fn transfer_ownership(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(org_id): Path<String>,
    Json(req): Json<TransferOwnershipRequest>,
) -> ApiResult<Response> {
    let organization_id = OrganizationId(org_id);
    let organization = state.organizations.find_organization(&organization_id).await?;
    if organization.owner_user_id != session.0.user_id {
        return Err(ApiError::Unauthorized);
    }

    let new_owner = state
        .credentials
        .find_user_by_email(&normalize_email(&req.email)?)
        .await?;
    state
        .organizations
        .transfer_ownership(&organization_id, new_owner.id)
        .await?;

    tracing::info!(
        organization_id = %organization_id,
        from = %session.0.user_id,
        to = %new_owner.id,
        "Ownership transferred"
    );

    let cookie = reauthorize(&state.auth_state(), &session)?;
    Ok((AppendHeaders([(header::SET_COOKIE, cookie)]), StatusCode::OK).into_response())
}

/// Invite link target
pub async fn accept_invite(
    State(state): State<AppState>,
    Query(query): Query<OtpQuery>,
) -> ApiResult<Json<Membership>> {
    let membership = state.organizations.accept_invite(&query.otp).await?;
    tracing::info!(
        organization_id = %membership.organization_id,
        user_id = %membership.user_id,
        "Invite accepted"
    );
    Ok(Json(membership))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Path((org_id, user_id)): Path<(String, i64)>,
) -> ApiResult<StatusCode> {
    let organization_id = OrganizationId(org_id);
    state
        .organizations
        .remove_member(&organization_id, UserId(user_id))
        .await?;
    tracing::info!(organization_id = %organization_id, user_id, "Member removed");
    Ok(StatusCode::NO_CONTENT)
}
