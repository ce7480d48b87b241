//! Claim shapes carried inside signed tokens

use patos_shared::{OrganizationId, UserId};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// A payload that can be signed by [`TokenCodec`](super::TokenCodec).
///
/// Every shape has its own audience, so a token minted for one shape never
/// verifies as another even though they share a signing secret.
pub trait ClaimShape: Serialize + DeserializeOwned + Clone {
    const AUDIENCE: &'static str;

    /// Structural rules that serde alone cannot express.
    fn is_well_formed(&self) -> bool {
        true
    }
}

/// Payload plus the registered claims stamped at issue time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims<P> {
    #[serde(flatten)]
    pub payload: P,
    pub aud: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

impl<P> TokenClaims<P> {
    /// Time left before `exp`, negative once expired.
    pub fn remaining(&self, now: OffsetDateTime) -> Duration {
        Duration::seconds(self.exp - now.unix_timestamp())
    }
}

/// Organization a session is operating in, with the caller's role there
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgScope {
    pub organization_id: OrganizationId,
    pub is_admin: bool,
}

/// Identity and optional organization scope of a signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    pub user_id: UserId,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    organization_id: Option<OrganizationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_admin: Option<bool>,
}

impl SessionClaims {
    /// Unscoped session, as issued right after login.
    pub fn new(user_id: UserId, email: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
            organization_id: None,
            is_admin: None,
        }
    }

    pub fn with_scope(mut self, scope: OrgScope) -> Self {
        self.organization_id = Some(scope.organization_id);
        self.is_admin = Some(scope.is_admin);
        self
    }

    pub fn scope(&self) -> Option<OrgScope> {
        match (&self.organization_id, self.is_admin) {
            (Some(organization_id), Some(is_admin)) => Some(OrgScope {
                organization_id: organization_id.clone(),
                is_admin,
            }),
            _ => None,
        }
    }
}

impl ClaimShape for SessionClaims {
    const AUDIENCE: &'static str = "session";

    // organizationId and isAdmin travel together or not at all
    fn is_well_formed(&self) -> bool {
        self.organization_id.is_some() == self.is_admin.is_some()
    }
}

/// Short-lived grant allowing a password change for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetClaims {
    pub user_id: UserId,
    pub allowed: bool,
}

impl PasswordResetClaims {
    pub fn allow(user_id: UserId) -> Self {
        Self {
            user_id,
            allowed: true,
        }
    }
}

impl ClaimShape for PasswordResetClaims {
    const AUDIENCE: &'static str = "password-reset";
}
