//! Persistence capabilities behind the auth flows
//!
//! Each trait has a Postgres implementation, where every multi-step
//! operation is one transaction, and `MemoryStore` (feature `test-util`), which
//! implements all of them over shared in-process state.

mod credentials;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
mod organizations;
mod password_resets;

use async_trait::async_trait;
use patos_shared::{
    AuthResult, Membership, Organization, OrganizationId, OrganizationInvite,
    OrganizationSummary, PasswordReset, User, UserId,
};
use time::Date;

use crate::auth::oauth::OAuthProfile;

pub use credentials::PgCredentialStore;
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryStore;
pub use organizations::PgOrganizationStore;
pub use password_resets::PgPasswordResetStore;

/// Sign-up form as submitted, password still in clear text
#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<Date>,
}

/// Editable profile fields of a confirmed user
#[derive(Debug, Clone)]
pub struct ProfileEdit {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<Date>,
}

/// Result of an OAuth login
#[derive(Debug, Clone)]
pub struct OAuthLogin {
    pub user: User,
    /// True when this login created the account
    pub created: bool,
}

#[derive(Debug, Clone)]
pub struct NewOrganization {
    pub id: OrganizationId,
    pub name: String,
    pub owner_user_id: UserId,
}

/// Users and pending registrations.
///
/// States per email: unregistered, pending (unconfirmed row), confirmed (user row).
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Upsert the pending row for `registration.email` with `otp`.
    /// A later call for the same email replaces the earlier OTP and credentials.
    /// `Conflict` when a confirmed user already owns the email.
    async fn register_pending(&self, registration: &Registration, otp: &str) -> AuthResult<()>;

    /// Materialize the pending row holding `otp` as a user and delete it.
    /// `NotFound` when no pending row holds `otp`.
    async fn confirm(&self, otp: &str) -> AuthResult<User>;

    /// Find or create the user for a provider-verified email and record the
    /// provider link idempotently.
    async fn login_oauth(&self, profile: &OAuthProfile) -> AuthResult<OAuthLogin>;

    async fn find_user_by_email(&self, email: &str) -> AuthResult<User>;

    async fn find_user(&self, id: UserId) -> AuthResult<User>;

    /// Replace the profile fields of `id` and bump `updated_at`.
    /// `NotFound` when the user does not exist.
    async fn edit_user(&self, id: UserId, edit: &ProfileEdit) -> AuthResult<User>;

    async fn ping(&self) -> AuthResult<()>;
}

/// Organizations, memberships and invites
#[async_trait]
pub trait OrganizationStore: Send + Sync {
    /// Insert the organization and the owner's admin membership together.
    async fn create_organization(&self, organization: &NewOrganization) -> AuthResult<Organization>;

    async fn find_organization(&self, id: &OrganizationId) -> AuthResult<Organization>;

    async fn find_membership(&self, organization_id: &OrganizationId, user_id: UserId) -> AuthResult<Membership>;

    async fn list_user_organizations(&self, user_id: UserId) -> AuthResult<Vec<OrganizationSummary>>;

    /// Several invites may coexist for the same user and organization.
    async fn create_invite(&self, invite: &OrganizationInvite) -> AuthResult<()>;

    /// Turn an unexpired invite into a membership with the invite's role and
    /// delete the invite, all or nothing. `NotFound` when absent or expired,
    /// `Conflict` when the user is already a member.
    async fn accept_invite(&self, otp: &str) -> AuthResult<Membership>;

    /// `Conflict` when `user_id` owns the organization.
    async fn remove_member(&self, organization_id: &OrganizationId, user_id: UserId) -> AuthResult<()>;

    /// Move the owner pointer and grant admin on the new owner's membership
    /// together. `NotFound` when the new owner is not a member.
    async fn transfer_ownership(&self, organization_id: &OrganizationId, new_owner: UserId) -> AuthResult<()>;

    /// Delete every invite past its expiry. Returns the number removed.
    async fn sweep_expired_invites(&self) -> AuthResult<u64>;
}

/// Single-use, expiring password reset records
#[async_trait]
pub trait PasswordResetStore: Send + Sync {
    async fn init_reset(&self, user_id: UserId, otp: &str) -> AuthResult<PasswordReset>;

    /// `NotFound` when absent or expired.
    async fn get_valid_reset(&self, otp: &str) -> AuthResult<PasswordReset>;

    /// Store the new password hash and delete every reset row of the user.
    /// `NotFound` when the user holds no unexpired reset.
    async fn complete_reset(&self, user_id: UserId, new_password: &str) -> AuthResult<()>;

    async fn sweep_expired_resets(&self) -> AuthResult<u64>;
}
