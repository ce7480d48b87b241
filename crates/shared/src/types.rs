//! Common types used across Patos

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};

// =============================================================================
// ID Wrappers
// =============================================================================

/// User ID wrapper (system-assigned, numeric)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct UserId(pub i64);

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Organization ID wrapper (short random string, shareable by humans)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct OrganizationId(pub String);

impl OrganizationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for OrganizationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for OrganizationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Users
// =============================================================================

/// A confirmed account
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[sqlx(rename = "user_id")]
    pub id: UserId,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<Date>,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Registration waiting for email confirmation, keyed by email
#[derive(Debug, Clone, FromRow)]
pub struct UnconfirmedUser {
    pub email: String,
    pub otp: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<Date>,
}

// =============================================================================
// Organizations
// =============================================================================

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    #[sqlx(rename = "organization_id")]
    pub id: OrganizationId,
    #[sqlx(rename = "organization_name")]
    pub name: String,
    pub owner_user_id: UserId,
    pub billing_plan_id: Option<i32>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub organization_id: OrganizationId,
    pub user_id: UserId,
    pub is_admin: bool,
}

/// One row of a user's organization listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationSummary {
    pub organization_id: OrganizationId,
    pub organization_name: String,
    pub is_admin: bool,
    pub is_owner: bool,
}

/// Pending invitation. `is_admin` is the role granted on acceptance.
#[derive(Debug, Clone, FromRow)]
pub struct OrganizationInvite {
    pub organization_id: OrganizationId,
    pub user_id: UserId,
    pub is_admin: bool,
    pub otp: String,
    pub exp: OffsetDateTime,
}

impl OrganizationInvite {
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.exp <= now
    }
}

// =============================================================================
// Password resets
// =============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct PasswordReset {
    pub user_id: UserId,
    pub otp: String,
    pub exp: OffsetDateTime,
}

impl PasswordReset {
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.exp <= now
    }
}
