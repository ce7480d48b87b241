//! Postgres-backed organizations, memberships and invites

use async_trait::async_trait;
use patos_shared::{
    AuthError, AuthResult, Membership, Organization, OrganizationId, OrganizationInvite,
    OrganizationSummary, UserId,
};
use sqlx::PgPool;

use super::{NewOrganization, OrganizationStore};

#[derive(Clone)]
pub struct PgOrganizationStore {
    pool: PgPool,
}

impl PgOrganizationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrganizationStore for PgOrganizationStore {
    async fn create_organization(&self, organization: &NewOrganization) -> AuthResult<Organization> {
        let mut tx = self.pool.begin().await?;

        let created: Organization = sqlx::query_as(
            r#"
            INSERT INTO organizations (organization_id, organization_name, owner_user_id)
            VALUES ($1, $2, $3)
            RETURNING organization_id, organization_name, owner_user_id, billing_plan_id,
                      created_at, deleted_at
            "#,
        )
        .bind(&organization.id)
        .bind(&organization.name)
        .bind(organization.owner_user_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO organizations_users (organization_id, user_id, is_admin)
            VALUES ($1, $2, true)
            "#,
        )
        .bind(&organization.id)
        .bind(organization.owner_user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            organization_id = %created.id,
            owner_user_id = %created.owner_user_id,
            "Organization created"
        );
        Ok(created)
    }

    async fn find_organization(&self, id: &OrganizationId) -> AuthResult<Organization> {
        let organization = sqlx::query_as(
            r#"
            SELECT organization_id, organization_name, owner_user_id, billing_plan_id,
                   created_at, deleted_at
            FROM organizations
            WHERE organization_id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(organization)
    }

    async fn find_membership(&self, organization_id: &OrganizationId, user_id: UserId) -> AuthResult<Membership> {
        let membership = sqlx::query_as(
            r#"
            SELECT organization_id, user_id, is_admin
            FROM organizations_users
            WHERE organization_id = $1 AND user_id = $2
            "#,
        )
        .bind(organization_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(membership)
    }

    async fn list_user_organizations(&self, user_id: UserId) -> AuthResult<Vec<OrganizationSummary>> {
        let organizations = sqlx::query_as(
            r#"
            SELECT o.organization_id,
                   o.organization_name,
                   ou.is_admin,
                   o.owner_user_id = ou.user_id AS is_owner
            FROM organizations o
            INNER JOIN organizations_users ou ON o.organization_id = ou.organization_id
            WHERE ou.user_id = $1 AND o.deleted_at IS NULL
            ORDER BY o.organization_name, o.organization_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(organizations)
    }

    async fn create_invite(&self, invite: &OrganizationInvite) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO organization_invites (organization_id, user_id, is_admin, otp, exp)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&invite.organization_id)
        .bind(invite.user_id)
        .bind(invite.is_admin)
        .bind(&invite.otp)
        .bind(invite.exp)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            organization_id = %invite.organization_id,
            user_id = %invite.user_id,
            is_admin = invite.is_admin,
            "Organization invite created"
        );
        Ok(())
    }

    async fn accept_invite(&self, otp: &str) -> AuthResult<Membership> {
        let mut tx = self.pool.begin().await?;

        let invite: OrganizationInvite = sqlx::query_as(
            r#"
            SELECT organization_id, user_id, is_admin, otp, exp
            FROM organization_invites
            WHERE otp = $1 AND exp > NOW()
            FOR UPDATE
            "#,
        )
        .bind(otp)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AuthError::NotFound)?;

        // A unique violation here (already a member) rolls the whole acceptance back
        let membership: Membership = sqlx::query_as(
            r#"
            INSERT INTO organizations_users (organization_id, user_id, is_admin)
            VALUES ($1, $2, $3)
            RETURNING organization_id, user_id, is_admin
            "#,
        )
        .bind(&invite.organization_id)
        .bind(invite.user_id)
        .bind(invite.is_admin)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM organization_invites WHERE otp = $1")
            .bind(otp)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(
            organization_id = %membership.organization_id,
            user_id = %membership.user_id,
            "Organization invite accepted"
        );
        Ok(membership)
    }

    async fn remove_member(&self, organization_id: &OrganizationId, user_id: UserId) -> AuthResult<()> {
        let mut tx = self.pool.begin().await?;

        let owner: UserId = sqlx::query_scalar(
            "SELECT owner_user_id FROM organizations WHERE organization_id = $1 FOR SHARE",
        )
        .bind(organization_id)
        .fetch_one(&mut *tx)
        .await?;

        if owner == user_id {
            return Err(AuthError::conflict("the owner cannot be removed"));
        }

        let removed = sqlx::query(
            "DELETE FROM organizations_users WHERE organization_id = $1 AND user_id = $2",
        )
        .bind(organization_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if removed == 0 {
            return Err(AuthError::NotFound);
        }

        tx.commit().await?;

        tracing::info!(organization_id = %organization_id, user_id = %user_id, "Member removed");
        Ok(())
    }

    async fn transfer_ownership(&self, organization_id: &OrganizationId, new_owner: UserId) -> AuthResult<()> {
        let mut tx = self.pool.begin().await?;

        let promoted = sqlx::query(
            r#"
            UPDATE organizations_users
            SET is_admin = true
            WHERE organization_id = $1 AND user_id = $2
            "#,
        )
        .bind(organization_id)
        .bind(new_owner)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if promoted == 0 {
            return Err(AuthError::NotFound);
        }

        let updated = sqlx::query(
            r#"
            UPDATE organizations
            SET owner_user_id = $1, updated_at = NOW()
            WHERE organization_id = $2
            "#,
        )
        .bind(new_owner)
        .bind(organization_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(AuthError::NotFound);
        }

        tx.commit().await?;

        tracing::info!(
            organization_id = %organization_id,
            new_owner = %new_owner,
            "Organization ownership transferred"
        );
        Ok(())
    }

    async fn sweep_expired_invites(&self) -> AuthResult<u64> {
        let result = sqlx::query("DELETE FROM organization_invites WHERE exp <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
