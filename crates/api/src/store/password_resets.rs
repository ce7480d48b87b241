//! Postgres-backed password reset records

use async_trait::async_trait;
use patos_shared::{AuthError, AuthResult, PasswordReset, UserId};
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};

use super::PasswordResetStore;
use crate::auth::hash_password;

#[derive(Clone)]
pub struct PgPasswordResetStore {
    pool: PgPool,
    ttl: Duration,
}

impl PgPasswordResetStore {
    /// `ttl` is how long a reset link stays valid.
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }
}

#[async_trait]
impl PasswordResetStore for PgPasswordResetStore {
    async fn init_reset(&self, user_id: UserId, otp: &str) -> AuthResult<PasswordReset> {
        let exp = OffsetDateTime::now_utc() + self.ttl;

        let reset = sqlx::query_as(
            r#"
            INSERT INTO password_resets (user_id, otp, exp)
            VALUES ($1, $2, $3)
            RETURNING user_id, otp, exp
            "#,
        )
        .bind(user_id)
        .bind(otp)
        .bind(exp)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(user_id = %user_id, "Password reset initiated");
        Ok(reset)
    }

    async fn get_valid_reset(&self, otp: &str) -> AuthResult<PasswordReset> {
        let reset = sqlx::query_as(
            r#"
            SELECT user_id, otp, exp
            FROM password_resets
            WHERE otp = $1 AND exp > NOW()
            "#,
        )
        .bind(otp)
        .fetch_one(&self.pool)
        .await?;
        Ok(reset)
    }

    async fn complete_reset(&self, user_id: UserId, new_password: &str) -> AuthResult<()> {
        let password_hash = hash_password(new_password)?;

        let mut tx = self.pool.begin().await?;

        let live: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM password_resets WHERE user_id = $1 AND exp > NOW()",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        if live == 0 {
            return Err(AuthError::NotFound);
        }

        let updated = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $1, updated_at = NOW()
            WHERE user_id = $2
            "#,
        )
        .bind(&password_hash)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(AuthError::NotFound);
        }

        // Every outstanding reset for the user dies with this one
        sqlx::query("DELETE FROM password_resets WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(user_id = %user_id, "Password reset completed");
        Ok(())
    }

    async fn sweep_expired_resets(&self) -> AuthResult<u64> {
        let result = sqlx::query("DELETE FROM password_resets WHERE exp <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
