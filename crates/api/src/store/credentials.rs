//! Postgres-backed users, pending registrations and OAuth links

use async_trait::async_trait;
use patos_shared::{AuthError, AuthResult, UnconfirmedUser, User, UserId};
use sqlx::PgPool;

use super::{CredentialStore, OAuthLogin, ProfileEdit, Registration};
use crate::auth::{generate_impossible_hash, hash_password, oauth::OAuthProfile};

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn register_pending(&self, registration: &Registration, otp: &str) -> AuthResult<()> {
        let password_hash = hash_password(&registration.password)?;

        let mut tx = self.pool.begin().await?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
            .bind(&registration.email)
            .fetch_one(&mut *tx)
            .await?;
        if exists {
            return Err(AuthError::conflict("email already registered"));
        }

        // Latest registration wins; the previous OTP stops working
        sqlx::query(
            r#"
            INSERT INTO unconfirmed_users (email, otp, password_hash, first_name, last_name, date_of_birth)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (email) DO UPDATE
            SET otp = EXCLUDED.otp,
                password_hash = EXCLUDED.password_hash,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                date_of_birth = EXCLUDED.date_of_birth,
                created_at = NOW()
            "#,
        )
        .bind(&registration.email)
        .bind(otp)
        .bind(&password_hash)
        .bind(&registration.first_name)
        .bind(&registration.last_name)
        .bind(registration.date_of_birth)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(email = %registration.email, "Pending registration stored");
        Ok(())
    }

    async fn confirm(&self, otp: &str) -> AuthResult<User> {
        let mut tx = self.pool.begin().await?;

        let pending: UnconfirmedUser = sqlx::query_as(
            r#"
            SELECT email, otp, password_hash, first_name, last_name, date_of_birth
            FROM unconfirmed_users
            WHERE otp = $1
            FOR UPDATE
            "#,
        )
        .bind(otp)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AuthError::NotFound)?;

        let user: User = sqlx::query_as(
            r#"
            INSERT INTO users (email, password_hash, first_name, last_name, date_of_birth)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING user_id, email, password_hash, first_name, last_name, date_of_birth,
                      avatar_url, is_active, created_at, updated_at
            "#,
        )
        .bind(&pending.email)
        .bind(&pending.password_hash)
        .bind(&pending.first_name)
        .bind(&pending.last_name)
        .bind(pending.date_of_birth)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM unconfirmed_users WHERE otp = $1")
            .bind(otp)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(user_id = %user.id, "User confirmed");
        Ok(user)
    }

    async fn login_oauth(&self, profile: &OAuthProfile) -> AuthResult<OAuthLogin> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<User> = sqlx::query_as(
            r#"
            SELECT user_id, email, password_hash, first_name, last_name, date_of_birth,
                   avatar_url, is_active, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(&profile.email)
        .fetch_optional(&mut *tx)
        .await?;

        let (user, created) = match existing {
            Some(user) => (user, false),
            None => {
                let password_hash = generate_impossible_hash()?;
                let user: User = sqlx::query_as(
                    r#"
                    INSERT INTO users (email, password_hash, first_name, last_name, avatar_url)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING user_id, email, password_hash, first_name, last_name, date_of_birth,
                              avatar_url, is_active, created_at, updated_at
                    "#,
                )
                .bind(&profile.email)
                .bind(&password_hash)
                .bind(&profile.first_name)
                .bind(&profile.last_name)
                .bind(&profile.picture_url)
                .fetch_one(&mut *tx)
                .await?;
                (user, true)
            }
        };

        sqlx::query(
            r#"
            INSERT INTO oauth_users (email, oauth_provider, user_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (email, oauth_provider) DO NOTHING
            "#,
        )
        .bind(&profile.email)
        .bind(&profile.provider)
        .bind(user.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            user_id = %user.id,
            provider = %profile.provider,
            created,
            "OAuth login"
        );
        Ok(OAuthLogin { user, created })
    }

    async fn find_user_by_email(&self, email: &str) -> AuthResult<User> {
        let user = sqlx::query_as(
            r#"
            SELECT user_id, email, password_hash, first_name, last_name, date_of_birth,
                   avatar_url, is_active, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user(&self, id: UserId) -> AuthResult<User> {
        let user = sqlx::query_as(
            r#"
            SELECT user_id, email, password_hash, first_name, last_name, date_of_birth,
                   avatar_url, is_active, created_at, updated_at
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn edit_user(&self, id: UserId, edit: &ProfileEdit) -> AuthResult<User> {
        let user = sqlx::query_as(
            r#"
            UPDATE users
            SET first_name = $2, last_name = $3, date_of_birth = $4, updated_at = NOW()
            WHERE user_id = $1
            RETURNING user_id, email, password_hash, first_name, last_name, date_of_birth,
                      avatar_url, is_active, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&edit.first_name)
        .bind(&edit.last_name)
        .bind(edit.date_of_birth)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(user_id = %id, "Profile updated");
        Ok(user)
    }

    async fn ping(&self) -> AuthResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{otp::generate_otp, verify_password};
    use serial_test::serial;

    async fn store() -> PgCredentialStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = patos_shared::create_pool(&url, 2).await.expect("pool");
        patos_shared::run_migrations(&pool).await.expect("migrations");
        PgCredentialStore::new(pool)
    }

    fn registration(email: &str, password: &str) -> Registration {
        Registration {
            email: email.to_string(),
            password: password.to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            date_of_birth: None,
        }
    }

    fn unique_email() -> String {
        format!("{}@example.test", generate_otp(12).unwrap().to_lowercase())
    }

    #[tokio::test]
    #[ignore = "Requires DATABASE_URL"]
    #[serial(sqlx_db)]
    async fn test_reregistration_replaces_otp() {
        let store = store().await;
        let email = unique_email();
        let o1 = generate_otp(128).unwrap();
        let o2 = generate_otp(128).unwrap();

        store.register_pending(&registration(&email, "first-pass1"), &o1).await.unwrap();
        store.register_pending(&registration(&email, "second-pass2"), &o2).await.unwrap();

        assert!(matches!(store.confirm(&o1).await, Err(AuthError::NotFound)));
        let user = store.confirm(&o2).await.unwrap();
        assert_eq!(user.email, email);
        assert!(verify_password("second-pass2", &user.password_hash).unwrap());

        assert!(matches!(store.confirm(&o2).await, Err(AuthError::NotFound)));
        assert!(matches!(
            store.register_pending(&registration(&email, "third-pass3"), &o1).await,
            Err(AuthError::Conflict(_))
        ));
    }

    #[tokio::test]
    #[ignore = "Requires DATABASE_URL"]
    #[serial(sqlx_db)]
    async fn test_oauth_login_creates_once() {
        let store = store().await;
        let profile = OAuthProfile {
            email: unique_email(),
            first_name: "Grace".into(),
            last_name: "Hopper".into(),
            picture_url: None,
            provider: "github".into(),
        };

        let first = store.login_oauth(&profile).await.unwrap();
        let second = store.login_oauth(&profile).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.user.id, second.user.id);
    }

    #[tokio::test]
    #[ignore = "Requires DATABASE_URL"]
    #[serial(sqlx_db)]
    async fn test_edit_user_updates_profile() {
        let store = store().await;
        let email = unique_email();
        let otp = generate_otp(128).unwrap();
        store.register_pending(&registration(&email, "first-pass1"), &otp).await.unwrap();
        let user = store.confirm(&otp).await.unwrap();

        let edit = ProfileEdit {
            first_name: "Augusta".into(),
            last_name: "King".into(),
            date_of_birth: Some(time::Date::from_calendar_date(1815, time::Month::December, 10).unwrap()),
        };
        let edited = store.edit_user(user.id, &edit).await.unwrap();
        assert_eq!(edited.first_name, "Augusta");
        assert_eq!(edited.date_of_birth, edit.date_of_birth);
        assert!(edited.updated_at >= user.updated_at);
        assert_eq!(store.find_user(user.id).await.unwrap().last_name, "King");

        assert!(matches!(
            store.edit_user(UserId(i64::MAX), &edit).await,
            Err(AuthError::NotFound)
        ));
    }
}
