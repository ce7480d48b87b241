//! Shared application state handed to every handler

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    auth::{
        oauth::{GithubProvider, GoogleProvider},
        AuthState, CookieWriter, OAuthProviders, TokenCodec,
    },
    config::Config,
    email::{EmailConfig, EmailSender, ResendEmailSender},
    store::{
        CredentialStore, OrganizationStore, PasswordResetStore, PgCredentialStore,
        PgOrganizationStore, PgPasswordResetStore,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub codec: TokenCodec,
    pub cookies: CookieWriter,
    pub credentials: Arc<dyn CredentialStore>,
    pub organizations: Arc<dyn OrganizationStore>,
    pub password_resets: Arc<dyn PasswordResetStore>,
    pub email: Arc<dyn EmailSender>,
    pub oauth: Arc<OAuthProviders>,
}

impl AppState {
    /// State backed by Postgres, Resend and the configured OAuth providers
    pub fn postgres(config: Config, pool: PgPool) -> Result<Self, url::ParseError> {
        let client = reqwest::Client::new();

        let mut oauth = OAuthProviders::new();
        if let Some(google) = config.google_oauth()? {
            oauth.register(Arc::new(GoogleProvider::new(google, client.clone())));
        }
        if let Some(github) = config.github_oauth()? {
            oauth.register(Arc::new(GithubProvider::new(github, client.clone())));
        }
        if oauth.is_empty() {
            tracing::info!("No OAuth provider configured");
        }

        let email = ResendEmailSender::new(
            EmailConfig::new(
                config.resend_api_key.clone(),
                config.email_from.clone(),
                config.project_name.clone(),
                config.api_host_url.clone(),
            ),
            client,
        );

        let password_reset_ttl = config.password_reset_ttl;
        Ok(Self::new(
            config,
            Arc::new(PgCredentialStore::new(pool.clone())),
            Arc::new(PgOrganizationStore::new(pool.clone())),
            Arc::new(PgPasswordResetStore::new(pool, password_reset_ttl)),
            Arc::new(email),
            oauth,
        ))
    }

    pub fn new(
        config: Config,
        credentials: Arc<dyn CredentialStore>,
        organizations: Arc<dyn OrganizationStore>,
        password_resets: Arc<dyn PasswordResetStore>,
        email: Arc<dyn EmailSender>,
        oauth: OAuthProviders,
    ) -> Self {
        let codec = TokenCodec::new(&config.jwt_secret, config.token_issuer());
        let cookies = CookieWriter::new(config.cookie_settings());

        Self {
            config: Arc::new(config),
            codec,
            cookies,
            credentials,
            organizations,
            password_resets,
            email,
            oauth: Arc::new(oauth),
        }
    }

    /// What the session middleware needs
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            codec: self.codec.clone(),
            cookies: self.cookies.clone(),
            session_ttl: self.config.session_ttl,
        }
    }
}
