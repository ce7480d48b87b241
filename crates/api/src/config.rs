//! Application configuration

use std::env;

use time::Duration;
use url::Url;

use crate::auth::{oauth::OAuthClientConfig, CookieSettings, OTP_LEN};

const MIN_JWT_SECRET_LEN: usize = 32;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub project_name: String,
    /// Public base URL of this API, always ending in `/`
    pub api_host_url: Url,
    /// Public base URL of the web app, always ending in `/`
    pub app_host_url: Url,
    /// `APP_ENV=release`: secure cookies scoped to the API host
    pub secured: bool,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Authentication
    pub jwt_secret: String,
    pub session_ttl: Duration,
    pub password_reset_token_ttl: Duration,
    pub org_invite_ttl: Duration,
    pub password_reset_ttl: Duration,
    pub otp_len: usize,

    // Email
    pub resend_api_key: String,
    pub email_from: String,

    // OAuth
    pub google: Option<OAuthCredentials>,
    pub github: Option<OAuthCredentials>,
}

/// Client id and secret registered with an OAuth provider
#[derive(Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let project_name = env::var("PROJECT_NAME").unwrap_or_else(|_| "patos-app".to_string());

        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            api_host_url: base_url("API_HOST_URL", "http://localhost:8080/")?,
            app_host_url: base_url("APP_HOST_URL", "http://localhost:3000/")?,
            secured: env::var("APP_ENV").map(|v| v == "release").unwrap_or(false),
            project_name,

            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,

            // Authentication
            jwt_secret: {
                let secret =
                    env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
                if secret.len() < MIN_JWT_SECRET_LEN {
                    return Err(ConfigError::WeakSecret(
                        "JWT_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },
            session_ttl: Duration::seconds(positive_or("SESSION_TTL_SECS", 1800)?),
            password_reset_token_ttl: Duration::seconds(positive_or("PASSWORD_RESET_TOKEN_TTL_SECS", 1800)?),
            org_invite_ttl: Duration::days(positive_or("ORG_INVITE_TTL_DAYS", 15)?),
            password_reset_ttl: Duration::days(positive_or("PASSWORD_RESET_TTL_DAYS", 1)?),
            otp_len: positive_or("OTP_LEN", OTP_LEN)?,

            // Email
            resend_api_key: env::var("RESEND_API_KEY").unwrap_or_default(),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Patos <noreply@localhost>".to_string()),

            // OAuth
            google: oauth_credentials("OAUTH_GOOGLE_CLIENT_ID", "OAUTH_GOOGLE_SECRET"),
            github: oauth_credentials("OAUTH_GITHUB_CLIENT_ID", "OAUTH_GITHUB_SECRET"),
        })
    }

    /// Issuer stamped into every token
    pub fn token_issuer(&self) -> String {
        format!("{}-auth", self.project_name)
    }

    /// Cookie names from the project name; domain and `Secure` only in secured mode.
    pub fn cookie_settings(&self) -> CookieSettings {
        let domain = if self.secured {
            self.api_host_url.host_str().map(str::to_string)
        } else {
            None
        };
        CookieSettings::for_project(&self.project_name, domain, self.secured)
    }

    /// Absolute URL under the API host, e.g. `v1/users/confirm`.
    pub fn api_url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.api_host_url.join(path)
    }

    /// Absolute URL under the web app host.
    pub fn app_url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.app_host_url.join(path)
    }

    pub fn google_oauth(&self) -> Result<Option<OAuthClientConfig>, url::ParseError> {
        self.google
            .as_ref()
            .map(|c| {
                Ok(OAuthClientConfig::google(
                    c.client_id.clone(),
                    c.client_secret.clone(),
                    self.api_url("v1/auth/google/callback")?.to_string(),
                ))
            })
            .transpose()
    }

    pub fn github_oauth(&self) -> Result<Option<OAuthClientConfig>, url::ParseError> {
        self.github
            .as_ref()
            .map(|c| {
                Ok(OAuthClientConfig::github(
                    c.client_id.clone(),
                    c.client_secret.clone(),
                    self.api_url("v1/auth/github/callback")?.to_string(),
                ))
            })
            .transpose()
    }
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Like [`parse_or`], but zero and negative values are invalid.
fn positive_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let value = parse_or(name, default)?;
    if value <= T::default() {
        return Err(ConfigError::Invalid(name));
    }
    Ok(value)
}

/// Parse a base URL and make sure it ends in `/` so `join` appends instead of replacing.
fn base_url(name: &'static str, default: &str) -> Result<Url, ConfigError> {
    let mut raw = env::var(name).unwrap_or_else(|_| default.to_string());
    if !raw.ends_with('/') {
        raw.push('/');
    }
    Url::parse(&raw).map_err(|_| ConfigError::Invalid(name))
}

fn oauth_credentials(id_var: &str, secret_var: &str) -> Option<OAuthCredentials> {
    let client_id = env::var(id_var).ok().filter(|v| !v.is_empty())?;
    let client_secret = env::var(secret_var).ok().filter(|v| !v.is_empty())?;
    Some(OAuthCredentials {
        client_id,
        client_secret,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}
