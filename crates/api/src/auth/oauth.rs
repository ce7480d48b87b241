//! Delegated login through Google and GitHub
//!
//! Each provider performs the authorization-code exchange and maps the
//! provider's profile onto [`OAuthProfile`]. Endpoint URLs live in
//! [`OAuthClientConfig`] so they can be pointed at a mock server.

use std::{collections::BTreeMap, collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

pub const GOOGLE_PROVIDER: &str = "google";
pub const GITHUB_PROVIDER: &str = "github";

/// Identity asserted by a provider after a successful exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthProfile {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub picture_url: Option<String>,
    pub provider: String,
}

#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub scopes: Vec<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    /// GitHub only: used when the profile hides the email address
    pub emails_url: Option<String>,
}

impl OAuthClientConfig {
    pub fn google(client_id: String, client_secret: String, redirect_url: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_url,
            scopes: vec![
                "https://www.googleapis.com/auth/userinfo.email".to_string(),
                "https://www.googleapis.com/auth/userinfo.profile".to_string(),
            ],
            authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_url: "https://www.googleapis.com/oauth2/v2/userinfo".to_string(),
            emails_url: None,
        }
    }

    pub fn github(client_id: String, client_secret: String, redirect_url: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_url,
            scopes: vec!["read:user".to_string(), "user:email".to_string()],
            authorize_url: "https://github.com/login/oauth/authorize".to_string(),
            token_url: "https://github.com/login/oauth/access_token".to_string(),
            userinfo_url: "https://api.github.com/user".to_string(),
            emails_url: Some("https://api.github.com/user/emails".to_string()),
        }
    }

    fn authorize_url_with_state(&self, state: &str) -> Result<String, OAuthError> {
        let scope = self.scopes.join(" ");
        let url = Url::parse_with_params(
            &self.authorize_url,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("state", state),
            ],
        )?;
        Ok(url.to_string())
    }
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Where to send the browser to start the flow
    fn authorize_url(&self, state: &str) -> Result<String, OAuthError>;

    /// Exchange an authorization code for the user's profile
    async fn authenticate(&self, code: &str) -> Result<OAuthProfile, OAuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

async fn exchange_code(
    client: &reqwest::Client,
    config: &OAuthClientConfig,
    code: &str,
) -> Result<String, OAuthError> {
    let response = client
        .post(&config.token_url)
        .header(reqwest::header::ACCEPT, "application/json")
        .form(&[
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", config.redirect_url.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await?;

    let status = response.status();
    let token: TokenResponse = response.json().await?;
    match token.access_token {
        Some(access_token) if status.is_success() => Ok(access_token),
        _ => Err(OAuthError::Exchange(
            token
                .error_description
                .or(token.error)
                .unwrap_or_else(|| status.to_string()),
        )),
    }
}

// =============================================================================
// Google
// =============================================================================

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    email: String,
    #[serde(default)]
    verified_email: bool,
    #[serde(default)]
    given_name: String,
    #[serde(default)]
    family_name: String,
    picture: Option<String>,
}

pub struct GoogleProvider {
    config: OAuthClientConfig,
    client: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(config: OAuthClientConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        GOOGLE_PROVIDER
    }

    fn authorize_url(&self, state: &str) -> Result<String, OAuthError> {
        self.config.authorize_url_with_state(state)
    }

    async fn authenticate(&self, code: &str) -> Result<OAuthProfile, OAuthError> {
        let access_token = exchange_code(&self.client, &self.config, code).await?;

        let info: GoogleUserInfo = self
            .client
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !info.verified_email {
            return Err(OAuthError::UnverifiedEmail);
        }

        Ok(OAuthProfile {
            email: info.email.to_lowercase(),
            first_name: info.given_name,
            last_name: info.family_name,
            picture_url: info.picture,
            provider: GOOGLE_PROVIDER.to_string(),
        })
    }
}

// =============================================================================
// GitHub
// =============================================================================

#[derive(Debug, Deserialize)]
struct GithubUser {
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

pub struct GithubProvider {
    config: OAuthClientConfig,
    client: reqwest::Client,
}

impl GithubProvider {
    pub fn new(config: OAuthClientConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    async fn primary_email(&self, access_token: &str) -> Result<String, OAuthError> {
        let Some(emails_url) = &self.config.emails_url else {
            return Err(OAuthError::Profile("account has no public email".to_string()));
        };

        let emails: Vec<GithubEmail> = self
            .client
            .get(emails_url)
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, "patos-api")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        emails
            .into_iter()
            .find(|e| e.primary && e.verified)
            .map(|e| e.email)
            .ok_or(OAuthError::UnverifiedEmail)
    }
}

#[async_trait]
impl OAuthProvider for GithubProvider {
    fn name(&self) -> &'static str {
        GITHUB_PROVIDER
    }

    fn authorize_url(&self, state: &str) -> Result<String, OAuthError> {
        self.config.authorize_url_with_state(state)
    }

    async fn authenticate(&self, code: &str) -> Result<OAuthProfile, OAuthError> {
        let access_token = exchange_code(&self.client, &self.config, code).await?;

        // GitHub rejects API calls without a User-Agent
        let user: GithubUser = self
            .client
            .get(&self.config.userinfo_url)
            .bearer_auth(&access_token)
            .header(reqwest::header::USER_AGENT, "patos-api")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let email = match user.email {
            Some(email) if !email.is_empty() => email,
            _ => self.primary_email(&access_token).await?,
        };

        let display_name = user.name.unwrap_or_default();
        let (first_name, last_name) = if display_name.trim().is_empty() {
            (user.login, String::new())
        } else {
            split_name(&display_name)
        };

        Ok(OAuthProfile {
            email: email.to_lowercase(),
            first_name,
            last_name,
            picture_url: user.avatar_url,
            provider: GITHUB_PROVIDER.to_string(),
        })
    }
}

/// "Ada King Lovelace" -> ("Ada", "King Lovelace")
pub fn split_name(full_name: &str) -> (String, String) {
    match full_name.trim().split_once(' ') {
        Some((first, last)) => (first.to_string(), last.trim().to_string()),
        None => (full_name.trim().to_string(), String::new()),
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Enabled providers by name
#[derive(Clone, Default)]
pub struct OAuthProviders {
    providers: HashMap<&'static str, Arc<dyn OAuthProvider>>,
}

impl OAuthProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn OAuthProvider>) {
        self.providers.insert(provider.name(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn OAuthProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Provider name -> authorization URL, all carrying the same `state`
    pub fn authorize_urls(&self, state: &str) -> Result<BTreeMap<String, String>, OAuthError> {
        self.providers
            .iter()
            .map(|(name, provider)| Ok((name.to_string(), provider.authorize_url(state)?)))
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("Unknown OAuth provider: {0}")]
    UnknownProvider(String),
    #[error("Code exchange failed: {0}")]
    Exchange(String),
    #[error("Could not read profile: {0}")]
    Profile(String),
    #[error("Email address is not verified")]
    UnverifiedEmail,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}
