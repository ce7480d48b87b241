//! Set-Cookie writing and Cookie reading for auth tokens

use axum::http::{
    header::{self, InvalidHeaderValue},
    HeaderMap, HeaderValue,
};
use time::Duration;

/// Cookie names and attributes, fixed at startup
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub session_name: String,
    pub password_reset_name: String,
    pub oauth_state_name: String,
    /// Only set in secured mode
    pub domain: Option<String>,
    pub secure: bool,
}

impl CookieSettings {
    /// Names derived from the project name, e.g. `patos-app_jwt`.
    pub fn for_project(project_name: &str, domain: Option<String>, secure: bool) -> Self {
        Self {
            session_name: format!("{project_name}_jwt"),
            password_reset_name: format!("{project_name}_pwreset_jwt"),
            oauth_state_name: format!("{project_name}_oauth_state"),
            domain,
            secure,
        }
    }
}

/// Builds `Set-Cookie` values: `Path=/`, `Max-Age` = TTL, `HttpOnly`,
/// `Secure` in secured mode, `SameSite=Lax`.
#[derive(Debug, Clone)]
pub struct CookieWriter {
    settings: CookieSettings,
}

impl CookieWriter {
    pub fn new(settings: CookieSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CookieSettings {
        &self.settings
    }

    pub fn session(&self, token: &str, ttl: Duration) -> Result<HeaderValue, InvalidHeaderValue> {
        self.build(&self.settings.session_name, token, ttl.whole_seconds())
    }

    pub fn clear_session(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        self.build(&self.settings.session_name, "", 0)
    }

    pub fn password_reset(&self, token: &str, ttl: Duration) -> Result<HeaderValue, InvalidHeaderValue> {
        self.build(&self.settings.password_reset_name, token, ttl.whole_seconds())
    }

    pub fn clear_password_reset(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        self.build(&self.settings.password_reset_name, "", 0)
    }

    pub fn oauth_state(&self, state: &str, ttl: Duration) -> Result<HeaderValue, InvalidHeaderValue> {
        self.build(&self.settings.oauth_state_name, state, ttl.whole_seconds())
    }

    pub fn clear_oauth_state(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        self.build(&self.settings.oauth_state_name, "", 0)
    }

    fn build(&self, name: &str, value: &str, max_age: i64) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie = format!("{name}={value}; Path=/; Max-Age={}", max_age.max(0));
        if let Some(domain) = &self.settings.domain {
            cookie.push_str("; Domain=");
            cookie.push_str(domain);
        }
        cookie.push_str("; HttpOnly");
        if self.settings.secure {
            cookie.push_str("; Secure");
        }
        cookie.push_str("; SameSite=Lax");

        HeaderValue::from_str(&cookie)
    }
}

/// Value of cookie `name` across all `Cookie` headers. Empty values count as absent.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}
