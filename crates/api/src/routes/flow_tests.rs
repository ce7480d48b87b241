//! End-to-end request flows over the in-memory store

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use patos_shared::OrganizationId;
use serde_json::{json, Value};
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;
use url::Url;

use crate::{
    auth::{
        OAuthError, OAuthProfile, OAuthProvider, OAuthProviders, PasswordResetClaims, SessionClaims,
    },
    config::Config,
    email::{EmailTemplate, RecordingEmailSender},
    state::AppState,
    store::{CredentialStore, MemoryStore},
};

use super::create_router;

const PASSWORD: &str = "quackquack1";
const SESSION: &str = "patos_jwt";
const RESET: &str = "patos_pwreset_jwt";
const OAUTH_STATE: &str = "patos_oauth_state";

struct FakeProvider;

#[async_trait]
impl OAuthProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn authorize_url(&self, state: &str) -> Result<String, OAuthError> {
        Ok(format!("https://oauth.test/authorize?state={state}"))
    }

    async fn authenticate(&self, code: &str) -> Result<OAuthProfile, OAuthError> {
        if code != "good-code" {
            return Err(OAuthError::Exchange("bad code".to_string()));
        }
        Ok(OAuthProfile {
            email: "mallard@patos.test".to_string(),
            first_name: "Mallard".to_string(),
            last_name: "Duck".to_string(),
            picture_url: None,
            provider: "fake".to_string(),
        })
    }
}

fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".to_string(),
        project_name: "patos".to_string(),
        api_host_url: Url::parse("http://api.patos.test/").unwrap(),
        app_host_url: Url::parse("http://app.patos.test/").unwrap(),
        secured: false,
        database_url: String::new(),
        database_max_connections: 1,
        jwt_secret: "flow-test-secret-that-is-long-enough-to-pass".to_string(),
        session_ttl: Duration::minutes(30),
        password_reset_token_ttl: Duration::minutes(15),
        org_invite_ttl: Duration::days(15),
        password_reset_ttl: Duration::days(1),
        otp_len: 32,
        resend_api_key: String::new(),
        email_from: "noreply@patos.test".to_string(),
        google: None,
        github: None,
    }
}

struct Harness {
    router: Router,
    state: AppState,
    store: Arc<MemoryStore>,
    email: Arc<RecordingEmailSender>,
}

impl Harness {
    fn new() -> Self {
        let config = test_config();
        let store = Arc::new(MemoryStore::with_reset_ttl(config.password_reset_ttl));
        let email = Arc::new(RecordingEmailSender::new());
        let mut oauth = OAuthProviders::new();
        oauth.register(Arc::new(FakeProvider));

        let state = AppState::new(
            config,
            store.clone(),
            store.clone(),
            store.clone(),
            email.clone(),
            oauth,
        );
        Self {
            router: create_router(state.clone()),
            state,
            store,
            email,
        }
    }

    async fn call(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        self.call(request(Method::GET, uri, cookie, None)).await
    }

    async fn send_json(&self, method: Method, uri: &str, cookie: Option<&str>, body: Value) -> Response {
        self.call(request(method, uri, cookie, Some(body))).await
    }

    fn last_otp(&self) -> String {
        let (_, template) = self.email.sent().pop().expect("no email sent");
        match template {
            EmailTemplate::EmailConfirmation { otp, .. }
            | EmailTemplate::OrganizationInvite { otp, .. }
            | EmailTemplate::PasswordReset { otp, .. } => otp,
            other => panic!("email without OTP: {other:?}"),
        }
    }

    /// Register and confirm `email`, returning a session cookie for it
    async fn signed_up(&self, email: &str, first_name: &str) -> String {
        let response = self
            .send_json(
                Method::PUT,
                "/v1/users",
                None,
                json!({ "email": email, "password": PASSWORD, "firstName": first_name, "lastName": "Pato" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let otp = self.last_otp();
        let response = self.get(&format!("/v1/users/confirm?otp={otp}"), None).await;
        assert_eq!(response.status(), StatusCode::FOUND);

        self.login(email, PASSWORD).await
    }

    async fn login(&self, email: &str, password: &str) -> String {
        let response = self
            .send_json(
                Method::POST,
                "/v1/auth/login",
                None,
                json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        cookie_value(&response, SESSION).expect("login sets the session cookie")
    }

    async fn scope_to(&self, session: &str, org: &str) -> String {
        let response = self
            .call(request(
                Method::POST,
                &format!("/v1/auth/set-organization/{org}"),
                Some(&cookie(SESSION, session)),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        cookie_value(&response, SESSION).expect("scoped session cookie")
    }
}

fn cookie(name: &str, value: &str) -> String {
    format!("{name}={value}")
}

fn request(method: Method, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Value written for cookie `name`, if the response sets it
fn cookie_value(response: &Response, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| value.strip_prefix(&prefix))
        .map(|rest| rest.split(';').next().unwrap_or_default().to_string())
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn location(response: &Response) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

#[tokio::test]
async fn test_registration_confirm_and_login() {
    let h = Harness::new();

    let response = h
        .send_json(
            Method::PUT,
            "/v1/users",
            None,
            json!({ "email": "Ada@Patos.test", "password": PASSWORD, "firstName": "Ada", "lastName": "Pato" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let otp = h.last_otp();
    let response = h.get(&format!("/v1/users/confirm?otp={otp}"), None).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "http://app.patos.test/");
    assert!(matches!(
        h.email.sent().last(),
        Some((to, EmailTemplate::AccountCreated { .. })) if to == "ada@patos.test"
    ));

    // The OTP is single use
    let response = h.get(&format!("/v1/users/confirm?otp={otp}"), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = h
        .send_json(
            Method::POST,
            "/v1/auth/login",
            None,
            json!({ "email": "ada@patos.test", "password": "wrong-password1" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(cookie_value(&response, SESSION).as_deref(), Some(""));

    let response = h
        .send_json(
            Method::POST,
            "/v1/auth/login",
            None,
            json!({ "email": "ada@patos.test", "password": PASSWORD }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let session = cookie_value(&response, SESSION).unwrap();
    let body = json_body(response).await;
    assert_eq!(body["email"], "ada@patos.test");
    assert_eq!(body["aud"], "session");
    assert_eq!(body["iss"], "patos-auth");
    assert!(body.get("organizationId").is_none());

    let response = h.get("/v1/auth/validate", Some(&cookie(SESSION, &session))).await;
    assert_eq!(response.status(), StatusCode::OK);
    // Fresh token, nothing to renew
    assert!(cookie_value(&response, SESSION).is_none());
    assert_eq!(json_body(response).await["email"], "ada@patos.test");
}

#[tokio::test]
async fn test_weak_password_rejected() {
    let h = Harness::new();
    let response = h
        .send_json(
            Method::PUT,
            "/v1/users",
            None,
            json!({ "email": "weak@patos.test", "password": "short", "firstName": "Weak", "lastName": "Pato" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(h.email.sent().is_empty());
}

#[tokio::test]
async fn test_edit_profile() {
    let h = Harness::new();
    let session = h.signed_up("edit@patos.test", "Edit").await;

    let response = h
        .send_json(
            Method::POST,
            "/v1/users/edit",
            None,
            json!({ "firstName": "Nobody", "lastName": "Pato" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(cookie_value(&response, SESSION).as_deref(), Some(""));

    let response = h
        .send_json(
            Method::POST,
            "/v1/users/edit",
            Some(&cookie(SESSION, &session)),
            json!({ "firstName": "   ", "lastName": "Pato" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = h
        .send_json(
            Method::POST,
            "/v1/users/edit",
            Some(&cookie(SESSION, &session)),
            json!({
                "firstName": " Donald ",
                "lastName": "Duck",
                "dateOfBirth": "1934-06-09T00:00:00Z",
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["firstName"], "Donald");
    assert_eq!(body["lastName"], "Duck");
    assert_eq!(body["email"], "edit@patos.test");
    assert!(body.get("passwordHash").is_none());

    let stored = h.store.find_user_by_email("edit@patos.test").await.unwrap();
    assert_eq!(stored.first_name, "Donald");
    assert_eq!(
        stored.date_of_birth,
        Some(time::Date::from_calendar_date(1934, time::Month::June, 9).unwrap())
    );
}

#[tokio::test]
async fn test_missing_session_clears_cookie() {
    let h = Harness::new();

    let response = h.get("/v1/auth/validate", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(cookie_value(&response, SESSION).as_deref(), Some(""));

    let response = h.get("/v1/auth/validate", Some(&cookie(SESSION, "garbage"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bearer_header_and_renewal() {
    let h = Harness::new();
    h.signed_up("bea@patos.test", "Bea").await;
    let user = h.state.credentials.find_user_by_email("bea@patos.test").await.unwrap();

    // Issued 20 of 30 minutes ago: less than half the lifetime remains
    let stale = h
        .state
        .codec
        .issue_at(
            &SessionClaims::new(user.id, user.email.clone()),
            Duration::minutes(30),
            OffsetDateTime::now_utc() - Duration::minutes(20),
        )
        .unwrap();

    let response = h
        .call(
            Request::builder()
                .uri("/v1/auth/validate")
                .header(header::AUTHORIZATION, format!("Bearer {stale}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let renewed = cookie_value(&response, SESSION).expect("renewed cookie");
    assert_ne!(renewed, stale);

    let claims = h.state.codec.decode::<SessionClaims>(&renewed).unwrap();
    assert!(claims.remaining(OffsetDateTime::now_utc()) > Duration::minutes(29));
}

#[tokio::test]
async fn test_logout_clears_cookie() {
    let h = Harness::new();
    let response = h.call(request(Method::POST, "/v1/auth/logout", None, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(set_cookie.starts_with("patos_jwt=;"));
    assert!(set_cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn test_organization_membership_lifecycle() {
    let h = Harness::new();
    let owner = h.signed_up("owner@patos.test", "Olga").await;
    let member = h.signed_up("member@patos.test", "Mara").await;

    let response = h
        .send_json(
            Method::PUT,
            "/v1/organizations",
            Some(&cookie(SESSION, &owner)),
            json!({ "organizationName": "Pond" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let org = json_body(response).await["id"].as_str().unwrap().to_string();
    assert_eq!(org.len(), 5);

    let invite_uri = format!("/v1/organizations/{org}/invite");
    let invite_body = json!({ "userEmail": "member@patos.test", "isAdmin": false });

    // Admin routes need a session scoped to the organization
    let response = h
        .send_json(Method::PUT, &invite_uri, Some(&cookie(SESSION, &owner)), invite_body.clone())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let owner_scoped = h.scope_to(&owner, &org).await;
    let response = h
        .send_json(Method::PUT, &invite_uri, Some(&cookie(SESSION, &owner_scoped)), invite_body.clone())
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let otp = h.last_otp();
    let response = h.get(&format!("/v1/organizations/accept-invite?otp={otp}"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let membership = json_body(response).await;
    assert_eq!(membership["organizationId"], org.as_str());
    assert_eq!(membership["isAdmin"], false);
    assert_eq!(h.store.invite_count().unwrap(), 0);

    let response = h.get(&format!("/v1/organizations/accept-invite?otp={otp}"), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // A plain member can read the organization but not administer it
    let member_scoped = h.scope_to(&member, &org).await;
    let response = h
        .get(&format!("/v1/organizations/{org}"), Some(&cookie(SESSION, &member_scoped)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["name"], "Pond");

    let response = h
        .send_json(Method::PUT, &invite_uri, Some(&cookie(SESSION, &member_scoped)), invite_body)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // A session scoped elsewhere does not reach this organization
    let response = h
        .get("/v1/organizations/zzzzz", Some(&cookie(SESSION, &member_scoped)))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let owner_id = h.state.credentials.find_user_by_email("owner@patos.test").await.unwrap().id;
    let member_id = h.state.credentials.find_user_by_email("member@patos.test").await.unwrap().id;

    let response = h
        .call(request(
            Method::DELETE,
            &format!("/v1/organizations/{org}/users/{}", owner_id.0),
            Some(&cookie(SESSION, &owner_scoped)),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = h
        .send_json(
            Method::POST,
            &format!("/v1/organizations/{org}/owner"),
            Some(&cookie(SESSION, &owner_scoped)),
            json!({ "email": "member@patos.test" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(cookie_value(&response, SESSION).is_some());

    let organization_id = OrganizationId(org.clone());
    let organization = h.state.organizations.find_organization(&organization_id).await.unwrap();
    assert_eq!(organization.owner_user_id, member_id);
    let new_owner = h
        .state
        .organizations
        .find_membership(&organization_id, member_id)
        .await
        .unwrap();
    assert!(new_owner.is_admin);

    // The former owner is no longer allowed to transfer
    let response = h
        .send_json(
            Method::POST,
            &format!("/v1/organizations/{org}/owner"),
            Some(&cookie(SESSION, &owner_scoped)),
            json!({ "email": "owner@patos.test" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let member_admin = h.scope_to(&member, &org).await;
    let response = h
        .call(request(
            Method::DELETE,
            &format!("/v1/organizations/{org}/users/{}", owner_id.0),
            Some(&cookie(SESSION, &member_admin)),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let members = h.store.members(&organization_id).unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].user_id, member_id);

    let response = h
        .get("/v1/users/organizations", Some(&cookie(SESSION, &member)))
        .await;
    let listing = json_body(response).await;
    assert_eq!(listing[0]["isOwner"], true);
    assert_eq!(listing[0]["isAdmin"], true);
}

#[tokio::test]
async fn test_set_organization_requires_membership() {
    let h = Harness::new();
    let outsider = h.signed_up("outsider@patos.test", "Otto").await;

    let response = h
        .call(request(
            Method::POST,
            "/v1/auth/set-organization/abcde",
            Some(&cookie(SESSION, &outsider)),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(cookie_value(&response, SESSION).as_deref(), Some(""));
}

#[tokio::test]
async fn test_password_reset_flow() {
    let h = Harness::new();
    h.signed_up("reset@patos.test", "Rita").await;
    let sent_before = h.email.sent().len();

    // Unknown addresses look the same to the caller
    let response = h
        .send_json(
            Method::POST,
            "/v1/users/init-reset-password",
            None,
            json!({ "email": "nobody@patos.test" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(h.email.sent().len(), sent_before);

    let response = h
        .send_json(
            Method::POST,
            "/v1/users/init-reset-password",
            None,
            json!({ "email": "reset@patos.test" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let otp = h.last_otp();

    let response = h
        .get(&format!("/v1/users/set-password-reset-cookie?otp={otp}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "http://app.patos.test/reset-password");
    let reset_token = cookie_value(&response, RESET).unwrap();

    let new_password = "newquack22";
    let response = h
        .send_json(
            Method::POST,
            "/v1/users/reset-password",
            Some(&cookie(RESET, &reset_token)),
            json!({ "password": new_password }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(cookie_value(&response, RESET).as_deref(), Some(""));

    h.login("reset@patos.test", new_password).await;
    let response = h
        .send_json(
            Method::POST,
            "/v1/auth/login",
            None,
            json!({ "email": "reset@patos.test", "password": PASSWORD }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The reset row is gone, so the same token cannot be replayed
    let response = h
        .send_json(
            Method::POST,
            "/v1/users/reset-password",
            Some(&cookie(RESET, &reset_token)),
            json!({ "password": "thirdquack3" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reset_password_needs_reset_token() {
    let h = Harness::new();
    let session = h.signed_up("swap@patos.test", "Sam").await;
    let user = h.state.credentials.find_user_by_email("swap@patos.test").await.unwrap();

    let response = h
        .send_json(Method::POST, "/v1/users/reset-password", None, json!({ "password": "newquack22" }))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(cookie_value(&response, RESET).as_deref(), Some(""));

    let response = h
        .send_json(
            Method::POST,
            "/v1/users/reset-password",
            Some(&format!("{}; {}", cookie(RESET, "garbage"), cookie(SESSION, &session))),
            json!({ "password": "newquack22" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(cookie_value(&response, RESET).as_deref(), Some(""));

    // A session token is not a reset token
    let response = h
        .send_json(
            Method::POST,
            "/v1/users/reset-password",
            Some(&cookie(RESET, &session)),
            json!({ "password": "newquack22" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(cookie_value(&response, RESET).as_deref(), Some(""));

    let revoked = h
        .state
        .codec
        .issue(
            &PasswordResetClaims {
                user_id: user.id,
                allowed: false,
            },
            Duration::minutes(15),
        )
        .unwrap();
    let response = h
        .send_json(
            Method::POST,
            "/v1/users/reset-password",
            Some(&cookie(RESET, &revoked)),
            json!({ "password": "newquack22" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(cookie_value(&response, RESET).as_deref(), Some(""));

    // The old password still works
    h.login("swap@patos.test", PASSWORD).await;
}

#[tokio::test]
async fn test_oauth_sign_in() {
    let h = Harness::new();

    let response = h.get("/v1/auth/providers", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let state = cookie_value(&response, OAUTH_STATE).unwrap();
    let urls = json_body(response).await;
    assert_eq!(
        urls["fake"],
        format!("https://oauth.test/authorize?state={state}").as_str()
    );

    let response = h
        .get(
            "/v1/auth/fake/callback?code=good-code&state=forged",
            Some(&cookie(OAUTH_STATE, &state)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(cookie_value(&response, SESSION).as_deref(), Some(""));
    assert_eq!(cookie_value(&response, OAUTH_STATE).as_deref(), Some(""));

    let response = h
        .get(&format!("/v1/auth/fake/callback?code=good-code&state={state}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = h
        .get(
            &format!("/v1/auth/fake/callback?code=good-code&state={state}"),
            Some(&cookie(OAUTH_STATE, &state)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "http://app.patos.test/");
    assert_eq!(cookie_value(&response, OAUTH_STATE).as_deref(), Some(""));
    let session = cookie_value(&response, SESSION).unwrap();

    let claims = h.state.codec.decode::<SessionClaims>(&session).unwrap();
    assert_eq!(claims.payload.email, "mallard@patos.test");
    assert!(matches!(
        h.email.sent().last(),
        Some((_, EmailTemplate::AccountCreated { .. }))
    ));

    // Second sign-in links to the same account without another welcome
    let sent = h.email.sent().len();
    let response = h
        .get(
            &format!("/v1/auth/fake/callback?code=good-code&state={state}"),
            Some(&cookie(OAUTH_STATE, &state)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(h.email.sent().len(), sent);
    let again = h.state.codec.decode::<SessionClaims>(&cookie_value(&response, SESSION).unwrap()).unwrap();
    assert_eq!(again.payload.user_id, claims.payload.user_id);

    let response = h
        .get(
            &format!("/v1/auth/unknown/callback?code=good-code&state={state}"),
            Some(&cookie(OAUTH_STATE, &state)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = h
        .get(
            &format!("/v1/auth/fake/callback?code=bad-code&state={state}"),
            Some(&cookie(OAUTH_STATE, &state)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_health_with_memory_store() {
    let h = Harness::new();
    assert_eq!(h.get("/health/live", None).await.status(), StatusCode::OK);
    assert_eq!(h.get("/health/ready", None).await.status(), StatusCode::OK);
    let response = h.get("/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["store"], "healthy");
    assert_eq!(body["status"], "healthy");
}

