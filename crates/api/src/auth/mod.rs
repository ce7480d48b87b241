//! Authentication and authorization for Patos

pub mod claims;
pub mod cookie;
pub mod jwt;
pub mod middleware;
pub mod oauth;
pub mod otp;
pub mod password;

pub use claims::{ClaimShape, OrgScope, PasswordResetClaims, SessionClaims, TokenClaims};
pub use cookie::{read_cookie, CookieSettings, CookieWriter};
pub use jwt::{TokenCodec, TokenError};
pub use middleware::{
    authorize, extract_token, issue_session, reauthorize, require_org_admin, require_org_member,
    require_session, Access, AuthState, Authorization, Session,
};
pub use oauth::{OAuthError, OAuthProfile, OAuthProvider, OAuthProviders};
pub use otp::{generate_otp, OtpError, OTP_LEN};
pub use password::{
    generate_impossible_hash, hash_password, validate_password_strength, verify_password,
    PasswordError, PasswordValidationError,
};
