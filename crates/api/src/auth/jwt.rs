//! Signed token issuing and decoding

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use patos_shared::AuthError;
use time::{Duration, OffsetDateTime};

use super::claims::{ClaimShape, TokenClaims};

/// HS256 codec shared by every claim shape
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl TokenCodec {
    pub fn new(secret: &str, issuer: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
        }
    }

    /// Sign `payload` with a fresh `iat` and `exp = now + ttl`.
    pub fn issue<P: ClaimShape>(&self, payload: &P, ttl: Duration) -> Result<String, TokenError> {
        self.issue_at(payload, ttl, OffsetDateTime::now_utc())
    }

    pub fn issue_at<P: ClaimShape>(
        &self,
        payload: &P,
        ttl: Duration,
        now: OffsetDateTime,
    ) -> Result<String, TokenError> {
        if !payload.is_well_formed() {
            return Err(TokenError::WrongShape);
        }

        let claims = TokenClaims {
            payload: payload.clone(),
            aud: P::AUDIENCE.to_string(),
            iss: self.issuer.clone(),
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
        };

        // Explicit algorithm prevents algorithm confusion attacks
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Verify signature, issuer, audience and expiry, then the payload's own rules.
    pub fn decode<P: ClaimShape>(&self, token: &str) -> Result<TokenClaims<P>, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_audience(&[P::AUDIENCE]);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "aud", "iss"]);

        let claims = decode::<TokenClaims<P>>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidAudience | ErrorKind::Json(_) | ErrorKind::MissingRequiredClaim(_) => {
                    TokenError::WrongShape
                }
                _ => TokenError::Invalid,
            })?;

        if !claims.payload.is_well_formed() {
            return Err(TokenError::WrongShape);
        }
        Ok(claims)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Token does not carry the expected claims")]
    WrongShape,
    #[error("Token encoding failed: {0}")]
    Encoding(String),
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Encoding(msg) => AuthError::Fatal(msg),
            _ => AuthError::InvalidToken,
        }
    }
}
