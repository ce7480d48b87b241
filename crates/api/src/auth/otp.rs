//! One-time tokens for confirmation, invite and reset links

use patos_shared::AuthError;
use rand::{rngs::OsRng, RngCore};

/// Default OTP length in characters
pub const OTP_LEN: usize = 128;

/// Length of generated organization ids
pub const ORGANIZATION_ID_LEN: usize = 5;

/// URL-safe alphabet. Exactly 64 symbols, so masking a byte to 6 bits is unbiased.
const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

#[derive(Debug, thiserror::Error)]
#[error("Entropy source unavailable: {0}")]
pub struct OtpError(String);

impl From<OtpError> for AuthError {
    fn from(err: OtpError) -> Self {
        AuthError::Fatal(err.to_string())
    }
}

/// Generate `len` characters drawn from the OS CSPRNG.
pub fn generate_otp(len: usize) -> Result<String, OtpError> {
    let mut bytes = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| OtpError(e.to_string()))?;

    Ok(bytes
        .into_iter()
        .map(|b| ALPHABET[(b & 0x3f) as usize] as char)
        .collect())
}
