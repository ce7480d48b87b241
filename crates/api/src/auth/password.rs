//! Password hashing with Argon2

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use patos_shared::AuthError;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hashing(e.to_string()))
}

/// Hash of 64 random bytes nobody knows.
/// Stored for accounts created through OAuth so password login never matches.
pub fn generate_impossible_hash() -> Result<String, PasswordError> {
    use argon2::password_hash::rand_core::RngCore;

    let mut random_bytes = [0u8; 64];
    OsRng
        .try_fill_bytes(&mut random_bytes)
        .map_err(|e| PasswordError::Hashing(e.to_string()))?;

    hash_password(&hex::encode(random_bytes))
}

/// Verify a password against a stored hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Minimal policy: bounded length, at least one letter and one digit
pub fn validate_password_strength(password: &str) -> Result<(), PasswordValidationError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(PasswordValidationError::TooShort);
    }
    if len > MAX_PASSWORD_LEN {
        return Err(PasswordValidationError::TooLong);
    }
    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err(PasswordValidationError::MissingLetter);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(PasswordValidationError::MissingDigit);
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error("Invalid password hash: {0}")]
    InvalidHash(String),
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        AuthError::Storage(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordValidationError {
    #[error("Password must be at least 8 characters")]
    TooShort,
    #[error("Password must be at most 128 characters")]
    TooLong,
    #[error("Password must contain at least one letter")]
    MissingLetter,
    #[error("Password must contain at least one digit")]
    MissingDigit,
}
