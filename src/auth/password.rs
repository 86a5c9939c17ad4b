//! Password hashing and the registration password policy.

use anyhow::anyhow;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use super::error::{AuthError, FieldError};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Hash a password for storage. The raw password never touches the database.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| AuthError::Internal(anyhow!("failed to hash password: {err}")))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash.
///
/// A malformed stored hash is a server fault, not a credential mismatch.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|err| AuthError::Internal(anyhow!("invalid stored password hash: {err}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Check the registration password policy.
///
/// Returns one field error per missing character class so the caller can
/// surface exactly what is wrong.
#[must_use]
pub fn check_password_policy(password: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if password.len() < MIN_PASSWORD_LENGTH {
        errors.push(FieldError::new(
            "password",
            "must be at least 8 characters long",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push(FieldError::new(
            "password",
            "must contain an uppercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push(FieldError::new(
            "password",
            "must contain a lowercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push(FieldError::new("password", "must contain a digit"));
    }
    if !password.chars().any(|c| !c.is_ascii_alphanumeric()) {
        errors.push(FieldError::new(
            "password",
            "must contain a special character",
        ));
    }

    errors
}
