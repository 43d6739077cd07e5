//! Argon2id password hashing (PHC string format).

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Hash a password into a PHC string suitable for storing in a record.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hashing(e.to_string()))
}

/// Check a password against a stored PHC string.
///
/// `Ok(false)` means the password is wrong; errors are reserved for hashes
/// that cannot be interpreted.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(stored).map_err(|e| PasswordError::MalformedHash(e.to_string()))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::Hashing(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let stored = hash_password("hunter2").unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert_eq!(verify_password("hunter2", &stored), Ok(true));
        assert_eq!(verify_password("hunter3", &stored), Ok(false));
    }

    #[test]
    fn plaintext_is_not_a_hash() {
        assert!(matches!(
            verify_password("hunter2", "hunter2"),
            Err(PasswordError::MalformedHash(_))
        ));
    }
}
