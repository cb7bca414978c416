//! Argon2id password hashing and the registration password policy.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::CoreError;

const SPECIAL_CHARS: &str = "!@#$%^&*()-_=+";

/// Hash a password for storage.
pub fn hash(password: &str) -> Result<String, CoreError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CoreError::InternalError(format!("password hashing failed: {e}")))
}

/// Check a password against a stored hash. A malformed stored hash is an
/// internal fault, not a failed login.
pub fn verify(password: &str, stored_hash: &str) -> Result<bool, CoreError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| CoreError::InternalError(format!("stored password hash invalid: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Registration policy: 12-20 characters with at least one uppercase
/// letter, one lowercase letter, one digit and one special character.
pub fn validate_policy(password: &str) -> Result<(), CoreError> {
    let length = password.chars().count();
    if !(12..=20).contains(&length) {
        return Err(CoreError::Validation(
            "password must be 12-20 characters long".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(CoreError::Validation(
            "password must contain an uppercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(CoreError::Validation(
            "password must contain a lowercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(CoreError::Validation(
            "password must contain a digit".to_string(),
        ));
    }
    if !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        return Err(CoreError::Validation(format!(
            "password must contain one of {SPECIAL_CHARS}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_and_rejects_wrong_password() {
        let hashed = hash("Tr4ding!sFun12").unwrap();
        assert!(verify("Tr4ding!sFun12", &hashed).unwrap());
        assert!(!verify("Tr4ding!sFun13", &hashed).unwrap());
    }

    #[test]
    fn malformed_stored_hash_is_an_internal_fault() {
        assert!(matches!(
            verify("whatever", "not-a-phc-string"),
            Err(CoreError::InternalError(_))
        ));
    }

    #[test]
    fn policy_boundaries() {
        assert!(validate_policy("Tr4ding!sFun").is_ok()); // exactly 12
        assert!(validate_policy("Tr4ding!sFu").is_err()); // 11
        assert!(validate_policy("Tr4ding!sFunForAll20").is_ok()); // exactly 20
        assert!(validate_policy("Tr4ding!sFunForAll21x").is_err()); // 21
        assert!(validate_policy("tr4ding!sfun").is_err()); // no uppercase
        assert!(validate_policy("TR4DING!SFUN").is_err()); // no lowercase
        assert!(validate_policy("Trading!sFun").is_err()); // no digit
        assert!(validate_policy("Tr4dingIsFun").is_err()); // no special
    }
}
