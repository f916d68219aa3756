//! Secret hashing and verification using Argon2
//!
//! Used for the owner's unlock code, which is stored only as a PHC hash.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::types::HeirloomError;

/// Hash a secret using Argon2id
///
/// Returns the PHC-formatted hash string that includes the salt and parameters.
pub fn hash_secret(secret: &str) -> Result<String, HeirloomError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| HeirloomError::Internal(format!("Failed to hash secret: {e}")))
}

/// Verify a secret against a stored hash
pub fn verify_secret(secret: &str, hash: &str) -> Result<bool, HeirloomError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| HeirloomError::Internal(format!("Invalid secret hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(secret.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let code = "amber-lighthouse-42";
        let hash = hash_secret(code).unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(!hash.contains(code));
        assert!(verify_secret(code, &hash).unwrap());
        assert!(!verify_secret("amber-lighthouse-43", &hash).unwrap());
    }

    #[test]
    fn test_salted() {
        let a = hash_secret("same-code").unwrap();
        let b = hash_secret("same-code").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_hash_format() {
        assert!(verify_secret("code", "plaintext-code").is_err());
    }
}
