//! Password hashing for registration and login.
//!
//! bcrypt with the crate's default cost. Hashes are self-describing strings
//! (salt embedded), stored in users.password_hash.

use bcrypt::{hash, verify, DEFAULT_COST};

/// Hash a plaintext password for storage.
pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    hash(password, DEFAULT_COST)
}

/// Check a plaintext password against a stored hash.
/// Returns false on any mismatch or malformed hash; callers treat both
/// the same way (invalid credentials).
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    verify(password, password_hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_roundtrip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
    }

    #[test]
    fn malformed_hash_rejects() {
        assert!(!verify_password("hunter2", "not-a-bcrypt-hash"));
    }
}
