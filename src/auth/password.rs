//! Password hashing with bcrypt.

use bcrypt::{hash, verify, DEFAULT_COST};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PasswordError {
    #[error("failed to hash password")]
    HashFailed,
    #[error("password mismatch")]
    Mismatch,
}

/// Derives and checks bcrypt verifiers. The cost is fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self { cost: DEFAULT_COST }
    }
}

impl PasswordHasher {
    pub fn with_cost(cost: u32) -> Self {
        Self { cost }
    }

    pub fn hash(&self, secret: &str) -> Result<String, PasswordError> {
        hash(secret, self.cost).map_err(|e| {
            warn!(error = %e, "bcrypt hash failed");
            PasswordError::HashFailed
        })
    }

    /// A malformed verifier is reported as `Mismatch`, same as a wrong secret.
    pub fn verify(&self, verifier: &str, candidate: &str) -> Result<(), PasswordError> {
        match verify(candidate, verifier) {
            Ok(true) => Ok(()),
            Ok(false) | Err(_) => Err(PasswordError::Mismatch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimum bcrypt cost keeps the suite fast.
    fn hasher() -> PasswordHasher {
        PasswordHasher::with_cost(4)
    }

    #[test]
    fn test_hash_round_trip() {
        let h = hasher();
        for secret in ["Abcdef1!", "pässwörd with spaces"] {
            let verifier = h.hash(secret).unwrap();
            assert!(verifier.starts_with("$2"));
            assert_ne!(verifier, secret);
            assert_eq!(h.verify(&verifier, secret), Ok(()));
        }
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let h = hasher();
        let verifier = h.hash("Abcdef1!").unwrap();
        assert_eq!(h.verify(&verifier, "Abcdef1?"), Err(PasswordError::Mismatch));
    }

    #[test]
    fn test_malformed_verifier_is_mismatch() {
        let h = hasher();
        assert_eq!(h.verify("not-a-bcrypt-hash", "x"), Err(PasswordError::Mismatch));
        assert_eq!(h.verify("", "x"), Err(PasswordError::Mismatch));
    }

    #[test]
    fn test_salted_hashes_differ() {
        let h = hasher();
        let a = h.hash("same").unwrap();
        let b = h.hash("same").unwrap();
        assert_ne!(a, b);
    }
}
