use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use regex::Regex;
use tracing::error;

use super::errors::UserError;
use crate::config::HashingConfig;

/// One-way, salted transform of a plaintext secret.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, plain: &str) -> Result<String, UserError>;
    // Login lives outside this service; tests exercise it directly.
    #[allow(dead_code)]
    fn verify(&self, plain: &str, hash: &str) -> Result<bool, UserError>;
}

#[derive(Clone)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    pub fn new(cfg: &HashingConfig) -> Result<Self, UserError> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, None)
            .map_err(|e| UserError::Credential(format!("invalid argon2 params: {e}")))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, plain: &str) -> Result<String, UserError> {
        if plain.is_empty() {
            return Err(UserError::Credential("empty password".into()));
        }
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                UserError::Credential(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    fn verify(&self, plain: &str, hash: &str) -> Result<bool, UserError> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            UserError::Credential(e.to_string())
        })?;
        Ok(self
            .argon2
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }
}

/// Password complexity gate used on the update path.
pub trait ComplexityCheck: Send + Sync {
    fn check(&self, plain: &str) -> Result<(), UserError>;
}

pub struct BasicComplexity {
    pub min_length: usize,
}

lazy_static! {
    static ref HAS_LETTER: Regex = Regex::new(r"\p{L}").unwrap();
    static ref HAS_DIGIT: Regex = Regex::new(r"\p{Nd}").unwrap();
}

impl ComplexityCheck for BasicComplexity {
    fn check(&self, plain: &str) -> Result<(), UserError> {
        if plain.chars().count() < self.min_length {
            return Err(UserError::WeakCredential(format!(
                "must be at least {} characters",
                self.min_length
            )));
        }
        if !HAS_LETTER.is_match(plain) || !HAS_DIGIT.is_match(plain) {
            return Err(UserError::WeakCredential(
                "must contain a letter and a digit".into(),
            ));
        }
        Ok(())
    }
}

// Small work factor so the suites stay fast.
#[cfg(test)]
pub(crate) fn test_hasher() -> Argon2Hasher {
    Argon2Hasher::new(&HashingConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
    .expect("valid params")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let hasher = test_hasher();
        let password = "Secur3P@ssw0rd!";
        let hash = hasher.hash(password).expect("hashing should succeed");
        assert_ne!(hash, password);
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn same_plaintext_hashes_differently() {
        let hasher = test_hasher();
        let a = hasher.hash("correct-horse-1").unwrap();
        let b = hasher.hash("correct-horse-1").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hasher = test_hasher();
        let hash = hasher.hash("correct-horse-battery-staple").unwrap();
        assert!(!hasher.verify("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn empty_and_malformed_inputs_are_credential_errors() {
        let hasher = test_hasher();
        assert!(matches!(hasher.hash(""), Err(UserError::Credential(_))));
        assert!(matches!(
            hasher.verify("anything", "not-a-valid-hash"),
            Err(UserError::Credential(_))
        ));
    }

    #[test]
    fn invalid_work_factor_is_rejected() {
        let cfg = HashingConfig {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        };
        assert!(Argon2Hasher::new(&cfg).is_err());
    }

    #[test]
    fn complexity_requires_length_letter_and_digit() {
        let rules = BasicComplexity { min_length: 8 };
        assert!(rules.check("n3w-passw0rd").is_ok());
        assert!(matches!(rules.check("a1"), Err(UserError::WeakCredential(_))));
        assert!(matches!(rules.check("onlyletters"), Err(UserError::WeakCredential(_))));
        assert!(matches!(rules.check("1234567890"), Err(UserError::WeakCredential(_))));
    }
}
