//! Password Hashing
//!
//! Salted, memory-hard password hashing with Argon2id. Hashes are PHC
//! strings (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`) so verification
//! reads the parameters from the stored hash and keeps working after the
//! configured cost changes.
//!
//! Hashing is intentionally slow. From async code use
//! [`PasswordHasher::hash_async`] / [`PasswordHasher::verify_async`], which
//! run on tokio's blocking pool instead of a request worker.

use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString};
use std::sync::{Arc, OnceLock};

use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use thiserror::Error;

/// Argon2 cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    /// Iterations (t_cost)
    pub iterations: u32,
    /// Memory in KiB (m_cost)
    pub memory_kib: u32,
    /// Lanes (p_cost)
    pub parallelism: u32,
}

impl Default for HashCost {
    /// OWASP baseline for Argon2id: 19 MiB, 2 iterations, 1 lane
    fn default() -> Self {
        Self {
            iterations: Params::DEFAULT_T_COST,
            memory_kib: Params::DEFAULT_M_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl HashCost {
    /// Cheapest parameters argon2 accepts. Tests only.
    pub fn minimal() -> Self {
        Self {
            iterations: Params::MIN_T_COST,
            memory_kib: Params::MIN_M_COST.max(8 * Params::MIN_P_COST),
            parallelism: Params::MIN_P_COST,
        }
    }
}

/// Password hashing errors
#[derive(Debug, Error)]
pub enum PasswordError {
    /// Cost parameters rejected by argon2
    #[error("invalid hash parameters: {0}")]
    InvalidParams(String),
    /// Hashing failed
    #[error("password hashing failed: {0}")]
    Hash(String),
    /// The blocking task was cancelled or panicked
    #[error("hashing task failed: {0}")]
    Task(String),
}

/// Argon2id password hasher
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
    // Hash checked when the user has none, built on first use
    decoy: Arc<OnceLock<Option<String>>>,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
            decoy: Arc::default(),
        }
    }
}

impl PasswordHasher {
    /// Hasher with explicit cost
    pub fn with_cost(cost: HashCost) -> Result<Self, PasswordError> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| PasswordError::InvalidParams(e.to_string()))?;
        Ok(Self {
            params,
            decoy: Arc::default(),
        })
    }

    /// Hasher using the configured cost
    pub fn from_config(config: &crate::config::SecurityConfig) -> Result<Self, PasswordError> {
        Self::with_cost(config.hash_cost)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password with a fresh random salt
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| PasswordError::Hash(e.to_string()))
    }

    /// Verify a password against a stored PHC hash.
    ///
    /// Returns `false` for a mismatch and for a hash that cannot be parsed.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        PasswordHash::new(hash)
            .map(|parsed| {
                self.argon2()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }

    /// Spend the same work as [`verify`](Self::verify) for a user with no
    /// stored hash. Always `false`.
    pub fn verify_missing(&self, password: &str) -> bool {
        let decoy = self
            .decoy
            .get_or_init(|| self.hash("warden-decoy-password").ok());
        if let Some(hash) = decoy {
            let _ = self.verify(password, hash);
        }
        false
    }

    /// [`hash`](Self::hash) on the blocking pool
    pub async fn hash_async(&self, password: String) -> Result<String, PasswordError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| PasswordError::Task(e.to_string()))?
    }

    /// [`verify`](Self::verify) on the blocking pool
    pub async fn verify_async(&self, password: String, hash: String) -> bool {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::with_cost(HashCost::minimal()).unwrap()
    }

    #[test]
    fn test_hash_is_salted() {
        let hasher = hasher();
        let a = hasher.hash("admin123!").unwrap();
        let b = hasher.hash("admin123!").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2id$"));
    }

    #[test]
    fn test_verify_roundtrip() {
        let hasher = hasher();
        let hash = hasher.hash("user123!").unwrap();
        assert!(hasher.verify("user123!", &hash));
        assert!(!hasher.verify("user123?", &hash));
        assert!(!hasher.verify("", &hash));
    }

    #[test]
    fn test_verify_malformed_hash() {
        let hasher = hasher();
        assert!(!hasher.verify("anything", "not-a-phc-string"));
        assert!(!hasher.verify("anything", ""));
    }

    #[test]
    fn test_verify_reads_params_from_hash() {
        let cheap = hasher();
        let hash = cheap.hash("s3cret!").unwrap();
        let default = PasswordHasher::default();
        assert!(default.verify("s3cret!", &hash));
    }

    #[test]
    fn test_verify_missing_never_matches() {
        let hasher = hasher();
        assert!(!hasher.verify_missing("warden-decoy-password"));
        assert!(!hasher.verify_missing(""));
        // Clones share the decoy
        let clone = hasher.clone();
        assert!(clone.decoy.get().is_some());
    }

    #[test]
    fn test_invalid_cost_rejected() {
        let result = PasswordHasher::with_cost(HashCost {
            iterations: 0,
            memory_kib: 8,
            parallelism: 1,
        });
        assert!(matches!(result, Err(PasswordError::InvalidParams(_))));
    }

    #[test]
    fn test_default_cost_matches_argon2() {
        let cost = HashCost::default();
        assert_eq!(cost.iterations, 2);
        assert_eq!(cost.memory_kib, 19 * 1024);
        assert_eq!(cost.parallelism, 1);
    }

    #[tokio::test]
    async fn test_async_hash_and_verify() {
        let hasher = hasher();
        let hash = hasher.hash_async("Abc123!@".to_string()).await.unwrap();
        assert!(hasher.verify_async("Abc123!@".to_string(), hash.clone()).await);
        assert!(!hasher.verify_async("nope".to_string(), hash).await);
    }
}
