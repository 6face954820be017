use anyhow::{Result, anyhow};
use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand_core::OsRng;
use tracing::warn;

/// Hashes and verifies account passwords.
#[derive(Clone, Default)]
pub struct Credentials {
    argon2: Argon2<'static>,
}

impl Credentials {
    /// Argon2id with explicit cost parameters. Memory is in KiB.
    pub fn with_params(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| anyhow!("Invalid Argon2 parameters: {}", e))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a password with a fresh random salt. Returns a PHC string.
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("Password hashing failed: {}", e))?;

        Ok(hash.to_string())
    }

    /// Check a password against a stored PHC string.
    ///
    /// A stored value that does not parse is a mismatch, not an error.
    pub fn verify(&self, password: &str, stored_hash: &str) -> bool {
        let parsed = match PasswordHash::new(stored_hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Unparseable password hash in storage: {}", e);
                return false;
            }
        };

        self.argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}
