//! Password hashing and verification (Argon2id).

use anyhow::Context;
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::RngCore;
use thiserror::Error;
use tokio::task;

use crate::config::SecurityConfig;

/// `SaltString` holds at most 64 base64 characters.
const MAX_SALT_BYTES: usize = 48;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Stored password hash is malformed: {0}")]
    MalformedHash(String),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Invalid hashing parameters: {0}")]
    Parameters(String),
}

#[derive(Debug, Clone)]
pub struct CredentialVerifier {
    params: Params,
    salt_len: usize,
}

impl CredentialVerifier {
    pub fn from_config(config: &SecurityConfig) -> Result<Self, CredentialError> {
        let params = Params::new(
            config.argon2_memory_cost_kib,
            config.argon2_time_cost,
            config.argon2_parallelism,
            Some(config.argon2_output_len as usize),
        )
        .map_err(|e| CredentialError::Parameters(e.to_string()))?;

        let salt_len = config.argon2_salt_len as usize;
        if salt_len > MAX_SALT_BYTES {
            return Err(CredentialError::Parameters(format!(
                "salt length {salt_len} exceeds {MAX_SALT_BYTES} bytes"
            )));
        }

        Ok(Self { params, salt_len })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash on the calling thread. Prefer [`Self::hash`] from async code.
    pub fn hash_blocking(&self, password: &str) -> Result<String, CredentialError> {
        let mut salt = vec![0u8; self.salt_len];
        rand::rng().fill_bytes(&mut salt);

        let salt =
            SaltString::encode_b64(&salt).map_err(|e| CredentialError::Hashing(e.to_string()))?;

        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| CredentialError::Hashing(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Returns `Ok(false)` on a plain mismatch. Any other failure is an error.
    pub fn verify_blocking(&self, password: &str, passhash: &str) -> Result<bool, CredentialError> {
        let parsed =
            PasswordHash::new(passhash).map_err(|e| CredentialError::MalformedHash(e.to_string()))?;

        match self.argon2().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(CredentialError::Hashing(e.to_string())),
        }
    }

    pub async fn hash(&self, password: &str) -> anyhow::Result<String> {
        let verifier = self.clone();
        let password = password.to_string();

        let hash = task::spawn_blocking(move || verifier.hash_blocking(&password))
            .await
            .context("Password hashing task panicked")??;

        Ok(hash)
    }

    pub async fn verify(&self, password: &str, passhash: &str) -> anyhow::Result<bool> {
        let verifier = self.clone();
        let password = password.to_string();
        let passhash = passhash.to_string();

        let matched = task::spawn_blocking(move || verifier.verify_blocking(&password, &passhash))
            .await
            .context("Password verification task panicked")??;

        Ok(matched)
    }

    /// True when `passhash` was produced with weaker settings than the current ones.
    #[must_use]
    pub fn needs_rehash(&self, passhash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(passhash) else {
            return true;
        };

        if parsed.algorithm != Algorithm::Argon2id.ident() {
            return true;
        }

        if parsed.version != Some(Version::V0x13 as u32) {
            return true;
        }

        let Ok(stored) = Params::try_from(&parsed) else {
            return true;
        };

        let output_len = parsed.hash.map_or(0, |output| output.len());

        let mut salt_buf = [0u8; 64];
        let salt_len = parsed
            .salt
            .and_then(|salt| salt.decode_b64(&mut salt_buf).ok().map(<[u8]>::len))
            .unwrap_or(0);

        stored.m_cost() < self.params.m_cost()
            || stored.t_cost() < self.params.t_cost()
            || stored.p_cost() < self.params.p_cost()
            || output_len < self.params.output_len().unwrap_or(Params::DEFAULT_OUTPUT_LEN)
            || salt_len < self.salt_len
    }
}
