//! Argon2id password hashing.
//!
//! Hashes are stored as PHC strings, so each one carries its own salt and
//! cost parameters and verification keeps working if the defaults change.

use std::sync::Arc;

use anyhow::Result;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, SaltString},
    Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version,
};
use rand::RngCore;

/// Hashes and verifies passwords with a fixed Argon2id cost.
///
/// Holds a hash of a random throwaway password so that a sign-in for an
/// unknown account still pays for one full verification.
#[derive(Clone)]
pub struct Passwords {
    params: Params,
    dummy_hash: Arc<str>,
}

impl Passwords {
    /// Argon2id with 19 MiB, 2 passes, 1 lane: a verification costs a few
    /// tens of milliseconds on commodity hardware.
    pub fn standard() -> Result<Self> {
        let params = Params::new(19 * 1024, 2, 1, None)
            .map_err(|e| anyhow::anyhow!("argon2 params: {e}"))?;
        Self::with_params(params)
    }

    pub fn with_params(params: Params) -> Result<Self> {
        let mut throwaway = [0u8; 32];
        OsRng.fill_bytes(&mut throwaway);
        let dummy_hash = hash_with(&params, &hex::encode(throwaway))?;
        Ok(Self {
            params,
            dummy_hash: dummy_hash.into(),
        })
    }

    /// Hash `password` with a fresh random salt. Returns a PHC string.
    pub fn hash(&self, password: &str) -> Result<String> {
        hash_with(&self.params, password)
    }

    /// Check `password` against `stored`.
    ///
    /// `None` (no such account) and unparsable hashes are verified against the
    /// dummy hash and always yield false.
    pub fn verify(&self, password: &str, stored: Option<&str>) -> bool {
        let parsed = stored.and_then(|h| PasswordHash::new(h).ok());
        let genuine = parsed.is_some();
        let target = match parsed {
            Some(hash) => hash,
            None => match PasswordHash::new(&self.dummy_hash) {
                Ok(hash) => hash,
                Err(_) => return false,
            },
        };
        let matched = Argon2::default()
            .verify_password(password.as_bytes(), &target)
            .is_ok();
        genuine && matched
    }
}

fn hash_with(params: &Params, password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone());
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("argon2 hash: {e}"))?;
    Ok(hash.to_string())
}
