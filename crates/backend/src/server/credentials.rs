//! Argon2id password hashes for the administrator and trainer accounts.

use std::fmt;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use common::ServiceError;

/// Argon2id hash of a password in PHC string form
/// (`$argon2id$v=19$m=...,t=...,p=...$<salt>$<hash>`).
///
/// Only the hash is kept; the password itself is dropped after hashing.
#[derive(Clone)]
pub struct PasswordDigest {
    phc: String,
}

impl PasswordDigest {
    /// Hash `password` under a fresh random salt.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Internal`] if hashing fails.
    pub fn hash(password: &str) -> Result<Self, ServiceError> {
        let salt = SaltString::generate(&mut OsRng);
        let phc = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| ServiceError::Internal(format!("password hash: {e}")))?
            .to_string();
        Ok(Self { phc })
    }

    /// Check `candidate` against the stored hash.
    pub fn verify(&self, candidate: &str) -> bool {
        match PasswordHash::new(&self.phc) {
            Ok(parsed) => Argon2::default()
                .verify_password(candidate.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

impl fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordDigest([REDACTED])")
    }
}

/// The single administrator account, configured at startup.
#[derive(Debug, Clone)]
pub struct AdminAccount {
    username: String,
    digest: PasswordDigest,
}

impl AdminAccount {
    /// Build the account, hashing `password` immediately.
    pub fn new(username: impl Into<String>, password: &str) -> Result<Self, ServiceError> {
        Ok(Self {
            username: username.into(),
            digest: PasswordDigest::hash(password)?,
        })
    }

    /// The administrator's login name.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns `true` if both the username and password match.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        // Always run the hash check so timing does not reveal the username.
        let password_ok = self.digest.verify(password);
        password_ok && username == self.username
    }
}
