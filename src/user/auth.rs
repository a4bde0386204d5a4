//! Session tokens and password credentials.

use anyhow::{bail, Result};
use rand::Rng;
use rand_distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};
use thiserror::Error;

const AUTH_TOKEN_LENGTH: usize = 64;

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub struct AuthTokenValue(pub String);

impl AuthTokenValue {
    pub fn generate() -> AuthTokenValue {
        let random_string: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(AUTH_TOKEN_LENGTH)
            .map(char::from)
            .collect();
        AuthTokenValue(random_string)
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct AuthToken {
    pub user_id: usize,
    pub created: SystemTime,
    pub last_used: Option<SystemTime>,
    pub value: AuthTokenValue,
}

impl AuthToken {
    /// A token is valid for `ttl` after issuance, regardless of use.
    pub fn is_expired(&self, ttl: Duration, now: SystemTime) -> bool {
        match now.duration_since(self.created) {
            Ok(age) => age > ttl,
            Err(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing, unknown or expired session token")]
    Unauthenticated,

    #[error("Auth storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

mod srms_argon2 {
    use anyhow::{anyhow, Result};
    use argon2::{
        password_hash::{
            rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
        },
        Argon2,
    };

    pub fn generate_b64_salt() -> String {
        SaltString::generate(&mut OsRng).to_string()
    }

    pub fn hash<T: AsRef<str>>(plain: &[u8], b64_salt: T) -> Result<String> {
        let salt = SaltString::from_b64(b64_salt.as_ref()).map_err(|err| anyhow!("{}", err))?;
        let hash = Argon2::default()
            .hash_password(plain, &salt)
            .map_err(|err| anyhow!("{}", err))?;
        Ok(hash.to_string())
    }

    pub fn verify<T: AsRef<str>>(plain_pw: &[u8], target_hash: T) -> Result<bool> {
        let password_hash =
            PasswordHash::new(target_hash.as_ref()).map_err(|err| anyhow!("{}", err))?;
        Ok(Argon2::default()
            .verify_password(plain_pw, &password_hash)
            .is_ok())
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum CredentialHasher {
    Argon2,
}

impl FromStr for CredentialHasher {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "argon2" => Ok(CredentialHasher::Argon2),
            _ => bail!("Unknown hasher {}", s),
        }
    }
}

impl fmt::Display for CredentialHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialHasher::Argon2 => f.write_str("argon2"),
        }
    }
}

impl CredentialHasher {
    pub fn generate_b64_salt(&self) -> String {
        match self {
            CredentialHasher::Argon2 => srms_argon2::generate_b64_salt(),
        }
    }

    pub fn hash<T: AsRef<str>>(&self, plain: &[u8], b64_salt: T) -> Result<String> {
        match self {
            CredentialHasher::Argon2 => srms_argon2::hash(plain, b64_salt),
        }
    }

    /// The argon2 PHC string embeds its own salt, so only the hash is needed.
    pub fn verify<P: AsRef<str>, H: AsRef<str>>(&self, plain_pw: P, target_hash: H) -> Result<bool> {
        match self {
            CredentialHasher::Argon2 => {
                srms_argon2::verify(plain_pw.as_ref().as_bytes(), target_hash)
            }
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct UsernamePasswordCredentials {
    pub user_id: usize,
    pub salt: String,
    pub hash: String,
    pub hasher: CredentialHasher,

    pub created: SystemTime,
    pub last_tried: Option<SystemTime>,
    pub last_used: Option<SystemTime>,
}

impl UsernamePasswordCredentials {
    pub fn new(user_id: usize, password: &str) -> Result<Self> {
        let hasher = CredentialHasher::Argon2;
        let salt = hasher.generate_b64_salt();
        let hash = hasher.hash(password.as_bytes(), &salt)?;
        Ok(UsernamePasswordCredentials {
            user_id,
            salt,
            hash,
            hasher,
            created: SystemTime::now(),
            last_tried: None,
            last_used: None,
        })
    }

    pub fn verify(&self, password: &str) -> Result<bool> {
        self.hasher.verify(password, &self.hash)
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct UserAuthCredentials {
    pub user_id: usize,
    pub username_password: Option<UsernamePasswordCredentials>,
}
