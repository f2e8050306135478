use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::config::PasswordSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordConfig {
    pub min_length: usize,
    pub max_length: usize,
    pub require_letter: bool,
    pub require_digit: bool,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 128,
            require_letter: true,
            require_digit: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Argon2Config {
    pub memory_cost_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
    pub output_length: usize,
}

impl Default for Argon2Config {
    fn default() -> Self {
        Self {
            memory_cost_kib: 19456,
            time_cost: 2,
            parallelism: 1,
            output_length: 32,
        }
    }
}

impl Argon2Config {
    /// Minimal cost parameters for test suites.
    pub fn low_memory() -> Self {
        Self {
            memory_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
            output_length: 32,
        }
    }
}

impl From<&PasswordSettings> for Argon2Config {
    fn from(settings: &PasswordSettings) -> Self {
        Self {
            memory_cost_kib: settings.argon2_memory_kib,
            time_cost: settings.argon2_time_cost,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PasswordIssue {
    TooShort { min: usize, actual: usize },
    TooLong { max: usize, actual: usize },
    MissingLetter,
    MissingDigit,
    ContainsUsername,
}

impl PasswordIssue {
    pub fn message(&self) -> String {
        match self {
            Self::TooShort { min, actual } => {
                format!("Password must be at least {min} characters (currently {actual})")
            }
            Self::TooLong { max, actual } => {
                format!("Password must be at most {max} characters (currently {actual})")
            }
            Self::MissingLetter => "Password must contain at least one letter".into(),
            Self::MissingDigit => "Password must contain at least one digit".into(),
            Self::ContainsUsername => "Password must not contain your username".into(),
        }
    }
}

pub struct PasswordService {
    argon2: Argon2<'static>,
    config: PasswordConfig,
    /// Hash verified against when no account matches, so that path costs
    /// the same as a wrong password.
    decoy_hash: String,
}

impl PasswordService {
    pub fn new(argon2_config: Argon2Config, password_config: PasswordConfig) -> Result<Self> {
        let params = Params::new(
            argon2_config.memory_cost_kib,
            argon2_config.time_cost,
            argon2_config.parallelism,
            Some(argon2_config.output_length),
        )
        .map_err(|e| anyhow!("Invalid Argon2 parameters: {e}"))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let decoy_hash = argon2
            .hash_password(b"quodo-decoy-password", &SaltString::generate(&mut OsRng))
            .map_err(|e| anyhow!("Failed to prepare decoy hash: {e}"))?
            .to_string();

        Ok(Self {
            argon2,
            config: password_config,
            decoy_hash,
        })
    }

    pub fn from_settings(settings: &PasswordSettings) -> Result<Self> {
        Self::new(Argon2Config::from(settings), PasswordConfig::default())
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("Failed to hash password: {e}"))?;

        Ok(hash.to_string())
    }

    pub fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed_hash =
            PasswordHash::new(hash).map_err(|e| anyhow!("Invalid password hash format: {e}"))?;

        match self.argon2.verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => {
                debug!("Password mismatch");
                Ok(false)
            }
            Err(e) => Err(anyhow!("Password verification failed: {e}")),
        }
    }

    /// Runs a full verification that never succeeds, for logins naming no account.
    pub fn verify_decoy(&self, password: &str) {
        if let Ok(true) = self.verify(password, &self.decoy_hash) {
            debug!("Decoy password matched");
        }
    }

    pub fn validate(&self, password: &str, username: Option<&str>) -> Vec<PasswordIssue> {
        let mut issues = Vec::new();

        let length = password.chars().count();
        if length < self.config.min_length {
            issues.push(PasswordIssue::TooShort {
                min: self.config.min_length,
                actual: length,
            });
        }
        if length > self.config.max_length {
            issues.push(PasswordIssue::TooLong {
                max: self.config.max_length,
                actual: length,
            });
        }
        if self.config.require_letter && !password.chars().any(|c| c.is_alphabetic()) {
            issues.push(PasswordIssue::MissingLetter);
        }
        if self.config.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            issues.push(PasswordIssue::MissingDigit);
        }
        if let Some(uname) = username {
            if uname.len() >= 3 && password.to_lowercase().contains(&uname.to_lowercase()) {
                issues.push(PasswordIssue::ContainsUsername);
            }
        }

        issues
    }

    /// Returns the joined issue messages when the password breaks the policy.
    pub fn check_policy(&self, password: &str, username: Option<&str>) -> Option<String> {
        let issues = self.validate(password, username);
        if issues.is_empty() {
            None
        } else {
            Some(
                issues
                    .iter()
                    .map(PasswordIssue::message)
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        }
    }

    pub fn config(&self) -> &PasswordConfig {
        &self.config
    }
}
