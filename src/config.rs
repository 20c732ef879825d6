//! Protocol configuration shared by every role.

use coco_primitives::{
    constants::{
        ARGON2_ITERATIONS, ARGON2_MEMORY_KIB, ARGON2_PARALLELISM, AUTHENTICATOR_TOKEN_VALIDITY,
        SALT_N_PEPPER_LENGTH, VERIFIER_TOKEN_VALIDITY,
    },
    Argon2Costs,
};
use serde::{Deserialize, Serialize};

use crate::{errors::CocoError, types::Scope};

/// Argon2id parameters of the hashing utility `H`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HashParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_kib: ARGON2_MEMORY_KIB,
            iterations: ARGON2_ITERATIONS,
            parallelism: ARGON2_PARALLELISM,
        }
    }
}

impl From<HashParams> for Argon2Costs {
    fn from(p: HashParams) -> Self {
        Self {
            memory_kib: p.memory_kib,
            iterations: p.iterations,
            parallelism: p.parallelism,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Seconds a token shown to an Authenticator stays valid.
    pub authenticator_token_validity: u64,
    /// Seconds an `access:uid` token shown to the Verifier stays valid.
    pub verifier_token_validity: u64,
    pub salt_length: usize,
    pub hash: HashParams,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            authenticator_token_validity: AUTHENTICATOR_TOKEN_VALIDITY,
            verifier_token_validity: VERIFIER_TOKEN_VALIDITY,
            salt_length: SALT_N_PEPPER_LENGTH,
            hash: HashParams::default(),
        }
    }
}

impl Config {
    /// Parse and validate a JSON configuration; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`CocoError::Validation`] on malformed JSON or rejected values.
    pub fn from_json(json: &str) -> Result<Self, CocoError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`CocoError::Validation`] for zero windows, short salts or Argon2 costs
    /// that Argon2 refuses.
    pub fn validate(&self) -> Result<(), CocoError> {
        if self.authenticator_token_validity == 0 {
            return Err(CocoError::invalid("authenticatorTokenValidity", "must be positive"));
        }
        if self.verifier_token_validity == 0 {
            return Err(CocoError::invalid("verifierTokenValidity", "must be positive"));
        }
        if self.salt_length < 16 {
            return Err(CocoError::invalid("saltLength", "shorter than 16 bytes"));
        }
        Argon2Costs::from(self.hash)
            .check()
            .map_err(|e| CocoError::invalid("hash", e.to_string()))
    }

    /// Validity window applied to tokens of `scope`.
    #[must_use]
    pub const fn window(&self, scope: Scope) -> u64 {
        if scope.is_verifier_facing() {
            self.verifier_token_validity
        } else {
            self.authenticator_token_validity
        }
    }

    #[must_use]
    pub fn costs(&self) -> Argon2Costs {
        self.hash.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let c = Config::default();
        assert_eq!(c.window(Scope::EvaluateOprf), 60);
        assert_eq!(c.window(Scope::Register), 60);
        assert_eq!(c.window(Scope::ProveIdentity), 60);
        assert_eq!(c.window(Scope::Access), 2_592_000);
        assert_eq!(c.salt_length, 32);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c = Config::from_json(r#"{"hash":{"memoryKib":64,"iterations":1,"parallelism":1}}"#)
            .unwrap();
        assert_eq!(c.hash.memory_kib, 64);
        assert_eq!(c.authenticator_token_validity, 60);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Config::from_json(r#"{"authenticatorTokenValidity":0}"#).is_err());
        assert!(Config::from_json(r#"{"saltLength":8}"#).is_err());
        assert!(Config::from_json(r#"{"hash":{"memoryKib":1}}"#).is_err());
        assert!(Config::from_json("not json").is_err());
    }
}
