#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

//! COCO primitives: protocol constants, domain-tagged SHA3-256, the Argon2id `H` utility,
//! and constant-time equality helpers.
//
// Everything here is shared by the Client, the Authenticators and the Verifier, so the
// encodings are fixed:
//
// - Tagged SHA3-256 with 8-byte little-endian length framing per part
// - `H(parts[])` = Argon2id(framed(parts), salt = SHA3("coco.hash.salt", framed(parts)))
// - Constant-time comparison of byte strings of possibly different length

use argon2::{Algorithm, Argon2, Params, Version};
use sha3::{Digest, Sha3_256};
use subtle::ConstantTimeEq;
use thiserror::Error;

pub mod constants;

/// 32-byte digest.
pub type Hash256 = [u8; 32];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error("invalid argon2 parameters: {0}")]
    InvalidParams(String),

    #[error("argon2 hashing failed: {0}")]
    Hashing(String),
}

/// Fixed-width little-endian encoding of a length or counter.
#[inline]
#[must_use]
pub const fn le64(x: u64) -> [u8; 8] {
    x.to_le_bytes()
}

/// Length-framed concatenation: `Σ ( LE(|p|,8) || p )`.
#[must_use]
pub fn frame(parts: &[&[u8]]) -> Vec<u8> {
    let total: usize = parts.iter().map(|p| p.len() + 8).sum();
    let mut out = Vec::with_capacity(total);
    for p in parts {
        out.extend_from_slice(&le64(p.len() as u64));
        out.extend_from_slice(p);
    }
    out
}

/// Domain-tagged SHA3-256 with length framing:
/// `H(tag, parts[])` = `SHA3_256`( UTF8(tag) || Σ ( LE(|p|,8) || p ) )
#[must_use]
pub fn h_tag(tag: &str, parts: &[&[u8]]) -> Hash256 {
    debug_assert!(tag.starts_with("coco."), "non-coco.* tag: {tag}");
    let mut hasher = Sha3_256::new();
    hasher.update(tag.as_bytes());
    for p in parts {
        hasher.update(le64(p.len() as u64));
        hasher.update(p);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Argon2id cost parameters for `H`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Argon2Costs {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for Argon2Costs {
    fn default() -> Self {
        Self {
            memory_kib: constants::ARGON2_MEMORY_KIB,
            iterations: constants::ARGON2_ITERATIONS,
            parallelism: constants::ARGON2_PARALLELISM,
        }
    }
}

impl Argon2Costs {
    fn hasher(self) -> Result<Argon2<'static>, HashError> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(constants::HASH_LEN),
        )
        .map_err(|e| HashError::InvalidParams(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Check that Argon2 accepts these costs.
    pub fn check(self) -> Result<(), HashError> {
        self.hasher().map(|_| ())
    }
}

/// The deterministic key-derivation hash `H(parts[])`.
///
/// The salt is derived from the input itself so every party computing `H` over the same
/// parts obtains the same digest.
///
/// # Errors
///
/// Returns [`HashError`] if the cost parameters are rejected by Argon2.
pub fn hash(costs: Argon2Costs, parts: &[&[u8]]) -> Result<Hash256, HashError> {
    let framed = frame(parts);
    let salt = h_tag(constants::TAG_HASH_SALT, &[&framed]);
    let mut out = [0u8; constants::HASH_LEN];
    costs
        .hasher()?
        .hash_password_into(&framed, &salt, &mut out)
        .map_err(|e| HashError::Hashing(e.to_string()))?;
    Ok(out)
}

/// Constant-time equality for two 32-byte hashes.
#[must_use]
pub fn ct_eq_hash(a: &Hash256, b: &Hash256) -> bool {
    a.ct_eq(b).into()
}
