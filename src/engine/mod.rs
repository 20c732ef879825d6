//! Seams to the two cryptographic collaborators.
//!
//! [`CredentialEngine`] covers the anonymous-credential side (blind signing, aggregation,
//! randomization, proofs) and [`PasswordHardeningEngine`] the OPRF. Both are injected into
//! the services and the client at construction. The reference implementations live in
//! [`transparent`] and [`ristretto_oprf`].

use thiserror::Error;

use crate::types::{
    AccessAttributeSet, BlindSignRequest, BlindSignature, ClientPublicKey, CredentialState,
    Evaluation, EvaluationRequest, FinalizeData, OprfPrivateKey, Proof, PublicAttributes,
    VerificationKey,
};

pub mod ristretto_oprf;
pub mod transparent;

pub use ristretto_oprf::{Ristretto255Evaluator, Ristretto255Oprf};
pub use transparent::{DeterministicSigner, Ed25519Authority, TransparentCredentials};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("malformed {0}")]
    Malformed(&'static str),

    #[error("invalid key material: {0}")]
    InvalidKey(&'static str),

    #[error("blind-sign request does not match its public key and attributes")]
    InvalidRequest,

    #[error("signature share {0} does not verify")]
    InvalidShare(usize),

    #[error("{signatures} signatures for {keys} keys")]
    ShareCountMismatch { signatures: usize, keys: usize },

    #[error("hash: {0}")]
    Hash(#[from] coco_primitives::HashError),
}

/// Client-side output of preparing a blind-sign request.
///
/// The opening is engine-specific secret state kept by the client to aggregate the
/// issued signatures later; it never leaves the client.
#[derive(Clone, Debug)]
pub struct PreparedBlindSign {
    pub public_key: ClientPublicKey,
    pub public_attributes: PublicAttributes,
    pub request: BlindSignRequest,
    opening: Vec<u8>,
}

impl PreparedBlindSign {
    #[must_use]
    pub const fn new(
        public_key: ClientPublicKey,
        public_attributes: PublicAttributes,
        request: BlindSignRequest,
        opening: Vec<u8>,
    ) -> Self {
        Self {
            public_key,
            public_attributes,
            request,
            opening,
        }
    }

    #[must_use]
    pub fn opening(&self) -> &[u8] {
        &self.opening
    }
}

/// The signing side of the credential engine.
pub trait CredentialIssuer: Send + Sync {
    fn verification_key(&self) -> VerificationKey;

    fn blind_sign(
        &self,
        request: &BlindSignRequest,
        public_key: &ClientPublicKey,
        public_attributes: &PublicAttributes,
    ) -> Result<BlindSignature, EngineError>;
}

/// Client-side and verifying operations of the credential engine.
pub trait CredentialEngine: Send + Sync {
    /// Long-lived issuer of an Authenticator or the Verifier.
    type Authority: CredentialIssuer;
    /// Issuer whose key is derived from caller-supplied secret bytes.
    type SelfSigner: CredentialIssuer;

    fn generate_authority(&self) -> Self::Authority;

    fn self_signer(&self, secret: &[u8; 32]) -> Result<Self::SelfSigner, EngineError>;

    fn prepare_blind_sign(
        &self,
        attributes: &AccessAttributeSet,
    ) -> Result<PreparedBlindSign, EngineError>;

    /// Combine one signature share per key, in key order, into a credential.
    fn aggregate(
        &self,
        prepared: &PreparedBlindSign,
        signatures: &[BlindSignature],
        keys: &[VerificationKey],
    ) -> Result<CredentialState, EngineError>;

    /// Consume a credential state and return a fresh proof together with the
    /// re-randomized state for the next proof in a chain.
    fn randomize_and_prove(
        &self,
        state: CredentialState,
    ) -> Result<(Proof, CredentialState), EngineError>;

    /// `Ok(false)` for a well-formed proof that does not verify.
    fn verify(
        &self,
        keys: &[VerificationKey],
        proof: &Proof,
        public_attributes: &PublicAttributes,
    ) -> Result<bool, EngineError>;
}

/// Server side of the OPRF held by each Authenticator.
pub trait BlindEvaluator: Send + Sync {
    /// Export the key so the evaluator can be restored identically.
    fn private_key(&self) -> OprfPrivateKey;

    fn evaluate(&self, request: &EvaluationRequest) -> Result<Evaluation, EngineError>;
}

/// Client side of the OPRF plus construction of evaluators.
pub trait PasswordHardeningEngine: Send + Sync {
    type Evaluator: BlindEvaluator;

    /// New evaluator; `None` draws a fresh key.
    fn evaluator(&self, key: Option<&OprfPrivateKey>) -> Result<Self::Evaluator, EngineError>;

    fn blind(&self, input: &[u8]) -> Result<(FinalizeData, EvaluationRequest), EngineError>;

    fn finalize(
        &self,
        state: &FinalizeData,
        evaluation: &Evaluation,
    ) -> Result<[u8; 32], EngineError>;
}
