//! Ed25519-based reference credential engine.
//!
//! Issuers sign a BLAKE3 commitment to the private subject together with the public
//! attributes. A credential is the ordered list of issuer signatures plus a nonce; every
//! randomization draws a new nonce, so two proofs from one credential never repeat. The
//! signatures themselves are reused across proofs: this engine hides the subject but does
//! NOT provide unlinkability and is meant for tests and integration, not deployment.
//
// Layouts (all integers little-endian):
//   VerificationKey            pk(32)
//   ClientPublicKey            session_pk(32)
//   BlindSignRequest           commitment(32) || session_sig(64)
//   BlindSignature             sig(64)
//   AggregatedVerificationKey  LE32(n) || n * pk(32)
//   Credential                 nonce(32) || commitment(32) || LE32(n) || n * sig(64)
//   Proof                      Credential || binding(32)

use coco_primitives::{
    constants::{
        TAG_CREDENTIAL_COMMIT, TAG_CREDENTIAL_PROOF, TAG_CREDENTIAL_REQUEST, TAG_CREDENTIAL_SHARE,
    },
    ct_eq_hash, frame,
};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand_core::{OsRng, RngCore};

use super::{CredentialEngine, CredentialIssuer, EngineError, PreparedBlindSign};
use crate::{
    ser::{encode_public_attributes, le32, Reader},
    types::{
        AccessAttributeSet, AggregatedVerificationKey, BlindSignRequest, BlindSignature,
        ClientPublicKey, Credential, CredentialState, Proof, PublicAttributes, VerificationKey,
    },
};

const PK_LEN: usize = 32;
const SIG_LEN: usize = 64;

fn tagged(tag: &str, parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(tag);
    hasher.update(&frame(parts));
    *hasher.finalize().as_bytes()
}

fn random32() -> [u8; 32] {
    let mut out = [0u8; 32];
    OsRng.fill_bytes(&mut out);
    out
}

fn share_message(commitment: &[u8; 32], attrs: &PublicAttributes) -> [u8; 32] {
    tagged(
        TAG_CREDENTIAL_SHARE,
        &[commitment, &encode_public_attributes(attrs)],
    )
}

fn request_message(commitment: &[u8; 32], attrs: &PublicAttributes) -> [u8; 32] {
    tagged(
        TAG_CREDENTIAL_REQUEST,
        &[commitment, &encode_public_attributes(attrs)],
    )
}

fn count_u32(n: usize, what: &'static str) -> Result<[u8; 4], EngineError> {
    u32::try_from(n)
        .map(le32)
        .map_err(|_| EngineError::Malformed(what))
}

fn parse_key(bytes: &[u8]) -> Result<VerifyingKey, EngineError> {
    let arr: [u8; PK_LEN] = bytes
        .try_into()
        .map_err(|_| EngineError::InvalidKey("verification key length"))?;
    VerifyingKey::from_bytes(&arr).map_err(|_| EngineError::InvalidKey("verification key"))
}

fn encode_aggregate(keys: &[VerificationKey]) -> Result<AggregatedVerificationKey, EngineError> {
    let mut v = Vec::with_capacity(4 + keys.len() * PK_LEN);
    v.extend_from_slice(&count_u32(keys.len(), "aggregated key")?);
    for key in keys {
        parse_key(key.as_bytes())?;
        v.extend_from_slice(key.as_bytes());
    }
    Ok(AggregatedVerificationKey(v))
}

fn parse_aggregate(key: &AggregatedVerificationKey) -> Result<Vec<VerifyingKey>, EngineError> {
    let mut r = Reader::new(key.as_bytes(), "aggregated key");
    let n = r.take_u32()? as usize;
    let body = r.take(n.checked_mul(PK_LEN).ok_or(EngineError::Malformed("aggregated key"))?)?;
    r.finish()?;
    body.chunks_exact(PK_LEN).map(parse_key).collect()
}

/// Decoded credential body shared by credentials and proofs.
struct Body {
    nonce: [u8; 32],
    commitment: [u8; 32],
    shares: Vec<Signature>,
}

impl Body {
    fn read(r: &mut Reader<'_>, what: &'static str) -> Result<Self, EngineError> {
        let nonce = r.take_array::<32>()?;
        let commitment = r.take_array::<32>()?;
        let n = r.take_u32()? as usize;
        let raw = r.take(n.checked_mul(SIG_LEN).ok_or(EngineError::Malformed(what))?)?;
        let shares = raw
            .chunks_exact(SIG_LEN)
            .map(|c| Signature::from_slice(c).map_err(|_| EngineError::Malformed(what)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            nonce,
            commitment,
            shares,
        })
    }

    fn encode(&self) -> Result<Vec<u8>, EngineError> {
        let mut v = Vec::with_capacity(32 + 32 + 4 + self.shares.len() * SIG_LEN + 32);
        v.extend_from_slice(&self.nonce);
        v.extend_from_slice(&self.commitment);
        v.extend_from_slice(&count_u32(self.shares.len(), "credential")?);
        for sig in &self.shares {
            v.extend_from_slice(&sig.to_bytes());
        }
        Ok(v)
    }

    fn binding(&self, body: &[u8], aggregated: &AggregatedVerificationKey) -> [u8; 32] {
        tagged(TAG_CREDENTIAL_PROOF, &[body, aggregated.as_bytes()])
    }
}

fn sign_share(
    signing: &SigningKey,
    request: &BlindSignRequest,
    public_key: &ClientPublicKey,
    public_attributes: &PublicAttributes,
) -> Result<BlindSignature, EngineError> {
    let mut r = Reader::new(request.as_bytes(), "blind-sign request");
    let commitment = r.take_array::<32>()?;
    let session_sig = Signature::from_bytes(&r.take_array::<SIG_LEN>()?);
    r.finish()?;
    let session = parse_key(public_key.as_bytes())
        .map_err(|_| EngineError::InvalidKey("client public key"))?;
    session
        .verify_strict(&request_message(&commitment, public_attributes), &session_sig)
        .map_err(|_| EngineError::InvalidRequest)?;
    let sig = signing.sign(&share_message(&commitment, public_attributes));
    Ok(BlindSignature(sig.to_bytes().to_vec()))
}

/// Long-lived issuer key of an Authenticator or the Verifier.
pub struct Ed25519Authority {
    signing: SigningKey,
}

impl Ed25519Authority {
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Restore an authority from its exported secret.
    #[must_use]
    pub fn from_secret(secret: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(secret),
        }
    }

    #[must_use]
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing.to_bytes()
    }
}

impl CredentialIssuer for Ed25519Authority {
    fn verification_key(&self) -> VerificationKey {
        VerificationKey(self.signing.verifying_key().to_bytes().to_vec())
    }

    fn blind_sign(
        &self,
        request: &BlindSignRequest,
        public_key: &ClientPublicKey,
        public_attributes: &PublicAttributes,
    ) -> Result<BlindSignature, EngineError> {
        sign_share(&self.signing, request, public_key, public_attributes)
    }
}

/// Issuer whose key is the caller's secret itself (the client's `RID_i`), so the same
/// secret always yields the same verification key.
pub struct DeterministicSigner {
    signing: SigningKey,
}

impl DeterministicSigner {
    #[must_use]
    pub fn from_secret(secret: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(secret),
        }
    }
}

impl CredentialIssuer for DeterministicSigner {
    fn verification_key(&self) -> VerificationKey {
        VerificationKey(self.signing.verifying_key().to_bytes().to_vec())
    }

    fn blind_sign(
        &self,
        request: &BlindSignRequest,
        public_key: &ClientPublicKey,
        public_attributes: &PublicAttributes,
    ) -> Result<BlindSignature, EngineError> {
        sign_share(&self.signing, request, public_key, public_attributes)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TransparentCredentials;

impl CredentialEngine for TransparentCredentials {
    type Authority = Ed25519Authority;
    type SelfSigner = DeterministicSigner;

    fn generate_authority(&self) -> Self::Authority {
        Ed25519Authority::generate()
    }

    fn self_signer(&self, secret: &[u8; 32]) -> Result<Self::SelfSigner, EngineError> {
        Ok(DeterministicSigner::from_secret(secret))
    }

    fn prepare_blind_sign(
        &self,
        attributes: &AccessAttributeSet,
    ) -> Result<PreparedBlindSign, EngineError> {
        let blinding = random32();
        let ordered = attributes.attributes();
        let private: Vec<&[u8]> = ordered
            .iter()
            .filter(|a| a.is_private)
            .map(|a| a.value.as_bytes())
            .collect();
        let commitment = tagged(TAG_CREDENTIAL_COMMIT, &[&blinding, &frame(&private)]);
        let session = SigningKey::generate(&mut OsRng);
        let session_sig = session.sign(&request_message(&commitment, attributes.public()));

        let mut request = Vec::with_capacity(32 + SIG_LEN);
        request.extend_from_slice(&commitment);
        request.extend_from_slice(&session_sig.to_bytes());

        let mut opening = Vec::with_capacity(64);
        opening.extend_from_slice(&commitment);
        opening.extend_from_slice(&blinding);

        Ok(PreparedBlindSign::new(
            ClientPublicKey(session.verifying_key().to_bytes().to_vec()),
            attributes.public().clone(),
            BlindSignRequest(request),
            opening,
        ))
    }

    fn aggregate(
        &self,
        prepared: &PreparedBlindSign,
        signatures: &[BlindSignature],
        keys: &[VerificationKey],
    ) -> Result<CredentialState, EngineError> {
        if signatures.len() != keys.len() {
            return Err(EngineError::ShareCountMismatch {
                signatures: signatures.len(),
                keys: keys.len(),
            });
        }
        if keys.is_empty() {
            return Err(EngineError::Malformed("empty signature set"));
        }
        let mut r = Reader::new(prepared.opening(), "opening");
        let commitment = r.take_array::<32>()?;
        let message = share_message(&commitment, &prepared.public_attributes);

        let mut shares = Vec::with_capacity(signatures.len());
        for (i, (sig, key)) in signatures.iter().zip(keys).enumerate() {
            let sig = Signature::from_slice(sig.as_bytes()).map_err(|_| EngineError::InvalidShare(i))?;
            parse_key(key.as_bytes())?
                .verify_strict(&message, &sig)
                .map_err(|_| EngineError::InvalidShare(i))?;
            shares.push(sig);
        }
        let body = Body {
            nonce: random32(),
            commitment,
            shares,
        };
        Ok(CredentialState {
            credential: Credential(body.encode()?),
            aggregated_key: encode_aggregate(keys)?,
        })
    }

    fn randomize_and_prove(
        &self,
        state: CredentialState,
    ) -> Result<(Proof, CredentialState), EngineError> {
        let mut r = Reader::new(state.credential.as_bytes(), "credential");
        let mut body = Body::read(&mut r, "credential")?;
        r.finish()?;
        let keys = parse_aggregate(&state.aggregated_key)?.len();
        if keys != body.shares.len() {
            return Err(EngineError::ShareCountMismatch {
                signatures: body.shares.len(),
                keys,
            });
        }
        body.nonce = random32();
        let encoded = body.encode()?;
        let mut proof = encoded.clone();
        proof.extend_from_slice(&body.binding(&encoded, &state.aggregated_key));
        Ok((
            Proof(proof),
            CredentialState {
                credential: Credential(encoded),
                aggregated_key: state.aggregated_key,
            },
        ))
    }

    fn verify(
        &self,
        keys: &[VerificationKey],
        proof: &Proof,
        public_attributes: &PublicAttributes,
    ) -> Result<bool, EngineError> {
        let mut r = Reader::new(proof.as_bytes(), "proof");
        let body = Body::read(&mut r, "proof")?;
        let binding = r.take_array::<32>()?;
        r.finish()?;
        if body.shares.len() != keys.len() {
            return Ok(false);
        }
        let aggregated = encode_aggregate(keys)?;
        let encoded = body.encode()?;
        if !ct_eq_hash(&binding, &body.binding(&encoded, &aggregated)) {
            return Ok(false);
        }
        let message = share_message(&body.commitment, public_attributes);
        for (sig, key) in body.shares.iter().zip(keys) {
            if parse_key(key.as_bytes())?.verify_strict(&message, sig).is_err() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
