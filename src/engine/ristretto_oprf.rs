//! 2HashDH OPRF over ristretto255 with SHA-512.
//!
//! `F(k, x) = H2(x, k * H1(x))`. The client sends `r * H1(x)`, the Authenticator answers
//! `k * r * H1(x)` and the client unblinds with `r^-1`.

use coco_primitives::constants::{TAG_OPRF_FINALIZE, TAG_OPRF_HASH_TO_GROUP};
use curve25519_dalek::{
    ristretto::{CompressedRistretto, RistrettoPoint},
    scalar::Scalar,
    traits::IsIdentity,
};
use rand_core::OsRng;
use sha2::{Digest, Sha512};

use super::{BlindEvaluator, EngineError, PasswordHardeningEngine};
use crate::{
    ser::Reader,
    types::{Evaluation, EvaluationRequest, FinalizeData, OprfPrivateKey},
};

fn hash_to_group(input: &[u8]) -> RistrettoPoint {
    let mut msg = Vec::with_capacity(TAG_OPRF_HASH_TO_GROUP.len() + input.len());
    msg.extend_from_slice(TAG_OPRF_HASH_TO_GROUP.as_bytes());
    msg.extend_from_slice(input);
    RistrettoPoint::hash_from_bytes::<Sha512>(&msg)
}

fn decode_point(bytes: &[u8], what: &'static str) -> Result<RistrettoPoint, EngineError> {
    let point = CompressedRistretto::from_slice(bytes)
        .map_err(|_| EngineError::Malformed(what))?
        .decompress()
        .ok_or(EngineError::Malformed(what))?;
    if point.is_identity() {
        return Err(EngineError::Malformed(what));
    }
    Ok(point)
}

fn decode_scalar(bytes: [u8; 32], what: &'static str) -> Result<Scalar, EngineError> {
    let scalar: Option<Scalar> = Scalar::from_canonical_bytes(bytes).into();
    match scalar {
        Some(s) if s != Scalar::ZERO => Ok(s),
        _ => Err(EngineError::InvalidKey(what)),
    }
}

fn nonzero_scalar() -> Scalar {
    loop {
        let s = Scalar::random(&mut OsRng);
        if s != Scalar::ZERO {
            return s;
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Ristretto255Oprf;

pub struct Ristretto255Evaluator {
    key: Scalar,
}

impl BlindEvaluator for Ristretto255Evaluator {
    fn private_key(&self) -> OprfPrivateKey {
        OprfPrivateKey(self.key.to_bytes().to_vec())
    }

    fn evaluate(&self, request: &EvaluationRequest) -> Result<Evaluation, EngineError> {
        let blinded = decode_point(request.as_bytes(), "evaluation request")?;
        Ok(Evaluation(
            (self.key * blinded).compress().to_bytes().to_vec(),
        ))
    }
}

impl PasswordHardeningEngine for Ristretto255Oprf {
    type Evaluator = Ristretto255Evaluator;

    fn evaluator(&self, key: Option<&OprfPrivateKey>) -> Result<Self::Evaluator, EngineError> {
        let key = match key {
            Some(k) => {
                let bytes: [u8; 32] = k
                    .as_bytes()
                    .try_into()
                    .map_err(|_| EngineError::InvalidKey("oprf key length"))?;
                decode_scalar(bytes, "oprf key")?
            }
            None => nonzero_scalar(),
        };
        Ok(Ristretto255Evaluator { key })
    }

    fn blind(&self, input: &[u8]) -> Result<(FinalizeData, EvaluationRequest), EngineError> {
        let r = nonzero_scalar();
        let blinded = r * hash_to_group(input);
        let mut state = Vec::with_capacity(32 + input.len());
        state.extend_from_slice(&r.to_bytes());
        state.extend_from_slice(input);
        Ok((
            FinalizeData(state),
            EvaluationRequest(blinded.compress().to_bytes().to_vec()),
        ))
    }

    fn finalize(
        &self,
        state: &FinalizeData,
        evaluation: &Evaluation,
    ) -> Result<[u8; 32], EngineError> {
        let mut r = Reader::new(state.as_bytes(), "finalize data");
        let blind = decode_scalar(r.take_array::<32>()?, "blinding scalar")?;
        let input = r.take(state.as_bytes().len() - 32)?;
        r.finish()?;
        let evaluated = decode_point(evaluation.as_bytes(), "evaluation")?;
        let unblinded = blind.invert() * evaluated;

        let mut h = Sha512::new();
        h.update(TAG_OPRF_FINALIZE.as_bytes());
        h.update((input.len() as u64).to_le_bytes());
        h.update(input);
        h.update(unblinded.compress().as_bytes());
        let digest = h.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest[..32]);
        Ok(out)
    }
}
