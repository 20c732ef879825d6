//! Sequential credential randomization.

use crate::{
    engine::{CredentialEngine, EngineError},
    types::{CredentialState, Proof},
};

/// Derive `count` proofs from `seed`, each from a fresh randomization of the state the
/// previous proof left behind. Returns the proofs in order and the final state.
///
/// Proof `i` is meant for Authenticator `i`; no two of them share a randomization.
pub fn prove_chain<C: CredentialEngine + ?Sized>(
    engine: &C,
    seed: CredentialState,
    count: usize,
) -> Result<(Vec<Proof>, CredentialState), EngineError> {
    (0..count).try_fold(
        (Vec::with_capacity(count), seed),
        |(mut proofs, state), _| {
            let (proof, next) = engine.randomize_and_prove(state)?;
            proofs.push(proof);
            Ok((proofs, next))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::{CredentialIssuer, Ed25519Authority, TransparentCredentials},
        types::{AccessAttributeSet, Scope, VerificationKey},
    };

    fn seed(
        engine: &TransparentCredentials,
    ) -> (CredentialState, Vec<VerificationKey>, AccessAttributeSet) {
        let set = AccessAttributeSet::issue("device", Scope::EvaluateOprf, 1_000, 60).unwrap();
        let prepared = engine.prepare_blind_sign(&set).unwrap();
        let issuers = [Ed25519Authority::generate(), Ed25519Authority::generate()];
        let keys: Vec<_> = issuers.iter().map(CredentialIssuer::verification_key).collect();
        let sigs: Vec<_> = issuers
            .iter()
            .map(|i| {
                i.blind_sign(&prepared.request, &prepared.public_key, &prepared.public_attributes)
                    .unwrap()
            })
            .collect();
        (engine.aggregate(&prepared, &sigs, &keys).unwrap(), keys, set)
    }

    #[test]
    fn every_link_is_distinct_and_verifies() {
        let engine = TransparentCredentials;
        let (state, keys, set) = seed(&engine);
        let (proofs, last) = prove_chain(&engine, state.clone(), 5).unwrap();
        assert_eq!(proofs.len(), 5);
        for (i, a) in proofs.iter().enumerate() {
            assert!(engine.verify(&keys, a, set.public()).unwrap());
            for b in &proofs[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_ne!(last.credential, state.credential);
        assert_eq!(last.aggregated_key, state.aggregated_key);
    }

    #[test]
    fn empty_chain_returns_seed() {
        let engine = TransparentCredentials;
        let (state, _, _) = seed(&engine);
        let (proofs, last) = prove_chain(&engine, state.clone(), 0).unwrap();
        assert!(proofs.is_empty());
        assert_eq!(last, state);
    }
}
