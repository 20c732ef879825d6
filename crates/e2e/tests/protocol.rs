//! Protocol scenarios over a full deployment.

use std::collections::HashSet;

use coco_auth::{
    attributes::issue_now,
    messages::{AccessProof, AccessRequest, RegistrationRequest},
    AuthenticatorApi, CocoError, CredentialEngine, CredentialIssuer, ErrorKind, KeyRegistry,
    Scope, TransparentCredentials, VerifierApi,
};
use coco_primitives::constants::{
    COLLECTION_AUTHENTICATOR, COLLECTION_CLIENT, COLLECTION_GLOBAL, COLLECTION_META,
    COLLECTION_USERID_TO_USERDATA, COLLECTION_USERNAME_TO_USERID,
};
use e2e::{Deployment, Wiring};

fn ids(d: &Deployment) -> Vec<Vec<String>> {
    d.authenticator_stores
        .iter()
        .map(|s| s.keys(COLLECTION_AUTHENTICATOR).unwrap())
        .collect()
}

fn assert_pairwise_distinct<T: std::hash::Hash + Eq + std::fmt::Debug>(items: &[T]) {
    let unique: HashSet<_> = items.iter().collect();
    assert_eq!(unique.len(), items.len(), "repeated value in {items:?}");
}

#[test]
fn alice_registers_with_three_authenticators() {
    let d = Deployment::new(3, Wiring::InProcess);
    d.client.register("alice", "pw123", "deviceA").unwrap();

    let per_authenticator = ids(&d);
    assert!(per_authenticator.iter().all(|ids| ids.len() == 1));
    let all: Vec<_> = per_authenticator.into_iter().flatten().collect();
    assert_pairwise_distinct(&all);

    let register_proofs: Vec<_> = d
        .recorder
        .register_requests()
        .into_iter()
        .map(|(_, r)| r.proof)
        .collect();
    assert_eq!(register_proofs.len(), 3);
    assert_pairwise_distinct(&register_proofs);

    for key in &d.authenticator_keys {
        assert!(d.registry.contains(key).unwrap());
    }
    assert!(d.registry.contains(&d.verifier_key).unwrap());
    assert_eq!(d.registry_store.len(COLLECTION_GLOBAL).unwrap(), 4);

    let record = d.client.record("alice").unwrap().unwrap();
    assert_eq!(record.verification_keys, d.authenticator_keys);
}

#[test]
fn every_authenticator_sees_a_different_proof() {
    let d = Deployment::new(3, Wiring::InProcess);
    d.client.register("alice", "pw123", "deviceA").unwrap();
    for method in ["handleOPRFEvaluation", "handleRegisterRequest"] {
        let proofs = d.recorder.proofs(method);
        let seen_by: HashSet<_> = proofs.iter().map(|(i, _)| *i).collect();
        assert_eq!(seen_by.len(), 3, "{method} did not reach every authenticator");
        let values: Vec<_> = proofs.into_iter().map(|(_, p)| p).collect();
        assert_pairwise_distinct(&values);
    }
    let tokens: Vec<_> = d
        .recorder
        .register_requests()
        .into_iter()
        .map(|(_, r)| r.reg_token_proof)
        .collect();
    assert_pairwise_distinct(&tokens);
}

#[test]
fn round_trip_leaves_one_user_record() {
    let d = Deployment::new(2, Wiring::InProcess);
    d.client.register("alice", "pw123", "deviceA").unwrap();
    d.client.login("alice", "pw123", "deviceA").unwrap();
    d.client.credential_login("alice").unwrap();
    d.client.credential_login("alice").unwrap();
    assert_eq!(d.verifier_store.len(COLLECTION_USERID_TO_USERDATA).unwrap(), 1);
    assert_eq!(d.verifier_store.len(COLLECTION_USERNAME_TO_USERID).unwrap(), 1);
    assert_eq!(d.client_store.len(COLLECTION_CLIENT).unwrap(), 1);
}

#[test]
fn pepper_is_generated_once() {
    let d = Deployment::new(1, Wiring::InProcess);
    let first = d.verifier.initialize_pepper().unwrap();
    let second = d.verifier.initialize_pepper().unwrap();
    assert_eq!(first, second);
    assert_eq!(d.verifier_store.len(COLLECTION_META).unwrap(), 1);
}

#[test]
fn duplicate_username_is_reported_and_not_stored() {
    let d = Deployment::new(2, Wiring::InProcess);
    d.client.register("alice", "pw123", "deviceA").unwrap();
    let err = d.client.register("alice", "other", "deviceB").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateIdentity);
    assert_eq!(d.verifier_store.len(COLLECTION_USERID_TO_USERDATA).unwrap(), 1);

    let engine = TransparentCredentials;
    let set = issue_now(&e2e::light_config(), "alice", Scope::Register).unwrap();
    let p = engine.prepare_blind_sign(&set).unwrap();
    let reply = d
        .verifier
        .handle_registration_request(&RegistrationRequest {
            username: "alice".into(),
            blind_sign_request: p.request,
            public_key: p.public_key,
            public_attributes: p.public_attributes,
        })
        .unwrap();
    assert!(reply.exists);
    assert!(reply.signature.is_none());
}

#[test]
fn replayed_registration_is_a_duplicate_id() {
    let d = Deployment::new(2, Wiring::InProcess);
    d.client.register("alice", "pw123", "deviceA").unwrap();
    let (index, request) = d.recorder.register_requests().remove(0);
    let err = d.authenticators[index]
        .handle_register_request(&request)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateIdentity);
    assert_eq!(d.authenticator_stores[index].len(COLLECTION_AUTHENTICATOR).unwrap(), 1);
}

#[test]
fn unregistered_keys_are_refused_even_with_valid_proofs() {
    let d = Deployment::new(2, Wiring::InProcess);
    d.client.register("alice", "pw123", "deviceA").unwrap();

    let engine = TransparentCredentials;
    let rogue: Vec<_> = (0..2).map(|_| engine.generate_authority()).collect();
    let set = issue_now(&e2e::light_config(), "alice", Scope::Access).unwrap();
    let p = engine.prepare_blind_sign(&set).unwrap();
    let keys: Vec<_> = rogue.iter().map(CredentialIssuer::verification_key).collect();
    let sigs: Vec<_> = rogue
        .iter()
        .map(|a| a.blind_sign(&p.request, &p.public_key, &p.public_attributes).unwrap())
        .collect();
    let state = engine.aggregate(&p, &sigs, &keys).unwrap();
    let (proof, _) = engine.randomize_and_prove(state).unwrap();
    assert!(engine.verify(&keys, &proof, &p.public_attributes).unwrap());

    let err = d
        .verifier
        .complete_login(&AccessRequest {
            username: "alice".into(),
            access: AccessProof {
                verification_keys: keys,
                proof,
                public_attributes: p.public_attributes,
            },
        })
        .unwrap_err();
    assert!(matches!(err, CocoError::UnknownVerificationKey(_)));
}

#[test]
fn wrong_password_aborts_before_the_verifier() {
    let d = Deployment::new(3, Wiring::InProcess);
    d.client.register("alice", "pw123", "deviceA").unwrap();
    let before = d.client.record("alice").unwrap();
    d.recorder.clear();

    let err = d.client.login("alice", "pw321", "deviceA").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownIdentity);
    let logins = d.recorder.proofs("handleLoginRequest");
    assert_eq!(logins.len(), 1, "first rejection must stop the operation");
    assert_eq!(d.client.record("alice").unwrap(), before);
}

#[test]
fn password_update_rotates_every_id() {
    let d = Deployment::new(2, Wiring::InProcess);
    d.client.register("alice", "pw123", "deviceA").unwrap();
    let old_ids = ids(&d);

    d.client
        .update_password("alice", "pw123", "correct horse", "deviceA")
        .unwrap();
    let new_ids = ids(&d);
    for (old, new) in old_ids.iter().zip(&new_ids) {
        assert_eq!(new.len(), 1);
        assert_ne!(old, new);
    }
    assert!(d.client.login("alice", "pw123", "deviceA").is_err());
    d.client.login("alice", "correct horse", "deviceA").unwrap();
}

#[test]
fn username_update_moves_every_record() {
    let d = Deployment::new(2, Wiring::InProcess);
    d.client.register("alice", "pw123", "deviceA").unwrap();
    d.client.register("bob", "hunter2", "deviceB").unwrap();

    let err = d
        .client
        .update_username("alice", "pw123", "bob", "deviceA")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateIdentity);

    d.client
        .update_username("alice", "pw123", "alicia", "deviceA")
        .unwrap();
    assert!(d.client.record("alice").unwrap().is_none());
    assert!(d.client.record("alicia").unwrap().is_some());
    assert_eq!(
        d.client.login("alice", "pw123", "deviceA").unwrap_err().kind(),
        ErrorKind::UnknownIdentity
    );
    d.client.credential_login("alicia").unwrap();
    d.client.login("alicia", "pw123", "deviceA").unwrap();
}

#[test]
fn deletion_after_next_factor_leaves_nothing() {
    let d = Deployment::new(3, Wiring::InProcess);
    d.client.register("alice", "pw123", "deviceA").unwrap();
    d.client
        .set_next_factor("alice", "pw123", "recovery-phrase", "deviceA")
        .unwrap();
    assert!(ids(&d).iter().all(|ids| ids.len() == 2));

    let err = d
        .client
        .delete("alice", "pw123", "not-the-phrase", "deviceA")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownIdentity);
    assert!(ids(&d).iter().all(|ids| ids.len() == 2));

    d.client
        .delete("alice", "pw123", "recovery-phrase", "deviceA")
        .unwrap();
    assert!(ids(&d).iter().all(Vec::is_empty));
    assert_eq!(d.verifier_store.len(COLLECTION_USERNAME_TO_USERID).unwrap(), 0);
    assert_eq!(d.verifier_store.len(COLLECTION_USERID_TO_USERDATA).unwrap(), 0);
    assert!(d.client.record("alice").unwrap().is_none());
    assert!(!d.verifier.handle_login_request("alice").unwrap().exists);
}

#[test]
fn oprf_key_survives_a_restart() {
    let d = Deployment::new(1, Wiring::InProcess);
    let exported = d.authenticators[0].get_oprf_private_key().unwrap();
    assert_eq!(exported, d.authenticators[0].get_oprf_private_key().unwrap());
    assert_eq!(exported.as_bytes().len(), 32);
}
