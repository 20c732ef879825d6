//! Client role: composes the Authenticator and Verifier calls of every user-facing
//! operation.
//!
//! Operations are straight-line sequences over a small set of building blocks:
//!
//! | step | building block |
//! |------|----------------|
//! | 0, 3, 6 | [`ClientAgent::prepare`] for `register:uid`, `evaluate:OPRF` and `access:uid` |
//! | 1 | [`ClientAgent::fresh_salts`] |
//! | 2 | [`ClientAgent::derive_rids`] |
//! | 4 | [`ClientAgent::harden`] (device proofs chained, one OPRF round per Authenticator) |
//! | 5 | [`ClientAgent::identities`] (local ids and their self-signed proofs) |
//! | 7 | [`ClientAgent::finish`] |
//! | 8 | [`ClientAgent::refresh`] |
//!
//! Authenticators are called in order and the first error aborts the operation. Calls that
//! already succeeded at earlier Authenticators are not rolled back.

use std::sync::Arc;

use coco_primitives::constants::COLLECTION_CLIENT;
use rand_core::{OsRng, RngCore};
use tracing::info;

use crate::{
    api::{AuthenticatorApi, VerifierApi},
    attributes::issue_now,
    chain::prove_chain,
    config::Config,
    engine::{CredentialEngine, CredentialIssuer, PasswordHardeningEngine, PreparedBlindSign},
    errors::CocoError,
    hashers::{derive_local_id, derive_rid},
    messages::{
        AccessGrantRequest, AccessProof, AccessRequest, BlindSignatureRequest,
        ChangeAuthenticationDataRequest, CompleteRegistrationRequest, DeleteCredentialRequest,
        IssuedSignature, LoginChallenge, LoginRequest, NfaCredentialCreationRequest,
        OprfEvaluationRequest, RegisterRequest, RegistrationRequest, UpdateSaltsRequest,
        UsernameUpdateRequest,
    },
    store::{RecordStore, Store},
    types::{
        BlindSignature, ClientRecord, CredentialState, LocalId, Pepper, Proof, PublicAttributes,
        Rid, Salt, Scope, VerificationKey,
    },
};

/// A local id at one Authenticator with its self-signed `prove:identity` proof.
#[derive(Clone, Debug)]
pub struct IdentityProof {
    pub id: LocalId,
    pub verification_key: VerificationKey,
    pub proof: Proof,
    pub public_attributes: PublicAttributes,
}

fn split(issued: Vec<IssuedSignature>) -> (Vec<BlindSignature>, Vec<VerificationKey>) {
    issued
        .into_iter()
        .map(|i| (i.signature, i.verification_key))
        .unzip()
}

fn grant_of(prepared: &PreparedBlindSign) -> AccessGrantRequest {
    AccessGrantRequest {
        blind_sign_request: prepared.request.clone(),
        public_key: prepared.public_key.clone(),
        user_attrs: prepared.public_attributes.clone(),
    }
}

fn access_of(record: &ClientRecord) -> AccessProof {
    AccessProof {
        verification_keys: record.verification_keys.clone(),
        proof: record.proof.clone(),
        public_attributes: record.public_attributes.clone(),
    }
}

pub struct ClientAgent<C: CredentialEngine, O: PasswordHardeningEngine> {
    config: Config,
    credentials: C,
    hardening: O,
    store: Arc<dyn Store>,
    verifier: Arc<dyn VerifierApi>,
    authenticators: Vec<Arc<dyn AuthenticatorApi>>,
}

impl<C: CredentialEngine, O: PasswordHardeningEngine> ClientAgent<C, O> {
    /// # Errors
    ///
    /// [`CocoError::Validation`] when no Authenticator is given.
    pub fn new(
        config: Config,
        credentials: C,
        hardening: O,
        store: Arc<dyn Store>,
        verifier: Arc<dyn VerifierApi>,
        authenticators: Vec<Arc<dyn AuthenticatorApi>>,
    ) -> Result<Self, CocoError> {
        if authenticators.is_empty() {
            return Err(CocoError::invalid("authenticators", "at least one is required"));
        }
        Ok(Self {
            config,
            credentials,
            hardening,
            store,
            verifier,
            authenticators,
        })
    }

    #[must_use]
    pub fn authenticator_count(&self) -> usize {
        self.authenticators.len()
    }

    /// The stored access credential of `username`, if this client holds one.
    pub fn record(&self, username: &str) -> Result<Option<ClientRecord>, CocoError> {
        Ok(self.store.load(COLLECTION_CLIENT, username)?)
    }

    /// Fresh attribute set for `scope` and a blind-sign request over it.
    pub fn prepare(&self, subject: &str, scope: Scope) -> Result<PreparedBlindSign, CocoError> {
        let set = issue_now(&self.config, subject, scope)?;
        Ok(self.credentials.prepare_blind_sign(&set)?)
    }

    /// One random salt per Authenticator.
    #[must_use]
    pub fn fresh_salts(&self) -> Vec<Salt> {
        (0..self.authenticators.len())
            .map(|_| {
                let mut salt = vec![0u8; self.config.salt_length];
                OsRng.fill_bytes(&mut salt);
                Salt(salt)
            })
            .collect()
    }

    pub fn derive_rids(
        &self,
        user_id: &str,
        secret: &str,
        salts: &[Salt],
        pepper: &Pepper,
    ) -> Result<Vec<Rid>, CocoError> {
        salts
            .iter()
            .map(|salt| derive_rid(&self.config, user_id, secret, salt, pepper))
            .collect()
    }

    /// Obtain a device credential from every Authenticator, then run one OPRF round per
    /// Authenticator on its RID, each authorized by the next proof of the chain.
    /// Returns the finalized outputs in Authenticator order.
    pub fn harden(&self, rids: &[Rid], device_id: &str) -> Result<Vec<[u8; 32]>, CocoError> {
        let device = self.prepare(device_id, Scope::EvaluateOprf)?;
        let request = BlindSignatureRequest {
            blind_sign_request: device.request.clone(),
            public_key: device.public_key.clone(),
            public_attributes: device.public_attributes.clone(),
        };
        let issued = self
            .authenticators
            .iter()
            .map(|auth| auth.handle_blind_signature_request(&request))
            .collect::<Result<Vec<_>, _>>()?;
        let (signatures, keys) = split(issued);
        let seed = self.credentials.aggregate(&device, &signatures, &keys)?;
        let (proofs, _) = prove_chain(&self.credentials, seed, self.authenticators.len())?;

        self.authenticators
            .iter()
            .zip(rids)
            .zip(proofs)
            .map(|((auth, rid), proof)| -> Result<[u8; 32], CocoError> {
                let (finalize, eval_request) = self.hardening.blind(rid.as_bytes())?;
                let response = auth.handle_oprf_evaluation(&OprfEvaluationRequest {
                    verification_keys: keys.clone(),
                    proof,
                    public_attributes: device.public_attributes.clone(),
                    eval_request,
                })?;
                Ok(self.hardening.finalize(&finalize, &response.evaluation)?)
            })
            .collect()
    }

    /// Derive the local id at every Authenticator and prove possession of its RID by
    /// self-signing a `prove:identity` token with the RID as key.
    pub fn identities(
        &self,
        rids: &[Rid],
        salts: &[Salt],
        outputs: &[[u8; 32]],
    ) -> Result<Vec<IdentityProof>, CocoError> {
        rids.iter()
            .zip(salts)
            .map(|(rid, salt)| -> Result<IdentityProof, CocoError> {
                let id = derive_local_id(&self.config, rid, outputs, salt)?;
                let signer = self.credentials.self_signer(rid.as_bytes())?;
                let prepared = self.prepare(id.as_str(), Scope::ProveIdentity)?;
                let signature = signer.blind_sign(
                    &prepared.request,
                    &prepared.public_key,
                    &prepared.public_attributes,
                )?;
                let verification_key = signer.verification_key();
                let state = self.credentials.aggregate(
                    &prepared,
                    &[signature],
                    core::slice::from_ref(&verification_key),
                )?;
                let (proof, _) = self.credentials.randomize_and_prove(state)?;
                Ok(IdentityProof {
                    id,
                    verification_key,
                    proof,
                    public_attributes: prepared.public_attributes,
                })
            })
            .collect()
    }

    /// Steps 2 to 5 for one secret.
    pub fn authenticate_secret(
        &self,
        user_id: &str,
        secret: &str,
        salts: &[Salt],
        pepper: &Pepper,
        device_id: &str,
    ) -> Result<Vec<IdentityProof>, CocoError> {
        if salts.len() != self.authenticators.len() {
            return Err(CocoError::invalid(
                "salts",
                format!(
                    "{} salts for {} authenticators",
                    salts.len(),
                    self.authenticators.len()
                ),
            ));
        }
        let rids = self.derive_rids(user_id, secret, salts, pepper)?;
        let outputs = self.harden(&rids, device_id)?;
        self.identities(&rids, salts, &outputs)
    }

    /// Aggregate the per-Authenticator access signatures into the credential shown to
    /// the Verifier.
    pub fn finish(
        &self,
        access: &PreparedBlindSign,
        issued: Vec<IssuedSignature>,
    ) -> Result<ClientRecord, CocoError> {
        let (signatures, keys) = split(issued);
        let state = self.credentials.aggregate(access, &signatures, &keys)?;
        let (proof, state) = self.credentials.randomize_and_prove(state)?;
        Ok(ClientRecord {
            proof,
            credential: state.credential,
            verification_keys: keys,
            public_attributes: access.public_attributes.clone(),
            aggregated_key: state.aggregated_key,
        })
    }

    /// A new proof from a stored credential, without contacting any Authenticator.
    pub fn refresh(&self, record: &ClientRecord) -> Result<ClientRecord, CocoError> {
        let (proof, state) = self.credentials.randomize_and_prove(CredentialState {
            credential: record.credential.clone(),
            aggregated_key: record.aggregated_key.clone(),
        })?;
        Ok(ClientRecord {
            proof,
            credential: state.credential,
            aggregated_key: state.aggregated_key,
            ..record.clone()
        })
    }

    fn challenge(&self, username: &str) -> Result<LoginChallenge, CocoError> {
        self.verifier.handle_login_request(username)?.into_challenge()
    }

    fn save(&self, username: &str, record: &ClientRecord) -> Result<(), CocoError> {
        Ok(self.store.put(COLLECTION_CLIENT, username, record)?)
    }

    /// # Errors
    ///
    /// [`CocoError::DuplicateIdentity`] if the username is taken; otherwise the first
    /// error returned by any role.
    pub fn register(&self, username: &str, secret: &str, device_id: &str) -> Result<(), CocoError> {
        info!(op = "register", username, "started");
        let token = self.prepare(username, Scope::Register)?;
        let grant = self
            .verifier
            .handle_registration_request(&RegistrationRequest {
                username: username.to_owned(),
                blind_sign_request: token.request.clone(),
                public_key: token.public_key.clone(),
                public_attributes: token.public_attributes.clone(),
            })?
            .into_grant()?;
        let token_state = self.credentials.aggregate(
            &token,
            core::slice::from_ref(&grant.signature),
            core::slice::from_ref(&grant.verification_key),
        )?;
        let (token_proofs, _) =
            prove_chain(&self.credentials, token_state, self.authenticators.len())?;

        let salts = self.fresh_salts();
        let identities =
            self.authenticate_secret(&grant.user_id, secret, &salts, &grant.pepper, device_id)?;

        let access = self.prepare(username, Scope::Access)?;
        let issued = self
            .authenticators
            .iter()
            .zip(identities)
            .zip(token_proofs)
            .map(|((auth, identity), token_proof)| {
                auth.handle_register_request(&RegisterRequest {
                    id: identity.id,
                    verification_key: identity.verification_key,
                    proof: identity.proof,
                    public_attributes: identity.public_attributes,
                    grant: grant_of(&access),
                    reg_token_proof: token_proof,
                    reg_token_attrs: token.public_attributes.clone(),
                    reg_token_vk: grant.verification_key.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let record = self.finish(&access, issued)?;

        self.verifier
            .complete_registration(&CompleteRegistrationRequest {
                username: username.to_owned(),
                user_id: grant.user_id.clone(),
                salts,
                access: access_of(&record),
            })?;
        self.save(username, &record)?;
        info!(op = "register", username, user_id = %grant.user_id, "completed");
        Ok(())
    }

    pub fn login(&self, username: &str, secret: &str, device_id: &str) -> Result<(), CocoError> {
        info!(op = "login", username, "started");
        let challenge = self.challenge(username)?;
        let identities = self.authenticate_secret(
            &challenge.user_id,
            secret,
            &challenge.salts,
            &challenge.pepper,
            device_id,
        )?;
        let access = self.prepare(username, Scope::Access)?;
        let issued = self
            .authenticators
            .iter()
            .zip(identities)
            .map(|(auth, identity)| {
                auth.handle_login_request(&LoginRequest {
                    id: identity.id,
                    proof: identity.proof,
                    public_attributes: identity.public_attributes,
                    grant: grant_of(&access),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let record = self.finish(&access, issued)?;

        self.verifier.complete_login(&AccessRequest {
            username: username.to_owned(),
            access: access_of(&record),
        })?;
        self.save(username, &record)?;
        info!(op = "login", username, "completed");
        Ok(())
    }

    /// Rotate every local id to ones derived from `new_secret` and fresh salts.
    pub fn update_password(
        &self,
        username: &str,
        old_secret: &str,
        new_secret: &str,
        device_id: &str,
    ) -> Result<(), CocoError> {
        info!(op = "updatePassword", username, "started");
        let challenge = self.challenge(username)?;
        let old = self.authenticate_secret(
            &challenge.user_id,
            old_secret,
            &challenge.salts,
            &challenge.pepper,
            device_id,
        )?;
        let new_salts = self.fresh_salts();
        let new = self.authenticate_secret(
            &challenge.user_id,
            new_secret,
            &new_salts,
            &challenge.pepper,
            device_id,
        )?;
        let access = self.prepare(username, Scope::Access)?;
        let issued = self
            .authenticators
            .iter()
            .zip(old.into_iter().zip(new))
            .map(|(auth, (old, new))| {
                auth.handle_change_authentication_data_request(&ChangeAuthenticationDataRequest {
                    old_id: old.id,
                    old_proof: old.proof,
                    old_attrs: old.public_attributes,
                    new_id: new.id,
                    new_vk: new.verification_key,
                    new_proof: new.proof,
                    new_attrs: new.public_attributes,
                    grant: grant_of(&access),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let record = self.finish(&access, issued)?;

        self.verifier
            .handle_update_salts_request(&UpdateSaltsRequest {
                username: username.to_owned(),
                new_salts,
                access: access_of(&record),
            })?;
        self.save(username, &record)?;
        info!(op = "updatePassword", username, "completed");
        Ok(())
    }

    /// Attach a recovery factor derived from `next_secret` and the current salts.
    pub fn set_next_factor(
        &self,
        username: &str,
        current_secret: &str,
        next_secret: &str,
        device_id: &str,
    ) -> Result<(), CocoError> {
        info!(op = "setNextFactor", username, "started");
        let challenge = self.challenge(username)?;
        let current = self.authenticate_secret(
            &challenge.user_id,
            current_secret,
            &challenge.salts,
            &challenge.pepper,
            device_id,
        )?;
        let recovery = self.authenticate_secret(
            &challenge.user_id,
            next_secret,
            &challenge.salts,
            &challenge.pepper,
            device_id,
        )?;
        let access = self.prepare(username, Scope::Access)?;
        let issued = self
            .authenticators
            .iter()
            .zip(current.into_iter().zip(recovery))
            .map(|(auth, (current, recovery))| {
                auth.handle_nfa_credential_creation_request(&NfaCredentialCreationRequest {
                    id: current.id,
                    proof: current.proof,
                    attrs: current.public_attributes,
                    recovery_id: recovery.id,
                    recovery_vk: recovery.verification_key,
                    recovery_proof: recovery.proof,
                    recovery_attrs: recovery.public_attributes,
                    grant: grant_of(&access),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let record = self.finish(&access, issued)?;

        self.verifier.complete_login(&AccessRequest {
            username: username.to_owned(),
            access: access_of(&record),
        })?;
        self.save(username, &record)?;
        info!(op = "setNextFactor", username, "completed");
        Ok(())
    }

    pub fn update_username(
        &self,
        username: &str,
        secret: &str,
        new_username: &str,
        device_id: &str,
    ) -> Result<(), CocoError> {
        info!(op = "updateUsername", username, new_username, "started");
        let challenge = self.challenge(username)?;
        let identities = self.authenticate_secret(
            &challenge.user_id,
            secret,
            &challenge.salts,
            &challenge.pepper,
            device_id,
        )?;
        let access = self.prepare(username, Scope::Access)?;
        let issued = self
            .authenticators
            .iter()
            .zip(identities)
            .map(|(auth, identity)| {
                auth.handle_login_request(&LoginRequest {
                    id: identity.id,
                    proof: identity.proof,
                    public_attributes: identity.public_attributes,
                    grant: grant_of(&access),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let record = self.finish(&access, issued)?;

        self.verifier
            .handle_username_update_request(&UsernameUpdateRequest {
                username: username.to_owned(),
                new_username: new_username.to_owned(),
                access: access_of(&record),
            })?;
        self.save(new_username, &record)?;
        self.store.delete(COLLECTION_CLIENT, username)?;
        info!(op = "updateUsername", username, new_username, "completed");
        Ok(())
    }

    /// Remove every local id, the recovery ids and the Verifier's user record. Requires
    /// both the current secret and the recovery secret.
    pub fn delete(
        &self,
        username: &str,
        secret: &str,
        next_secret: &str,
        device_id: &str,
    ) -> Result<(), CocoError> {
        info!(op = "delete", username, "started");
        let challenge = self.challenge(username)?;
        let current = self.authenticate_secret(
            &challenge.user_id,
            secret,
            &challenge.salts,
            &challenge.pepper,
            device_id,
        )?;
        let recovery = self.authenticate_secret(
            &challenge.user_id,
            next_secret,
            &challenge.salts,
            &challenge.pepper,
            device_id,
        )?;
        let access = self.prepare(username, Scope::Access)?;
        let issued = self
            .authenticators
            .iter()
            .zip(current.into_iter().zip(recovery))
            .map(|(auth, (current, recovery))| {
                auth.handle_delete_credential_request(&DeleteCredentialRequest {
                    id: current.id,
                    proof: current.proof,
                    attrs: current.public_attributes,
                    recovery_id: recovery.id,
                    recovery_proof: recovery.proof,
                    recovery_attrs: recovery.public_attributes,
                    grant: grant_of(&access),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let record = self.finish(&access, issued)?;

        self.verifier.handle_delete_user_request(&AccessRequest {
            username: username.to_owned(),
            access: access_of(&record),
        })?;
        self.store.delete(COLLECTION_CLIENT, username)?;
        info!(op = "delete", username, "completed");
        Ok(())
    }

    /// Log in again with the stored credential; no password and no Authenticator involved.
    pub fn credential_login(&self, username: &str) -> Result<(), CocoError> {
        info!(op = "credentialLogin", username, "started");
        let stored = self
            .record(username)?
            .ok_or(CocoError::UnknownIdentity {
                what: "stored credential",
            })?;
        let record = self.refresh(&stored)?;
        self.verifier.credential_login(&AccessRequest {
            username: username.to_owned(),
            access: access_of(&record),
        })?;
        self.save(username, &record)?;
        info!(op = "credentialLogin", username, "completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        authenticator::AuthenticatorService,
        config::HashParams,
        engine::{Ristretto255Oprf, TransparentCredentials},
        errors::ErrorKind,
        registry::{KeyRegistry, StoreRegistry},
        store::MemoryStore,
        verifier::VerifierService,
    };

    fn light() -> Config {
        Config {
            hash: HashParams {
                memory_kib: 64,
                iterations: 1,
                parallelism: 1,
            },
            ..Config::default()
        }
    }

    struct Fixture {
        client: ClientAgent<TransparentCredentials, Ristretto255Oprf>,
        client_store: Arc<MemoryStore>,
        registry: Arc<StoreRegistry>,
    }

    fn fixture(n: usize) -> Fixture {
        let engine = TransparentCredentials;
        let registry = Arc::new(StoreRegistry::new(Arc::new(MemoryStore::new())));
        let authenticators: Vec<Arc<dyn AuthenticatorApi>> = (0..n)
            .map(|_| {
                Arc::new(AuthenticatorService::new(
                    light(),
                    engine,
                    engine.generate_authority(),
                    Ristretto255Oprf.evaluator(None).unwrap(),
                    Arc::new(MemoryStore::new()),
                    registry.clone(),
                )) as Arc<dyn AuthenticatorApi>
            })
            .collect();
        let verifier = VerifierService::new(
            light(),
            engine,
            engine.generate_authority(),
            Arc::new(MemoryStore::new()),
            registry.clone(),
        )
        .unwrap();
        let client_store = Arc::new(MemoryStore::new());
        let client = ClientAgent::new(
            light(),
            engine,
            Ristretto255Oprf,
            client_store.clone(),
            Arc::new(verifier),
            authenticators,
        )
        .unwrap();
        Fixture {
            client,
            client_store,
            registry,
        }
    }

    #[test]
    fn requires_an_authenticator() {
        let engine = TransparentCredentials;
        let registry = Arc::new(StoreRegistry::new(Arc::new(MemoryStore::new())));
        let verifier = VerifierService::new(
            light(),
            engine,
            engine.generate_authority(),
            Arc::new(MemoryStore::new()),
            registry,
        )
        .unwrap();
        let err = ClientAgent::new(
            light(),
            engine,
            Ristretto255Oprf,
            Arc::new(MemoryStore::new()),
            Arc::new(verifier),
            Vec::new(),
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn fresh_salts_are_per_authenticator() {
        let f = fixture(3);
        let salts = f.client.fresh_salts();
        assert_eq!(salts.len(), 3);
        assert!(salts.iter().all(|s| s.as_bytes().len() == 32));
        assert_ne!(salts[0], salts[1]);
    }

    #[test]
    fn register_login_and_credential_login() {
        let f = fixture(2);
        f.client.register("alice", "pw123", "deviceA").unwrap();
        let first = f.client.record("alice").unwrap().unwrap();
        assert_eq!(first.verification_keys.len(), 2);
        for key in &first.verification_keys {
            assert!(f.registry.contains(key).unwrap());
        }

        f.client.login("alice", "pw123", "deviceB").unwrap();
        f.client.credential_login("alice").unwrap();
        let refreshed = f.client.record("alice").unwrap().unwrap();
        assert_ne!(refreshed.proof, first.proof);
        assert_eq!(f.client_store.len(COLLECTION_CLIENT).unwrap(), 1);
    }

    #[test]
    fn wrong_password_never_reaches_the_verifier() {
        let f = fixture(2);
        f.client.register("alice", "pw123", "deviceA").unwrap();
        let err = f.client.login("alice", "pw124", "deviceA").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownIdentity);
    }

    #[test]
    fn same_secret_derives_same_ids() {
        let f = fixture(2);
        let salts = f.client.fresh_salts();
        let pepper = Pepper(vec![5u8; 32]);
        let a = f
            .client
            .authenticate_secret("uid", "pw", &salts, &pepper, "dev")
            .unwrap();
        let b = f
            .client
            .authenticate_secret("uid", "pw", &salts, &pepper, "other-dev")
            .unwrap();
        let ids = |v: &[IdentityProof]| v.iter().map(|i| i.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&a), ids(&b));
        assert_ne!(a[0].id, a[1].id);
        assert_ne!(a[0].proof, b[0].proof);
    }

    #[test]
    fn credential_login_without_record_fails() {
        let f = fixture(1);
        let err = f.client.credential_login("nobody").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownIdentity);
    }
}
