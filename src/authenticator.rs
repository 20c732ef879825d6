//! Authenticator role.
//!
//! Every operation validates its attribute sets and proofs before touching local state
//! or the key registry. Operations that carry two proofs (password change, recovery
//! factor, deletion) check both before mutating either record.

use std::sync::Arc;

use coco_primitives::constants::COLLECTION_AUTHENTICATOR;
use tracing::debug;

use crate::{
    api::AuthenticatorApi,
    attributes::validate_for_scope,
    config::Config,
    engine::{BlindEvaluator, CredentialEngine, CredentialIssuer},
    errors::{require_nonempty, traced, CocoError},
    messages::{
        AccessGrantRequest, BlindSignatureRequest, ChangeAuthenticationDataRequest,
        DeleteCredentialRequest, EvaluationResponse, IssuedSignature, LoginRequest,
        NfaCredentialCreationRequest, OprfEvaluationRequest, RegisterRequest,
    },
    registry::KeyRegistry,
    store::{RecordStore, Store},
    types::{IdentityRecord, LocalId, OprfPrivateKey, Proof, PublicAttributes, Scope, VerificationKey},
};

const ROLE: &str = "authenticator";

pub struct AuthenticatorService<C: CredentialEngine, E: BlindEvaluator> {
    config: Config,
    credentials: C,
    authority: C::Authority,
    evaluator: E,
    store: Arc<dyn Store>,
    registry: Arc<dyn KeyRegistry>,
}

impl<C: CredentialEngine, E: BlindEvaluator> AuthenticatorService<C, E> {
    /// `authority` signs every issued credential share; `evaluator` holds the OPRF key
    /// and must be restored from [`AuthenticatorApi::get_oprf_private_key`] across restarts.
    pub fn new(
        config: Config,
        credentials: C,
        authority: C::Authority,
        evaluator: E,
        store: Arc<dyn Store>,
        registry: Arc<dyn KeyRegistry>,
    ) -> Self {
        Self {
            config,
            credentials,
            authority,
            evaluator,
            store,
            registry,
        }
    }

    #[must_use]
    pub fn verification_key(&self) -> VerificationKey {
        self.authority.verification_key()
    }

    fn check_id(id: &LocalId) -> Result<(), CocoError> {
        require_nonempty("id", id.as_str().as_bytes())
    }

    /// The recovery factor must be a second identity, not the primary one again.
    fn check_distinct(id: &LocalId, recovery_id: &LocalId) -> Result<(), CocoError> {
        if id == recovery_id {
            return Err(CocoError::invalid("recoveryId", "must differ from id"));
        }
        Ok(())
    }

    fn lookup(&self, id: &LocalId) -> Result<IdentityRecord, CocoError> {
        Self::check_id(id)?;
        self.store
            .load(COLLECTION_AUTHENTICATOR, id.as_str())?
            .ok_or(CocoError::UnknownIdentity { what: "id" })
    }

    fn exists(&self, id: &LocalId) -> Result<bool, CocoError> {
        Ok(self.store.contains(COLLECTION_AUTHENTICATOR, id.as_str())?)
    }

    /// Attribute policy for `scope`, then the proof against `keys`.
    fn check_token(
        &self,
        keys: &[VerificationKey],
        proof: &Proof,
        attrs: &PublicAttributes,
        scope: Scope,
        what: &'static str,
    ) -> Result<(), CocoError> {
        require_nonempty("proof", proof.as_bytes())?;
        validate_for_scope(&self.config, attrs, scope)?;
        if self.credentials.verify(keys, proof, attrs)? {
            Ok(())
        } else {
            Err(CocoError::ProofVerification { what })
        }
    }

    fn check_identity(
        &self,
        key: &VerificationKey,
        proof: &Proof,
        attrs: &PublicAttributes,
        what: &'static str,
    ) -> Result<(), CocoError> {
        require_nonempty("verificationKey", key.as_bytes())?;
        self.check_token(
            core::slice::from_ref(key),
            proof,
            attrs,
            Scope::ProveIdentity,
            what,
        )
    }

    /// Blind-sign the client's `access:uid` request. Nothing is published yet.
    fn sign_grant(&self, grant: &AccessGrantRequest) -> Result<IssuedSignature, CocoError> {
        require_nonempty("blindSignRequest", grant.blind_sign_request.as_bytes())?;
        require_nonempty("publicKey", grant.public_key.as_bytes())?;
        validate_for_scope(&self.config, &grant.user_attrs, Scope::Access)?;
        let signature = self.authority.blind_sign(
            &grant.blind_sign_request,
            &grant.public_key,
            &grant.user_attrs,
        )?;
        Ok(IssuedSignature {
            signature,
            verification_key: self.authority.verification_key(),
        })
    }

    fn publish(&self, issued: IssuedSignature) -> Result<IssuedSignature, CocoError> {
        self.registry.publish(&issued.verification_key)?;
        Ok(issued)
    }

    fn store_identity(&self, id: &LocalId, key: &VerificationKey) -> Result<(), CocoError> {
        let record = IdentityRecord {
            verification_key: key.clone(),
        };
        if self
            .store
            .insert_new(COLLECTION_AUTHENTICATOR, id.as_str(), &record)?
        {
            Ok(())
        } else {
            Err(CocoError::DuplicateIdentity { what: "id" })
        }
    }

    fn blind_signature(&self, req: &BlindSignatureRequest) -> Result<IssuedSignature, CocoError> {
        require_nonempty("blindSignRequest", req.blind_sign_request.as_bytes())?;
        require_nonempty("publicKey", req.public_key.as_bytes())?;
        validate_for_scope(&self.config, &req.public_attributes, Scope::EvaluateOprf)?;
        let signature = self.authority.blind_sign(
            &req.blind_sign_request,
            &req.public_key,
            &req.public_attributes,
        )?;
        self.publish(IssuedSignature {
            signature,
            verification_key: self.authority.verification_key(),
        })
    }

    fn oprf_evaluation(
        &self,
        req: &OprfEvaluationRequest,
    ) -> Result<EvaluationResponse, CocoError> {
        require_nonempty("evalRequest", req.eval_request.as_bytes())?;
        validate_for_scope(&self.config, &req.public_attributes, Scope::EvaluateOprf)?;
        self.registry.require_all(&req.verification_keys)?;
        self.check_token(
            &req.verification_keys,
            &req.proof,
            &req.public_attributes,
            Scope::EvaluateOprf,
            "evaluate:OPRF token",
        )?;
        let evaluation = self.evaluator.evaluate(&req.eval_request)?;
        Ok(EvaluationResponse { evaluation })
    }

    fn register(&self, req: &RegisterRequest) -> Result<IssuedSignature, CocoError> {
        Self::check_id(&req.id)?;
        if self.exists(&req.id)? {
            return Err(CocoError::DuplicateIdentity { what: "id" });
        }
        require_nonempty("regTokenVK", req.reg_token_vk.as_bytes())?;
        self.registry
            .require_all(core::slice::from_ref(&req.reg_token_vk))?;
        self.check_token(
            core::slice::from_ref(&req.reg_token_vk),
            &req.reg_token_proof,
            &req.reg_token_attrs,
            Scope::Register,
            "registration token",
        )?;
        self.check_identity(
            &req.verification_key,
            &req.proof,
            &req.public_attributes,
            "identity",
        )?;
        let issued = self.sign_grant(&req.grant)?;

        self.store_identity(&req.id, &req.verification_key)?;
        debug!(role = ROLE, id = %req.id, "identity registered");
        self.publish(issued)
    }

    fn login(&self, req: &LoginRequest) -> Result<IssuedSignature, CocoError> {
        let record = self.lookup(&req.id)?;
        self.check_identity(
            &record.verification_key,
            &req.proof,
            &req.public_attributes,
            "identity",
        )?;
        let issued = self.sign_grant(&req.grant)?;
        self.publish(issued)
    }

    fn change_authentication_data(
        &self,
        req: &ChangeAuthenticationDataRequest,
    ) -> Result<IssuedSignature, CocoError> {
        let old = self.lookup(&req.old_id)?;
        Self::check_id(&req.new_id)?;
        self.check_identity(
            &old.verification_key,
            &req.old_proof,
            &req.old_attrs,
            "current identity",
        )?;
        self.check_identity(&req.new_vk, &req.new_proof, &req.new_attrs, "new identity")?;
        let rotating = req.new_id != req.old_id;
        if rotating && self.exists(&req.new_id)? {
            return Err(CocoError::DuplicateIdentity { what: "new id" });
        }
        let issued = self.sign_grant(&req.grant)?;

        if rotating {
            self.store_identity(&req.new_id, &req.new_vk)?;
            self.store
                .delete(COLLECTION_AUTHENTICATOR, req.old_id.as_str())?;
        } else {
            self.store.put(
                COLLECTION_AUTHENTICATOR,
                req.new_id.as_str(),
                &IdentityRecord {
                    verification_key: req.new_vk.clone(),
                },
            )?;
        }
        debug!(role = ROLE, old = %req.old_id, new = %req.new_id, "identity rotated");
        self.publish(issued)
    }

    fn nfa_credential_creation(
        &self,
        req: &NfaCredentialCreationRequest,
    ) -> Result<IssuedSignature, CocoError> {
        Self::check_distinct(&req.id, &req.recovery_id)?;
        let primary = self.lookup(&req.id)?;
        Self::check_id(&req.recovery_id)?;
        self.check_identity(&primary.verification_key, &req.proof, &req.attrs, "identity")?;
        self.check_identity(
            &req.recovery_vk,
            &req.recovery_proof,
            &req.recovery_attrs,
            "recovery identity",
        )?;
        if self.exists(&req.recovery_id)? {
            return Err(CocoError::DuplicateIdentity { what: "recovery id" });
        }
        let issued = self.sign_grant(&req.grant)?;

        self.store_identity(&req.recovery_id, &req.recovery_vk)?;
        debug!(role = ROLE, id = %req.id, "recovery factor attached");
        self.publish(issued)
    }

    fn delete_credential(
        &self,
        req: &DeleteCredentialRequest,
    ) -> Result<IssuedSignature, CocoError> {
        Self::check_distinct(&req.id, &req.recovery_id)?;
        let primary = self.lookup(&req.id)?;
        let recovery = self.lookup(&req.recovery_id)?;
        self.check_identity(&primary.verification_key, &req.proof, &req.attrs, "identity")?;
        self.check_identity(
            &recovery.verification_key,
            &req.recovery_proof,
            &req.recovery_attrs,
            "recovery identity",
        )?;
        let issued = self.sign_grant(&req.grant)?;

        self.store.delete(COLLECTION_AUTHENTICATOR, req.id.as_str())?;
        self.store
            .delete(COLLECTION_AUTHENTICATOR, req.recovery_id.as_str())?;
        debug!(role = ROLE, id = %req.id, "identity and recovery factor deleted");
        self.publish(issued)
    }
}

impl<C: CredentialEngine, E: BlindEvaluator> AuthenticatorApi for AuthenticatorService<C, E> {
    fn get_oprf_private_key(&self) -> Result<OprfPrivateKey, CocoError> {
        traced(ROLE, "getOPRFPrivateKey", Ok(self.evaluator.private_key()))
    }

    fn handle_blind_signature_request(
        &self,
        request: &BlindSignatureRequest,
    ) -> Result<IssuedSignature, CocoError> {
        traced(
            ROLE,
            "handleBlindSignatureRequest",
            self.blind_signature(request),
        )
    }

    fn handle_oprf_evaluation(
        &self,
        request: &OprfEvaluationRequest,
    ) -> Result<EvaluationResponse, CocoError> {
        traced(ROLE, "handleOPRFEvaluation", self.oprf_evaluation(request))
    }

    fn handle_register_request(
        &self,
        request: &RegisterRequest,
    ) -> Result<IssuedSignature, CocoError> {
        traced(ROLE, "handleRegisterRequest", self.register(request))
    }

    fn handle_login_request(&self, request: &LoginRequest) -> Result<IssuedSignature, CocoError> {
        traced(ROLE, "handleLoginRequest", self.login(request))
    }

    fn handle_change_authentication_data_request(
        &self,
        request: &ChangeAuthenticationDataRequest,
    ) -> Result<IssuedSignature, CocoError> {
        traced(
            ROLE,
            "handleChangeAuthenticationDataRequest",
            self.change_authentication_data(request),
        )
    }

    fn handle_nfa_credential_creation_request(
        &self,
        request: &NfaCredentialCreationRequest,
    ) -> Result<IssuedSignature, CocoError> {
        traced(
            ROLE,
            "handleNFACredentialCreationRequest",
            self.nfa_credential_creation(request),
        )
    }

    fn handle_delete_credential_request(
        &self,
        request: &DeleteCredentialRequest,
    ) -> Result<IssuedSignature, CocoError> {
        traced(
            ROLE,
            "handleDeleteCredentialRequest",
            self.delete_credential(request),
        )
    }
}
