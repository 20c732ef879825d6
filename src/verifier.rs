//! Verifier role: owns the username mapping, the per-user salts and the pepper, issues
//! registration tokens and checks the aggregated `access:uid` proofs.

use std::sync::Arc;

use coco_primitives::constants::{
    COLLECTION_META, COLLECTION_PENDING_REGISTRATION, COLLECTION_USERID_TO_USERDATA,
    COLLECTION_USERNAME_TO_USERID, META_PEPPER,
};
use rand_core::{OsRng, RngCore};
use subtle::{Choice, ConstantTimeEq};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    api::VerifierApi,
    attributes::validate_for_scope,
    config::Config,
    engine::{CredentialEngine, CredentialIssuer},
    errors::{require_nonempty, traced, CocoError},
    messages::{
        AccessProof, AccessRequest, CompleteRegistrationRequest, LoginResponse,
        RegistrationRequest, RegistrationResponse, UpdateSaltsRequest, UsernameUpdateRequest,
    },
    registry::KeyRegistry,
    store::{RecordStore, Store},
    types::{
        PendingRegistration, Pepper, Salt, Scope, UserMapping, UserRecord, VerificationKey,
    },
};

const ROLE: &str = "verifier";

/// Generate the pepper on first use and return the persisted one afterwards.
///
/// # Errors
///
/// Returns [`CocoError::Storage`] if the store fails.
pub fn initialize_pepper(store: &dyn Store, length: usize) -> Result<Pepper, CocoError> {
    if let Some(existing) = store.retrieve(COLLECTION_META, META_PEPPER)? {
        return Ok(Pepper(existing));
    }
    let mut fresh = vec![0u8; length];
    OsRng.fill_bytes(&mut fresh);
    if store.save_new(COLLECTION_META, META_PEPPER, &fresh)? {
        info!(role = ROLE, "pepper generated");
        return Ok(Pepper(fresh));
    }
    store
        .retrieve(COLLECTION_META, META_PEPPER)?
        .map(Pepper)
        .ok_or(CocoError::UnknownIdentity { what: "pepper" })
}

pub struct VerifierService<C: CredentialEngine> {
    config: Config,
    credentials: C,
    authority: C::Authority,
    store: Arc<dyn Store>,
    registry: Arc<dyn KeyRegistry>,
    pepper: Pepper,
}

impl<C: CredentialEngine> VerifierService<C> {
    /// Loads the pepper, generating it if this store has never held one.
    ///
    /// # Errors
    ///
    /// Returns [`CocoError::Storage`] if the pepper cannot be read or written.
    pub fn new(
        config: Config,
        credentials: C,
        authority: C::Authority,
        store: Arc<dyn Store>,
        registry: Arc<dyn KeyRegistry>,
    ) -> Result<Self, CocoError> {
        let pepper = initialize_pepper(store.as_ref(), config.salt_length)?;
        Ok(Self {
            config,
            credentials,
            authority,
            store,
            registry,
            pepper,
        })
    }

    /// Re-run pepper initialization; always yields the pepper loaded at construction.
    pub fn initialize_pepper(&self) -> Result<Pepper, CocoError> {
        initialize_pepper(self.store.as_ref(), self.config.salt_length)
    }

    #[must_use]
    pub fn verification_key(&self) -> VerificationKey {
        self.authority.verification_key()
    }

    fn mapping(&self, username: &str) -> Result<Option<UserMapping>, CocoError> {
        require_nonempty("username", username.as_bytes())?;
        Ok(self.store.load(COLLECTION_USERNAME_TO_USERID, username)?)
    }

    fn known_user(&self, username: &str) -> Result<(UserMapping, UserRecord), CocoError> {
        let mapping = self
            .mapping(username)?
            .ok_or(CocoError::UnknownIdentity { what: "username" })?;
        let record = self
            .store
            .load(COLLECTION_USERID_TO_USERDATA, &mapping.user_id)?
            .ok_or(CocoError::UnknownIdentity { what: "user record" })?;
        Ok((mapping, record))
    }

    fn check_salts(&self, salts: &[Salt], keys: usize) -> Result<(), CocoError> {
        if salts.len() != keys {
            return Err(CocoError::invalid(
                "salts",
                format!("{} salts for {keys} verification keys", salts.len()),
            ));
        }
        if salts.iter().any(|s| s.as_bytes().len() != self.config.salt_length) {
            return Err(CocoError::invalid(
                "salts",
                format!("every salt must be {} bytes", self.config.salt_length),
            ));
        }
        Ok(())
    }

    /// Registry gate, attribute policy, then the aggregated proof.
    fn check_access(&self, access: &AccessProof) -> Result<(), CocoError> {
        require_nonempty("proof", access.proof.as_bytes())?;
        self.registry.require_all(&access.verification_keys)?;
        validate_for_scope(&self.config, &access.public_attributes, Scope::Access)?;
        if self.credentials.verify(
            &access.verification_keys,
            &access.proof,
            &access.public_attributes,
        )? {
            Ok(())
        } else {
            Err(CocoError::ProofVerification {
                what: "access:uid token",
            })
        }
    }

    /// Only a `userId` issued by [`Self::registration`] for this username can be completed.
    fn check_pending(&self, user_id: &str, username: &str) -> Result<(), CocoError> {
        let pending: PendingRegistration = self
            .store
            .load(COLLECTION_PENDING_REGISTRATION, user_id)?
            .ok_or(CocoError::UnknownIdentity {
                what: "pending userId",
            })?;
        if pending.username != username {
            return Err(CocoError::invalid("userId", "issued for another username"));
        }
        Ok(())
    }

    fn refresh_keys(
        &self,
        mapping: &UserMapping,
        mut record: UserRecord,
        keys: &[VerificationKey],
    ) -> Result<(), CocoError> {
        record.verification_keys = keys.to_vec();
        self.store
            .put(COLLECTION_USERID_TO_USERDATA, &mapping.user_id, &record)?;
        Ok(())
    }

    fn registration(&self, req: &RegistrationRequest) -> Result<RegistrationResponse, CocoError> {
        require_nonempty("blindSignRequest", req.blind_sign_request.as_bytes())?;
        require_nonempty("publicKey", req.public_key.as_bytes())?;
        validate_for_scope(&self.config, &req.public_attributes, Scope::Register)?;
        if let Some(existing) = self.mapping(&req.username)? {
            return Ok(RegistrationResponse {
                exists: true,
                user_id: existing.user_id,
                pepper: None,
                signature: None,
                verification_key: None,
            });
        }
        let signature = self.authority.blind_sign(
            &req.blind_sign_request,
            &req.public_key,
            &req.public_attributes,
        )?;
        let verification_key = self.authority.verification_key();
        let user_id = Uuid::new_v4().to_string();
        let pending = PendingRegistration {
            username: req.username.clone(),
        };
        if !self
            .store
            .insert_new(COLLECTION_PENDING_REGISTRATION, &user_id, &pending)?
        {
            return Err(CocoError::DuplicateIdentity { what: "userId" });
        }
        self.registry.publish(&verification_key)?;
        Ok(RegistrationResponse {
            exists: false,
            user_id,
            pepper: Some(self.pepper.clone()),
            signature: Some(signature),
            verification_key: Some(verification_key),
        })
    }

    fn completion(&self, req: &CompleteRegistrationRequest) -> Result<(), CocoError> {
        require_nonempty("userId", req.user_id.as_bytes())?;
        if self.mapping(&req.username)?.is_some() {
            return Err(CocoError::DuplicateIdentity { what: "username" });
        }
        self.check_salts(&req.salts, req.access.verification_keys.len())?;
        self.check_access(&req.access)?;
        self.check_pending(&req.user_id, &req.username)?;

        let mapping = UserMapping {
            user_id: req.user_id.clone(),
        };
        if !self
            .store
            .insert_new(COLLECTION_USERNAME_TO_USERID, &req.username, &mapping)?
        {
            return Err(CocoError::DuplicateIdentity { what: "username" });
        }
        let record = UserRecord {
            salts: req.salts.clone(),
            verification_keys: req.access.verification_keys.clone(),
        };
        let stored = self
            .store
            .insert_new(COLLECTION_USERID_TO_USERDATA, &req.user_id, &record);
        if !matches!(stored, Ok(true)) {
            self.store
                .delete(COLLECTION_USERNAME_TO_USERID, &req.username)?;
            return Err(match stored {
                Err(e) => e.into(),
                Ok(_) => CocoError::DuplicateIdentity { what: "userId" },
            });
        }
        self.store
            .delete(COLLECTION_PENDING_REGISTRATION, &req.user_id)?;
        info!(role = ROLE, user_id = %req.user_id, "user registered");
        Ok(())
    }

    fn lookup(&self, username: &str) -> Result<LoginResponse, CocoError> {
        match self.mapping(username)? {
            None => Ok(LoginResponse {
                exists: false,
                user_id: None,
                salts: None,
                pepper: None,
            }),
            Some(mapping) => {
                let record: UserRecord = self
                    .store
                    .load(COLLECTION_USERID_TO_USERDATA, &mapping.user_id)?
                    .ok_or(CocoError::UnknownIdentity { what: "user record" })?;
                Ok(LoginResponse {
                    exists: true,
                    user_id: Some(mapping.user_id),
                    salts: Some(record.salts),
                    pepper: Some(self.pepper.clone()),
                })
            }
        }
    }

    fn login(&self, req: &AccessRequest) -> Result<(), CocoError> {
        let (mapping, record) = self.known_user(&req.username)?;
        self.check_access(&req.access)?;
        self.refresh_keys(&mapping, record, &req.access.verification_keys)
    }

    fn credential(&self, req: &AccessRequest) -> Result<(), CocoError> {
        let (_, record) = self.known_user(&req.username)?;
        let supplied = &req.access.verification_keys;
        let same = supplied
            .iter()
            .zip(&record.verification_keys)
            .fold(Choice::from(1), |acc, (a, b)| {
                acc & a.as_bytes().ct_eq(b.as_bytes())
            });
        if supplied.len() != record.verification_keys.len() || !bool::from(same) {
            return Err(CocoError::VerificationKeyMismatch);
        }
        self.check_access(&AccessProof {
            verification_keys: record.verification_keys,
            proof: req.access.proof.clone(),
            public_attributes: req.access.public_attributes.clone(),
        })
    }

    fn update_salts(&self, req: &UpdateSaltsRequest) -> Result<(), CocoError> {
        let (mapping, mut record) = self.known_user(&req.username)?;
        self.check_salts(&req.new_salts, req.access.verification_keys.len())?;
        self.check_access(&req.access)?;
        record.salts = req.new_salts.clone();
        self.refresh_keys(&mapping, record, &req.access.verification_keys)?;
        debug!(role = ROLE, user_id = %mapping.user_id, "salts updated");
        Ok(())
    }

    fn username_update(&self, req: &UsernameUpdateRequest) -> Result<(), CocoError> {
        let (mapping, record) = self.known_user(&req.username)?;
        if self.mapping(&req.new_username)?.is_some() {
            return Err(CocoError::DuplicateIdentity { what: "username" });
        }
        self.check_access(&req.access)?;
        if !self
            .store
            .insert_new(COLLECTION_USERNAME_TO_USERID, &req.new_username, &mapping)?
        {
            return Err(CocoError::DuplicateIdentity { what: "username" });
        }
        self.store
            .delete(COLLECTION_USERNAME_TO_USERID, &req.username)?;
        self.refresh_keys(&mapping, record, &req.access.verification_keys)?;
        debug!(role = ROLE, user_id = %mapping.user_id, "username changed");
        Ok(())
    }

    fn delete_user(&self, req: &AccessRequest) -> Result<(), CocoError> {
        let (mapping, _) = self.known_user(&req.username)?;
        self.check_access(&req.access)?;
        self.store
            .delete(COLLECTION_USERNAME_TO_USERID, &req.username)?;
        self.store
            .delete(COLLECTION_USERID_TO_USERDATA, &mapping.user_id)?;
        info!(role = ROLE, user_id = %mapping.user_id, "user deleted");
        Ok(())
    }
}

impl<C: CredentialEngine> VerifierApi for VerifierService<C> {
    fn handle_registration_request(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationResponse, CocoError> {
        traced(ROLE, "handleRegistrationRequest", self.registration(request))
    }

    fn complete_registration(
        &self,
        request: &CompleteRegistrationRequest,
    ) -> Result<(), CocoError> {
        traced(ROLE, "completeRegistration", self.completion(request))
    }

    fn handle_login_request(&self, username: &str) -> Result<LoginResponse, CocoError> {
        traced(ROLE, "handleLoginRequest", self.lookup(username))
    }

    fn complete_login(&self, request: &AccessRequest) -> Result<(), CocoError> {
        traced(ROLE, "completeLogin", self.login(request))
    }

    fn credential_login(&self, request: &AccessRequest) -> Result<(), CocoError> {
        traced(ROLE, "credentialLogin", self.credential(request))
    }

    fn handle_update_salts_request(&self, request: &UpdateSaltsRequest) -> Result<(), CocoError> {
        traced(ROLE, "handleUpdateSaltsRequest", self.update_salts(request))
    }

    fn handle_username_update_request(
        &self,
        request: &UsernameUpdateRequest,
    ) -> Result<(), CocoError> {
        traced(
            ROLE,
            "handleUsernameUpdateRequest",
            self.username_update(request),
        )
    }

    fn handle_delete_user_request(&self, request: &AccessRequest) -> Result<(), CocoError> {
        traced(ROLE, "handleDeleteUserRequest", self.delete_user(request))
    }
}
