//! End-to-end harness for COCO deployments.
//!
//! [`Deployment`] wires one Verifier, `n` Authenticators and one Client over a shared
//! key registry, either in process or through the JSON wire path, and keeps every store
//! reachable so scenarios can inspect the state each role ends up with.

#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex, PoisonError};

use coco_auth::{
    engine::Ristretto255Evaluator,
    messages::{
        BlindSignatureRequest, ChangeAuthenticationDataRequest, DeleteCredentialRequest,
        EvaluationResponse, IssuedSignature, LoginRequest, NfaCredentialCreationRequest,
        OprfEvaluationRequest, RegisterRequest,
    },
    AuthenticatorApi, AuthenticatorService, ClientAgent, CocoError, Config, CredentialEngine,
    CredentialIssuer, HashParams, Loopback, MemoryStore, OprfPrivateKey, PasswordHardeningEngine,
    Proof, RemoteAuthenticator, RemoteVerifier, Ristretto255Oprf, StoreRegistry,
    TransparentCredentials, VerificationKey, VerifierApi, VerifierService,
};

pub type Authenticator = AuthenticatorService<TransparentCredentials, Ristretto255Evaluator>;
pub type Verifier = VerifierService<TransparentCredentials>;
pub type Client = ClientAgent<TransparentCredentials, Ristretto255Oprf>;

/// Install a test-writer subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();
}

/// Argon2 costs small enough for debug-build tests.
#[must_use]
pub fn light_config() -> Config {
    Config {
        hash: HashParams {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        },
        ..Config::default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wiring {
    InProcess,
    /// Every call is encoded to JSON, dispatched by name and decoded again.
    Json,
}

/// One call observed at an Authenticator.
#[derive(Clone, Debug)]
pub struct Seen {
    pub authenticator: usize,
    pub method: &'static str,
    pub proofs: Vec<Proof>,
}

#[derive(Default)]
pub struct Recorder {
    seen: Mutex<Vec<Seen>>,
    registers: Mutex<Vec<(usize, RegisterRequest)>>,
}

impl Recorder {
    fn push(&self, authenticator: usize, method: &'static str, proofs: Vec<Proof>) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Seen {
                authenticator,
                method,
                proofs,
            });
    }

    #[must_use]
    pub fn seen(&self) -> Vec<Seen> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Proofs sent with `method`, in call order.
    #[must_use]
    pub fn proofs(&self, method: &str) -> Vec<(usize, Proof)> {
        self.seen()
            .into_iter()
            .filter(|s| s.method == method)
            .flat_map(|s| s.proofs.into_iter().map(move |p| (s.authenticator, p)))
            .collect()
    }

    #[must_use]
    pub fn register_requests(&self) -> Vec<(usize, RegisterRequest)> {
        self.registers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Passes every call through and records the proofs it carries.
pub struct Recording {
    index: usize,
    inner: Arc<dyn AuthenticatorApi>,
    recorder: Arc<Recorder>,
}

impl AuthenticatorApi for Recording {
    fn get_oprf_private_key(&self) -> Result<OprfPrivateKey, CocoError> {
        self.inner.get_oprf_private_key()
    }

    fn handle_blind_signature_request(
        &self,
        request: &BlindSignatureRequest,
    ) -> Result<IssuedSignature, CocoError> {
        self.recorder
            .push(self.index, "handleBlindSignatureRequest", Vec::new());
        self.inner.handle_blind_signature_request(request)
    }

    fn handle_oprf_evaluation(
        &self,
        request: &OprfEvaluationRequest,
    ) -> Result<EvaluationResponse, CocoError> {
        self.recorder
            .push(self.index, "handleOPRFEvaluation", vec![request.proof.clone()]);
        self.inner.handle_oprf_evaluation(request)
    }

    fn handle_register_request(
        &self,
        request: &RegisterRequest,
    ) -> Result<IssuedSignature, CocoError> {
        self.recorder.push(
            self.index,
            "handleRegisterRequest",
            vec![request.proof.clone(), request.reg_token_proof.clone()],
        );
        self.recorder
            .registers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((self.index, request.clone()));
        self.inner.handle_register_request(request)
    }

    fn handle_login_request(&self, request: &LoginRequest) -> Result<IssuedSignature, CocoError> {
        self.recorder
            .push(self.index, "handleLoginRequest", vec![request.proof.clone()]);
        self.inner.handle_login_request(request)
    }

    fn handle_change_authentication_data_request(
        &self,
        request: &ChangeAuthenticationDataRequest,
    ) -> Result<IssuedSignature, CocoError> {
        self.recorder.push(
            self.index,
            "handleChangeAuthenticationDataRequest",
            vec![request.old_proof.clone(), request.new_proof.clone()],
        );
        self.inner.handle_change_authentication_data_request(request)
    }

    fn handle_nfa_credential_creation_request(
        &self,
        request: &NfaCredentialCreationRequest,
    ) -> Result<IssuedSignature, CocoError> {
        self.recorder.push(
            self.index,
            "handleNFACredentialCreationRequest",
            vec![request.proof.clone(), request.recovery_proof.clone()],
        );
        self.inner.handle_nfa_credential_creation_request(request)
    }

    fn handle_delete_credential_request(
        &self,
        request: &DeleteCredentialRequest,
    ) -> Result<IssuedSignature, CocoError> {
        self.recorder.push(
            self.index,
            "handleDeleteCredentialRequest",
            vec![request.proof.clone(), request.recovery_proof.clone()],
        );
        self.inner.handle_delete_credential_request(request)
    }
}

pub struct Deployment {
    pub client: Client,
    pub client_store: Arc<MemoryStore>,
    pub verifier: Arc<Verifier>,
    pub verifier_store: Arc<MemoryStore>,
    pub verifier_key: VerificationKey,
    pub authenticators: Vec<Arc<Authenticator>>,
    pub authenticator_stores: Vec<Arc<MemoryStore>>,
    pub authenticator_keys: Vec<VerificationKey>,
    pub registry: Arc<StoreRegistry>,
    pub registry_store: Arc<MemoryStore>,
    pub recorder: Arc<Recorder>,
}

impl Deployment {
    /// # Panics
    ///
    /// If `n` is zero.
    #[must_use]
    pub fn new(n: usize, wiring: Wiring) -> Self {
        init_tracing();
        let config = light_config();
        let engine = TransparentCredentials;
        let registry_store = Arc::new(MemoryStore::new());
        let registry = Arc::new(StoreRegistry::new(registry_store.clone()));

        let authenticator_stores: Vec<_> = (0..n).map(|_| Arc::new(MemoryStore::new())).collect();
        let authenticators: Vec<Arc<Authenticator>> = authenticator_stores
            .iter()
            .map(|store| {
                Arc::new(AuthenticatorService::new(
                    config.clone(),
                    engine,
                    engine.generate_authority(),
                    Ristretto255Oprf.evaluator(None).expect("fresh OPRF key"),
                    store.clone(),
                    registry.clone(),
                ))
            })
            .collect();
        let authenticator_keys = authenticators
            .iter()
            .map(|a| a.verification_key())
            .collect();

        let verifier_store = Arc::new(MemoryStore::new());
        let authority = engine.generate_authority();
        let verifier_key = authority.verification_key();
        let verifier = Arc::new(
            VerifierService::new(
                config.clone(),
                engine,
                authority,
                verifier_store.clone(),
                registry.clone(),
            )
            .expect("verifier starts"),
        );

        let recorder = Arc::new(Recorder::default());
        let apis: Vec<Arc<dyn AuthenticatorApi>> = authenticators
            .iter()
            .enumerate()
            .map(|(index, service)| {
                let inner: Arc<dyn AuthenticatorApi> = match wiring {
                    Wiring::InProcess => service.clone(),
                    Wiring::Json => Arc::new(RemoteAuthenticator::new(Loopback::new(
                        service.clone(),
                    ))),
                };
                Arc::new(Recording {
                    index,
                    inner,
                    recorder: recorder.clone(),
                }) as Arc<dyn AuthenticatorApi>
            })
            .collect();
        let verifier_api: Arc<dyn VerifierApi> = match wiring {
            Wiring::InProcess => verifier.clone(),
            Wiring::Json => Arc::new(RemoteVerifier::new(Loopback::new(verifier.clone()))),
        };

        let client_store = Arc::new(MemoryStore::new());
        let client = ClientAgent::new(
            config,
            engine,
            Ristretto255Oprf,
            client_store.clone(),
            verifier_api,
            apis,
        )
        .expect("at least one authenticator");

        Self {
            client,
            client_store,
            verifier,
            verifier_store,
            verifier_key,
            authenticators,
            authenticator_stores,
            authenticator_keys,
            registry,
            registry_store,
            recorder,
        }
    }
}
