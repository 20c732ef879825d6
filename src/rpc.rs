//! JSON dispatch-by-name between roles.
//!
//! A request is `{"method": <name>, "params": {...}}` and a reply is either
//! `{"ok": <payload>}` or `{"error": {"kind": .., "message": ..}}`. The server side is
//! [`JsonDispatch`]; the client side is [`RemoteAuthenticator`] / [`RemoteVerifier`] over
//! any [`Transport`].

use std::sync::Arc;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::trace;

use crate::{
    api::{AuthenticatorApi, VerifierApi},
    authenticator::AuthenticatorService,
    engine::{BlindEvaluator, CredentialEngine},
    errors::{CocoError, ErrorKind},
    messages::{
        AccessRequest, BlindSignatureRequest, ChangeAuthenticationDataRequest,
        CompleteRegistrationRequest, DeleteCredentialRequest, EvaluationResponse, IssuedSignature,
        LoginLookupRequest, LoginRequest, LoginResponse, NfaCredentialCreationRequest,
        OprfEvaluationRequest, RegisterRequest, RegistrationRequest, RegistrationResponse,
        UpdateSaltsRequest, UsernameUpdateRequest,
    },
    types::OprfPrivateKey,
    verifier::VerifierService,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum AuthenticatorCall {
    #[serde(rename = "getOPRFPrivateKey")]
    GetOprfPrivateKey,
    #[serde(rename = "handleBlindSignatureRequest")]
    BlindSignature(BlindSignatureRequest),
    #[serde(rename = "handleOPRFEvaluation")]
    OprfEvaluation(OprfEvaluationRequest),
    #[serde(rename = "handleRegisterRequest")]
    Register(RegisterRequest),
    #[serde(rename = "handleLoginRequest")]
    Login(LoginRequest),
    #[serde(rename = "handleChangeAuthenticationDataRequest")]
    ChangeAuthenticationData(ChangeAuthenticationDataRequest),
    #[serde(rename = "handleNFACredentialCreationRequest")]
    NfaCredentialCreation(NfaCredentialCreationRequest),
    #[serde(rename = "handleDeleteCredentialRequest")]
    DeleteCredential(DeleteCredentialRequest),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum VerifierCall {
    #[serde(rename = "handleRegistrationRequest")]
    Registration(RegistrationRequest),
    #[serde(rename = "completeRegistration")]
    CompleteRegistration(CompleteRegistrationRequest),
    #[serde(rename = "handleLoginRequest")]
    Login(LoginLookupRequest),
    #[serde(rename = "completeLogin")]
    CompleteLogin(AccessRequest),
    #[serde(rename = "credentialLogin")]
    CredentialLogin(AccessRequest),
    #[serde(rename = "handleUpdateSaltsRequest")]
    UpdateSalts(UpdateSaltsRequest),
    #[serde(rename = "handleUsernameUpdateRequest")]
    UsernameUpdate(UsernameUpdateRequest),
    #[serde(rename = "handleDeleteUserRequest")]
    DeleteUser(AccessRequest),
}

/// Error object carried in a reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&CocoError> for WireError {
    fn from(e: &CocoError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl From<WireError> for CocoError {
    fn from(e: WireError) -> Self {
        Self::Remote {
            kind: e.kind,
            message: e.message,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Reply<T> {
    Ok(T),
    Error(WireError),
}

impl<T> From<Result<T, CocoError>> for Reply<T> {
    fn from(result: Result<T, CocoError>) -> Self {
        match result {
            Ok(v) => Self::Ok(v),
            Err(e) => Self::Error(WireError::from(&e)),
        }
    }
}

impl<T> Reply<T> {
    /// # Errors
    ///
    /// The peer's error as [`CocoError::Remote`].
    pub fn into_result(self) -> Result<T, CocoError> {
        match self {
            Self::Ok(v) => Ok(v),
            Self::Error(e) => Err(e.into()),
        }
    }
}

fn encode_reply<T: Serialize>(result: Result<T, CocoError>) -> String {
    serde_json::to_string(&Reply::from(result)).unwrap_or_else(|e| {
        format!(
            r#"{{"error":{{"kind":"transport","message":{}}}}}"#,
            serde_json::Value::String(e.to_string())
        )
    })
}

/// Serve one JSON request against an Authenticator.
pub fn dispatch_authenticator<A: AuthenticatorApi + ?Sized>(api: &A, request: &str) -> String {
    let call = match serde_json::from_str::<AuthenticatorCall>(request) {
        Ok(call) => call,
        Err(e) => return encode_reply::<()>(Err(e.into())),
    };
    match call {
        AuthenticatorCall::GetOprfPrivateKey => encode_reply(api.get_oprf_private_key()),
        AuthenticatorCall::BlindSignature(r) => encode_reply(api.handle_blind_signature_request(&r)),
        AuthenticatorCall::OprfEvaluation(r) => encode_reply(api.handle_oprf_evaluation(&r)),
        AuthenticatorCall::Register(r) => encode_reply(api.handle_register_request(&r)),
        AuthenticatorCall::Login(r) => encode_reply(api.handle_login_request(&r)),
        AuthenticatorCall::ChangeAuthenticationData(r) => {
            encode_reply(api.handle_change_authentication_data_request(&r))
        }
        AuthenticatorCall::NfaCredentialCreation(r) => {
            encode_reply(api.handle_nfa_credential_creation_request(&r))
        }
        AuthenticatorCall::DeleteCredential(r) => {
            encode_reply(api.handle_delete_credential_request(&r))
        }
    }
}

/// Serve one JSON request against the Verifier.
pub fn dispatch_verifier<V: VerifierApi + ?Sized>(api: &V, request: &str) -> String {
    let call = match serde_json::from_str::<VerifierCall>(request) {
        Ok(call) => call,
        Err(e) => return encode_reply::<()>(Err(e.into())),
    };
    match call {
        VerifierCall::Registration(r) => encode_reply(api.handle_registration_request(&r)),
        VerifierCall::CompleteRegistration(r) => encode_reply(api.complete_registration(&r)),
        VerifierCall::Login(r) => encode_reply(api.handle_login_request(&r.username)),
        VerifierCall::CompleteLogin(r) => encode_reply(api.complete_login(&r)),
        VerifierCall::CredentialLogin(r) => encode_reply(api.credential_login(&r)),
        VerifierCall::UpdateSalts(r) => encode_reply(api.handle_update_salts_request(&r)),
        VerifierCall::UsernameUpdate(r) => encode_reply(api.handle_username_update_request(&r)),
        VerifierCall::DeleteUser(r) => encode_reply(api.handle_delete_user_request(&r)),
    }
}

/// Server side of dispatch-by-name: one JSON request in, one JSON reply out.
/// Never fails; every error becomes an error reply.
pub trait JsonDispatch: Send + Sync {
    fn dispatch(&self, request: &str) -> String;
}

impl<C: CredentialEngine, E: BlindEvaluator> JsonDispatch for AuthenticatorService<C, E> {
    fn dispatch(&self, request: &str) -> String {
        dispatch_authenticator(self, request)
    }
}

impl<C: CredentialEngine> JsonDispatch for VerifierService<C> {
    fn dispatch(&self, request: &str) -> String {
        dispatch_verifier(self, request)
    }
}

impl<D: JsonDispatch + ?Sized> JsonDispatch for Arc<D> {
    fn dispatch(&self, request: &str) -> String {
        (**self).dispatch(request)
    }
}

/// String-in, string-out round trip to one peer. Timeouts and retries belong here.
pub trait Transport: Send + Sync {
    fn round_trip(&self, request: &str) -> Result<String, CocoError>;
}

/// In-process [`Transport`] that still goes through the JSON encoding.
pub struct Loopback<D> {
    server: D,
}

impl<D: JsonDispatch> Loopback<D> {
    pub const fn new(server: D) -> Self {
        Self { server }
    }
}

impl<D: JsonDispatch> Transport for Loopback<D> {
    fn round_trip(&self, request: &str) -> Result<String, CocoError> {
        Ok(self.server.dispatch(request))
    }
}

fn call<T, Q, R>(transport: &T, request: &Q) -> Result<R, CocoError>
where
    T: Transport + ?Sized,
    Q: Serialize,
    R: DeserializeOwned,
{
    let body = serde_json::to_string(request).map_err(|e| CocoError::Transport(e.to_string()))?;
    trace!(bytes = body.len(), "rpc request");
    let raw = transport.round_trip(&body)?;
    serde_json::from_str::<Reply<R>>(&raw)
        .map_err(|e| CocoError::Transport(format!("undecodable reply: {e}")))?
        .into_result()
}

/// [`AuthenticatorApi`] over a [`Transport`].
pub struct RemoteAuthenticator<T> {
    transport: T,
}

impl<T: Transport> RemoteAuthenticator<T> {
    pub const fn new(transport: T) -> Self {
        Self { transport }
    }
}

impl<T: Transport> AuthenticatorApi for RemoteAuthenticator<T> {
    fn get_oprf_private_key(&self) -> Result<OprfPrivateKey, CocoError> {
        call(&self.transport, &AuthenticatorCall::GetOprfPrivateKey)
    }

    fn handle_blind_signature_request(
        &self,
        request: &BlindSignatureRequest,
    ) -> Result<IssuedSignature, CocoError> {
        call(
            &self.transport,
            &AuthenticatorCall::BlindSignature(request.clone()),
        )
    }

    fn handle_oprf_evaluation(
        &self,
        request: &OprfEvaluationRequest,
    ) -> Result<EvaluationResponse, CocoError> {
        call(
            &self.transport,
            &AuthenticatorCall::OprfEvaluation(request.clone()),
        )
    }

    fn handle_register_request(
        &self,
        request: &RegisterRequest,
    ) -> Result<IssuedSignature, CocoError> {
        call(&self.transport, &AuthenticatorCall::Register(request.clone()))
    }

    fn handle_login_request(&self, request: &LoginRequest) -> Result<IssuedSignature, CocoError> {
        call(&self.transport, &AuthenticatorCall::Login(request.clone()))
    }

    fn handle_change_authentication_data_request(
        &self,
        request: &ChangeAuthenticationDataRequest,
    ) -> Result<IssuedSignature, CocoError> {
        call(
            &self.transport,
            &AuthenticatorCall::ChangeAuthenticationData(request.clone()),
        )
    }

    fn handle_nfa_credential_creation_request(
        &self,
        request: &NfaCredentialCreationRequest,
    ) -> Result<IssuedSignature, CocoError> {
        call(
            &self.transport,
            &AuthenticatorCall::NfaCredentialCreation(request.clone()),
        )
    }

    fn handle_delete_credential_request(
        &self,
        request: &DeleteCredentialRequest,
    ) -> Result<IssuedSignature, CocoError> {
        call(
            &self.transport,
            &AuthenticatorCall::DeleteCredential(request.clone()),
        )
    }
}

/// [`VerifierApi`] over a [`Transport`].
pub struct RemoteVerifier<T> {
    transport: T,
}

impl<T: Transport> RemoteVerifier<T> {
    pub const fn new(transport: T) -> Self {
        Self { transport }
    }
}

impl<T: Transport> VerifierApi for RemoteVerifier<T> {
    fn handle_registration_request(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationResponse, CocoError> {
        call(&self.transport, &VerifierCall::Registration(request.clone()))
    }

    fn complete_registration(
        &self,
        request: &CompleteRegistrationRequest,
    ) -> Result<(), CocoError> {
        call(
            &self.transport,
            &VerifierCall::CompleteRegistration(request.clone()),
        )
    }

    fn handle_login_request(&self, username: &str) -> Result<LoginResponse, CocoError> {
        call(
            &self.transport,
            &VerifierCall::Login(LoginLookupRequest {
                username: username.to_owned(),
            }),
        )
    }

    fn complete_login(&self, request: &AccessRequest) -> Result<(), CocoError> {
        call(&self.transport, &VerifierCall::CompleteLogin(request.clone()))
    }

    fn credential_login(&self, request: &AccessRequest) -> Result<(), CocoError> {
        call(
            &self.transport,
            &VerifierCall::CredentialLogin(request.clone()),
        )
    }

    fn handle_update_salts_request(&self, request: &UpdateSaltsRequest) -> Result<(), CocoError> {
        call(&self.transport, &VerifierCall::UpdateSalts(request.clone()))
    }

    fn handle_username_update_request(
        &self,
        request: &UsernameUpdateRequest,
    ) -> Result<(), CocoError> {
        call(
            &self.transport,
            &VerifierCall::UsernameUpdate(request.clone()),
        )
    }

    fn handle_delete_user_request(&self, request: &AccessRequest) -> Result<(), CocoError> {
        call(&self.transport, &VerifierCall::DeleteUser(request.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        engine::{CredentialEngine, PasswordHardeningEngine, Ristretto255Oprf, TransparentCredentials},
        registry::StoreRegistry,
        store::MemoryStore,
        types::PublicAttributes,
    };

    fn verifier() -> Arc<VerifierService<TransparentCredentials>> {
        let engine = TransparentCredentials;
        Arc::new(
            VerifierService::new(
                Config::default(),
                engine,
                engine.generate_authority(),
                Arc::new(MemoryStore::new()),
                Arc::new(StoreRegistry::new(Arc::new(MemoryStore::new()))),
            )
            .unwrap(),
        )
    }

    #[test]
    fn method_names_match_the_wire_surface() {
        let v = serde_json::to_value(AuthenticatorCall::GetOprfPrivateKey).unwrap();
        assert_eq!(v, serde_json::json!({ "method": "getOPRFPrivateKey" }));

        let lookup = VerifierCall::Login(LoginLookupRequest {
            username: "alice".into(),
        });
        assert_eq!(
            serde_json::to_string(&lookup).unwrap(),
            r#"{"method":"handleLoginRequest","params":{"username":"alice"}}"#
        );

        let raw = r#"{"method":"handleBlindSignatureRequest","params":{
            "blindSignRequest":"01","publicKey":"02",
            "publicAttributes":{"issuedAt":1,"expiry":2,"scope":"evaluate:OPRF"}}}"#;
        let call: AuthenticatorCall = serde_json::from_str(raw).unwrap();
        assert!(matches!(call, AuthenticatorCall::BlindSignature(ref r)
            if r.public_attributes == PublicAttributes {
                issued_at: 1,
                expiry: 2,
                scope: "evaluate:OPRF".into(),
            }));
    }

    #[test]
    fn replies_carry_ok_or_error() {
        assert_eq!(encode_reply(Ok(())), r#"{"ok":null}"#);
        let err = encode_reply::<()>(Err(CocoError::UnknownIdentity { what: "username" }));
        let reply: Reply<()> = serde_json::from_str(&err).unwrap();
        let back = reply.into_result().unwrap_err();
        assert_eq!(back.kind(), ErrorKind::UnknownIdentity);
        assert!(matches!(back, CocoError::Remote { ref message, .. } if message == "username not found"));
    }

    #[test]
    fn malformed_requests_get_validation_errors() {
        let v = verifier();
        for raw in ["", "{}", r#"{"method":"dropTables"}"#, r#"{"method":"completeLogin","params":{}}"#] {
            let reply: Reply<()> = serde_json::from_str(&v.dispatch(raw)).unwrap();
            assert_eq!(reply.into_result().unwrap_err().kind(), ErrorKind::Validation);
        }
    }

    #[test]
    fn remote_stubs_reach_the_services() {
        let remote = RemoteVerifier::new(Loopback::new(verifier()));
        let unknown = remote.handle_login_request("alice").unwrap();
        assert!(!unknown.exists);

        let engine = TransparentCredentials;
        let evaluator = Ristretto255Oprf.evaluator(None).unwrap();
        let key = evaluator.private_key();
        let service = AuthenticatorService::new(
            Config::default(),
            engine,
            engine.generate_authority(),
            evaluator,
            Arc::new(MemoryStore::new()),
            Arc::new(StoreRegistry::new(Arc::new(MemoryStore::new()))),
        );
        let remote = RemoteAuthenticator::new(Loopback::new(service));
        assert_eq!(remote.get_oprf_private_key().unwrap(), key);
        let err = remote
            .handle_login_request(&LoginRequest {
                id: crate::types::LocalId("ab".into()),
                proof: crate::types::Proof(vec![1]),
                public_attributes: PublicAttributes {
                    issued_at: 0,
                    expiry: 1,
                    scope: "prove:identity".into(),
                },
                grant: crate::messages::AccessGrantRequest {
                    blind_sign_request: crate::types::BlindSignRequest(vec![1]),
                    public_key: crate::types::ClientPublicKey(vec![2]),
                    user_attrs: PublicAttributes {
                        issued_at: 0,
                        expiry: 1,
                        scope: "access:uid".into(),
                    },
                },
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownIdentity);
    }

    struct Down;

    impl Transport for Down {
        fn round_trip(&self, _: &str) -> Result<String, CocoError> {
            Ok("<html>502</html>".into())
        }
    }

    #[test]
    fn garbage_replies_are_transport_errors() {
        let err = RemoteVerifier::new(Down)
            .handle_login_request("alice")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
