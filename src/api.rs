//! The role interfaces the client drives. Implemented in-process by the services and
//! over a [`Transport`](crate::rpc::Transport) by the remote stubs in [`rpc`](crate::rpc).

use crate::{
    errors::CocoError,
    messages::{
        AccessRequest, BlindSignatureRequest, ChangeAuthenticationDataRequest,
        CompleteRegistrationRequest, DeleteCredentialRequest, EvaluationResponse, IssuedSignature,
        LoginRequest, LoginResponse, NfaCredentialCreationRequest, OprfEvaluationRequest,
        RegisterRequest, RegistrationRequest, RegistrationResponse, UpdateSaltsRequest,
        UsernameUpdateRequest,
    },
    types::OprfPrivateKey,
};

pub trait AuthenticatorApi: Send + Sync {
    fn get_oprf_private_key(&self) -> Result<OprfPrivateKey, CocoError>;

    fn handle_blind_signature_request(
        &self,
        request: &BlindSignatureRequest,
    ) -> Result<IssuedSignature, CocoError>;

    fn handle_oprf_evaluation(
        &self,
        request: &OprfEvaluationRequest,
    ) -> Result<EvaluationResponse, CocoError>;

    fn handle_register_request(
        &self,
        request: &RegisterRequest,
    ) -> Result<IssuedSignature, CocoError>;

    fn handle_login_request(&self, request: &LoginRequest) -> Result<IssuedSignature, CocoError>;

    fn handle_change_authentication_data_request(
        &self,
        request: &ChangeAuthenticationDataRequest,
    ) -> Result<IssuedSignature, CocoError>;

    fn handle_nfa_credential_creation_request(
        &self,
        request: &NfaCredentialCreationRequest,
    ) -> Result<IssuedSignature, CocoError>;

    fn handle_delete_credential_request(
        &self,
        request: &DeleteCredentialRequest,
    ) -> Result<IssuedSignature, CocoError>;
}

pub trait VerifierApi: Send + Sync {
    fn handle_registration_request(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationResponse, CocoError>;

    fn complete_registration(&self, request: &CompleteRegistrationRequest)
        -> Result<(), CocoError>;

    fn handle_login_request(&self, username: &str) -> Result<LoginResponse, CocoError>;

    fn complete_login(&self, request: &AccessRequest) -> Result<(), CocoError>;

    fn credential_login(&self, request: &AccessRequest) -> Result<(), CocoError>;

    fn handle_update_salts_request(&self, request: &UpdateSaltsRequest) -> Result<(), CocoError>;

    fn handle_username_update_request(
        &self,
        request: &UsernameUpdateRequest,
    ) -> Result<(), CocoError>;

    fn handle_delete_user_request(&self, request: &AccessRequest) -> Result<(), CocoError>;
}
