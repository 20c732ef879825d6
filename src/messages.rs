//! Request and response bodies of the Authenticator and Verifier RPC surface.
//!
//! Field names are the camelCase parameter names peers exchange on the wire.

use serde::{Deserialize, Serialize};

use crate::{
    errors::CocoError,
    types::{
        BlindSignRequest, BlindSignature, ClientPublicKey, Evaluation, EvaluationRequest, LocalId,
        Pepper, Proof, PublicAttributes, Salt, VerificationKey,
    },
};

/// The client's request for a fresh access-scope signature, carried by every
/// identity-bearing Authenticator call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrantRequest {
    pub blind_sign_request: BlindSignRequest,
    pub public_key: ClientPublicKey,
    pub user_attrs: PublicAttributes,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlindSignatureRequest {
    pub blind_sign_request: BlindSignRequest,
    pub public_key: ClientPublicKey,
    pub public_attributes: PublicAttributes,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OprfEvaluationRequest {
    pub verification_keys: Vec<VerificationKey>,
    pub proof: Proof,
    pub public_attributes: PublicAttributes,
    pub eval_request: EvaluationRequest,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub id: LocalId,
    pub verification_key: VerificationKey,
    pub proof: Proof,
    pub public_attributes: PublicAttributes,
    #[serde(flatten)]
    pub grant: AccessGrantRequest,
    pub reg_token_proof: Proof,
    pub reg_token_attrs: PublicAttributes,
    #[serde(rename = "regTokenVK")]
    pub reg_token_vk: VerificationKey,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub id: LocalId,
    pub proof: Proof,
    pub public_attributes: PublicAttributes,
    #[serde(flatten)]
    pub grant: AccessGrantRequest,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeAuthenticationDataRequest {
    pub old_id: LocalId,
    pub old_proof: Proof,
    pub old_attrs: PublicAttributes,
    pub new_id: LocalId,
    #[serde(rename = "newVK")]
    pub new_vk: VerificationKey,
    pub new_proof: Proof,
    pub new_attrs: PublicAttributes,
    #[serde(flatten)]
    pub grant: AccessGrantRequest,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfaCredentialCreationRequest {
    pub id: LocalId,
    pub proof: Proof,
    pub attrs: PublicAttributes,
    pub recovery_id: LocalId,
    #[serde(rename = "recoveryVK")]
    pub recovery_vk: VerificationKey,
    pub recovery_proof: Proof,
    pub recovery_attrs: PublicAttributes,
    #[serde(flatten)]
    pub grant: AccessGrantRequest,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCredentialRequest {
    pub id: LocalId,
    pub proof: Proof,
    pub attrs: PublicAttributes,
    pub recovery_id: LocalId,
    pub recovery_proof: Proof,
    pub recovery_attrs: PublicAttributes,
    #[serde(flatten)]
    pub grant: AccessGrantRequest,
}

/// `{Signature, VK}`: one issued signature share and the key it verifies under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedSignature {
    #[serde(rename = "Signature")]
    pub signature: BlindSignature,
    #[serde(rename = "VK")]
    pub verification_key: VerificationKey,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResponse {
    #[serde(rename = "Evaluation")]
    pub evaluation: Evaluation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub username: String,
    pub blind_sign_request: BlindSignRequest,
    pub public_key: ClientPublicKey,
    pub public_attributes: PublicAttributes,
}

/// `{exists, userId, pepper, Signature, VK}`; the last three only when `exists` is false.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub exists: bool,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pepper: Option<Pepper>,
    #[serde(rename = "Signature", default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<BlindSignature>,
    #[serde(rename = "VK", default, skip_serializing_if = "Option::is_none")]
    pub verification_key: Option<VerificationKey>,
}

/// What the client needs from a successful registration request.
#[derive(Clone, Debug)]
pub struct RegistrationGrant {
    pub user_id: String,
    pub pepper: Pepper,
    pub signature: BlindSignature,
    pub verification_key: VerificationKey,
}

impl RegistrationResponse {
    /// # Errors
    ///
    /// [`CocoError::DuplicateIdentity`] if the username is taken, [`CocoError::Validation`]
    /// if a field required for a fresh registration is missing.
    pub fn into_grant(self) -> Result<RegistrationGrant, CocoError> {
        if self.exists {
            return Err(CocoError::DuplicateIdentity { what: "username" });
        }
        if self.user_id.is_empty() {
            return Err(CocoError::invalid("userId", "missing"));
        }
        Ok(RegistrationGrant {
            user_id: self.user_id,
            pepper: self.pepper.ok_or_else(|| CocoError::invalid("pepper", "missing"))?,
            signature: self
                .signature
                .ok_or_else(|| CocoError::invalid("Signature", "missing"))?,
            verification_key: self
                .verification_key
                .ok_or_else(|| CocoError::invalid("VK", "missing"))?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginLookupRequest {
    pub username: String,
}

/// `{exists:false}` or `{exists:true, userId, salts, pepper}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salts: Option<Vec<Salt>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pepper: Option<Pepper>,
}

#[derive(Clone, Debug)]
pub struct LoginChallenge {
    pub user_id: String,
    pub salts: Vec<Salt>,
    pub pepper: Pepper,
}

impl LoginResponse {
    /// # Errors
    ///
    /// [`CocoError::UnknownIdentity`] for an unknown username, [`CocoError::Validation`] if a
    /// known username comes without its salts or pepper.
    pub fn into_challenge(self) -> Result<LoginChallenge, CocoError> {
        if !self.exists {
            return Err(CocoError::UnknownIdentity { what: "username" });
        }
        let salts = self
            .salts
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CocoError::invalid("salts", "missing"))?;
        Ok(LoginChallenge {
            user_id: self
                .user_id
                .filter(|u| !u.is_empty())
                .ok_or_else(|| CocoError::invalid("userId", "missing"))?,
            salts,
            pepper: self.pepper.ok_or_else(|| CocoError::invalid("pepper", "missing"))?,
        })
    }
}

/// An aggregated `access:uid` proof and the keys it verifies under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessProof {
    pub verification_keys: Vec<VerificationKey>,
    pub proof: Proof,
    pub public_attributes: PublicAttributes,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRegistrationRequest {
    pub username: String,
    pub user_id: String,
    pub salts: Vec<Salt>,
    #[serde(flatten)]
    pub access: AccessProof,
}

/// Body of `completeLogin`, `credentialLogin` and `handleDeleteUserRequest`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    pub username: String,
    #[serde(flatten)]
    pub access: AccessProof,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSaltsRequest {
    pub username: String,
    pub new_salts: Vec<Salt>,
    #[serde(flatten)]
    pub access: AccessProof,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsernameUpdateRequest {
    pub username: String,
    pub new_username: String,
    #[serde(flatten)]
    pub access: AccessProof,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs() -> PublicAttributes {
        PublicAttributes {
            issued_at: 1,
            expiry: 2,
            scope: "access:uid".into(),
        }
    }

    #[test]
    fn register_request_uses_wire_parameter_names() {
        let req = RegisterRequest {
            id: LocalId("aa".into()),
            verification_key: VerificationKey(vec![1]),
            proof: Proof(vec![2]),
            public_attributes: attrs(),
            grant: AccessGrantRequest {
                blind_sign_request: BlindSignRequest(vec![3]),
                public_key: ClientPublicKey(vec![4]),
                user_attrs: attrs(),
            },
            reg_token_proof: Proof(vec![5]),
            reg_token_attrs: attrs(),
            reg_token_vk: VerificationKey(vec![6]),
        };
        let v = serde_json::to_value(&req).unwrap();
        for key in [
            "id",
            "verificationKey",
            "proof",
            "publicAttributes",
            "blindSignRequest",
            "publicKey",
            "userAttrs",
            "regTokenProof",
            "regTokenAttrs",
            "regTokenVK",
        ] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
        assert_eq!(v["regTokenVK"], "06");
        let back: RegisterRequest = serde_json::from_value(v).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn registration_response_shapes() {
        let taken = RegistrationResponse {
            exists: true,
            user_id: "u".into(),
            pepper: None,
            signature: None,
            verification_key: None,
        };
        assert_eq!(
            serde_json::to_string(&taken).unwrap(),
            r#"{"exists":true,"userId":"u"}"#
        );
        assert!(matches!(
            taken.into_grant(),
            Err(CocoError::DuplicateIdentity { .. })
        ));

        let incomplete: RegistrationResponse =
            serde_json::from_str(r#"{"exists":false,"userId":"u","pepper":"00"}"#).unwrap();
        assert!(matches!(
            incomplete.into_grant(),
            Err(CocoError::Validation { field: "Signature", .. })
        ));
    }

    #[test]
    fn login_response_requires_salts_when_known() {
        let unknown: LoginResponse = serde_json::from_str(r#"{"exists":false}"#).unwrap();
        assert!(matches!(
            unknown.into_challenge(),
            Err(CocoError::UnknownIdentity { .. })
        ));
        let bare: LoginResponse =
            serde_json::from_str(r#"{"exists":true,"userId":"u","pepper":"00"}"#).unwrap();
        assert!(matches!(
            bare.into_challenge(),
            Err(CocoError::Validation { field: "salts", .. })
        ));
    }
}
