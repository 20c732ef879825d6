use core::fmt;
use core::str::FromStr;

use coco_primitives::constants::{
    ATTRIBUTE_COUNT, SCOPE_ACCESS, SCOPE_EVALUATE_OPRF, SCOPE_PROVE_IDENTITY, SCOPE_REGISTER,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::CocoError;

// Opaque byte artifacts cross role boundaries as lowercase hex strings.
macro_rules! hex_newtype {
    (@common $(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, Default)]
        pub struct $name(pub Vec<u8>);

        impl $name {
            #[must_use]
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            #[must_use]
            pub fn to_hex(&self) -> String {
                hex::encode(&self.0)
            }

            pub fn from_hex(s: &str) -> Result<Self, CocoError> {
                hex::decode(s)
                    .map(Self)
                    .map_err(|e| CocoError::invalid(stringify!($name), e.to_string()))
            }

            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl From<Vec<u8>> for $name {
            fn from(v: Vec<u8>) -> Self {
                Self(v)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let s = String::deserialize(d)?;
                hex::decode(&s).map(Self).map_err(serde::de::Error::custom)
            }
        }
    };
    (secret $(#[$meta:meta])* $name:ident) => {
        hex_newtype!(@common $(#[$meta])* $name);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($name), "(<redacted>)"))
            }
        }
    };
    ($(#[$meta:meta])* $name:ident) => {
        hex_newtype!(@common $(#[$meta])* $name);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.to_hex())
            }
        }
    };
}

hex_newtype!(
    /// Verification key of one credential issuer.
    VerificationKey
);
hex_newtype!(BlindSignature);
hex_newtype!(BlindSignRequest);
hex_newtype!(
    /// Client-side public key bound into a blind-sign request.
    ClientPublicKey
);
hex_newtype!(
    /// Single-use proof of possession of a credential.
    Proof
);
hex_newtype!(
    /// Randomizable credential held by the client.
    Credential
);
hex_newtype!(
    /// Ordered aggregate of the issuers' verification keys.
    AggregatedVerificationKey
);
hex_newtype!(EvaluationRequest);
hex_newtype!(Evaluation);
hex_newtype!(secret
    /// Client-only state needed to finalize an OPRF evaluation.
    FinalizeData
);
hex_newtype!(secret Salt);
hex_newtype!(secret Pepper);
hex_newtype!(secret
    /// Exported OPRF key of an Authenticator; losing it invalidates every id it derived.
    OprfPrivateKey
);

/// Protocol step a token may authorize.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    Register,
    EvaluateOprf,
    ProveIdentity,
    Access,
}

impl Scope {
    pub const ALL: [Self; 4] = [
        Self::Register,
        Self::EvaluateOprf,
        Self::ProveIdentity,
        Self::Access,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Register => SCOPE_REGISTER,
            Self::EvaluateOprf => SCOPE_EVALUATE_OPRF,
            Self::ProveIdentity => SCOPE_PROVE_IDENTITY,
            Self::Access => SCOPE_ACCESS,
        }
    }

    /// Whether tokens of this scope are consumed by the Verifier (long-lived).
    #[must_use]
    pub const fn is_verifier_facing(self) -> bool {
        matches!(self, Self::Access)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = CocoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scope| scope.as_str() == s)
            .ok_or_else(|| CocoError::attribute("scope", format!("unknown scope `{s}`")))
    }
}

/// The three public attributes of an access attribute set, as shown to verifiers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAttributes {
    pub issued_at: u64,
    pub expiry: u64,
    pub scope: String,
}

/// One entry of an attribute set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    pub value: String,
    pub is_private: bool,
}

/// `[sub (private), iat, exp, scope]`. Built fresh for each protocol step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessAttributeSet {
    subject: String,
    public: PublicAttributes,
}

impl AccessAttributeSet {
    /// Attribute set for `scope`, issued at `issued_at` and valid for `validity` seconds.
    pub fn issue(
        subject: impl Into<String>,
        scope: Scope,
        issued_at: u64,
        validity: u64,
    ) -> Result<Self, CocoError> {
        let subject = subject.into();
        if subject.is_empty() {
            return Err(CocoError::invalid("subject", "empty"));
        }
        if validity == 0 {
            return Err(CocoError::attribute("exp", "zero validity"));
        }
        let expiry = issued_at
            .checked_add(validity)
            .ok_or_else(|| CocoError::attribute("exp", "overflow"))?;
        Ok(Self {
            subject,
            public: PublicAttributes {
                issued_at,
                expiry,
                scope: scope.as_str().to_owned(),
            },
        })
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub const fn public(&self) -> &PublicAttributes {
        &self.public
    }

    /// Ordered attribute list as signed by the credential engine.
    #[must_use]
    pub fn attributes(&self) -> [Attribute; ATTRIBUTE_COUNT] {
        [
            Attribute {
                value: self.subject.clone(),
                is_private: true,
            },
            Attribute {
                value: self.public.issued_at.to_string(),
                is_private: false,
            },
            Attribute {
                value: self.public.expiry.to_string(),
                is_private: false,
            },
            Attribute {
                value: self.public.scope.clone(),
                is_private: false,
            },
        ]
    }
}

/// Rotating real identifier `RID_i`. Never persisted or sent.
#[derive(Clone, PartialEq, Eq)]
pub struct Rid(pub(crate) [u8; 32]);

impl Rid {
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Rid(<redacted>)")
    }
}

/// Local per-Authenticator identity, hex of a 32-byte digest.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(pub String);

impl LocalId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A randomized credential together with the aggregated key it verifies under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialState {
    pub credential: Credential,
    pub aggregated_key: AggregatedVerificationKey,
}

/// Authenticator-side record of one registered identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    #[serde(rename = "VerificationKey")]
    pub verification_key: VerificationKey,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMapping {
    pub user_id: String,
}

/// A `userId` the Verifier handed out for `username` that has not been completed yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRegistration {
    pub username: String,
}

/// Verifier-side record of a user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "Salts")]
    pub salts: Vec<Salt>,
    #[serde(rename = "VerificationKeys")]
    pub verification_keys: Vec<VerificationKey>,
}

/// Client-side access credential kept between sessions for `credentialLogin`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    pub proof: Proof,
    pub credential: Credential,
    pub verification_keys: Vec<VerificationKey>,
    pub public_attributes: PublicAttributes,
    pub aggregated_key: AggregatedVerificationKey,
}
