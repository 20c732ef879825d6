#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

//! COCO: distributed, privacy-preserving password authentication.
//!
//! A Client authenticates against one Verifier and several Authenticators. The password
//! is hardened through an OPRF at every Authenticator, each Authenticator only ever sees
//! a fresh randomization of the Client's credential, and every verification key has to
//! appear in a shared key registry before a proof under it is accepted.

// Protocol choices:
// - Attribute sets: [sub (private), iat, exp, scope], 4 entries
// - Token windows: 60 s towards Authenticators, 30 days towards the Verifier
// - H: Argon2id over length-framed parts, SHA3-256 derived salt
// - Wire: JSON, binary artifacts as lowercase hex

pub mod types;
pub mod errors;
pub mod ser;
pub mod config;
pub mod attributes;
pub mod hashers;
pub mod store;
pub mod registry;
pub mod engine;
pub mod chain;
pub mod messages;
pub mod api;
pub mod authenticator;
pub mod verifier;
pub mod client;
pub mod rpc;

pub use types::*;
pub use errors::{CocoError, ErrorKind};
pub use config::{Config, HashParams};
pub use attributes::{issue_now, unix_now, validate_attributes, validate_for_scope};
pub use hashers::{derive_local_id, derive_rid};
pub use store::{MemoryStore, RecordStore, Store, StoreError};
pub use registry::{KeyRegistry, StoreRegistry};
pub use engine::{
    BlindEvaluator, CredentialEngine, CredentialIssuer, EngineError, PasswordHardeningEngine,
    Ristretto255Oprf, TransparentCredentials,
};
pub use chain::prove_chain;
pub use api::{AuthenticatorApi, VerifierApi};
pub use authenticator::AuthenticatorService;
pub use verifier::VerifierService;
pub use client::ClientAgent;
pub use rpc::{JsonDispatch, Loopback, RemoteAuthenticator, RemoteVerifier, Transport};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PROTOCOL_VERSION: u32 = 1;
