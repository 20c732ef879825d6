#![forbid(unsafe_code)]

/// Number of attributes in every access attribute set: `[sub, iat, exp, scope]`.
pub const ATTRIBUTE_COUNT: usize = 4;

/// Length in bytes of every per-Authenticator salt and of the Verifier pepper.
pub const SALT_N_PEPPER_LENGTH: usize = 32;

/// Lifetime of tokens shown to Authenticators, in seconds.
pub const AUTHENTICATOR_TOKEN_VALIDITY: u64 = 60;

/// Lifetime of access tokens shown to the Verifier, in seconds (30 days).
pub const VERIFIER_TOKEN_VALIDITY: u64 = 2_592_000;

pub const ARGON2_MEMORY_KIB: u32 = 1 << 17;
pub const ARGON2_ITERATIONS: u32 = 3;
pub const ARGON2_PARALLELISM: u32 = 4;
pub const HASH_LEN: usize = 32;

pub const SCOPE_REGISTER: &str = "register:uid";
pub const SCOPE_EVALUATE_OPRF: &str = "evaluate:OPRF";
pub const SCOPE_PROVE_IDENTITY: &str = "prove:identity";
pub const SCOPE_ACCESS: &str = "access:uid";

pub const COLLECTION_CLIENT: &str = "client_storage";
pub const COLLECTION_AUTHENTICATOR: &str = "auth_storage";
pub const COLLECTION_GLOBAL: &str = "global_storage";
pub const COLLECTION_META: &str = "meta";
pub const COLLECTION_USERNAME_TO_USERID: &str = "username_to_userid";
pub const COLLECTION_USERID_TO_USERDATA: &str = "userid_to_userdata";
pub const COLLECTION_PENDING_REGISTRATION: &str = "pending_registration";
pub const META_PEPPER: &str = "pepper";

pub const TAG_HASH_SALT: &str = "coco.hash.salt";
pub const TAG_CREDENTIAL_COMMIT: &str = "coco.credential.commit";
pub const TAG_CREDENTIAL_REQUEST: &str = "coco.credential.request";
pub const TAG_CREDENTIAL_SHARE: &str = "coco.credential.share";
pub const TAG_CREDENTIAL_PROOF: &str = "coco.credential.proof";
pub const TAG_OPRF_HASH_TO_GROUP: &str = "coco.oprf.h2g";
pub const TAG_OPRF_FINALIZE: &str = "coco.oprf.finalize";
