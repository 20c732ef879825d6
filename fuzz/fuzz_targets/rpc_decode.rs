#![no_main]

use std::sync::{Arc, OnceLock};

use coco_auth::{
    rpc::{dispatch_verifier, AuthenticatorCall, Reply},
    Config, CredentialEngine, MemoryStore, StoreRegistry, TransparentCredentials, VerifierService,
};
use libfuzzer_sys::fuzz_target;

fn verifier() -> &'static VerifierService<TransparentCredentials> {
    static VERIFIER: OnceLock<VerifierService<TransparentCredentials>> = OnceLock::new();
    VERIFIER.get_or_init(|| {
        let engine = TransparentCredentials;
        VerifierService::new(
            Config::default(),
            engine,
            engine.generate_authority(),
            Arc::new(MemoryStore::new()),
            Arc::new(StoreRegistry::new(Arc::new(MemoryStore::new()))),
        )
        .unwrap()
    })
}

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let _ = serde_json::from_str::<AuthenticatorCall>(text);
    // Dispatch never panics and always answers with a well-formed reply.
    let reply = dispatch_verifier(verifier(), text);
    assert!(serde_json::from_str::<Reply<serde_json::Value>>(&reply).is_ok());
});
