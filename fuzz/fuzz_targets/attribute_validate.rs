#![no_main]

use coco_auth::{validate_attributes, PublicAttributes, Scope};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (u64, u64, u64, u64, u8, &str)| {
    let (iat, exp, window, now, expected, scope) = input;
    let expected = Scope::ALL[usize::from(expected) % Scope::ALL.len()];
    let attrs = PublicAttributes {
        issued_at: iat,
        expiry: exp,
        scope: scope.to_owned(),
    };
    if validate_attributes(&attrs, expected, window, Some(now)).is_ok() {
        assert!(iat <= now && now < exp);
        assert!(exp - iat <= window);
        assert_eq!(scope, expected.as_str());
    }
});
