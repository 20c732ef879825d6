//! Property-based tests for the attribute policy and the proof chain

use coco_auth::*;
use proptest::prelude::*;

fn scope() -> impl Strategy<Value = Scope> {
    prop::sample::select(Scope::ALL.to_vec())
}

fn attrs(iat: u64, exp: u64, scope: Scope) -> PublicAttributes {
    PublicAttributes {
        issued_at: iat,
        expiry: exp,
        scope: scope.as_str().to_owned(),
    }
}

// Property test: a validity span longer than the scope's window is always rejected
proptest! {
    #[test]
    fn window_overrun_rejected(
        s in scope(),
        iat in 0u64..1_000_000_000,
        excess in 1u64..10_000,
        age in 0u64..60,
    ) {
        let config = Config::default();
        let window = config.window(s);
        let a = attrs(iat, iat + window + excess, s);
        let now = iat + age;
        prop_assert!(validate_attributes(&a, s, window, Some(now)).is_err());
    }
}

// Property test: any span within the window is accepted until it expires
proptest! {
    #[test]
    fn within_window_accepted_until_expiry(
        s in scope(),
        iat in 0u64..1_000_000_000,
        span_permille in 1u64..=1000,
        elapsed_permille in 0u64..1000,
    ) {
        let window = Config::default().window(s);
        let span = (window * span_permille / 1000).max(1);
        let elapsed = span * elapsed_permille / 1000;
        let a = attrs(iat, iat + span, s);
        prop_assert!(validate_attributes(&a, s, window, Some(iat + elapsed)).is_ok());
        prop_assert!(validate_attributes(&a, s, window, Some(iat + span)).is_err());
    }
}

// Property test: tokens issued after `now` are rejected
proptest! {
    #[test]
    fn future_issuance_rejected(
        s in scope(),
        now in 0u64..1_000_000_000,
        ahead in 1u64..3_600,
    ) {
        let a = attrs(now + ahead, now + ahead + 1, s);
        let r = validate_attributes(&a, s, Config::default().window(s), Some(now));
        prop_assert!(
            matches!(r, Err(CocoError::Attribute { attribute: "iat", .. })),
            "future iat accepted"
        );
    }
}

// Property test: a token never authorizes a scope other than its own
proptest! {
    #[test]
    fn scope_mismatch_rejected(
        issued in scope(),
        expected in scope(),
        iat in 0u64..1_000_000_000,
    ) {
        prop_assume!(issued != expected);
        let a = attrs(iat, iat + 30, issued);
        let r = validate_attributes(&a, expected, 2_592_000, Some(iat));
        prop_assert!(
            matches!(r, Err(CocoError::Attribute { attribute: "scope", .. })),
            "scope {issued} accepted for {expected}"
        );
    }
}

// Property test: arbitrary scope strings are only accepted verbatim
proptest! {
    #[test]
    fn unknown_scope_strings_rejected(raw in "[a-zA-Z:]{0,20}") {
        let known = Scope::ALL.iter().any(|s| s.as_str() == raw);
        prop_assert_eq!(raw.parse::<Scope>().is_ok(), known);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    // Property test: every proof of a chain is distinct and verifies under the same keys
    #[test]
    fn proof_chain_is_unlinkable(issuers in 1usize..4, links in 1usize..6) {
        let engine = TransparentCredentials;
        let set = issue_now(&Config::default(), "alice", Scope::Access).unwrap();
        let prepared = engine.prepare_blind_sign(&set).unwrap();
        let authorities: Vec<_> = (0..issuers).map(|_| engine.generate_authority()).collect();
        let keys: Vec<_> = authorities.iter().map(CredentialIssuer::verification_key).collect();
        let sigs: Vec<_> = authorities
            .iter()
            .map(|a| {
                a.blind_sign(&prepared.request, &prepared.public_key, &prepared.public_attributes)
                    .unwrap()
            })
            .collect();
        let seed = engine.aggregate(&prepared, &sigs, &keys).unwrap();

        let (proofs, _) = prove_chain(&engine, seed, links).unwrap();
        prop_assert_eq!(proofs.len(), links);
        for (i, p) in proofs.iter().enumerate() {
            prop_assert!(engine.verify(&keys, p, set.public()).unwrap());
            for q in &proofs[i + 1..] {
                prop_assert_ne!(p, q);
            }
        }
    }
}
