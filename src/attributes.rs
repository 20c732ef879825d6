use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    config::Config,
    errors::CocoError,
    types::{AccessAttributeSet, PublicAttributes, Scope},
};

/// Seconds since the Unix epoch.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Check a presented attribute set against the policy for `expected`.
///
/// `current_time` defaults to the system clock.
///
/// # Errors
///
/// Returns [`CocoError::Attribute`] if `iat` lies in the future, `exp` does not follow
/// `iat`, `exp - iat` exceeds `window`, the token has expired, or the scope differs.
pub fn validate_attributes(
    attrs: &PublicAttributes,
    expected: Scope,
    window: u64,
    current_time: Option<u64>,
) -> Result<(), CocoError> {
    let now = current_time.unwrap_or_else(unix_now);

    if attrs.issued_at > now {
        return Err(CocoError::attribute(
            "iat",
            format!("issued at {} is in the future (now {now})", attrs.issued_at),
        ));
    }
    if attrs.expiry <= attrs.issued_at {
        return Err(CocoError::attribute("exp", "expiry does not follow issuance"));
    }
    if attrs.expiry - attrs.issued_at > window {
        return Err(CocoError::attribute(
            "exp",
            format!(
                "validity {}s exceeds the {window}s window",
                attrs.expiry - attrs.issued_at
            ),
        ));
    }
    if attrs.expiry <= now {
        return Err(CocoError::attribute(
            "exp",
            format!("expired at {} (now {now})", attrs.expiry),
        ));
    }
    if attrs.scope != expected.as_str() {
        return Err(CocoError::attribute(
            "scope",
            format!("expected `{expected}`, got `{}`", attrs.scope),
        ));
    }
    Ok(())
}

/// [`validate_attributes`] with the window `config` assigns to `expected`.
pub fn validate_for_scope(
    config: &Config,
    attrs: &PublicAttributes,
    expected: Scope,
) -> Result<(), CocoError> {
    validate_attributes(attrs, expected, config.window(expected), None)
}

/// Fresh attribute set for `scope`, issued now with the configured window.
pub fn issue_now(
    config: &Config,
    subject: impl Into<String>,
    scope: Scope,
) -> Result<AccessAttributeSet, CocoError> {
    AccessAttributeSet::issue(subject, scope, unix_now(), config.window(scope))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn attrs(iat: u64, exp: u64, scope: &str) -> PublicAttributes {
        PublicAttributes {
            issued_at: iat,
            expiry: exp,
            scope: scope.into(),
        }
    }

    fn rejected_attribute(r: Result<(), CocoError>) -> Option<&'static str> {
        match r {
            Err(CocoError::Attribute { attribute, .. }) => Some(attribute),
            _ => None,
        }
    }

    #[test]
    fn accepts_fresh_token_within_window() {
        let a = attrs(1_000, 1_060, "evaluate:OPRF");
        assert!(validate_attributes(&a, Scope::EvaluateOprf, 60, Some(1_000)).is_ok());
        assert!(validate_attributes(&a, Scope::EvaluateOprf, 60, Some(1_059)).is_ok());
    }

    #[test]
    fn rejects_future_issuance() {
        let a = attrs(1_001, 1_060, "evaluate:OPRF");
        let r = validate_attributes(&a, Scope::EvaluateOprf, 60, Some(1_000));
        assert_eq!(rejected_attribute(r), Some("iat"));
    }

    #[test]
    fn rejects_window_overrun() {
        let a = attrs(1_000, 1_061, "prove:identity");
        let r = validate_attributes(&a, Scope::ProveIdentity, 60, Some(1_000));
        assert_eq!(rejected_attribute(r), Some("exp"));
    }

    #[test]
    fn rejects_expired_and_inverted_tokens() {
        let a = attrs(1_000, 1_060, "access:uid");
        let r = validate_attributes(&a, Scope::Access, 2_592_000, Some(1_060));
        assert_eq!(rejected_attribute(r), Some("exp"));
        let b = attrs(1_000, 1_000, "access:uid");
        let r = validate_attributes(&b, Scope::Access, 2_592_000, Some(1_000));
        assert_eq!(rejected_attribute(r), Some("exp"));
    }

    #[test]
    fn rejects_scope_mismatch() {
        let a = attrs(1_000, 1_060, "access:uid");
        let r = validate_attributes(&a, Scope::Register, 60, Some(1_000));
        assert_eq!(rejected_attribute(r), Some("scope"));
        let e = validate_attributes(&a, Scope::Register, 60, Some(1_000)).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Attribute);
    }

    #[test]
    fn issued_sets_pass_their_own_policy() {
        let config = Config::default();
        for scope in Scope::ALL {
            let set = issue_now(&config, "subject", scope).unwrap();
            assert!(validate_for_scope(&config, set.public(), scope).is_ok());
        }
    }
}
