//! Multi-key bearer authentication with revocation (SPEC_FULL §4.B). The
//! membership check never short-circuits: every candidate key is compared
//! in constant time, revocation list first, so the decision's timing does
//! not depend on which position (if any) matched.

use crate::errors::AuthError;
use subtle::ConstantTimeEq;

#[derive(Clone, Debug)]
pub struct ApiKeyIdentity {
    /// Full key, kept in-process only for rate-limiter sharding. Never
    /// logged in full — see `logsafe::key_prefix`.
    pub key: String,
}

pub struct ApiKeyAuth {
    allowed: Vec<String>,
    revoked: Vec<String>,
}

impl ApiKeyAuth {
    pub fn new(allowed: Vec<String>, revoked: Vec<String>) -> Self {
        Self { allowed, revoked }
    }

    /// Constant-time membership test: compares the candidate against every
    /// entry in `haystack` regardless of whether an earlier entry already
    /// matched, and ORs the per-entry `Choice` results together.
    fn ct_contains(haystack: &[String], token: &[u8]) -> bool {
        let mut found = subtle::Choice::from(0u8);
        for candidate in haystack {
            found |= candidate.as_bytes().ct_eq(token);
        }
        found.unwrap_u8() == 1
    }

    pub fn check(&self, token: &str) -> Result<ApiKeyIdentity, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingKey);
        }
        let bytes = token.as_bytes();

        // Revocation wins even if the same value also appears in the
        // allowlist (stale config should fail closed, not open).
        let revoked = Self::ct_contains(&self.revoked, bytes);
        let allowed = Self::ct_contains(&self.allowed, bytes);

        if revoked {
            return Err(AuthError::RevokedKey);
        }
        if allowed {
            return Ok(ApiKeyIdentity { key: token.to_string() });
        }
        Err(AuthError::InvalidKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> ApiKeyAuth {
        ApiKeyAuth::new(
            vec!["good-key-one-1234".to_string(), "good-key-two-5678".to_string()],
            vec!["revoked-key-0000".to_string()],
        )
    }

    #[test]
    fn accepts_allowlisted_key() {
        assert!(auth().check("good-key-two-5678").is_ok());
    }

    #[test]
    fn rejects_missing_key() {
        assert!(matches!(auth().check("").unwrap_err(), AuthError::MissingKey));
    }

    #[test]
    fn rejects_unknown_key() {
        assert!(matches!(auth().check("nope").unwrap_err(), AuthError::InvalidKey));
    }

    #[test]
    fn revocation_wins_over_allowlist() {
        let a = ApiKeyAuth::new(vec!["dup-key".to_string()], vec!["dup-key".to_string()]);
        assert!(matches!(a.check("dup-key").unwrap_err(), AuthError::RevokedKey));
    }

    #[test]
    fn revoked_key_rejected_even_if_not_allowlisted() {
        assert!(matches!(auth().check("revoked-key-0000").unwrap_err(), AuthError::RevokedKey));
    }

    #[test]
    fn ct_contains_does_not_short_circuit_on_first_entry() {
        // Every candidate must still be compared even once a later match is
        // found; exercised here by checking a match that only occurs last.
        let haystack = vec!["a".to_string(), "b".to_string(), "target".to_string()];
        assert!(ApiKeyAuth::ct_contains(&haystack, b"target"));
        assert!(!ApiKeyAuth::ct_contains(&haystack, b"absent"));
    }
}
