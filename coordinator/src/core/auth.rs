//! Shared-secret request authorization.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("access token must not be empty")]
pub struct EmptySecret;

/// Authorizes requests against one configured secret.
#[derive(Clone)]
pub struct AccessGuard {
    secret: Vec<u8>,
}

impl AccessGuard {
    /// Rejects an empty secret so a missing header can never authorize.
    pub fn new(secret: impl Into<String>) -> Result<Self, EmptySecret> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(EmptySecret);
        }
        Ok(Self {
            secret: secret.into_bytes(),
        })
    }

    /// True iff `presented` is byte-identical to the secret.
    pub fn authorize(&self, presented: &str) -> bool {
        let presented = presented.as_bytes();
        if presented.len() != self.secret.len() {
            return false;
        }
        // Fold over every byte so timing does not reveal the first mismatch.
        presented
            .iter()
            .zip(&self.secret)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl std::fmt::Debug for AccessGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGuard")
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_exact_token() {
        let guard = AccessGuard::new("test").expect("guard");
        assert!(guard.authorize("test"));
    }

    #[test]
    fn rejects_wrong_prefix_suffix_and_case() {
        let guard = AccessGuard::new("not-test").expect("guard");
        for token in ["test", "not-tes", "not-test ", "NOT-TEST", "", "not-test\0"] {
            assert!(!guard.authorize(token), "token {token:?} must be rejected");
        }
    }

    #[test]
    fn empty_secret_is_refused() {
        assert_eq!(AccessGuard::new("").unwrap_err(), EmptySecret);
    }

    #[test]
    fn debug_output_hides_secret() {
        let guard = AccessGuard::new("hunter2").expect("guard");
        assert!(!format!("{guard:?}").contains("hunter2"));
    }
}
