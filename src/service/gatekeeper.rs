//! Caller authorization.

use serde::{Deserialize, Serialize};

use crate::error_handling::ServiceError;

pub const PERMISSION_DENIED: &str = "Permission denied.";
pub const INVALID_REQUEST: &str = "Invalid request.";

/// The caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    pub name: String,
    pub can_manage: bool,
}

impl Actor {
    pub fn manager(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            can_manage: true,
        }
    }

    /// `"<phrase> by <name>"`, or the bare phrase for a nameless actor.
    pub fn attribution(&self, phrase: &str) -> String {
        let name = self.name.trim();
        if name.is_empty() {
            phrase.to_string()
        } else {
            format!("{phrase} by {name}")
        }
    }
}

/// Checks capability and request nonce.
///
/// With a configured secret the nonce must match it; without one any
/// non-empty nonce is accepted.
#[derive(Debug, Clone, Default)]
pub struct Gatekeeper {
    secret: Option<String>,
}

impl Gatekeeper {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn authorize(&self, actor: &Actor) -> Result<(), ServiceError> {
        if actor.can_manage {
            Ok(())
        } else {
            log::debug!("Actor {} lacks the manage capability", actor.id);
            Err(ServiceError::PermissionDenied(PERMISSION_DENIED.to_string()))
        }
    }

    pub fn verify_nonce(&self, nonce: Option<&str>) -> bool {
        match (nonce.map(str::trim).filter(|n| !n.is_empty()), &self.secret) {
            (None, _) => false,
            (Some(nonce), Some(secret)) => nonce == secret,
            (Some(_), None) => true,
        }
    }

    /// Capability first, then nonce.
    pub fn check(&self, actor: &Actor, nonce: Option<&str>) -> Result<(), ServiceError> {
        self.authorize(actor)?;
        if self.verify_nonce(nonce) {
            Ok(())
        } else {
            Err(ServiceError::ValidationError(INVALID_REQUEST.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_checked_before_nonce() {
        let gate = Gatekeeper::new(Some("s3cret".into()));
        let visitor = Actor::default();
        let err = gate.check(&visitor, None).unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied(_)));
        assert_eq!(err.message(), "Permission denied.");
    }

    #[test]
    fn test_nonce_must_match_secret() {
        let gate = Gatekeeper::new(Some("s3cret".into()));
        let admin = Actor::manager(1, "Ada");
        assert!(gate.check(&admin, Some("s3cret")).is_ok());
        let err = gate.check(&admin, Some("guess")).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(ref m) if m == "Invalid request."));
        assert!(gate.check(&admin, Some("  ")).is_err());
    }

    #[test]
    fn test_without_secret_any_nonce_passes() {
        let gate = Gatekeeper::new(Some(String::new()));
        let admin = Actor::manager(1, "Ada");
        assert!(gate.check(&admin, Some("anything")).is_ok());
        assert!(gate.check(&admin, None).is_err());
    }

    #[test]
    fn test_attribution_message() {
        assert_eq!(
            Actor::manager(3, "Grace").attribution("Manually Resolved"),
            "Manually Resolved by Grace"
        );
        assert_eq!(
            Actor::manager(3, " ").attribution("Manually Updated"),
            "Manually Updated"
        );
    }
}
