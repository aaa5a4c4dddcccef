//! Participant identity: anonymous device fingerprint plus optional account

pub mod guard;
pub mod resolver;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use guard::DeduplicationGuard;
pub use resolver::{FingerprintSource, IdentityResolver, StaticFingerprint};

/// Marks fingerprints minted when the device fingerprint was unavailable.
pub const FALLBACK_PREFIX: &str = "fallback-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub fingerprint_id: String,
    pub user_id: Option<String>,
}

impl Identity {
    pub fn new(fingerprint_id: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            fingerprint_id: fingerprint_id.into(),
            user_id,
        }
    }

    pub fn anonymous(fingerprint_id: impl Into<String>) -> Self {
        Self::new(fingerprint_id, None)
    }

    pub fn fallback(user_id: Option<String>) -> Self {
        Self::new(format!("{}{}", FALLBACK_PREFIX, Uuid::new_v4()), user_id)
    }

    /// Deduplication against a fallback fingerprint is best-effort only.
    pub fn is_fallback(&self) -> bool {
        self.fingerprint_id.starts_with(FALLBACK_PREFIX)
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// Same participant when either signal matches.
    pub fn matches(&self, other: &Identity) -> bool {
        self.fingerprint_id == other.fingerprint_id
            || matches!((&self.user_id, &other.user_id), (Some(a), Some(b)) if a == b)
    }
}
