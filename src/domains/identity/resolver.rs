use async_trait::async_trait;
use shared::SurveyConfig;
use std::time::Duration;
use tracing::{debug, warn};

use super::Identity;
use crate::observability::metrics::record_identity_fallback;

/// Produces a stable anonymous device token.
#[async_trait]
pub trait FingerprintSource: Send + Sync {
    async fn fingerprint(&self) -> anyhow::Result<String>;
}

/// A fingerprint computed by the host before the flow starts.
#[derive(Debug, Clone)]
pub struct StaticFingerprint(pub String);

#[async_trait]
impl FingerprintSource for StaticFingerprint {
    async fn fingerprint(&self) -> anyhow::Result<String> {
        Ok(self.0.clone())
    }
}

/// Races the fingerprint source against a fixed timeout.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    timeout: Duration,
}

impl IdentityResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn from_config(config: &SurveyConfig) -> Self {
        Self::new(config.identity_timeout())
    }

    /// Never fails: an unavailable fingerprint yields a marked fallback token.
    pub async fn resolve(
        &self,
        source: &dyn FingerprintSource,
        user_id: Option<String>,
    ) -> Identity {
        match tokio::time::timeout(self.timeout, source.fingerprint()).await {
            Ok(Ok(fingerprint)) if !fingerprint.trim().is_empty() => {
                debug!("Device fingerprint resolved");
                Identity::new(fingerprint.trim(), user_id)
            }
            Ok(Ok(_)) => {
                warn!("Fingerprint source returned an empty token, using fallback identity");
                record_identity_fallback("empty");
                Identity::fallback(user_id)
            }
            Ok(Err(e)) => {
                warn!("Fingerprint source failed: {}, using fallback identity", e);
                record_identity_fallback("error");
                Identity::fallback(user_id)
            }
            Err(_) => {
                warn!(
                    "Fingerprint not ready after {:?}, using fallback identity",
                    self.timeout
                );
                record_identity_fallback("timeout");
                Identity::fallback(user_id)
            }
        }
    }
}
