//! Persistence contract for responses and redemptions
//!
//! Both tables carry uniqueness over (campaign, fingerprint) and
//! (campaign, user). Callers do an advisory existence check first and treat a
//! unique violation on insert as "someone else already wrote it".

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domains::identity::Identity;
use crate::domains::rewards::models::{NewRedemption, RewardRedemption};
use crate::domains::survey::models::{NewSurveyResponse, SurveyResponse};

pub use memory::MemoryStore;
pub use postgres::PgSurveyStore;

// Unique index names, shared by every store implementation.
pub const RESPONSE_FINGERPRINT_KEY: &str = "responses_campaign_fingerprint_key";
pub const RESPONSE_USER_KEY: &str = "responses_campaign_user_key";
pub const REDEMPTION_FINGERPRINT_KEY: &str = "reward_redemptions_campaign_fingerprint_key";
pub const REDEMPTION_USER_KEY: &str = "reward_redemptions_campaign_profile_key";
pub const REDEMPTION_CODE_KEY: &str = "reward_redemptions_code_key";
pub const LUCKY_NUMBER_KEY: &str = "reward_redemptions_campaign_lucky_number_key";

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn unique(constraint: impl Into<String>) -> Self {
        Self::UniqueViolation {
            constraint: constraint.into(),
        }
    }

    /// The row for this participant already exists.
    pub fn is_identity_conflict(&self) -> bool {
        matches!(
            self,
            Self::UniqueViolation { constraint } if constraint != REDEMPTION_CODE_KEY && constraint != LUCKY_NUMBER_KEY
        )
    }

    /// A generated value collided; retrying with a fresh one may succeed.
    pub fn is_value_collision(&self) -> bool {
        matches!(
            self,
            Self::UniqueViolation { constraint } if constraint == REDEMPTION_CODE_KEY || constraint == LUCKY_NUMBER_KEY
        )
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some("23505") {
                return Self::unique(db_err.constraint().unwrap_or_default());
            }
        }
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[async_trait]
pub trait SurveyStore: Send + Sync {
    /// Response matching the identity's fingerprint or user id.
    async fn find_response(
        &self,
        campaign_id: Uuid,
        identity: &Identity,
    ) -> Result<Option<SurveyResponse>, StoreError>;

    /// Fails with `UniqueViolation` when the participant already responded.
    async fn insert_response(&self, response: NewSurveyResponse) -> Result<SurveyResponse, StoreError>;

    async fn find_redemption(
        &self,
        campaign_id: Uuid,
        identity: &Identity,
    ) -> Result<Option<RewardRedemption>, StoreError>;

    /// Assigns the campaign-scoped lucky number when requested.
    async fn insert_redemption(
        &self,
        redemption: NewRedemption,
    ) -> Result<RewardRedemption, StoreError>;
}
