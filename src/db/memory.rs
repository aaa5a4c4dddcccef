use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use super::{
    StoreError, SurveyStore, LUCKY_NUMBER_KEY, REDEMPTION_CODE_KEY, REDEMPTION_FINGERPRINT_KEY,
    REDEMPTION_USER_KEY, RESPONSE_FINGERPRINT_KEY, RESPONSE_USER_KEY,
};
use crate::domains::identity::Identity;
use crate::domains::rewards::models::{NewRedemption, RewardRedemption};
use crate::domains::survey::models::{NewSurveyResponse, SurveyResponse};

#[derive(Default)]
struct CampaignRedemptions {
    rows: Vec<RewardRedemption>,
    last_lucky_number: i64,
}

/// In-process store with the same uniqueness rules as the PostgreSQL schema.
///
/// Each campaign's rows sit behind one `DashMap` shard entry, so check and
/// insert happen under the same lock.
#[derive(Default)]
pub struct MemoryStore {
    responses: DashMap<Uuid, Vec<SurveyResponse>>,
    redemptions: DashMap<Uuid, CampaignRedemptions>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn response_count(&self, campaign_id: Uuid) -> usize {
        self.responses.get(&campaign_id).map_or(0, |rows| rows.len())
    }

    pub fn redemption_count(&self, campaign_id: Uuid) -> usize {
        self.redemptions.get(&campaign_id).map_or(0, |c| c.rows.len())
    }
}

/// Name of the unique key `existing` collides on, if any.
fn identity_collision(existing: &Identity, incoming: &Identity, fingerprint_key: &'static str, user_key: &'static str) -> Option<&'static str> {
    if existing.fingerprint_id == incoming.fingerprint_id {
        Some(fingerprint_key)
    } else if existing.user_id.is_some() && existing.user_id == incoming.user_id {
        Some(user_key)
    } else {
        None
    }
}

#[async_trait]
impl SurveyStore for MemoryStore {
    async fn find_response(
        &self,
        campaign_id: Uuid,
        identity: &Identity,
    ) -> Result<Option<SurveyResponse>, StoreError> {
        Ok(self.responses.get(&campaign_id).and_then(|rows| {
            rows.iter()
                .find(|row| row.identity.matches(identity))
                .cloned()
        }))
    }

    async fn insert_response(&self, response: NewSurveyResponse) -> Result<SurveyResponse, StoreError> {
        let mut rows = self.responses.entry(response.campaign_id).or_default();

        if let Some(key) = rows.iter().find_map(|row| {
            identity_collision(&row.identity, &response.identity, RESPONSE_FINGERPRINT_KEY, RESPONSE_USER_KEY)
        }) {
            return Err(StoreError::unique(key));
        }

        let stored = SurveyResponse {
            id: Uuid::new_v4(),
            campaign_id: response.campaign_id,
            identity: response.identity,
            profile_role: response.profile_role,
            response_data: response.response_data,
            is_test: response.is_test,
            created_at: Utc::now(),
        };
        rows.push(stored.clone());
        Ok(stored)
    }

    async fn find_redemption(
        &self,
        campaign_id: Uuid,
        identity: &Identity,
    ) -> Result<Option<RewardRedemption>, StoreError> {
        Ok(self.redemptions.get(&campaign_id).and_then(|campaign| {
            campaign
                .rows
                .iter()
                .find(|row| row.identity.matches(identity))
                .cloned()
        }))
    }

    async fn insert_redemption(
        &self,
        redemption: NewRedemption,
    ) -> Result<RewardRedemption, StoreError> {
        if let Some(code) = &redemption.redemption_code {
            let taken = self.redemptions.iter().any(|campaign| {
                campaign
                    .rows
                    .iter()
                    .any(|row| row.redemption_code.as_ref() == Some(code))
            });
            if taken {
                return Err(StoreError::unique(REDEMPTION_CODE_KEY));
            }
        }

        let mut campaign = self.redemptions.entry(redemption.campaign_id).or_default();

        if let Some(key) = campaign.rows.iter().find_map(|row| {
            identity_collision(&row.identity, &redemption.identity, REDEMPTION_FINGERPRINT_KEY, REDEMPTION_USER_KEY)
        }) {
            return Err(StoreError::unique(key));
        }

        let lucky_number = if redemption.assign_lucky_number {
            let next = campaign.last_lucky_number + 1;
            if campaign.rows.iter().any(|row| row.lucky_number == Some(next)) {
                return Err(StoreError::unique(LUCKY_NUMBER_KEY));
            }
            campaign.last_lucky_number = next;
            Some(next)
        } else {
            None
        };

        let stored = RewardRedemption {
            id: redemption.id,
            campaign_id: redemption.campaign_id,
            identity: redemption.identity,
            reward_id: redemption.reward_id,
            lucky_number,
            redemption_code: redemption.redemption_code,
            contact_whatsapp: redemption.contact_whatsapp,
            contact_email: redemption.contact_email,
            metadata: redemption.metadata,
        };
        campaign.rows.push(stored.clone());
        Ok(stored)
    }
}
