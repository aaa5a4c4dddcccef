use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::code_generator::RedemptionCodeGenerator;
use super::display::project;
use super::fetcher::RewardFileFetcher;
use super::models::{
    whatsapp_digits, ClaimOutcome, ClaimRequest, ClaimSource, NewRedemption, RedemptionError,
    RedemptionMetadata, Reward, RewardRedemption,
};
use crate::db::{StoreError, SurveyStore};
use crate::domains::identity::{DeduplicationGuard, Identity};
use crate::domains::survey::models::Campaign;
use crate::observability::metrics::{
    record_redemption, record_redemption_retry, record_reward_file_fetch,
};

/// Inserts retried after a redemption code or lucky number collision.
pub const MAX_ALLOCATION_ATTEMPTS: u32 = 5;

/// First `draw` reward, else the first reward.
pub fn anchor_reward(rewards: &[Reward]) -> Option<&Reward> {
    rewards
        .iter()
        .find(|reward| reward.is_draw())
        .or_else(|| rewards.first())
}

/// Issues the single redemption row that covers every reward of a campaign.
#[derive(Clone)]
pub struct RewardAllocator {
    store: Arc<dyn SurveyStore>,
    guard: DeduplicationGuard,
    codes: RedemptionCodeGenerator,
    fetcher: Arc<dyn RewardFileFetcher>,
}

struct Contact {
    whatsapp: Option<String>,
    email: Option<String>,
}

impl RewardAllocator {
    pub fn new(
        store: Arc<dyn SurveyStore>,
        codes: RedemptionCodeGenerator,
        fetcher: Arc<dyn RewardFileFetcher>,
    ) -> Self {
        Self {
            guard: DeduplicationGuard::new(store.clone()),
            store,
            codes,
            fetcher,
        }
    }

    /// The participant's redemption, if one exists, projected onto the reward set.
    pub async fn existing(
        &self,
        campaign: &Campaign,
        identity: &Identity,
    ) -> Result<Option<ClaimOutcome>, RedemptionError> {
        Ok(self
            .guard
            .has_redeemed(campaign.id, identity)
            .await?
            .map(|row| redeemed(campaign, ClaimSource::Existing, row)))
    }

    pub async fn claim(
        &self,
        campaign: &Campaign,
        identity: &Identity,
        request: &ClaimRequest,
    ) -> Result<ClaimOutcome, RedemptionError> {
        let Some(anchor) = anchor_reward(&campaign.rewards) else {
            record_redemption("no_rewards");
            return Ok(ClaimOutcome::NoRewards);
        };

        if let Some(outcome) = self.existing(campaign, identity).await? {
            info!(campaign_id = %campaign.id, fingerprint = %identity.fingerprint_id, "Reusing existing redemption");
            record_redemption("existing");
            return Ok(outcome);
        }

        let has_draw = campaign.rewards.iter().any(Reward::is_draw);
        let has_pdf = campaign.rewards.iter().any(Reward::is_pdf);

        let contact = match check_claim(request, has_draw) {
            Ok(contact) => contact,
            Err(e) => {
                record_redemption("rejected");
                return Err(e);
            }
        };

        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let new_redemption = NewRedemption {
                id: Uuid::new_v4(),
                campaign_id: campaign.id,
                identity: identity.clone(),
                reward_id: anchor.id,
                redemption_code: has_pdf.then(|| self.codes.generate()),
                assign_lucky_number: has_draw,
                contact_whatsapp: contact.whatsapp.clone(),
                contact_email: contact.email.clone(),
                metadata: RedemptionMetadata::new(Utc::now(), request.sensitive_consent),
            };

            match self.store.insert_redemption(new_redemption).await {
                Ok(row) => {
                    info!(
                        campaign_id = %campaign.id,
                        redemption_id = %row.id,
                        anchor_reward = %anchor.id,
                        lucky_number = ?row.lucky_number,
                        redemption_code = ?row.redemption_code,
                        "Reward redemption created"
                    );
                    record_redemption("created");
                    self.fetch_files(campaign).await;
                    return Ok(redeemed(campaign, ClaimSource::Created, row));
                }
                Err(e) if e.is_identity_conflict() => {
                    warn!(campaign_id = %campaign.id, "Redemption insert lost a race: {}", e);
                    return self.reread_after_conflict(campaign, identity, e).await;
                }
                Err(e) if e.is_value_collision() => {
                    warn!(
                        campaign_id = %campaign.id,
                        attempt,
                        "Unique violation inserting redemption ({}). Retrying...",
                        e
                    );
                    if let StoreError::UniqueViolation { constraint } = &e {
                        record_redemption_retry(constraint);
                    }
                }
                Err(e) => {
                    error!(campaign_id = %campaign.id, "Failed to insert redemption: {}", e);
                    record_redemption("failed");
                    return Err(e.into());
                }
            }
        }

        record_redemption("failed");
        Err(RedemptionError::AllocationExhausted {
            attempts: MAX_ALLOCATION_ATTEMPTS,
        })
    }

    async fn reread_after_conflict(
        &self,
        campaign: &Campaign,
        identity: &Identity,
        conflict: StoreError,
    ) -> Result<ClaimOutcome, RedemptionError> {
        match self.existing(campaign, identity).await? {
            Some(outcome) => {
                record_redemption("existing");
                Ok(outcome)
            }
            None => {
                record_redemption("failed");
                Err(conflict.into())
            }
        }
    }

    async fn fetch_files(&self, campaign: &Campaign) {
        let fetches = campaign
            .rewards
            .iter()
            .filter(|reward| reward.is_pdf())
            .filter_map(|reward| reward.file_url.as_deref().map(|url| (reward, url)))
            .map(|(reward, url)| async move { (reward, self.fetcher.fetch(reward, url).await) });

        for (reward, result) in join_all(fetches).await {
            match result {
                Ok(()) => record_reward_file_fetch(true),
                Err(e) => {
                    warn!(reward_id = %reward.id, "Failed to fetch reward file: {:#}", e);
                    record_reward_file_fetch(false);
                }
            }
        }
    }
}

fn redeemed(campaign: &Campaign, source: ClaimSource, row: RewardRedemption) -> ClaimOutcome {
    ClaimOutcome::Redeemed {
        source,
        displays: project(&campaign.rewards, Some(&row)),
        redemption: row,
    }
}

/// Draw entries need a valid contact form and the sensitive data consent.
/// A contact given for a pdf-only set is validated and kept.
fn check_claim(request: &ClaimRequest, has_draw: bool) -> Result<Contact, RedemptionError> {
    let contact = match (&request.contact, has_draw) {
        (Some(form), _) => {
            form.check()
                .map_err(|errors| RedemptionError::ContactValidation { errors })?;
            Contact {
                whatsapp: Some(whatsapp_digits(&form.whatsapp)),
                email: Some(form.email.trim().to_string()),
            }
        }
        (None, true) => {
            return Err(RedemptionError::ContactValidation {
                errors: vec!["WhatsApp and email are required to enter the draw".to_string()],
            })
        }
        (None, false) => Contact {
            whatsapp: None,
            email: None,
        },
    };

    if has_draw && !request.sensitive_consent {
        return Err(RedemptionError::ConsentRequired);
    }

    Ok(contact)
}
