use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::models::{AnswerMap, Campaign, NewSurveyResponse, SurveyResponse};
use crate::cache::DraftCache;
use crate::db::{StoreError, SurveyStore};
use crate::domains::identity::{DeduplicationGuard, Identity};
use crate::observability::metrics::{record_draft_cache_error, record_response};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// Not a failure from the participant's point of view.
    #[error("A response already exists for this participant ({response_id})")]
    AlreadyResponded { response_id: Uuid },

    #[error("Could not save the response: {0}")]
    SubmissionFailure(#[from] StoreError),
}

impl SubmitError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SubmissionFailure(_))
    }
}

/// Persists the one response of a participant.
#[derive(Clone)]
pub struct ResponseSubmitter {
    store: Arc<dyn SurveyStore>,
    guard: DeduplicationGuard,
    drafts: Arc<dyn DraftCache>,
}

impl ResponseSubmitter {
    pub fn new(store: Arc<dyn SurveyStore>, drafts: Arc<dyn DraftCache>) -> Self {
        Self {
            guard: DeduplicationGuard::new(store.clone()),
            store,
            drafts,
        }
    }

    pub async fn submit(
        &self,
        campaign: &Campaign,
        identity: &Identity,
        role: Option<&str>,
        answers: &AnswerMap,
        is_test: bool,
    ) -> Result<SurveyResponse, SubmitError> {
        if let Some(response_id) = self.guard.existing_response(campaign.id, identity).await? {
            record_response("already_responded");
            return Err(SubmitError::AlreadyResponded { response_id });
        }

        let new_response = NewSurveyResponse {
            campaign_id: campaign.id,
            identity: identity.clone(),
            profile_role: role.map(str::to_string),
            response_data: answers.clone(),
            is_test,
        };

        let stored = match self.store.insert_response(new_response).await {
            Ok(stored) => stored,
            Err(e) if e.is_identity_conflict() => {
                // Lost the race to a concurrent submission of the same participant
                warn!(campaign_id = %campaign.id, "Response insert hit a unique index: {}", e);
                record_response("already_responded");
                let existing = self.guard.existing_response(campaign.id, identity).await?;
                return Err(match existing {
                    Some(response_id) => SubmitError::AlreadyResponded { response_id },
                    None => SubmitError::SubmissionFailure(e),
                });
            }
            Err(e) => {
                error!(campaign_id = %campaign.id, "Failed to insert survey response: {}", e);
                record_response("failed");
                return Err(SubmitError::SubmissionFailure(e));
            }
        };

        info!(
            campaign_id = %campaign.id,
            response_id = %stored.id,
            fingerprint = %identity.fingerprint_id,
            answers = answers.len(),
            "Survey response submitted"
        );
        record_response("created");

        if let Err(e) = self.drafts.clear(&campaign.slug).await {
            warn!(slug = %campaign.slug, "Failed to clear survey draft: {}", e);
            record_draft_cache_error("clear");
        }

        Ok(stored)
    }
}
