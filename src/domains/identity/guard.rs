use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::Identity;
use crate::db::{StoreError, SurveyStore};
use crate::domains::rewards::models::RewardRedemption;

/// Read-side existence checks over responses and redemptions.
///
/// Advisory only: two sessions can both pass the check, and the store's
/// unique indexes decide which insert wins.
#[derive(Clone)]
pub struct DeduplicationGuard {
    store: Arc<dyn SurveyStore>,
}

impl DeduplicationGuard {
    pub fn new(store: Arc<dyn SurveyStore>) -> Self {
        Self { store }
    }

    pub async fn has_responded(&self, campaign_id: Uuid, identity: &Identity) -> Result<bool, StoreError> {
        Ok(self.existing_response(campaign_id, identity).await?.is_some())
    }

    pub async fn existing_response(
        &self,
        campaign_id: Uuid,
        identity: &Identity,
    ) -> Result<Option<Uuid>, StoreError> {
        let found = self
            .store
            .find_response(campaign_id, identity)
            .await?
            .map(|response| response.id);

        if let Some(id) = found {
            debug!(%campaign_id, fingerprint = %identity.fingerprint_id, response_id = %id, "Prior response found");
        }
        Ok(found)
    }

    pub async fn has_redeemed(
        &self,
        campaign_id: Uuid,
        identity: &Identity,
    ) -> Result<Option<RewardRedemption>, StoreError> {
        self.store.find_redemption(campaign_id, identity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::domains::survey::models::{AnswerMap, NewSurveyResponse};

    #[tokio::test]
    async fn test_lookup_by_either_signal() {
        let store = Arc::new(MemoryStore::new());
        let guard = DeduplicationGuard::new(store.clone());
        let campaign_id = Uuid::new_v4();

        let stored = store
            .insert_response(NewSurveyResponse {
                campaign_id,
                identity: Identity::new("fp-1", Some("user-1".to_string())),
                profile_role: None,
                response_data: AnswerMap::new(),
                is_test: false,
            })
            .await
            .unwrap();

        assert_eq!(
            guard
                .existing_response(campaign_id, &Identity::anonymous("fp-1"))
                .await
                .unwrap(),
            Some(stored.id)
        );
        assert!(guard
            .has_responded(campaign_id, &Identity::new("fp-2", Some("user-1".to_string())))
            .await
            .unwrap());
        assert!(!guard
            .has_responded(campaign_id, &Identity::anonymous("fp-2"))
            .await
            .unwrap());
        assert!(!guard
            .has_responded(Uuid::new_v4(), &Identity::anonymous("fp-1"))
            .await
            .unwrap());
        assert!(guard
            .has_redeemed(campaign_id, &Identity::anonymous("fp-1"))
            .await
            .unwrap()
            .is_none());
    }
}
