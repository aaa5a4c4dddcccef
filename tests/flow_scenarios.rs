//! End-to-end walks through the flow controller against the in-memory stores.

#[cfg(test)]
mod flow_scenarios {
    use async_trait::async_trait;
    use axe_survey::cache::DraftCache;
    use axe_survey::db::{MemoryStore, StoreError, SurveyStore};
    use axe_survey::domains::identity::{FingerprintSource, Identity};
    use axe_survey::domains::rewards::{
        ClaimOutcome, ClaimRequest, ContactForm, NewRedemption, RewardDisplay, RewardRedemption,
    };
    use axe_survey::domains::survey::models::{
        AnswerMap, AnswerValue, Campaign, CampaignStatus, ClosedReason, NewSurveyResponse,
        SurveyResponse,
    };
    use axe_survey::domains::survey::{FlowError, FlowState, IoKind, SessionProfile};
    use axe_survey::SurveyEngine;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use shared::SurveyConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    fn campaign(value: serde_json::Value) -> Campaign {
        serde_json::from_value(value).expect("campaign fixture")
    }

    fn branching_campaign() -> Campaign {
        campaign(json!({
            "id": Uuid::new_v4(),
            "slug": "mapeamento-terreiros",
            "title": "Mapeamento dos terreiros",
            "status": "active",
            "start_date": null,
            "end_date": null,
            "consent_text": null,
            "form_schema": [
                {"id": "A", "title": "Geral", "target_roles": [], "questions": [
                    {"id": "q1", "type": "single_choice", "required": true, "options": ["yes", "no"]},
                    {"id": "q2", "type": "short_text", "required": true,
                     "depends_on": {"question_id": "q1", "value": "yes"}},
                    {"id": "q3", "type": "scale", "min": 1, "max": 5}
                ]},
                {"id": "B", "title": "Lideranças", "target_roles": ["lider_terreiro"], "questions": [
                    {"id": "q4", "type": "long_text"}
                ]}
            ],
            "rewards": []
        }))
    }

    fn engine() -> SurveyEngine {
        SurveyEngine::in_memory(SurveyConfig::default())
    }

    // ========================================================================
    // SCHEMA AND NAVIGATION
    // ========================================================================

    #[tokio::test]
    async fn test_role_unset_only_sees_role_agnostic_sections() {
        let schema = branching_campaign().form_schema;
        let resolved = axe_survey::domains::survey::schema::resolve(&schema, None).unwrap();

        let ids: Vec<_> = resolved.iter().map(|r| r.question.id.as_str()).collect();
        assert_eq!(ids, vec!["q1", "q2", "q3"]);
        assert!(resolved.iter().all(|r| r.section_id == "A"));
    }

    #[tokio::test]
    async fn test_skipped_question_forward_and_backward() {
        let engine = engine();
        let mut flow = engine.flow(
            Arc::new(branching_campaign()),
            Identity::anonymous("fp-skip"),
            SessionProfile::with_role("frequentador"),
        );

        assert_eq!(flow.start().await.unwrap(), FlowState::Questioning);
        assert_eq!(flow.current_question().unwrap().question.id, "q1");

        // 1. Answering "no" skips q2 going forward
        flow.advance(Some(AnswerValue::text("no"))).await.unwrap();
        assert_eq!(flow.current_question().unwrap().question.id, "q3");

        // 2. And going backward
        flow.retreat().unwrap();
        assert_eq!(flow.current_question().unwrap().question.id, "q1");

        // 3. Changing the answer brings q2 back
        flow.advance(Some(AnswerValue::text("yes"))).await.unwrap();
        assert_eq!(flow.current_question().unwrap().question.id, "q2");
    }

    #[tokio::test]
    async fn test_progress_never_decreases_going_forward() {
        let engine = engine();
        let mut flow = engine.flow(
            Arc::new(branching_campaign()),
            Identity::anonymous("fp-progress"),
            SessionProfile::with_role("frequentador"),
        );
        flow.start().await.unwrap();

        let mut seen = vec![flow.progress()];
        flow.advance(Some(AnswerValue::text("yes"))).await.unwrap();
        seen.push(flow.progress());
        flow.advance(Some(AnswerValue::text("Ilê Axé"))).await.unwrap();
        seen.push(flow.progress());

        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]), "{:?}", seen);
        assert_eq!(flow.current_question().unwrap().question.id, "q3");
        assert_eq!(flow.progress(), 100);

        assert_eq!(
            flow.advance(Some(AnswerValue::Number(4))).await.unwrap(),
            FlowState::Submitting
        );
    }

    // ========================================================================
    // CLOSED CAMPAIGNS
    // ========================================================================

    #[tokio::test]
    async fn test_expired_campaign_closes_before_role_selection_despite_draft() {
        let engine = engine();
        let mut expired = branching_campaign();
        expired.end_date = Some(Utc::now() - Duration::days(1));
        let identity = Identity::anonymous("fp-closed");

        let draft: AnswerMap = [("q1", AnswerValue::text("yes"))].into_iter().collect();
        engine
            .drafts_for(&identity)
            .save(&expired.slug, &draft)
            .await
            .unwrap();

        let mut flow = engine.flow(Arc::new(expired), identity, SessionProfile::anonymous());

        assert_eq!(
            flow.start().await.unwrap(),
            FlowState::Closed(ClosedReason::Expired)
        );
        assert!(flow.answers().is_empty());
        assert!(flow.select_role("lider_terreiro").is_err());
    }

    #[tokio::test]
    async fn test_draft_campaign_is_open_for_preview() {
        let engine = engine();
        let mut preview = branching_campaign();
        preview.status = CampaignStatus::Draft;
        preview.end_date = Some(Utc::now() - Duration::days(30));

        let mut flow = engine.flow(
            Arc::new(preview),
            Identity::anonymous("fp-preview"),
            SessionProfile::anonymous(),
        );

        assert_eq!(flow.start().await.unwrap(), FlowState::RoleSelection);
    }

    // ========================================================================
    // SUBMISSION
    // ========================================================================

    async fn complete(flow: &mut axe_survey::FlowController) {
        flow.start().await.unwrap();
        flow.advance(Some(AnswerValue::text("no"))).await.unwrap();
        flow.advance(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_submission_is_idempotent_across_sessions() {
        let engine = engine();
        let campaign = Arc::new(branching_campaign());
        let profile = SessionProfile::with_role("frequentador");

        let mut first = engine.flow(campaign.clone(), Identity::anonymous("fp-1"), profile.clone());
        complete(&mut first).await;
        assert_eq!(first.submit().await.unwrap(), FlowState::Done);
        let stored = first.response().unwrap().clone();
        assert_eq!(stored.profile_role.as_deref(), Some("frequentador"));
        assert!(!stored.is_test);

        // Same device comes back later, now logged in
        let mut second = engine.flow(
            campaign.clone(),
            Identity::new("fp-1", Some("user-7".to_string())),
            profile,
        );
        assert_eq!(second.start().await.unwrap(), FlowState::AlreadyResponded);
        assert_eq!(second.existing_response_id(), Some(stored.id));

        // No rewards configured: viewing them finishes the flow
        assert_eq!(second.view_rewards().await.unwrap(), FlowState::Done);
    }

    #[tokio::test]
    async fn test_authenticated_sessions_are_marked_as_test() {
        let engine = engine();
        let mut flow = engine.flow(
            Arc::new(branching_campaign()),
            Identity::new("fp-auth", Some("user-1".to_string())),
            SessionProfile::with_role("frequentador"),
        );
        complete(&mut flow).await;
        flow.submit().await.unwrap();

        assert!(flow.response().unwrap().is_test);
    }

    #[tokio::test]
    async fn test_draft_is_restored_and_cleared_on_submit() {
        let engine = engine();
        let campaign = Arc::new(branching_campaign());
        let identity = Identity::anonymous("fp-resume");

        // 1. First session answers q1 and leaves
        let mut first = engine.flow(campaign.clone(), identity.clone(), SessionProfile::with_role("frequentador"));
        first.start().await.unwrap();
        first.advance(Some(AnswerValue::text("yes"))).await.unwrap();
        drop(first);

        // 2. Second session resumes with q1 restored
        let mut second = engine.flow(campaign.clone(), identity.clone(), SessionProfile::with_role("frequentador"));
        second.start().await.unwrap();
        assert_eq!(second.answers().get("q1"), Some(&AnswerValue::text("yes")));
        assert_eq!(second.current_question().unwrap().question.id, "q1");

        second.advance(Some(AnswerValue::text("yes"))).await.unwrap();
        second.advance(Some(AnswerValue::text("Casa de Oxóssi"))).await.unwrap();
        second.advance(None).await.unwrap();
        second.submit().await.unwrap();

        // 3. Draft gone after the commit
        assert!(engine
            .drafts_for(&identity)
            .load(&campaign.slug)
            .await
            .unwrap()
            .is_none());
    }

    /// Fails the first `failures` response inserts.
    struct FlakyStore {
        inner: MemoryStore,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl SurveyStore for FlakyStore {
        async fn find_response(&self, campaign_id: Uuid, identity: &Identity) -> Result<Option<SurveyResponse>, StoreError> {
            self.inner.find_response(campaign_id, identity).await
        }

        async fn insert_response(&self, response: NewSurveyResponse) -> Result<SurveyResponse, StoreError> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Database("connection reset".to_string()));
            }
            self.inner.insert_response(response).await
        }

        async fn find_redemption(&self, campaign_id: Uuid, identity: &Identity) -> Result<Option<RewardRedemption>, StoreError> {
            self.inner.find_redemption(campaign_id, identity).await
        }

        async fn insert_redemption(&self, redemption: NewRedemption) -> Result<RewardRedemption, StoreError> {
            self.inner.insert_redemption(redemption).await
        }
    }

    #[tokio::test]
    async fn test_submission_failure_keeps_answers_and_retries() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failures: AtomicUsize::new(1),
        });
        let engine = SurveyEngine::new(SurveyConfig::default(), store.clone());
        let mut flow = engine.flow(
            Arc::new(branching_campaign()),
            Identity::anonymous("fp-flaky"),
            SessionProfile::with_role("frequentador"),
        );
        complete(&mut flow).await;
        let rx = flow.subscribe();

        let err = flow.submit().await.unwrap_err();
        assert!(matches!(err, FlowError::SubmissionFailure(_)));
        assert!(err.is_retryable());
        assert_eq!(flow.state(), FlowState::Submitting);
        assert_eq!(flow.answers().get("q1"), Some(&AnswerValue::text("no")));
        assert_eq!(rx.borrow().awaiting, None);

        assert_eq!(flow.submit().await.unwrap(), FlowState::Done);
        assert_eq!(store.inner.response_count(flow.response().unwrap().campaign_id), 1);
    }

    #[tokio::test]
    async fn test_concurrent_sessions_persist_one_response() {
        let engine = engine();
        let campaign = Arc::new(branching_campaign());
        let profile = SessionProfile::with_role("frequentador");

        let mut a = engine.flow(campaign.clone(), Identity::anonymous("fp-race"), profile.clone());
        let mut b = engine.flow(campaign.clone(), Identity::anonymous("fp-race"), profile);
        complete(&mut a).await;
        complete(&mut b).await;

        let (ra, rb) = tokio::join!(a.submit(), b.submit());
        let states = [ra.unwrap(), rb.unwrap()];

        assert!(states.contains(&FlowState::Done));
        assert!(states.contains(&FlowState::AlreadyResponded));
    }

    // ========================================================================
    // DEGRADED COLLABORATORS
    // ========================================================================

    struct BrokenDrafts;

    #[async_trait]
    impl DraftCache for BrokenDrafts {
        async fn load(&self, _slug: &str) -> shared::Result<Option<AnswerMap>> {
            Err(shared::AppError::redis_pool("unavailable"))
        }

        async fn save(&self, _slug: &str, _answers: &AnswerMap) -> shared::Result<()> {
            Err(shared::AppError::redis_pool("unavailable"))
        }

        async fn clear(&self, _slug: &str) -> shared::Result<()> {
            Err(shared::AppError::redis_pool("unavailable"))
        }
    }

    #[tokio::test]
    async fn test_broken_draft_cache_never_blocks() {
        let engine = engine().with_device_drafts(Arc::new(BrokenDrafts));
        let mut flow = engine.flow(
            Arc::new(branching_campaign()),
            Identity::anonymous("fp-nocache"),
            SessionProfile::with_role("frequentador"),
        );

        complete(&mut flow).await;
        assert_eq!(flow.submit().await.unwrap(), FlowState::Done);
    }

    struct NeverReady;

    #[async_trait]
    impl FingerprintSource for NeverReady {
        async fn fingerprint(&self) -> anyhow::Result<String> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fingerprint_timeout_still_allows_participation() {
        let engine = engine();
        let mut flow = engine
            .begin_session(
                Arc::new(branching_campaign()),
                &NeverReady,
                None,
                SessionProfile::with_role("frequentador"),
            )
            .await;

        assert!(flow.identity().is_fallback());
        complete(&mut flow).await;
        assert_eq!(flow.submit().await.unwrap(), FlowState::Done);
    }

    // ========================================================================
    // REWARDS THROUGH THE FLOW
    // ========================================================================

    fn rewarded_campaign() -> Campaign {
        let mut c = branching_campaign();
        let id = c.id;
        c.rewards = serde_json::from_value(json!([
            {"id": Uuid::new_v4(), "campaign_id": id, "type": "draw", "title": "Sorteio de tablet"},
            {"id": Uuid::new_v4(), "campaign_id": id, "type": "pdf", "title": "Cartilha",
             "file_url": "https://cdn.example.org/cartilha.pdf"}
        ]))
        .unwrap();
        c
    }

    #[tokio::test]
    async fn test_claim_through_flow_and_view_later() {
        let engine = engine();
        let campaign = Arc::new(rewarded_campaign());
        let identity = Identity::anonymous("fp-reward");
        let profile = SessionProfile::with_role("frequentador");

        let mut flow = engine.flow(campaign.clone(), identity.clone(), profile.clone());
        complete(&mut flow).await;
        assert_eq!(flow.submit().await.unwrap(), FlowState::RewardOffer);
        assert_eq!(flow.begin_claim().unwrap(), FlowState::RewardClaim);

        // 1. Missing consent keeps the claim form open
        let err = flow
            .claim(&ClaimRequest {
                contact: Some(ContactForm::new("71 99876-5432", "mae@terreiro.org")),
                sensitive_consent: false,
            })
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(flow.state(), FlowState::RewardClaim);

        // 2. A valid claim finishes
        let done = flow
            .claim(&ClaimRequest {
                contact: Some(ContactForm::new("71 99876-5432", "mae@terreiro.org")),
                sensitive_consent: true,
            })
            .await
            .unwrap();
        assert_eq!(done, FlowState::Done);
        let cards = flow.reward_cards();
        assert_eq!(cards[0].display, RewardDisplay::LuckyNumber("00001".to_string()));
        assert!(matches!(cards[1].display, RewardDisplay::RedemptionCode(_)));

        // 3. A later session sees the same row
        let mut later = engine.flow(campaign, identity, profile);
        assert_eq!(later.start().await.unwrap(), FlowState::AlreadyResponded);
        assert_eq!(later.view_rewards().await.unwrap(), FlowState::Done);
        assert_eq!(later.reward_cards(), cards);
        assert!(matches!(later.claim_outcome(), Some(ClaimOutcome::Redeemed { .. })));
    }

    #[tokio::test]
    async fn test_skipped_rewards_are_offered_again() {
        let engine = engine();
        let campaign = Arc::new(rewarded_campaign());
        let identity = Identity::anonymous("fp-skip-reward");

        let mut flow = engine.flow(campaign.clone(), identity.clone(), SessionProfile::with_role("frequentador"));
        complete(&mut flow).await;
        flow.submit().await.unwrap();
        assert_eq!(flow.skip_rewards().unwrap(), FlowState::Done);

        let mut later = engine.flow(campaign, identity, SessionProfile::with_role("frequentador"));
        later.start().await.unwrap();
        let mut rx = later.subscribe();
        assert_eq!(later.view_rewards().await.unwrap(), FlowState::RewardOffer);
        assert!(rx.has_changed().unwrap());
        let snapshot = *rx.borrow_and_update();
        assert_eq!(snapshot.state, FlowState::RewardOffer);
        assert_ne!(snapshot.awaiting, Some(IoKind::LoadingRewards));

        assert!(later.reward_cards().iter().all(|c| c.display == RewardDisplay::Pending));
    }
}
