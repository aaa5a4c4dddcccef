//! Per-session state machine that walks a participant through a campaign.
//!
//! One controller per session; it is the only writer of its answer map. Every
//! transition publishes a [`FlowSnapshot`] on a watch channel, and async
//! transitions publish an extra snapshot with `awaiting` set while the I/O is
//! in flight.

use chrono::Utc;
use serde::Serialize;
use shared::SurveyConfig;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::models::{AnswerMap, AnswerValue, Campaign, ClosedReason, ResolvedQuestion, SurveyResponse};
use super::schema::{self, SchemaError};
use super::submission::{ResponseSubmitter, SubmitError};
use super::validation::{validate_answer, FieldError};
use super::visibility::{first_visible, is_last_visible, next_visible, previous_visible};
use crate::cache::DraftCache;
use crate::db::{StoreError, SurveyStore};
use crate::domains::identity::{DeduplicationGuard, Identity};
use crate::domains::rewards::models::{ClaimOutcome, ClaimRequest, RedemptionError, RewardDisplayItem};
use crate::domains::rewards::{project, RewardAllocator};
use crate::observability::metrics::record_draft_cache_error;

// ============================================================================
// STATES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum FlowState {
    /// Created, `start()` not called yet.
    Starting,
    Consent,
    RoleSelection,
    /// The chosen role resolves to zero questions.
    NoQuestions,
    Questioning,
    Submitting,
    RewardOffer,
    RewardClaim,
    Done,
    AlreadyResponded,
    Closed(ClosedReason),
    Declined,
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Closed(_) | Self::Declined)
    }
}

/// I/O the controller is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IoKind {
    CheckingEligibility,
    Submitting,
    Claiming,
    LoadingRewards,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlowSnapshot {
    pub state: FlowState,
    pub awaiting: Option<IoKind>,
    pub progress: u8,
}

/// What the host knows about the participant's account.
#[derive(Debug, Clone, Default)]
pub struct SessionProfile {
    pub role: Option<String>,
}

impl SessionProfile {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_role(role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error(transparent)]
    SchemaEmpty(#[from] SchemaError),

    #[error(transparent)]
    Validation(#[from] FieldError),

    #[error("Submission failed, please try again: {0}")]
    SubmissionFailure(StoreError),

    #[error(transparent)]
    Redemption(#[from] RedemptionError),

    #[error("Role '{role}' is not offered by this campaign")]
    UnknownRole { role: String },

    #[error("Cannot {action} while in {state:?}")]
    InvalidTransition { action: &'static str, state: FlowState },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FlowError {
    /// Errors the participant can recover from without restarting the flow.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::SubmissionFailure(_) | Self::Store(_) => true,
            Self::Redemption(e) => !matches!(e, RedemptionError::AllocationExhausted { .. }),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoleSource {
    /// Fixed by a non-system profile role.
    Profile,
    /// Picked in RoleSelection.
    Selected,
    /// The campaign targets no roles, so there was nothing to pick.
    NotRequired,
}

// ============================================================================
// CONTROLLER
// ============================================================================

pub struct FlowController {
    campaign: Arc<Campaign>,
    identity: Identity,
    profile: SessionProfile,
    config: SurveyConfig,
    guard: DeduplicationGuard,
    submitter: ResponseSubmitter,
    allocator: RewardAllocator,
    drafts: Arc<dyn DraftCache>,

    state: FlowState,
    role: Option<String>,
    role_source: Option<RoleSource>,
    questions: Vec<ResolvedQuestion>,
    index: usize,
    answers: AnswerMap,
    progress: u8,
    response: Option<SurveyResponse>,
    existing_response_id: Option<Uuid>,
    outcome: Option<ClaimOutcome>,
    tx: watch::Sender<FlowSnapshot>,
}

impl FlowController {
    pub fn new(
        campaign: Arc<Campaign>,
        identity: Identity,
        profile: SessionProfile,
        config: SurveyConfig,
        store: Arc<dyn SurveyStore>,
        drafts: Arc<dyn DraftCache>,
        allocator: RewardAllocator,
    ) -> Self {
        let (tx, _rx) = watch::channel(FlowSnapshot {
            state: FlowState::Starting,
            awaiting: None,
            progress: 0,
        });

        Self {
            guard: DeduplicationGuard::new(store.clone()),
            submitter: ResponseSubmitter::new(store, drafts.clone()),
            campaign,
            identity,
            profile,
            config,
            allocator,
            drafts,
            state: FlowState::Starting,
            role: None,
            role_source: None,
            questions: Vec::new(),
            index: 0,
            answers: AnswerMap::new(),
            progress: 0,
            response: None,
            existing_response_id: None,
            outcome: None,
            tx,
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn answers(&self) -> &AnswerMap {
        &self.answers
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn questions(&self) -> &[ResolvedQuestion] {
        &self.questions
    }

    pub fn current_question(&self) -> Option<&ResolvedQuestion> {
        match self.state {
            FlowState::Questioning => self.questions.get(self.index),
            _ => None,
        }
    }

    pub fn response(&self) -> Option<&SurveyResponse> {
        self.response.as_ref()
    }

    /// Id of the response that made this session `AlreadyResponded`.
    pub fn existing_response_id(&self) -> Option<Uuid> {
        self.existing_response_id
    }

    pub fn claim_outcome(&self) -> Option<&ClaimOutcome> {
        self.outcome.as_ref()
    }

    /// Every reward card with whatever the single redemption row gives it.
    pub fn reward_cards(&self) -> Vec<RewardDisplayItem> {
        let redemption = self.outcome.as_ref().and_then(ClaimOutcome::redemption);
        project(&self.campaign.rewards, redemption)
    }

    pub fn available_roles(&self) -> Vec<String> {
        schema::available_roles(&self.campaign.form_schema)
    }

    pub fn subscribe(&self) -> watch::Receiver<FlowSnapshot> {
        self.tx.subscribe()
    }

    pub fn is_test(&self) -> bool {
        self.config.authenticated_is_test && self.identity.is_authenticated()
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Closed first, then prior response, then draft restore.
    pub async fn start(&mut self) -> Result<FlowState, FlowError> {
        self.expect_state(FlowState::Starting, "start")?;

        if let Some(reason) = self.campaign.closed_reason(Utc::now()) {
            info!(campaign = %self.campaign.slug, ?reason, "Campaign is closed");
            return Ok(self.transition(FlowState::Closed(reason)));
        }

        if self.campaign.form_schema.is_empty() {
            return Err(SchemaError::SchemaEmpty.into());
        }

        self.publish_awaiting(IoKind::CheckingEligibility);
        let existing = self
            .guard
            .existing_response(self.campaign.id, &self.identity)
            .await;
        let existing = match existing {
            Ok(existing) => existing,
            Err(e) => {
                self.publish();
                return Err(e.into());
            }
        };

        if let Some(response_id) = existing {
            info!(
                campaign = %self.campaign.slug,
                fingerprint = %self.identity.fingerprint_id,
                "Participant already responded"
            );
            self.existing_response_id = Some(response_id);
            return Ok(self.transition(FlowState::AlreadyResponded));
        }

        self.restore_draft().await;

        if self.campaign.requires_consent() {
            return Ok(self.transition(FlowState::Consent));
        }
        self.after_consent()
    }

    pub fn accept_consent(&mut self) -> Result<FlowState, FlowError> {
        self.expect_state(FlowState::Consent, "accept consent")?;
        self.after_consent()
    }

    pub fn decline_consent(&mut self) -> Result<FlowState, FlowError> {
        self.expect_state(FlowState::Consent, "decline consent")?;
        info!(campaign = %self.campaign.slug, "Consent declined");
        Ok(self.transition(FlowState::Declined))
    }

    pub fn select_role(&mut self, role: &str) -> Result<FlowState, FlowError> {
        self.expect_state(FlowState::RoleSelection, "select a role")?;

        let role = role.trim();
        if !self.available_roles().iter().any(|offered| offered == role) {
            return Err(FlowError::UnknownRole {
                role: role.to_string(),
            });
        }

        debug!(campaign = %self.campaign.slug, role, "Role selected");
        self.role = Some(role.to_string());
        self.role_source = Some(RoleSource::Selected);
        self.begin_questions()
    }

    /// Validate and record the answer to the current question, then move to
    /// the next visible one.
    pub async fn advance(&mut self, value: Option<AnswerValue>) -> Result<FlowState, FlowError> {
        self.expect_state(FlowState::Questioning, "advance")?;

        let question = &self.questions[self.index].question;
        if let Some(value) = validate_answer(question, value)? {
            let question_id = question.id.clone();
            self.answers.merge(question_id, value);
        }

        self.save_draft().await;

        match next_visible(&self.questions, self.index, &self.answers) {
            Some(next) => {
                self.index = next;
                self.progress = self.progress_at(next);
                Ok(self.transition(FlowState::Questioning))
            }
            None => {
                self.progress = 100;
                Ok(self.transition(FlowState::Submitting))
            }
        }
    }

    pub fn retreat(&mut self) -> Result<FlowState, FlowError> {
        let from = match self.state {
            FlowState::Questioning => self.index,
            FlowState::Submitting => self.questions.len(),
            FlowState::NoQuestions => 0,
            state => {
                return Err(FlowError::InvalidTransition {
                    action: "go back",
                    state,
                })
            }
        };

        if let Some(previous) = previous_visible(&self.questions, from, &self.answers) {
            self.index = previous;
            self.progress = self.progress_at(previous);
            return Ok(self.transition(FlowState::Questioning));
        }

        if self.role_source == Some(RoleSource::Selected) {
            self.role = None;
            self.role_source = None;
            self.questions.clear();
            self.index = 0;
            self.progress = 0;
            return Ok(self.transition(FlowState::RoleSelection));
        }

        Ok(self.state)
    }

    pub async fn submit(&mut self) -> Result<FlowState, FlowError> {
        self.expect_state(FlowState::Submitting, "submit")?;

        self.publish_awaiting(IoKind::Submitting);
        let is_test = self.is_test();
        let result = self
            .submitter
            .submit(
                &self.campaign,
                &self.identity,
                self.role.as_deref(),
                &self.answers,
                is_test,
            )
            .await;

        match result {
            Ok(response) => {
                self.response = Some(response);
                let next = if self.campaign.has_rewards() {
                    FlowState::RewardOffer
                } else {
                    FlowState::Done
                };
                Ok(self.transition(next))
            }
            Err(SubmitError::AlreadyResponded { response_id }) => {
                self.existing_response_id = Some(response_id);
                Ok(self.transition(FlowState::AlreadyResponded))
            }
            Err(SubmitError::SubmissionFailure(e)) => {
                warn!(campaign = %self.campaign.slug, "Submission failed, answers kept: {}", e);
                self.publish();
                Err(FlowError::SubmissionFailure(e))
            }
        }
    }

    pub fn begin_claim(&mut self) -> Result<FlowState, FlowError> {
        self.expect_state(FlowState::RewardOffer, "claim rewards")?;
        Ok(self.transition(FlowState::RewardClaim))
    }

    pub fn skip_rewards(&mut self) -> Result<FlowState, FlowError> {
        self.expect_state(FlowState::RewardOffer, "skip rewards")?;
        Ok(self.transition(FlowState::Done))
    }

    /// A rejected contact form or missing consent keeps the claim form open.
    pub async fn claim(&mut self, request: &ClaimRequest) -> Result<FlowState, FlowError> {
        self.expect_state(FlowState::RewardClaim, "submit the claim")?;

        self.publish_awaiting(IoKind::Claiming);
        let result = self
            .allocator
            .claim(&self.campaign, &self.identity, request)
            .await;

        match result {
            Ok(outcome) => {
                self.outcome = Some(outcome);
                Ok(self.transition(FlowState::Done))
            }
            Err(e) => {
                self.publish();
                Err(e.into())
            }
        }
    }

    /// From `AlreadyResponded`: show the existing redemption, or offer the
    /// rewards when none was claimed yet.
    pub async fn view_rewards(&mut self) -> Result<FlowState, FlowError> {
        self.expect_state(FlowState::AlreadyResponded, "view rewards")?;

        self.publish_awaiting(IoKind::LoadingRewards);
        let existing = match self.allocator.existing(&self.campaign, &self.identity).await {
            Ok(existing) => existing,
            Err(e) => {
                self.publish();
                return Err(e.into());
            }
        };

        match existing {
            Some(outcome) => {
                self.outcome = Some(outcome);
                Ok(self.transition(FlowState::Done))
            }
            None if self.campaign.has_rewards() => Ok(self.transition(FlowState::RewardOffer)),
            None => Ok(self.transition(FlowState::Done)),
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn after_consent(&mut self) -> Result<FlowState, FlowError> {
        let profile_role = self.profile.role.clone();

        if let Some(role) = profile_role
            .as_deref()
            .filter(|role| !self.config.is_system_role(role))
        {
            self.role = Some(role.to_string());
            self.role_source = Some(RoleSource::Profile);
            return self.begin_questions();
        }

        if self.available_roles().is_empty() {
            self.role = profile_role;
            self.role_source = Some(RoleSource::NotRequired);
            return self.begin_questions();
        }

        Ok(self.transition(FlowState::RoleSelection))
    }

    fn begin_questions(&mut self) -> Result<FlowState, FlowError> {
        self.questions = schema::resolve(&self.campaign.form_schema, self.role.as_deref())?;

        if self.questions.is_empty() {
            return Ok(self.transition(FlowState::NoQuestions));
        }

        match first_visible(&self.questions, &self.answers) {
            Some(first) => {
                self.index = first;
                self.progress = self.progress_at(first);
                Ok(self.transition(FlowState::Questioning))
            }
            None => {
                self.progress = 100;
                Ok(self.transition(FlowState::Submitting))
            }
        }
    }

    /// Percentage shown while `index` is the current question.
    fn progress_at(&self, index: usize) -> u8 {
        if is_last_visible(&self.questions, index, &self.answers) {
            return 100;
        }
        let total = self.questions.len().max(1) as f64;
        let percent = ((index + 1) as f64 / total * 100.0).round();
        percent.min(100.0) as u8
    }

    async fn restore_draft(&mut self) {
        match self.drafts.load(&self.campaign.slug).await {
            Ok(Some(draft)) => {
                debug!(campaign = %self.campaign.slug, answers = draft.len(), "Draft restored");
                self.answers.absorb(draft);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(campaign = %self.campaign.slug, "Failed to load survey draft: {}", e);
                record_draft_cache_error("load");
            }
        }
    }

    async fn save_draft(&self) {
        if let Err(e) = self.drafts.save(&self.campaign.slug, &self.answers).await {
            warn!(campaign = %self.campaign.slug, "Failed to save survey draft: {}", e);
            record_draft_cache_error("save");
        }
    }

    fn expect_state(&self, expected: FlowState, action: &'static str) -> Result<(), FlowError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(FlowError::InvalidTransition {
                action,
                state: self.state,
            })
        }
    }

    fn transition(&mut self, next: FlowState) -> FlowState {
        if self.state != next {
            debug!(campaign = %self.campaign.slug, from = ?self.state, to = ?next, "Flow transition");
        }
        self.state = next;
        self.publish();
        next
    }

    fn publish(&self) {
        self.tx.send_replace(FlowSnapshot {
            state: self.state,
            awaiting: None,
            progress: self.progress,
        });
    }

    fn publish_awaiting(&self, io: IoKind) {
        self.tx.send_replace(FlowSnapshot {
            state: self.state,
            awaiting: Some(io),
            progress: self.progress,
        });
    }
}
