// ============================================================================
// PROMETHEUS METRICS
// ============================================================================
// Counters for survey submissions, reward claims and degraded paths
// ============================================================================

use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

lazy_static! {
    // ========================================================================
    // SURVEY METRICS
    // ========================================================================

    /// Submissions by outcome: created, already_responded, failed
    pub static ref SURVEY_RESPONSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "survey_responses_total",
        "Total number of survey submissions by outcome",
        &["outcome"]
    )
    .expect("survey_responses_total registration");

    /// Claims by outcome: created, existing, no_rewards, rejected, failed
    pub static ref REWARD_REDEMPTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "reward_redemptions_total",
        "Total number of reward claims by outcome",
        &["outcome"]
    )
    .expect("reward_redemptions_total registration");

    /// Redemption inserts retried after a code or lucky number collision
    pub static ref REDEMPTION_RETRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "reward_redemption_retries_total",
        "Redemption inserts retried after a generated value collided",
        &["constraint"]
    )
    .expect("reward_redemption_retries_total registration");

    // ========================================================================
    // DEGRADED PATHS
    // ========================================================================

    pub static ref IDENTITY_FALLBACKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "survey_identity_fallbacks_total",
        "Sessions that fell back to a generated fingerprint",
        &["reason"]
    )
    .expect("survey_identity_fallbacks_total registration");

    pub static ref DRAFT_CACHE_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "survey_draft_cache_errors_total",
        "Draft cache operations that failed and were ignored",
        &["operation"]
    )
    .expect("survey_draft_cache_errors_total registration");

    pub static ref REWARD_FILE_FETCHES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "reward_file_fetches_total",
        "Reward file retrievals by status",
        &["status"]
    )
    .expect("reward_file_fetches_total registration");
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

pub fn record_response(outcome: &str) {
    SURVEY_RESPONSES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_redemption(outcome: &str) {
    REWARD_REDEMPTIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_redemption_retry(constraint: &str) {
    REDEMPTION_RETRIES_TOTAL.with_label_values(&[constraint]).inc();
}

pub fn record_identity_fallback(reason: &str) {
    IDENTITY_FALLBACKS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_draft_cache_error(operation: &str) {
    DRAFT_CACHE_ERRORS_TOTAL.with_label_values(&[operation]).inc();
}

pub fn record_reward_file_fetch(success: bool) {
    let status = if success { "success" } else { "failure" };
    REWARD_FILE_FETCHES_TOTAL.with_label_values(&[status]).inc();
}

/// Text exposition of every registered metric.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
