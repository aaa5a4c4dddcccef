//! Reward models: rewards, the single redemption row and claim input

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::db::StoreError;
use crate::domains::identity::Identity;

// ======================================================================
// REWARDS
// ======================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardKind {
    Draw,
    Pdf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    pub id: Uuid,
    pub campaign_id: Uuid,
    #[serde(rename = "type")]
    pub kind: RewardKind,
    pub title: String,
    #[serde(default)]
    pub draw_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub file_url: Option<String>,
}

impl Reward {
    pub fn is_draw(&self) -> bool {
        self.kind == RewardKind::Draw
    }

    pub fn is_pdf(&self) -> bool {
        self.kind == RewardKind::Pdf
    }
}

// ======================================================================
// REDEMPTIONS
// ======================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedemptionMetadata {
    pub redeemed_at: DateTime<Utc>,
    pub sensitive_consent: bool,
    /// Always true: the row covers every reward of the campaign.
    pub single_entry: bool,
}

impl RedemptionMetadata {
    pub fn new(redeemed_at: DateTime<Utc>, sensitive_consent: bool) -> Self {
        Self {
            redeemed_at,
            sensitive_consent,
            single_entry: true,
        }
    }
}

/// The one authoritative redemption of an identity for a campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardRedemption {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub identity: Identity,
    /// Anchor reward the row references.
    pub reward_id: Uuid,
    pub lucky_number: Option<i64>,
    pub redemption_code: Option<String>,
    pub contact_whatsapp: Option<String>,
    pub contact_email: Option<String>,
    pub metadata: RedemptionMetadata,
}

impl RewardRedemption {
    /// Lucky numbers are shown zero-padded to five digits.
    pub fn formatted_lucky_number(&self) -> Option<String> {
        self.lucky_number.map(format_lucky_number)
    }
}

pub fn format_lucky_number(number: i64) -> String {
    format!("{:05}", number)
}

/// Insert payload; the store assigns `lucky_number` when asked to.
#[derive(Debug, Clone)]
pub struct NewRedemption {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub identity: Identity,
    pub reward_id: Uuid,
    pub redemption_code: Option<String>,
    pub assign_lucky_number: bool,
    pub contact_whatsapp: Option<String>,
    pub contact_email: Option<String>,
    pub metadata: RedemptionMetadata,
}

// ======================================================================
// CLAIM INPUT
// ======================================================================

lazy_static! {
    static ref NON_DIGIT: Regex = Regex::new(r"\D").expect("static regex");
}

/// Digits of a WhatsApp number, separators removed.
pub fn whatsapp_digits(raw: &str) -> String {
    NON_DIGIT.replace_all(raw, "").into_owned()
}

fn validate_whatsapp(value: &str) -> Result<(), ValidationError> {
    let digits = whatsapp_digits(value);
    if (10..=11).contains(&digits.len()) {
        Ok(())
    } else {
        let mut error = ValidationError::new("whatsapp");
        error.message = Some("WhatsApp must have 10 or 11 digits (DDD + number)".into());
        Err(error)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ContactForm {
    #[validate(custom(function = "validate_whatsapp"))]
    pub whatsapp: String,

    #[validate(email(message = "Email must be a valid email address"))]
    pub email: String,
}

impl ContactForm {
    pub fn new(whatsapp: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            whatsapp: whatsapp.into(),
            email: email.into(),
        }
    }

    /// Field messages of a failed validation, sorted by field name.
    pub fn check(&self) -> Result<(), Vec<String>> {
        self.validate().map_err(|errors| flatten_errors(&errors))
    }
}

fn flatten_errors(errors: &ValidationErrors) -> Vec<String> {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    fields
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field))
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClaimRequest {
    pub contact: Option<ContactForm>,
    #[serde(default)]
    pub sensitive_consent: bool,
}

// ======================================================================
// OUTCOMES
// ======================================================================

/// What a reward card shows after the claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RewardDisplay {
    LuckyNumber(String),
    RedemptionCode(String),
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewardDisplayItem {
    pub reward_id: Uuid,
    pub title: String,
    pub kind: RewardKind,
    pub display: RewardDisplay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimSource {
    Created,
    /// Returned an existing row, found up front or after losing an insert race.
    Existing,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClaimOutcome {
    /// The campaign offers nothing to claim.
    NoRewards,
    Redeemed {
        source: ClaimSource,
        redemption: RewardRedemption,
        displays: Vec<RewardDisplayItem>,
    },
}

impl ClaimOutcome {
    pub fn redemption(&self) -> Option<&RewardRedemption> {
        match self {
            Self::NoRewards => None,
            Self::Redeemed { redemption, .. } => Some(redemption),
        }
    }
}

// ======================================================================
// ERRORS
// ======================================================================

#[derive(Debug, thiserror::Error)]
pub enum RedemptionError {
    #[error("Contact form is invalid: {}", .errors.join("; "))]
    ContactValidation { errors: Vec<String> },

    #[error("Consent to process sensitive data is required to enter the draw")]
    ConsentRequired,

    #[error("Could not allocate a unique redemption after {attempts} attempts")]
    AllocationExhausted { attempts: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RedemptionError {
    /// Claim blockers the participant can fix by editing the form.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ContactValidation { .. } | Self::ConsentRequired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_whatsapp_digit_rules() {
        assert!(ContactForm::new("(71) 99876-5432", "mae@terreiro.org").check().is_ok());
        assert!(ContactForm::new("7133334444", "mae@terreiro.org").check().is_ok());

        let errors = ContactForm::new("99876-5432", "mae@terreiro.org")
            .check()
            .unwrap_err();
        assert_eq!(errors, vec!["WhatsApp must have 10 or 11 digits (DDD + number)"]);

        assert!(ContactForm::new("+55 71 99876 5432", "mae@terreiro.org")
            .check()
            .is_err());
    }

    #[test]
    fn test_email_rule() {
        let errors = ContactForm::new("71998765432", "not-an-email").check().unwrap_err();
        assert_eq!(errors, vec!["Email must be a valid email address"]);

        let errors = ContactForm::new("123", "nope").check().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_whatsapp_digits() {
        assert_eq!(whatsapp_digits("(71) 9 9876-5432"), "71998765432");
    }

    #[test]
    fn test_lucky_number_padding() {
        assert_eq!(format_lucky_number(427), "00427");
        assert_eq!(format_lucky_number(123456), "123456");
    }

    #[test]
    fn test_reward_deserialize() {
        let reward: Reward = serde_json::from_value(json!({
            "id": "6f9619ff-8b86-d011-b42d-00c04fc964ff",
            "campaign_id": "6f9619ff-8b86-d011-b42d-00c04fc964fe",
            "type": "pdf",
            "title": "Cartilha de direitos",
            "file_url": "https://cdn.example.org/cartilha.pdf"
        }))
        .unwrap();

        assert!(reward.is_pdf());
        assert!(reward.draw_at.is_none());
    }
}
