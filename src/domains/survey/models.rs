//! Campaign schema, answers and persisted survey responses

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domains::identity::Identity;
use crate::domains::rewards::models::Reward;

// ======================================================================
// CAMPAIGN
// ======================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Active,
    Ended,
}

/// Why a campaign no longer (or not yet) accepts participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosedReason {
    Ended,
    Expired,
    NotStarted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub form_schema: Vec<Section>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: CampaignStatus,
    pub consent_text: Option<String>,
    #[serde(default)]
    pub rewards: Vec<Reward>,
}

impl Campaign {
    /// Drafts stay open for previews; an ended status always closes.
    pub fn closed_reason(&self, now: DateTime<Utc>) -> Option<ClosedReason> {
        match self.status {
            CampaignStatus::Draft => None,
            CampaignStatus::Ended => Some(ClosedReason::Ended),
            CampaignStatus::Active => {
                if self.end_date.map_or(false, |end| end < now) {
                    Some(ClosedReason::Expired)
                } else if self.start_date.map_or(false, |start| start > now) {
                    Some(ClosedReason::NotStarted)
                } else {
                    None
                }
            }
        }
    }

    pub fn requires_consent(&self) -> bool {
        self.consent_text
            .as_deref()
            .map_or(false, |text| !text.trim().is_empty())
    }

    pub fn has_rewards(&self) -> bool {
        !self.rewards.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub target_roles: Vec<String>,
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl Section {
    pub fn is_role_agnostic(&self) -> bool {
        self.target_roles.is_empty()
    }
}

// ======================================================================
// QUESTIONS
// ======================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub depends_on: Option<Dependency>,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    ShortText {
        #[serde(default)]
        max_length: Option<usize>,
    },
    LongText {
        #[serde(default)]
        max_length: Option<usize>,
    },
    SingleChoice {
        #[serde(default)]
        options: Vec<String>,
    },
    MultipleChoice {
        #[serde(default)]
        options: Vec<String>,
    },
    Scale {
        #[serde(default = "default_scale_min")]
        min: i64,
        #[serde(default = "default_scale_max")]
        max: i64,
    },
    Info,
}

fn default_scale_min() -> i64 {
    1
}

fn default_scale_max() -> i64 {
    5
}

impl Question {
    /// `info` blocks carry no answer.
    pub fn is_answerable(&self) -> bool {
        !matches!(self.kind, QuestionKind::Info)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub question_id: String,
    pub value: AnswerValue,
}

/// A flattened question annotated with the section it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedQuestion {
    pub section_id: String,
    pub section_title: String,
    pub question: Question,
}

// ======================================================================
// ANSWERS
// ======================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Many(Vec<String>),
    Number(i64),
    Text(String),
}

impl AnswerValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn many<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Many(values.into_iter().map(Into::into).collect())
    }

    /// String form used for dependency comparison.
    pub fn normalized(&self) -> String {
        match self {
            Self::Text(text) => text.trim().to_string(),
            Self::Number(n) => n.to_string(),
            Self::Many(items) => items
                .iter()
                .map(|item| item.trim())
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Number(_) => false,
            Self::Many(items) => items.iter().all(|item| item.trim().is_empty()),
        }
    }
}

/// Answers collected so far, keyed by question id. Entries are only ever
/// added or replaced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerMap(BTreeMap<String, AnswerValue>);

impl AnswerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, question_id: &str) -> Option<&AnswerValue> {
        self.0.get(question_id)
    }

    pub fn merge(&mut self, question_id: impl Into<String>, value: AnswerValue) {
        self.0.insert(question_id.into(), value);
    }

    /// Restore answers from a cached draft without dropping anything already held.
    pub fn absorb(&mut self, other: AnswerMap) {
        for (id, value) in other.0 {
            self.0.entry(id).or_insert(value);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AnswerValue)> {
        self.0.iter()
    }
}

impl<K: Into<String>> FromIterator<(K, AnswerValue)> for AnswerMap {
    fn from_iter<T: IntoIterator<Item = (K, AnswerValue)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

// ======================================================================
// RESPONSES
// ======================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyResponse {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub identity: Identity,
    pub profile_role: Option<String>,
    pub response_data: AnswerMap,
    pub is_test: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSurveyResponse {
    pub campaign_id: Uuid,
    pub identity: Identity,
    pub profile_role: Option<String>,
    pub response_data: AnswerMap,
    pub is_test: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn campaign(status: CampaignStatus) -> Campaign {
        Campaign {
            id: Uuid::new_v4(),
            slug: "censo-2025".to_string(),
            title: "Censo".to_string(),
            form_schema: vec![],
            start_date: None,
            end_date: None,
            status,
            consent_text: None,
            rewards: vec![],
        }
    }

    #[test]
    fn test_question_kind_deserialize() {
        let question: Question = serde_json::from_value(json!({
            "id": "q1",
            "title": "Você frequenta um terreiro?",
            "type": "single_choice",
            "required": true,
            "options": ["sim", "não"]
        }))
        .unwrap();

        assert!(question.required);
        assert_eq!(
            question.kind,
            QuestionKind::SingleChoice {
                options: vec!["sim".to_string(), "não".to_string()]
            }
        );

        let info: Question = serde_json::from_value(json!({"id": "i1", "type": "info"})).unwrap();
        assert!(!info.is_answerable());

        let scale: Question = serde_json::from_value(json!({"id": "s1", "type": "scale"})).unwrap();
        assert_eq!(scale.kind, QuestionKind::Scale { min: 1, max: 5 });
    }

    #[test]
    fn test_dependency_value_forms() {
        let dep: Dependency =
            serde_json::from_value(json!({"question_id": "q1", "value": "yes"})).unwrap();
        assert_eq!(dep.value, AnswerValue::text("yes"));

        let dep: Dependency =
            serde_json::from_value(json!({"question_id": "q1", "value": 3})).unwrap();
        assert_eq!(dep.value, AnswerValue::Number(3));
    }

    #[test]
    fn test_closed_reason() {
        let now = Utc::now();

        let mut c = campaign(CampaignStatus::Active);
        assert_eq!(c.closed_reason(now), None);

        c.end_date = Some(now - Duration::days(1));
        assert_eq!(c.closed_reason(now), Some(ClosedReason::Expired));

        c.status = CampaignStatus::Draft;
        assert_eq!(c.closed_reason(now), None);

        let mut c = campaign(CampaignStatus::Active);
        c.start_date = Some(now + Duration::days(1));
        assert_eq!(c.closed_reason(now), Some(ClosedReason::NotStarted));

        assert_eq!(
            campaign(CampaignStatus::Ended).closed_reason(now),
            Some(ClosedReason::Ended)
        );
    }

    #[test]
    fn test_answer_map_never_drops_on_absorb() {
        let mut answers: AnswerMap = [("q1", AnswerValue::text("a"))].into_iter().collect();
        let draft: AnswerMap = [
            ("q1", AnswerValue::text("stale")),
            ("q2", AnswerValue::Number(4)),
        ]
        .into_iter()
        .collect();

        answers.absorb(draft);
        assert_eq!(answers.len(), 2);
        assert_eq!(answers.get("q1"), Some(&AnswerValue::text("a")));
    }

    #[test]
    fn test_normalized() {
        assert_eq!(AnswerValue::text("  sim ").normalized(), "sim");
        assert_eq!(AnswerValue::Number(7).normalized(), "7");
        assert!(AnswerValue::many(Vec::<String>::new()).is_blank());
        assert!(AnswerValue::text("   ").is_blank());
    }
}
