use serde::Serialize;

use super::models::{AnswerValue, Question, QuestionKind};

// ============================================================================
// FIELD ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldError {
    #[error("Question {question_id} is required")]
    Required { question_id: String },

    #[error("Question {question_id} does not accept this kind of answer")]
    KindMismatch { question_id: String },

    #[error("'{value}' is not an option of question {question_id}")]
    UnknownOption { question_id: String, value: String },

    #[error("Question {question_id} expects a value between {min} and {max}")]
    OutOfRange { question_id: String, min: i64, max: i64 },

    #[error("Question {question_id} accepts at most {max_length} characters")]
    TooLong { question_id: String, max_length: usize },
}

impl FieldError {
    pub fn question_id(&self) -> &str {
        match self {
            Self::Required { question_id }
            | Self::KindMismatch { question_id }
            | Self::UnknownOption { question_id, .. }
            | Self::OutOfRange { question_id, .. }
            | Self::TooLong { question_id, .. } => question_id,
        }
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

/// Check a candidate answer for `question`.
///
/// Returns the value to merge into the answer map, or `None` when nothing
/// should be stored (info blocks and skipped optional questions).
pub fn validate_answer(
    question: &Question,
    value: Option<AnswerValue>,
) -> Result<Option<AnswerValue>, FieldError> {
    if !question.is_answerable() {
        return Ok(None);
    }

    let value = match value {
        Some(value) if !value.is_blank() => value,
        _ if question.required => {
            return Err(FieldError::Required {
                question_id: question.id.clone(),
            })
        }
        _ => return Ok(None),
    };

    let id = || question.id.clone();

    match (&question.kind, value) {
        (QuestionKind::ShortText { max_length } | QuestionKind::LongText { max_length }, AnswerValue::Text(text)) => {
            let text = text.trim().to_string();
            if let Some(max_length) = *max_length {
                if text.chars().count() > max_length {
                    return Err(FieldError::TooLong { question_id: id(), max_length });
                }
            }
            Ok(Some(AnswerValue::Text(text)))
        }

        (QuestionKind::SingleChoice { options }, AnswerValue::Text(choice)) => {
            let choice = choice.trim().to_string();
            check_option(options, &choice, id)?;
            Ok(Some(AnswerValue::Text(choice)))
        }

        (QuestionKind::MultipleChoice { options }, AnswerValue::Many(choices)) => {
            let mut kept: Vec<String> = Vec::with_capacity(choices.len());
            for choice in choices.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
                check_option(options, choice, id)?;
                if !kept.iter().any(|k| k == choice) {
                    kept.push(choice.to_string());
                }
            }
            Ok(Some(AnswerValue::Many(kept)))
        }

        (QuestionKind::MultipleChoice { options }, AnswerValue::Text(choice)) => {
            let choice = choice.trim().to_string();
            check_option(options, &choice, id)?;
            Ok(Some(AnswerValue::Many(vec![choice])))
        }

        (QuestionKind::Scale { min, max }, value) => {
            let number = match value {
                AnswerValue::Number(n) => n,
                AnswerValue::Text(text) => text
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| FieldError::KindMismatch { question_id: id() })?,
                AnswerValue::Many(_) => return Err(FieldError::KindMismatch { question_id: id() }),
            };
            if number < *min || number > *max {
                return Err(FieldError::OutOfRange {
                    question_id: id(),
                    min: *min,
                    max: *max,
                });
            }
            Ok(Some(AnswerValue::Number(number)))
        }

        _ => Err(FieldError::KindMismatch { question_id: id() }),
    }
}

/// An empty option list accepts free values.
fn check_option(
    options: &[String],
    choice: &str,
    id: impl Fn() -> String,
) -> Result<(), FieldError> {
    if options.is_empty() || options.iter().any(|option| option == choice) {
        Ok(())
    } else {
        Err(FieldError::UnknownOption {
            question_id: id(),
            value: choice.to_string(),
        })
    }
}
