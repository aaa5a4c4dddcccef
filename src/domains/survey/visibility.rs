use super::models::{AnswerMap, AnswerValue, Question, ResolvedQuestion};

/// Whether `question`'s dependency is satisfied by `answers`.
///
/// Total: an unanswered dependency means the question is skipped.
pub fn is_visible(question: &Question, answers: &AnswerMap) -> bool {
    let Some(dependency) = &question.depends_on else {
        return true;
    };

    let target = dependency.value.normalized();
    match answers.get(&dependency.question_id) {
        None => false,
        Some(AnswerValue::Many(items)) => items.iter().any(|item| item.trim() == target),
        Some(stored) => stored.normalized() == target,
    }
}

/// First visible index strictly after `from`.
pub fn next_visible(
    questions: &[ResolvedQuestion],
    from: usize,
    answers: &AnswerMap,
) -> Option<usize> {
    questions
        .iter()
        .enumerate()
        .skip(from + 1)
        .find(|(_, resolved)| is_visible(&resolved.question, answers))
        .map(|(index, _)| index)
}

/// Last visible index strictly before `from`.
pub fn previous_visible(
    questions: &[ResolvedQuestion],
    from: usize,
    answers: &AnswerMap,
) -> Option<usize> {
    questions[..from.min(questions.len())]
        .iter()
        .rposition(|resolved| is_visible(&resolved.question, answers))
}

/// First visible index from the start of the list.
pub fn first_visible(questions: &[ResolvedQuestion], answers: &AnswerMap) -> Option<usize> {
    questions
        .iter()
        .position(|resolved| is_visible(&resolved.question, answers))
}

/// Whether `index` is the last question the participant can reach.
///
/// A later question still counts as reachable while it depends on the
/// question at `index` or on one after it, since that answer is not settled.
pub fn is_last_visible(questions: &[ResolvedQuestion], index: usize, answers: &AnswerMap) -> bool {
    let position = |question_id: &str| {
        questions
            .iter()
            .position(|resolved| resolved.question.id == question_id)
    };

    !questions.iter().skip(index + 1).any(|resolved| {
        if is_visible(&resolved.question, answers) {
            return true;
        }
        resolved
            .question
            .depends_on
            .as_ref()
            .and_then(|dependency| position(&dependency.question_id))
            .is_some_and(|target| target >= index)
    })
}
