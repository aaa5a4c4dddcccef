use super::models::{ResolvedQuestion, Section};

/// Role that always sees every section.
pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("Survey not found or unavailable: the campaign has no sections")]
    SchemaEmpty,
}

/// Whether `section` is shown to a participant holding `role`.
///
/// Without a role only role-agnostic sections qualify, which lets the flow
/// report "no questions yet" before the role picker.
pub fn section_applies(section: &Section, role: Option<&str>) -> bool {
    if section.is_role_agnostic() {
        return true;
    }
    match role {
        Some(ADMIN_ROLE) => true,
        Some(role) => section.target_roles.iter().any(|target| target == role),
        None => false,
    }
}

/// Flatten the sections applicable to `role` into one ordered question list.
pub fn resolve(
    schema: &[Section],
    role: Option<&str>,
) -> Result<Vec<ResolvedQuestion>, SchemaError> {
    if schema.is_empty() {
        return Err(SchemaError::SchemaEmpty);
    }

    Ok(schema
        .iter()
        .filter(|section| section_applies(section, role))
        .flat_map(|section| {
            section.questions.iter().map(move |question| ResolvedQuestion {
                section_id: section.id.clone(),
                section_title: section.title.clone(),
                question: question.clone(),
            })
        })
        .collect())
}

/// Distinct target roles in first-seen order, for the role picker.
pub fn available_roles(schema: &[Section]) -> Vec<String> {
    let mut roles: Vec<String> = Vec::new();
    for role in schema.iter().flat_map(|section| section.target_roles.iter()) {
        if !roles.contains(role) {
            roles.push(role.clone());
        }
    }
    roles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::survey::models::{Question, QuestionKind};

    fn question(id: &str) -> Question {
        Question {
            id: id.to_string(),
            title: id.to_uppercase(),
            required: false,
            depends_on: None,
            kind: QuestionKind::ShortText { max_length: None },
        }
    }

    fn section(id: &str, roles: &[&str], questions: &[&str]) -> Section {
        Section {
            id: id.to_string(),
            title: format!("Section {}", id),
            target_roles: roles.iter().map(|r| r.to_string()).collect(),
            questions: questions.iter().map(|q| question(q)).collect(),
        }
    }

    fn ids(resolved: &[ResolvedQuestion]) -> Vec<&str> {
        resolved.iter().map(|r| r.question.id.as_str()).collect()
    }

    fn schema() -> Vec<Section> {
        vec![
            section("A", &[], &["a1", "a2"]),
            section("B", &["lider_terreiro"], &["b1"]),
            section("C", &["frequentador", "lider_terreiro"], &["c1", "c2"]),
        ]
    }

    #[test]
    fn test_role_unset_only_role_agnostic() {
        let resolved = resolve(&schema(), None).unwrap();
        assert_eq!(ids(&resolved), vec!["a1", "a2"]);
    }

    #[test]
    fn test_flattening_order_for_role() {
        let resolved = resolve(&schema(), Some("lider_terreiro")).unwrap();
        assert_eq!(ids(&resolved), vec!["a1", "a2", "b1", "c1", "c2"]);
        assert_eq!(resolved[2].section_id, "B");
        assert_eq!(resolved[2].section_title, "Section B");

        let resolved = resolve(&schema(), Some("frequentador")).unwrap();
        assert_eq!(ids(&resolved), vec!["a1", "a2", "c1", "c2"]);
    }

    #[test]
    fn test_admin_sees_everything() {
        let resolved = resolve(&schema(), Some(ADMIN_ROLE)).unwrap();
        assert_eq!(resolved.len(), 5);
    }

    #[test]
    fn test_schema_empty_is_distinct_from_no_questions() {
        assert_eq!(resolve(&[], None), Err(SchemaError::SchemaEmpty));

        let only_targeted = vec![section("B", &["lider_terreiro"], &["b1"])];
        assert!(resolve(&only_targeted, None).unwrap().is_empty());
    }

    #[test]
    fn test_available_roles() {
        assert_eq!(
            available_roles(&schema()),
            vec!["lider_terreiro".to_string(), "frequentador".to_string()]
        );
    }
}
