//! Cache key generation utilities

/// Generate cache key for an in-progress survey draft
pub fn survey_draft(slug: &str) -> String {
    format!("survey_draft:{}", slug)
}

/// Draft key namespaced to one device on a shared cache
pub fn survey_draft_for(slug: &str, scope: Option<&str>) -> String {
    match scope {
        Some(scope) => format!("{}:{}", survey_draft(slug), scope),
        None => survey_draft(slug),
    }
}
