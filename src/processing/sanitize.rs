//! Helpers for normalizing caller-supplied provenance.

use super::types::{DEFAULT_SOURCE_ID, DocumentSource};

/// Sanitize arbitrary string input by trimming whitespace and dropping empties.
pub(crate) fn sanitize_string(value: Option<String>) -> Option<String> {
    value.and_then(|input| {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Normalize `source_id` values, falling back to [`DEFAULT_SOURCE_ID`] when absent.
pub fn sanitize_source_id(value: Option<String>) -> String {
    sanitize_string(value).unwrap_or_else(|| DEFAULT_SOURCE_ID.to_string())
}

/// Keep only absolute `http`/`https` URLs.
pub fn sanitize_url(value: Option<String>) -> Option<String> {
    sanitize_string(value).filter(|candidate| {
        let accepted = reqwest::Url::parse(candidate)
            .map(|url| matches!(url.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !accepted {
            tracing::debug!(url = %candidate, "Dropping non-HTTP provenance URL");
        }
        accepted
    })
}

/// Trim every provenance field and apply defaults.
pub(crate) fn normalize_source(source: &DocumentSource) -> DocumentSource {
    DocumentSource {
        source_id: Some(sanitize_source_id(source.source_id.clone())),
        title: sanitize_string(source.title.clone()),
        url: sanitize_url(source.url.clone()),
        published_at: source.published_at,
    }
}
