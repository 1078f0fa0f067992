//! Recover a [`StructuredAnswer`] from a language model reply.
//!
//! Models are asked for a JSON object but often wrap it in a fenced code block, with or without
//! a `json` language tag. Each [`AnswerFormat`] extracts one candidate; formats are tried in
//! [`AnswerFormat::PRIORITY`] order and the first candidate that decodes wins.

use super::types::{AnswerError, StructuredAnswer};

const FENCE: &str = "```";

/// A convention a model may use to present its JSON answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerFormat {
    /// Fenced code block; `tag` is the required language tag (`None` for an untagged fence).
    FencedJson {
        /// Language tag following the opening fence.
        tag: Option<&'static str>,
    },
    /// The whole reply is the JSON object.
    Bare,
}

impl AnswerFormat {
    /// Order in which formats are attempted, strictest first.
    pub const PRIORITY: [Self; 3] = [
        Self::FencedJson { tag: Some("json") },
        Self::FencedJson { tag: None },
        Self::Bare,
    ];

    /// Slice of `raw` this format would decode, if the reply uses it.
    pub fn candidate<'a>(&self, raw: &'a str) -> Option<&'a str> {
        match self {
            Self::FencedJson { tag } => fenced_block(raw, tag.unwrap_or("")),
            Self::Bare => Some(raw.trim()),
        }
    }
}

/// Body of the first fence whose info string equals `tag`, up to the last closing fence.
fn fenced_block<'a>(raw: &'a str, tag: &str) -> Option<&'a str> {
    let mut offset = 0;
    while let Some(found) = raw[offset..].find(FENCE) {
        let info_start = offset + found + FENCE.len();
        let line_end = raw[info_start..]
            .find('\n')
            .map(|idx| info_start + idx)?;
        let info = raw[info_start..line_end].trim();

        if info == tag {
            let body_start = line_end + 1;
            let body_end = raw[body_start..].rfind(FENCE).map(|idx| body_start + idx)?;
            return Some(raw[body_start..body_end].trim());
        }
        offset = info_start;
    }
    None
}

/// Parse a model reply into a structured answer.
///
/// Fails with [`AnswerError::UnparsableAnswer`] carrying the reply unchanged when no format
/// yields a JSON object with a non-empty `answer` and a valid `confidence`.
pub fn extract(raw: &str) -> Result<StructuredAnswer, AnswerError> {
    let mut reason = String::from("reply is empty");

    for format in AnswerFormat::PRIORITY {
        let Some(candidate) = format.candidate(raw) else {
            continue;
        };
        if candidate.is_empty() {
            continue;
        }

        match serde_json::from_str::<StructuredAnswer>(candidate) {
            Ok(answer) if answer.answer.trim().is_empty() => {
                reason = "answer field is empty".to_string();
            }
            Ok(answer) => {
                tracing::trace!(format = ?format, "Extracted structured answer");
                return Ok(answer);
            }
            Err(error) => {
                tracing::trace!(format = ?format, error = %error, "Answer candidate rejected");
                reason = error.to_string();
            }
        }
    }

    tracing::warn!(reason = %reason, raw_chars = raw.chars().count(), "Unparsable model answer");
    Err(AnswerError::UnparsableAnswer {
        raw: raw.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::Confidence;

    fn sample() -> StructuredAnswer {
        StructuredAnswer {
            answer: "Alpha methods are fast.".into(),
            relevant_context: Some("Alpha methods are fast. Beta methods are slower.".into()),
            confidence: Some(Confidence::High),
        }
    }

    #[test]
    fn reads_every_supported_convention() {
        let answer = sample();
        let json = serde_json::to_string_pretty(&answer).expect("serialize");
        let replies = [
            format!("Here you go:\n```json\n{json}\n```\nHope that helps."),
            format!("```\n{json}\n```"),
            format!("  {json}\n"),
        ];

        for reply in replies {
            assert_eq!(extract(&reply).expect("answer"), answer, "reply: {reply}");
        }
    }

    #[test]
    fn tagged_fence_wins_over_untagged() {
        let reply = "```json\n{\"answer\": \"tagged\"}\n```\n";
        assert_eq!(extract(reply).expect("answer").answer, "tagged");
        assert_eq!(
            AnswerFormat::FencedJson { tag: None }.candidate("```\n{}\n```"),
            Some("{}")
        );
        assert_eq!(AnswerFormat::FencedJson { tag: Some("json") }.candidate("```\n{}\n```"), None);
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let answer = extract(r#"{"answer": "unknown", "extra": 1}"#).expect("answer");
        assert_eq!(answer.answer, "unknown");
        assert!(answer.relevant_context.is_none());
        assert!(answer.confidence.is_none());
    }

    #[test]
    fn confidence_is_case_sensitive() {
        let error = extract(r#"{"answer": "x", "confidence": "High"}"#).unwrap_err();
        assert!(matches!(error, AnswerError::UnparsableAnswer { .. }));

        let error = extract(r#"{"answer": "x", "confidence": "certain"}"#).unwrap_err();
        assert!(matches!(error, AnswerError::UnparsableAnswer { .. }));
    }

    #[test]
    fn failure_preserves_raw_reply() {
        let raw = "  I could not find anything relevant.\n```\nnot json\n```  ";
        let error = extract(raw).unwrap_err();
        assert_eq!(error.raw(), raw);
    }

    #[test]
    fn empty_answer_is_rejected() {
        let error = extract(r#"{"answer": "   "}"#).unwrap_err();
        assert!(matches!(error, AnswerError::UnparsableAnswer { ref reason, .. } if reason.contains("empty")));
        assert!(extract("").is_err());
    }
}
