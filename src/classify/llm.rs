// src/classify/llm.rs
// Optional LLM-assisted classification with deterministic fallback
//
// Any failure mode here (backend error, timeout, unparseable reply) returns
// the deterministic result instead of propagating, so classification never
// fails ingestion.

use std::str::FromStr;
use std::time::Duration;
use strum::IntoEnumIterator;
use tracing::{debug, warn};

use crate::llm::LlmBackend;
use crate::types::{Category, Classification};

/// Confidence assigned when the LLM agrees on a parseable category.
const LLM_CONFIDENCE_FLOOR: f32 = 0.75;

pub fn build_prompt(text: &str) -> String {
    let categories: Vec<String> = Category::iter().map(|c| c.to_string()).collect();
    format!(
        "Classify the following text into exactly one of these categories: {}.\n\
         Respond with only the category name.\n\nText:\n{}",
        categories.join(", "),
        text
    )
}

/// Parse a category token out of a model reply. Tolerates surrounding
/// whitespace, punctuation, and prose around the token.
pub fn parse_category_reply(reply: &str) -> Option<Category> {
    let cleaned = reply.trim().to_lowercase();
    let first_token: String = cleaned
        .split_whitespace()
        .next()?
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();

    if let Ok(category) = Category::from_str(&first_token) {
        return Some(category);
    }

    // Fall back to scanning the whole reply for a known name
    Category::iter().find(|c| cleaned.contains(&c.to_string()))
}

/// Run the LLM classification path, falling back to `deterministic` on any
/// error or timeout.
pub async fn classify_with_llm(
    backend: &dyn LlmBackend,
    text: &str,
    deterministic: Classification,
    timeout: Duration,
) -> Classification {
    let prompt = build_prompt(text);

    match tokio::time::timeout(timeout, backend.complete(&prompt)).await {
        Ok(Ok(reply)) => match parse_category_reply(&reply) {
            Some(category) => Classification {
                category,
                confidence: deterministic.confidence.max(LLM_CONFIDENCE_FLOOR),
                matched: vec!["llm".to_string()],
            },
            None => {
                debug!(reply = %reply, "Unparseable LLM classification, using deterministic result");
                deterministic
            }
        },
        Ok(Err(e)) => {
            warn!(error = %e, "LLM classification failed, using deterministic result");
            deterministic
        }
        Err(_) => {
            warn!("LLM classification timed out, using deterministic result");
            deterministic
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_token() {
        assert_eq!(parse_category_reply("fact"), Some(Category::Fact));
        assert_eq!(parse_category_reply("  Task \n"), Some(Category::Task));
    }

    #[test]
    fn test_parse_with_punctuation() {
        assert_eq!(parse_category_reply("\"procedure\"."), Some(Category::Procedure));
    }

    #[test]
    fn test_parse_embedded_in_prose() {
        assert_eq!(
            parse_category_reply("The category is: conversation"),
            Some(Category::Conversation)
        );
    }

    #[test]
    fn test_parse_garbage_returns_none() {
        assert_eq!(parse_category_reply("no idea"), None);
        assert_eq!(parse_category_reply(""), None);
    }

    #[test]
    fn test_prompt_lists_all_categories() {
        let prompt = build_prompt("some text");
        assert!(prompt.contains("fact"));
        assert!(prompt.contains("greeting"));
        assert!(prompt.contains("some text"));
    }
}
