// src/classify/patterns.rs
// Static pattern tables for deterministic classification
//
// Matching is O(len(text)) per pattern with no network calls, so ingestion
// never blocks on classification. Adding a category is a table edit here
// plus an intent mapping entry in search/mod.rs.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{Category, Intent};

/// One weighted pattern. `name` surfaces in `Classification::matched`.
pub struct WeightedPattern {
    pub name: &'static str,
    pub regex: Regex,
    pub weight: f32,
}

fn pat(name: &'static str, re: &str, weight: f32) -> WeightedPattern {
    WeightedPattern {
        name,
        regex: Regex::new(re).expect("static pattern must compile"),
        weight,
    }
}

/// Category patterns, matched against lowercased input.
/// Declaration order is the final tie-break, so keep it stable.
pub static CATEGORY_PATTERNS: Lazy<Vec<(Category, Vec<WeightedPattern>)>> = Lazy::new(|| {
    vec![
        (
            Category::Question,
            vec![
                pat("question_mark", r"\?\s*$", 2.0),
                pat("wh_start", r"^(who|what|when|where|why|which|how)\b", 1.5),
                pat(
                    "aux_start",
                    r"^(is|are|can|could|would|should|do|does|did|will)\b",
                    1.0,
                ),
            ],
        ),
        (
            Category::Task,
            vec![
                pat(
                    "task_marker",
                    r"\b(remember to|don't forget to|need to|have to|must)\b",
                    2.0,
                ),
                pat("task_noun", r"\b(todo|to-do|deadline|due)\b", 1.5),
                pat(
                    "by_deadline",
                    r"\bby (monday|tuesday|wednesday|thursday|friday|saturday|sunday|tomorrow|tonight|end of (day|week))\b",
                    1.5,
                ),
            ],
        ),
        (
            Category::Fact,
            vec![
                pat("located", r"\b(is|are|was|were) (at|in|on|located)\b", 2.5),
                pat("copula", r"\b(is|are|was|were) (a|an|the)\b", 1.5),
                pat("defines", r"\b(means|equals|costs?|contains)\b", 1.5),
            ],
        ),
        (
            Category::Concept,
            vec![pat(
                "concept_marker",
                r"\b(concept|theory|principle|paradigm|definition of|refers to|means that)\b",
                2.0,
            )],
        ),
        (
            Category::Code,
            vec![
                pat("code_fence", r"```", 3.0),
                pat(
                    "code_keyword",
                    r"\b(fn|def|impl|struct|enum|function|import|async fn)\s+\w+",
                    2.5,
                ),
                pat("source_ext", r"\.(rs|py|js|ts|go|java|cpp|h)\b", 1.5),
                pat("code_symbols", r"(=>|::|->|\{\}|\(\))", 1.0),
            ],
        ),
        (
            Category::Procedure,
            vec![
                pat("how_to", r"\bhow to\b", 1.5),
                pat(
                    "step_words",
                    r"\b(step \d|first,|then,|next,|finally,|in order to)\b",
                    1.5,
                ),
                pat(
                    "imperative",
                    r"^(install|configure|run|open|click|select|restart)\b",
                    1.5,
                ),
                pat("numbered_list", r"(?m)^\s*\d+[.)]\s", 2.0),
            ],
        ),
        (
            Category::Workflow,
            vec![pat(
                "workflow_marker",
                r"\b(workflow|pipeline|approval|handoff|staging)\b",
                2.0,
            )],
        ),
        (
            Category::Conversation,
            vec![pat(
                "speech_marker",
                r"\b(said|told|asked|replied|mentioned|discussed|talked about)\b",
                1.5,
            )],
        ),
        (
            Category::Greeting,
            vec![pat(
                "greeting_start",
                r"^(hi|hello|hey|good (morning|afternoon|evening)|thanks|thank you|bye|goodbye|see you)\b",
                3.0,
            )],
        ),
        (
            Category::Document,
            vec![pat(
                "document_noun",
                r"\b(report|document|pdf|spreadsheet|presentation|slides?|memo|invoice)\b",
                1.5,
            )],
        ),
        (
            Category::Image,
            vec![
                pat(
                    "image_noun",
                    r"\b(image|screenshot|photo|picture|diagram)\b",
                    2.0,
                ),
                pat("image_ext", r"\.(png|jpe?g|gif|svg|webp)\b", 2.0),
            ],
        ),
        (
            Category::Reference,
            vec![
                pat("url", r"https?://", 2.5),
                pat(
                    "reference_marker",
                    r"\b(see also|refer to|reference|documentation|docs at|link to)\b",
                    1.5,
                ),
            ],
        ),
        (
            Category::Event,
            vec![
                pat(
                    "event_noun",
                    r"\b(meeting|appointment|call (at|with)|happened|occurred|scheduled)\b",
                    1.5,
                ),
                pat(
                    "time_marker",
                    r"\b(at \d{1,2}(:\d{2})?\s?(am|pm)|yesterday at|tomorrow at|today at)\b",
                    1.0,
                ),
            ],
        ),
        (
            Category::Preference,
            vec![pat(
                "preference_marker",
                r"\b(prefer|favorite|favourite|always use|never use|i like|i love|i hate|rather than)\b",
                2.0,
            )],
        ),
        (
            Category::Error,
            vec![pat(
                "error_marker",
                r"\b(error|exception|failed|failure|crashed?|panic|traceback|stack trace|segfault)\b",
                2.0,
            )],
        ),
    ]
});

/// Query intent patterns, matched against lowercased query text.
pub static INTENT_PATTERNS: Lazy<Vec<(Intent, Vec<WeightedPattern>)>> = Lazy::new(|| {
    vec![
        (
            Intent::GetTasks,
            vec![
                pat(
                    "task_query",
                    r"\b(to.?do|tasks?|need to (do|finish)|have to do|deadlines?|due)\b",
                    2.0,
                ),
                pat("what_should_i", r"\bwhat (do|must|should) i\b", 1.5),
            ],
        ),
        (
            Intent::FindProcedure,
            vec![
                pat("how_query", r"\bhow (do|to|can|did)\b", 2.0),
                pat(
                    "procedure_query",
                    r"\b(steps?|procedure|process for|instructions)\b",
                    1.5,
                ),
            ],
        ),
        (
            Intent::RetrieveFact,
            vec![
                pat("wh_copula", r"^(what|when|where|who) (is|was|are|were)\b", 2.0),
                pat(
                    "fact_query",
                    r"\b(remind me what|what did i say about|fact)\b",
                    1.0,
                ),
            ],
        ),
        (
            Intent::SearchConversation,
            vec![pat(
                "conversation_query",
                r"\b(conversation|chat|said|discussed|talked|told me)\b",
                2.0,
            )],
        ),
        (
            Intent::LocateCode,
            vec![pat(
                "code_query",
                r"\b(code|function|class|method|implementation|snippet)\b",
                2.0,
            )],
        ),
        (
            Intent::FindDocument,
            vec![pat(
                "document_query",
                r"\b(document|report|pdf|presentation|spreadsheet)\b",
                2.0,
            )],
        ),
    ]
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_category_patterns_compile() {
        // Forcing the Lazy is the test: a bad pattern panics here
        assert_eq!(CATEGORY_PATTERNS.len(), 15);
    }

    #[test]
    fn test_intent_tables_cover_all_but_general() {
        // GeneralSearch is the fallback, not a pattern entry
        assert_eq!(INTENT_PATTERNS.len(), 6);
    }
}
