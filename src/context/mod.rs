// src/context/mod.rs
// Context assembly: retrieval results + conversation history -> a
// token-bounded prompt payload

mod budget;

pub use budget::TokenBudget;

use tracing::debug;

use crate::config::ContextConfig;
use crate::types::{ContextItem, ContextPayload, HistoryTurn, ScoredRecord};

pub struct ContextAssembler {
    budget: TokenBudget,
    config: ContextConfig,
}

impl ContextAssembler {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            budget: TokenBudget::new(),
            config,
        }
    }

    /// Assemble a payload from scored retrieval results (highest score
    /// first) and live conversation history.
    ///
    /// The last `reserved_history_turns` of history are always included,
    /// even if they alone approach the budget — recency of the live
    /// conversation takes precedence over archival relevance. Retrieved
    /// items are then appended greedily while the total estimate fits
    /// `max_tokens`.
    pub fn build_context(
        &self,
        query: &str,
        history: &[HistoryTurn],
        results: Vec<ScoredRecord>,
        max_tokens: usize,
        degraded: bool,
    ) -> ContextPayload {
        let reserved_start = history
            .len()
            .saturating_sub(self.config.reserved_history_turns);
        let reserved_history = &history[reserved_start..];

        // Greedy packing: re-render after each tentative add so the
        // estimate tracks the real formatted output, headers included.
        let mut included: Vec<&ScoredRecord> = Vec::new();
        for candidate in &results {
            included.push(candidate);
            let rendered = render(query, reserved_history, &included);
            if self.budget.estimate(&rendered) > max_tokens {
                included.pop();
            }
        }

        let formatted_text = render(query, reserved_history, &included);
        let token_estimate = self.budget.estimate(&formatted_text);

        let mut items: Vec<ContextItem> = included
            .iter()
            .map(|s| ContextItem::Memory {
                record_id: s.record.id,
                category: s.record.category,
                tier: s.record.tier,
                content: s.record.content.clone(),
                score: s.score,
            })
            .collect();
        items.extend(reserved_history.iter().map(|turn| ContextItem::History {
            role: turn.role.clone(),
            content: turn.content.clone(),
        }));

        debug!(
            memory_items = included.len(),
            history_turns = reserved_history.len(),
            token_estimate,
            "Context assembled"
        );

        ContextPayload {
            items,
            formatted_text,
            token_estimate,
            degraded,
        }
    }

    /// Ids of the memory records included in a payload, for access
    /// bookkeeping.
    pub fn included_record_ids(payload: &ContextPayload) -> Vec<i64> {
        payload
            .items
            .iter()
            .filter_map(|item| match item {
                ContextItem::Memory { record_id, .. } => Some(*record_id),
                ContextItem::History { .. } => None,
            })
            .collect()
    }
}

/// Single formatted block for direct LLM prompt injection.
fn render(query: &str, history: &[HistoryTurn], memory: &[&ScoredRecord]) -> String {
    let mut out = String::new();

    if !memory.is_empty() {
        out.push_str("## Relevant memory\n");
        for scored in memory {
            out.push_str(&format!(
                "- [{}/{}] {}\n",
                scored.record.category, scored.record.tier, scored.record.content
            ));
        }
        out.push('\n');
    }

    if !history.is_empty() {
        out.push_str("## Conversation\n");
        for turn in history {
            out.push_str(&format!("{}: {}\n", turn.role, turn.content));
        }
        out.push('\n');
    }

    out.push_str("## Query\n");
    out.push_str(query);
    out
}
