// src/search/fusion.rs
// Reciprocal Rank Fusion of the vector and keyword result lists

use std::collections::HashMap;

use crate::types::{MemoryRecord, ScoredRecord};

/// Fuse two ranked lists: `score(record) = Σ 1 / (rank + c)` over the lists
/// the record appears in, with 1-based ranks. Records absent from a list
/// contribute 0 for it. The constant `c` dampens rank-1 outliers.
pub fn reciprocal_rank_fusion(
    vector_list: Vec<MemoryRecord>,
    keyword_list: Vec<MemoryRecord>,
    c: f32,
) -> Vec<ScoredRecord> {
    let mut fused: HashMap<i64, ScoredRecord> = HashMap::new();

    for (index, record) in vector_list.into_iter().enumerate() {
        let rank = index + 1;
        let contribution = 1.0 / (rank as f32 + c);
        fused
            .entry(record.id)
            .and_modify(|s| {
                s.score += contribution;
                s.vector_rank = Some(rank);
            })
            .or_insert(ScoredRecord {
                record,
                score: contribution,
                vector_rank: Some(rank),
                keyword_rank: None,
            });
    }

    for (index, record) in keyword_list.into_iter().enumerate() {
        let rank = index + 1;
        let contribution = 1.0 / (rank as f32 + c);
        fused
            .entry(record.id)
            .and_modify(|s| {
                s.score += contribution;
                s.keyword_rank = Some(rank);
            })
            .or_insert(ScoredRecord {
                record,
                score: contribution,
                vector_rank: None,
                keyword_rank: Some(rank),
            });
    }

    fused.into_values().collect()
}
