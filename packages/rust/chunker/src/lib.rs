//! Greedy chunk planning over the ordered fragment sequence.
//!
//! Fragments are packed into transformation-sized chunks front to back:
//! the current chunk accumulates fragments while its estimated size stays
//! within the budget, and closes when the next fragment would overflow it.
//! Fragments are atomic; one larger than the whole budget still goes into a
//! chunk of its own rather than being split or dropped.

use lectern_shared::{Chunk, Fragment};
use tracing::{debug, info, warn};

/// Default chunk size budget in characters.
pub const DEFAULT_CHUNK_CHARS: usize = 120_000;

/// Smallest budget the CLI accepts. The planner itself honors any budget.
pub const MIN_CHUNK_CHARS: usize = 20_000;

/// Pack ordered fragments into chunks under `budget_chars`.
///
/// Every fragment lands in exactly one chunk and chunks preserve the input
/// order. Chunk ids are dense from 0. The only chunks allowed to exceed the
/// budget are single-fragment chunks whose one fragment is itself oversized.
pub fn plan_chunks(fragments: Vec<Fragment>, budget_chars: usize) -> Vec<Chunk> {
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current: Vec<Fragment> = Vec::new();
    let mut current_size = 0usize;

    for fragment in fragments {
        let len = fragment.raw_text.chars().count();

        if !current.is_empty() && current_size + len > budget_chars {
            chunks.push(close_chunk(chunks.len(), current, current_size));
            current = Vec::new();
            current_size = 0;
        }

        if len > budget_chars {
            warn!(
                file = %fragment.file_name(),
                size = len,
                budget = budget_chars,
                "fragment exceeds the chunk budget, admitting it alone"
            );
        }

        current.push(fragment);
        current_size += len;
    }

    if !current.is_empty() {
        chunks.push(close_chunk(chunks.len(), current, current_size));
    }

    info!(
        chunks = chunks.len(),
        budget = budget_chars,
        "chunk plan complete"
    );
    chunks
}

fn close_chunk(id: usize, fragments: Vec<Fragment>, estimated_size: usize) -> Chunk {
    debug!(
        id,
        fragments = fragments.len(),
        estimated_size,
        "chunk closed"
    );
    Chunk {
        id,
        fragments,
        estimated_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lectern_shared::OrderKey;
    use std::path::PathBuf;

    fn fragment(name: &str, size: usize) -> Fragment {
        Fragment {
            path: PathBuf::from(format!("/in/{name}")),
            raw_text: "x".repeat(size),
            size_bytes: size as u64,
            modified_time: Utc::now(),
            order_key: OrderKey {
                rank: 1,
                numeric: vec![],
                modified_ns: 0,
                lexical: name.to_lowercase(),
                file_name: name.to_string(),
            },
        }
    }

    #[test]
    fn under_budget_yields_single_chunk() {
        let chunks = plan_chunks(vec![fragment("a", 10), fragment("b", 20)], 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, 0);
        assert_eq!(chunks[0].fragments.len(), 2);
        assert_eq!(chunks[0].estimated_size, 30);
    }

    #[test]
    fn closes_chunk_when_next_fragment_overflows() {
        let chunks = plan_chunks(
            vec![fragment("a", 60), fragment("b", 60), fragment("c", 30)],
            100,
        );
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].fragments.len(), 1);
        assert_eq!(chunks[1].fragments.len(), 2);
        assert_eq!(chunks[1].estimated_size, 90);
    }

    #[test]
    fn exact_fit_stays_in_current_chunk() {
        let chunks = plan_chunks(vec![fragment("a", 40), fragment("b", 60)], 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].estimated_size, 100);
    }

    #[test]
    fn oversized_fragment_gets_its_own_chunk() {
        let chunks = plan_chunks(
            vec![fragment("a", 30), fragment("big", 500), fragment("c", 30)],
            100,
        );
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].fragments[0].file_name(), "a");
        assert_eq!(chunks[1].fragments.len(), 1);
        assert_eq!(chunks[1].fragments[0].file_name(), "big");
        assert_eq!(chunks[1].estimated_size, 500);
        assert_eq!(chunks[2].fragments[0].file_name(), "c");
    }

    #[test]
    fn budget_smaller_than_every_fragment_never_drops() {
        let chunks = plan_chunks(vec![fragment("a", 50), fragment("b", 50)], 10);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.fragments.len() == 1));
    }

    #[test]
    fn every_fragment_appears_exactly_once_in_order() {
        let input: Vec<Fragment> = (0..17)
            .map(|i| fragment(&format!("{i:02}_f.txt"), 25))
            .collect();
        let expected: Vec<String> = input.iter().map(|f| f.file_name()).collect();

        let chunks = plan_chunks(input, 100);
        let flattened: Vec<String> = chunks
            .iter()
            .flat_map(|c| c.fragments.iter().map(|f| f.file_name()))
            .collect();
        assert_eq!(flattened, expected);

        // Ids dense from 0
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.id, i);
        }
        // Only the packing bound applies: all chunks within budget here
        assert!(chunks.iter().all(|c| c.estimated_size <= 100));
    }

    #[test]
    fn no_fragments_yields_no_chunks() {
        let chunks = plan_chunks(vec![], 100);
        assert!(chunks.is_empty());
    }

    #[test]
    fn multibyte_text_measured_in_chars() {
        // 10 three-byte chars measure as 10, not 30
        let mut f = fragment("uni", 0);
        f.raw_text = "語".repeat(10);
        let chunks = plan_chunks(vec![f, fragment("b", 90)], 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].estimated_size, 100);
    }
}
