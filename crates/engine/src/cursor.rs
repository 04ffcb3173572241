//! The mock engine's sequence cursor: `signature → last_sequence`, guarded
//! by a reader-writer lock with a short critical section: the read-modify-
//! write of a single entry, never held across network I/O.

use std::collections::HashMap;

use parking_lot::RwLock;

#[derive(Default)]
pub struct SequenceCursor {
    cursor: RwLock<HashMap<String, i64>>,
}

impl SequenceCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the first candidate (ordered ascending by `sequence_number`)
    /// with `sequence_number > last_sequence` for `signature`; wrap to the
    /// first candidate if none qualify. Advances the cursor to the selected
    /// sequence number. Returns `None` if `candidates` is empty.
    pub fn select<'a>(&self, signature: &str, candidates: &'a [i64]) -> Option<i64> {
        if candidates.is_empty() {
            return None;
        }

        let last = *self.cursor.read().get(signature).unwrap_or(&0);
        let selected = candidates
            .iter()
            .copied()
            .find(|&seq| seq > last)
            .unwrap_or(candidates[0]);

        self.cursor.write().insert(signature.to_string(), selected);
        Some(selected)
    }

    pub fn reset(&self, signature: &str) {
        self.cursor.write().remove(signature);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_through_candidates_in_round_robin_order() {
        let cursor = SequenceCursor::new();
        let candidates = vec![1, 2, 3];

        assert_eq!(cursor.select("sig", &candidates), Some(1));
        assert_eq!(cursor.select("sig", &candidates), Some(2));
        assert_eq!(cursor.select("sig", &candidates), Some(3));
        // Wraps back to the first candidate.
        assert_eq!(cursor.select("sig", &candidates), Some(1));
    }

    #[test]
    fn distinct_signatures_have_independent_cursors() {
        let cursor = SequenceCursor::new();
        assert_eq!(cursor.select("a", &[1, 2]), Some(1));
        assert_eq!(cursor.select("b", &[1, 2]), Some(1));
        assert_eq!(cursor.select("a", &[1, 2]), Some(2));
    }

    #[test]
    fn empty_candidates_returns_none() {
        let cursor = SequenceCursor::new();
        assert_eq!(cursor.select("sig", &[]), None);
    }

    #[test]
    fn cursor_never_exceeds_the_max_candidate() {
        let cursor = SequenceCursor::new();
        let candidates = vec![5, 10];
        for _ in 0..10 {
            let selected = cursor.select("sig", &candidates).unwrap();
            assert!(selected <= *candidates.iter().max().unwrap());
        }
    }
}
