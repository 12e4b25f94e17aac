//! CorrectionHistory: an in-memory-only ring of recent correction events.
//! Not a durability requirement — an observability aid surfaced through
//! the debug CLI, per the resolved open question on history persistence.

use std::collections::VecDeque;
use std::time::Instant;

use keyglot_core::Hypothesis;

#[derive(Debug, Clone)]
pub struct CorrectionEvent {
    pub original_text_len: usize,
    pub chosen_hypothesis: Hypothesis,
    pub source_app_id: Option<String>,
    pub was_automatic: bool,
    pub at: Instant,
}

/// Bounded ring buffer; oldest entries are dropped once `cap` is exceeded.
pub struct CorrectionHistory {
    events: VecDeque<CorrectionEvent>,
    cap: usize,
}

impl CorrectionHistory {
    pub fn new(cap: usize) -> Self {
        Self { events: VecDeque::with_capacity(cap), cap: cap.max(1) }
    }

    pub fn record(&mut self, event: CorrectionEvent) {
        if self.events.len() >= self.cap {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Most recent events first.
    pub fn recent(&self) -> impl Iterator<Item = &CorrectionEvent> {
        self.events.iter().rev()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyglot_core::Language;

    fn event() -> CorrectionEvent {
        CorrectionEvent {
            original_text_len: 6,
            chosen_hypothesis: Hypothesis::Pure(Language::Ru),
            source_app_id: None,
            was_automatic: true,
            at: Instant::now(),
        }
    }

    #[test]
    fn ring_drops_oldest_past_capacity() {
        let mut history = CorrectionHistory::new(3);
        for _ in 0..5 {
            history.record(event());
        }
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn recent_returns_newest_first() {
        let mut history = CorrectionHistory::new(50);
        let mut e1 = event();
        e1.original_text_len = 1;
        let mut e2 = event();
        e2.original_text_len = 2;
        history.record(e1);
        history.record(e2);
        let lens: Vec<_> = history.recent().map(|e| e.original_text_len).collect();
        assert_eq!(lens, vec![2, 1]);
    }
}
