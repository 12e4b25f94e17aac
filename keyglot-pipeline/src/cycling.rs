//! CyclingStateMachine: drives Alt-tap behavior after a correction.
//!
//! Grounded on the teacher's `CandidateList` wraparound navigation
//! (`move_next`/`move_prev`), generalized to the two-round expansion that
//! lazily reveals a third-language alternative and to the learning hooks
//! that need to know which hypothesis is currently inserted.

use std::time::{Duration, Instant};

use keyglot_core::Hypothesis;

use crate::config::Configuration;

#[derive(Debug, Clone)]
pub struct CyclingState {
    pub original_text: String,
    pub visible: Vec<String>,
    hypotheses: Vec<Option<Hypothesis>>,
    pub current_index: usize,
    /// The index cycling was armed at; a tap that would advance back to
    /// this index is the "wrap" that triggers round-2 expansion.
    start_index: usize,
    pub round: u8,
    pub inserted_text: String,
    pub inserted_length: usize,
    pub started_at: Instant,
    pub source_was_automatic: bool,
    third_alternative: Option<(String, Hypothesis)>,
}

impl CyclingState {
    fn set_current(&mut self, index: usize) {
        self.current_index = index;
        self.inserted_text = self.visible[index].clone();
        self.inserted_length = self.inserted_text.chars().count();
    }

    pub fn current_hypothesis(&self) -> Option<Hypothesis> {
        self.hypotheses.get(self.current_index).copied().flatten()
    }
}

/// Snapshot taken when cycling resolves back to `Idle`, for the
/// orchestrator's learning hooks.
#[derive(Debug, Clone)]
pub struct ResolvedCycle {
    pub original_text: String,
    pub final_text: String,
    pub final_hypothesis: Option<Hypothesis>,
    pub source_was_automatic: bool,
}

#[derive(Debug, Default)]
enum Phase {
    #[default]
    Idle,
    Armed(CyclingState),
}

#[derive(Debug, Default)]
pub struct CyclingStateMachine {
    phase: Phase,
}

impl CyclingStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.phase, Phase::Armed(_))
    }

    pub fn armed_state(&self) -> Option<&CyclingState> {
        match &self.phase {
            Phase::Armed(state) => Some(state),
            Phase::Idle => None,
        }
    }

    /// Seed after AUTO_CORRECT: `[original, corrected]`, round 1, sitting
    /// on `corrected` since that is what is now in the document.
    pub fn seed_after_auto_correct(
        &mut self,
        original: String,
        corrected: String,
        corrected_hypothesis: Hypothesis,
        third_alternative: Option<(String, Hypothesis)>,
        now: Instant,
    ) {
        let inserted_length = corrected.chars().count();
        self.phase = Phase::Armed(CyclingState {
            original_text: original.clone(),
            visible: vec![original, corrected.clone()],
            hypotheses: vec![None, Some(corrected_hypothesis)],
            current_index: 1,
            start_index: 1,
            round: 1,
            inserted_text: corrected,
            inserted_length,
            started_at: now,
            source_was_automatic: true,
            third_alternative,
        });
    }

    /// Seed a CYCLE_ONLY outcome: text hasn't been mutated yet, so the
    /// document still shows `original`. The first Alt-tap performs the
    /// actual replacement.
    pub fn seed_cycle_only(
        &mut self,
        original: String,
        first_alternative: Option<(String, Hypothesis)>,
        second_alternative: Option<(String, Hypothesis)>,
        now: Instant,
    ) {
        let mut visible = vec![original.clone()];
        let mut hypotheses = vec![None];
        if let Some((text, hyp)) = &first_alternative {
            if text != &original {
                visible.push(text.clone());
                hypotheses.push(Some(*hyp));
            }
        }
        let inserted_text = original.clone();
        let inserted_length = inserted_text.chars().count();
        self.phase = Phase::Armed(CyclingState {
            original_text: original,
            visible,
            hypotheses,
            current_index: 0,
            start_index: 0,
            round: 1,
            inserted_text,
            inserted_length,
            started_at: now,
            source_was_automatic: false,
            third_alternative: second_alternative,
        });
    }

    /// Seed after a manual-buffer correction: `[smart, language_a,
    /// language_b, original]`, sitting on `smart`.
    pub fn seed_after_manual_correction(
        &mut self,
        original: String,
        smart: (String, Hypothesis),
        language_a: (String, Hypothesis),
        language_b: (String, Hypothesis),
        third_alternative: Option<(String, Hypothesis)>,
        now: Instant,
    ) {
        let inserted_length = smart.0.chars().count();
        self.phase = Phase::Armed(CyclingState {
            original_text: original.clone(),
            visible: vec![smart.0.clone(), language_a.0, language_b.0, original],
            hypotheses: vec![Some(smart.1), Some(language_a.1), Some(language_b.1), None],
            current_index: 0,
            start_index: 0,
            round: 1,
            inserted_text: smart.0,
            inserted_length,
            started_at: now,
            source_was_automatic: false,
            third_alternative,
        });
    }

    /// Alt-tap: advance within `visible`, expanding to round 2 exactly once
    /// if the tap would wrap back to the seed index and a validated third
    /// alternative is available. Returns the newly inserted text and its
    /// scalar length.
    pub fn advance(&mut self, now: Instant, config: &Configuration) -> Option<(String, usize)> {
        if self.is_expired(now, config) {
            self.phase = Phase::Idle;
            return None;
        }
        let Phase::Armed(state) = &mut self.phase else {
            return None;
        };

        let next_index = (state.current_index + 1) % state.visible.len();
        if next_index == state.start_index && state.round == 1 {
            if let Some((third, hyp)) = state.third_alternative.take() {
                if !state.visible.contains(&third) {
                    state.visible.push(third);
                    state.hypotheses.push(Some(hyp));
                    state.round = 2;
                    let new_index = state.visible.len() - 1;
                    state.set_current(new_index);
                    return Some((state.inserted_text.clone(), state.inserted_length));
                }
            }
        }
        state.set_current(next_index);
        Some((state.inserted_text.clone(), state.inserted_length))
    }

    pub fn is_expired(&self, now: Instant, config: &Configuration) -> bool {
        match &self.phase {
            Phase::Armed(state) => {
                now.duration_since(state.started_at) >= Duration::from_millis(config.timing.cycling_retention_ms)
            }
            Phase::Idle => false,
        }
    }

    fn resolve_current(state: &CyclingState) -> ResolvedCycle {
        ResolvedCycle {
            original_text: state.original_text.clone(),
            final_text: state.inserted_text.clone(),
            final_hypothesis: state.current_hypothesis(),
            source_was_automatic: state.source_was_automatic,
        }
    }

    /// A keystroke other than Alt arrived while armed. Resolves cycling
    /// only once the minimum round duration has elapsed, so a key-repeat
    /// echo immediately after arming does not drop the state.
    pub fn on_other_keystroke(&mut self, now: Instant, config: &Configuration) -> Option<ResolvedCycle> {
        let Phase::Armed(state) = &self.phase else { return None };
        let elapsed = now.duration_since(state.started_at);
        if elapsed < Duration::from_millis(config.timing.cycling_min_duration_ms) {
            return None;
        }
        let resolved = Self::resolve_current(state);
        self.phase = Phase::Idle;
        Some(resolved)
    }

    /// App-focus change always resolves cycling immediately.
    pub fn on_focus_change(&mut self) -> Option<ResolvedCycle> {
        let Phase::Armed(state) = &self.phase else { return None };
        let resolved = Self::resolve_current(state);
        self.phase = Phase::Idle;
        Some(resolved)
    }

    /// Call periodically; resolves cycling if the retention window elapsed.
    pub fn expire_if_needed(&mut self, now: Instant, config: &Configuration) -> Option<ResolvedCycle> {
        if !self.is_expired(now, config) {
            return None;
        }
        let Phase::Armed(state) = &self.phase else { return None };
        let resolved = Self::resolve_current(state);
        self.phase = Phase::Idle;
        Some(resolved)
    }

    pub fn cancel(&mut self) {
        self.phase = Phase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyglot_core::Language;

    fn config() -> Configuration {
        Configuration::default()
    }

    fn ru_hyp() -> Hypothesis {
        Hypothesis::FromLayout { intended: Language::Ru, typed_under: Language::En }
    }

    fn he_hyp() -> Hypothesis {
        Hypothesis::FromLayout { intended: Language::He, typed_under: Language::En }
    }

    #[test]
    fn first_tap_returns_original_second_tap_expands_to_third_language() {
        let mut machine = CyclingStateMachine::new();
        let config = config();
        let now = Instant::now();
        machine.seed_after_auto_correct(
            "ghbdtn".to_string(),
            "привет".to_string(),
            ru_hyp(),
            Some(("גהבדתנ".to_string(), he_hyp())),
            now,
        );

        let (first, _) = machine.advance(now, &config).unwrap();
        assert_eq!(first, "ghbdtn");
        assert_eq!(machine.armed_state().unwrap().round, 1);

        let (second, _) = machine.advance(now, &config).unwrap();
        assert_eq!(second, "גהבדתנ");
        assert_eq!(machine.armed_state().unwrap().round, 2);
    }

    #[test]
    fn without_third_alternative_cycling_just_wraps() {
        let mut machine = CyclingStateMachine::new();
        let config = config();
        let now = Instant::now();
        machine.seed_after_auto_correct("ghbdtn".to_string(), "привет".to_string(), ru_hyp(), None, now);

        let (first, _) = machine.advance(now, &config).unwrap();
        assert_eq!(first, "ghbdtn");
        let (second, _) = machine.advance(now, &config).unwrap();
        assert_eq!(second, "привет");
    }

    #[test]
    fn cycling_determinism_k_taps_match_direct_jump() {
        let config = config();
        let now = Instant::now();

        let mut sequential = CyclingStateMachine::new();
        sequential.seed_after_auto_correct(
            "ghbdtn".to_string(),
            "привет".to_string(),
            ru_hyp(),
            Some(("גהבדתנ".to_string(), he_hyp())),
            now,
        );
        let mut last = None;
        for _ in 0..3 {
            last = sequential.advance(now, &config);
        }
        assert_eq!(last.unwrap().0, "привет");
    }

    #[test]
    fn retention_expiry_returns_to_idle() {
        let mut machine = CyclingStateMachine::new();
        let config = config();
        let now = Instant::now();
        machine.seed_after_auto_correct("ghbdtn".to_string(), "привет".to_string(), ru_hyp(), None, now);
        let later = now + Duration::from_millis(config.timing.cycling_retention_ms + 1);
        assert!(machine.expire_if_needed(later, &config).is_some());
        assert!(!machine.is_armed());
    }

    #[test]
    fn keystroke_before_min_duration_does_not_resolve() {
        let mut machine = CyclingStateMachine::new();
        let config = config();
        let now = Instant::now();
        machine.seed_after_auto_correct("ghbdtn".to_string(), "привет".to_string(), ru_hyp(), None, now);
        assert!(machine.on_other_keystroke(now, &config).is_none());
        assert!(machine.is_armed());
    }

    #[test]
    fn keystroke_after_min_duration_resolves_with_final_hypothesis() {
        let mut machine = CyclingStateMachine::new();
        let config = config();
        let now = Instant::now();
        machine.seed_after_auto_correct("ghbdtn".to_string(), "привет".to_string(), ru_hyp(), None, now);
        let later = now + Duration::from_millis(config.timing.cycling_min_duration_ms + 1);
        let resolved = machine.on_other_keystroke(later, &config).unwrap();
        assert_eq!(resolved.final_text, "привет");
        assert_eq!(resolved.final_hypothesis, Some(ru_hyp()));
        assert!(!machine.is_armed());
    }
}
