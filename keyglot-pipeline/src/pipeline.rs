//! CorrectionPipeline: wires the buffer, classifier ensemble, user
//! dictionary, router, cycling state machine, and replacement engine
//! together into the single entry point a host backend drives.
//!
//! Dispatch-by-state mirrors the teacher's `process_key` method on
//! `InputMethodEngine`; the never-hard-fail loading of the user
//! dictionary mirrors the teacher's `init_*` methods, which log and
//! degrade rather than propagate.

use std::sync::Mutex;
use std::time::Instant;

use tracing::{debug, info, warn};

use keyglot_core::{
    Decision, Ensemble, EnsembleContext, Hypothesis, LayoutTables, RuleScope, StatisticalClassifier, UserDictionary,
};

use crate::buffer::{BoundaryReason, InputBuffer};
use crate::config::Configuration;
use crate::cycling::CyclingStateMachine;
use crate::history::{CorrectionEvent, CorrectionHistory};
use crate::platform::{AppObserver, Clipboard, KeyDirection, RawKeyEvent, ReplacementOutcome, ReplacementTarget, TextHost};
use crate::replace::ReplacementEngine;
use crate::router::{self, RouteOutcome, RouterContext};

/// Everything downstream code needs to know happened for one key event.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineAction {
    Committed { original: String, rewritten: String, hypothesis: Hypothesis, automatic: bool },
    Deferred { token: String },
    CycleAdvanced { text: String },
    NoOp,
}

pub struct CorrectionPipeline {
    config: Configuration,
    tables: LayoutTables,
    classifier: StatisticalClassifier,
    user_dict: Mutex<UserDictionary>,
    buffer: InputBuffer,
    cycling: CyclingStateMachine,
    history: CorrectionHistory,
    last_language: Option<keyglot_core::Language>,
}

impl CorrectionPipeline {
    pub fn new(config: Configuration) -> Self {
        let user_dict = match Configuration::user_dictionary_file() {
            Some(path) => UserDictionary::load(path),
            None => {
                warn!("could not determine user dictionary path, starting empty");
                UserDictionary::new()
            }
        };
        let history = CorrectionHistory::new(config.correction.history_cap);
        Self {
            config,
            tables: LayoutTables::embedded(),
            classifier: StatisticalClassifier::with_heuristic_recognizer(),
            user_dict: Mutex::new(user_dict),
            buffer: InputBuffer::new(),
            cycling: CyclingStateMachine::new(),
            history,
            last_language: None,
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn history(&self) -> &CorrectionHistory {
        &self.history
    }

    pub fn is_cycling_armed(&self) -> bool {
        self.cycling.is_armed()
    }

    fn dict(&self) -> std::sync::MutexGuard<'_, UserDictionary> {
        self.user_dict.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Persist the user dictionary if it has unsaved changes. Never
    /// hard-fails; a write error is logged and swallowed.
    pub fn save_learning(&self) {
        let mut dict = self.dict();
        if !dict.is_dirty() {
            return;
        }
        if let Err(err) = dict.save() {
            warn!(error = %err, "failed to persist user dictionary");
        }
    }

    /// Main entry point: dispatch one raw keystroke.
    pub fn handle_key_event<P>(&mut self, platform: &mut P, event: &RawKeyEvent, now: Instant) -> Vec<PipelineAction>
    where
        P: TextHost + Clipboard + AppObserver,
    {
        if event.direction != KeyDirection::Down {
            return vec![];
        }

        let app_id = platform.frontmost_app_id();
        let is_alt_tap = event.modifiers.alt && event.produced_char.is_none();

        if is_alt_tap {
            return self.handle_alt_tap(platform, now);
        }

        let Some(c) = event.produced_char else {
            return vec![];
        };

        let mut actions = vec![];
        if self.cycling.is_armed() {
            if let Some(resolved) = self.cycling.on_other_keystroke(now, &self.config) {
                self.apply_cycle_resolution(&resolved);
            }
        }

        if let Some((token, reason)) = self.buffer.push_char(c, now, &self.config) {
            actions.extend(self.process_emitted_token(platform, token, app_id, reason, now));
        }
        actions
    }

    /// Periodic scheduler tick: surfaces timeout-driven token emission,
    /// phrase-buffer idle reset, and cycling retention expiry. Call this
    /// from a low-frequency background timer, not from the key event path.
    pub fn tick<P>(&mut self, platform: &mut P, now: Instant) -> Vec<PipelineAction>
    where
        P: TextHost + Clipboard + AppObserver,
    {
        let mut actions = vec![];
        self.buffer.check_phrase_idle(now, &self.config);
        if let Some(resolved) = self.cycling.expire_if_needed(now, &self.config) {
            self.apply_cycle_resolution(&resolved);
        }
        if let Some((token, reason)) = self.buffer.check_timeout(now, &self.config) {
            let app_id = platform.frontmost_app_id();
            actions.extend(self.process_emitted_token(platform, token, app_id, reason, now));
        }
        actions
    }

    /// A non-character boundary observed directly by the host: app focus
    /// change, mouse click, or arrow-key navigation.
    pub fn handle_external_boundary<P>(&mut self, platform: &mut P, reason: BoundaryReason, now: Instant) -> Vec<PipelineAction>
    where
        P: TextHost + Clipboard + AppObserver,
    {
        if reason == BoundaryReason::FocusChange {
            if let Some(resolved) = self.cycling.on_focus_change() {
                self.apply_cycle_resolution(&resolved);
            }
            self.buffer.clear_pending();
        }
        let mut actions = vec![];
        if let Some((token, r)) = self.buffer.on_external_boundary(reason, now) {
            let app_id = platform.frontmost_app_id();
            actions.extend(self.process_emitted_token(platform, token, app_id, r, now));
        }
        actions
    }

    fn handle_alt_tap<P>(&mut self, platform: &mut P, now: Instant) -> Vec<PipelineAction>
    where
        P: TextHost + Clipboard + AppObserver,
    {
        if !self.cycling.is_armed() {
            return vec![];
        }
        let before = self.cycling.armed_state().map(|s| {
            (s.inserted_text.clone(), s.inserted_length, s.source_was_automatic, s.original_text.clone())
        });
        let Some((new_text, _)) = self.cycling.advance(now, &self.config) else {
            return vec![];
        };
        let Some((old_text, old_len, was_automatic, original_text)) = before else {
            return vec![];
        };
        if new_text == old_text {
            return vec![];
        }
        let target = ReplacementTarget::RecentInsertion { text: old_text, length: old_len };
        let outcome = ReplacementEngine::replace(platform, &target, &new_text, &self.config);
        if outcome != ReplacementOutcome::Committed {
            warn!("cycling advance failed to commit replacement");
            return vec![];
        }
        if was_automatic && new_text == original_text {
            self.dict().record_auto_reject(&original_text, RuleScope::Global);
            debug!(token = %original_text, "alt-tap return to original recorded as auto-reject");
        }
        vec![PipelineAction::CycleAdvanced { text: new_text }]
    }

    /// Cycling resolved (focus change, idle keystroke, or retention
    /// expiry): if the final text differs from the original, the user
    /// implicitly accepted a non-original alternative.
    fn apply_cycle_resolution(&mut self, resolved: &crate::cycling::ResolvedCycle) {
        if resolved.final_text == resolved.original_text {
            return;
        }
        let Some(hypothesis) = resolved.final_hypothesis else {
            return;
        };
        self.dict().record_manual_apply(&resolved.original_text, hypothesis, RuleScope::Global);
        debug!(token = %resolved.original_text, "cycling resolution recorded as manual apply");
    }

    /// An explicit manual correction of a confirmed accessibility
    /// selection, outside the normal typed-token flow (e.g. a hotkey
    /// bound to "convert selection"). If an existing rule conflicts with
    /// the chosen hypothesis, this records an override before applying.
    pub fn manual_correct_selection<P>(
        &mut self,
        platform: &mut P,
        original_text: &str,
        hypothesis: Hypothesis,
        rewritten_text: &str,
        now: Instant,
    ) -> PipelineAction
    where
        P: TextHost + Clipboard,
    {
        {
            let mut dict = self.dict();
            let conflicts = dict
                .lookup(original_text, &RuleScope::Global)
                .is_some_and(|rule| !matches!(rule.action, keyglot_core::RuleAction::None));
            if conflicts {
                dict.record_override(original_text, RuleScope::Global);
            }
            dict.record_manual_apply(original_text, hypothesis, RuleScope::Global);
        }
        let outcome = ReplacementEngine::replace(platform, &ReplacementTarget::SelectionConfirmed, rewritten_text, &self.config);
        if outcome == ReplacementOutcome::Committed {
            self.last_language = Some(hypothesis.language());
            self.history.record(CorrectionEvent {
                original_text_len: original_text.chars().count(),
                chosen_hypothesis: hypothesis,
                source_app_id: None,
                was_automatic: false,
                at: now,
            });
            PipelineAction::Committed {
                original: original_text.to_string(),
                rewritten: rewritten_text.to_string(),
                hypothesis,
                automatic: false,
            }
        } else {
            PipelineAction::NoOp
        }
    }

    fn process_emitted_token<P>(
        &mut self,
        platform: &mut P,
        mut raw_text: String,
        mut source_app_id: Option<String>,
        reason: BoundaryReason,
        now: Instant,
    ) -> Vec<PipelineAction>
    where
        P: TextHost + Clipboard + AppObserver,
    {
        if let Some((prefix, pending_app)) = self.buffer.take_adjoining_pending(now, &self.config) {
            raw_text = format!("{prefix}{raw_text}");
            source_app_id = pending_app.or(source_app_id);
        }

        if raw_text.is_empty() {
            return vec![];
        }
        if let Some(app_id) = &source_app_id {
            if self.config.excluded_app_ids.contains(app_id) {
                debug!(app = %app_id, "skipping correction for excluded app");
                return vec![];
            }
        }

        let context = EnsembleContext { last_language: self.last_language };
        let ensemble = Ensemble::new(&self.classifier, &self.tables);
        let decision = ensemble.decide(&raw_text, &context);

        let rule = self.dict().lookup(&raw_text, &RuleScope::Global).cloned();
        let router_context = RouterContext { token_text: raw_text.clone(), token_length: raw_text.chars().count() };
        let decision_for_cycling = decision.clone();
        let (outcome, skip_reason) = router::route(decision, rule.as_ref(), &router_context, &self.config);
        if let Some(skip) = skip_reason {
            debug!(token = %raw_text, ?skip, "correction skipped");
        }

        match outcome {
            RouteOutcome::KeepOriginal => vec![PipelineAction::NoOp],
            RouteOutcome::Defer => {
                self.buffer.defer(raw_text.clone(), source_app_id, reason, now);
                vec![PipelineAction::Deferred { token: raw_text }]
            }
            RouteOutcome::AutoCorrect { hypothesis, rewritten_text } => {
                self.commit_auto_correct(platform, raw_text, hypothesis, rewritten_text, decision_for_cycling, source_app_id, now)
            }
            RouteOutcome::CycleOnly { decision } => {
                self.arm_cycle_only(raw_text, decision, now);
                vec![PipelineAction::NoOp]
            }
        }
    }

    fn commit_auto_correct<P>(
        &mut self,
        platform: &mut P,
        original: String,
        hypothesis: Hypothesis,
        rewritten_text: String,
        decision: Decision,
        source_app_id: Option<String>,
        now: Instant,
    ) -> Vec<PipelineAction>
    where
        P: TextHost + Clipboard,
    {
        let length = original.chars().count();
        let target = ReplacementTarget::FreshBuffer { text: original.clone(), length };
        let outcome = ReplacementEngine::replace(platform, &target, &rewritten_text, &self.config);
        if outcome != ReplacementOutcome::Committed {
            warn!(token = %original, "auto-correct replacement failed to commit");
            return vec![PipelineAction::NoOp];
        }

        self.last_language = Some(hypothesis.language());
        self.history.record(CorrectionEvent {
            original_text_len: length,
            chosen_hypothesis: hypothesis,
            source_app_id,
            was_automatic: true,
            at: now,
        });

        let third = third_language_alternative(&decision, &original, &rewritten_text);
        self.cycling.seed_after_auto_correct(original.clone(), rewritten_text.clone(), hypothesis, third, now);

        info!(token = %original, corrected = %rewritten_text, "auto-corrected");
        vec![PipelineAction::Committed { original, rewritten: rewritten_text, hypothesis, automatic: true }]
    }

    fn arm_cycle_only(&mut self, original: String, decision: Decision, now: Instant) {
        let mut candidates = decision
            .alternatives
            .iter()
            .filter(|alt| alt.rewritten_text != original && router::validate_rewrite(&original, &alt.rewritten_text).is_ok());
        let first = candidates.next().map(|alt| (alt.rewritten_text.clone(), alt.hypothesis));
        let second = candidates.next().map(|alt| (alt.rewritten_text.clone(), alt.hypothesis));
        self.cycling.seed_cycle_only(original, first, second, now);
    }
}

/// Picks the best alternative for a third language, distinct from both
/// the original typed text and the already-chosen correction, and
/// passing the same validation gates a real correction would.
fn third_language_alternative(decision: &Decision, original: &str, corrected: &str) -> Option<(String, Hypothesis)> {
    decision
        .alternatives
        .iter()
        .find(|alt| {
            alt.rewritten_text != original
                && alt.rewritten_text != corrected
                && router::validate_rewrite(original, &alt.rewritten_text).is_ok()
        })
        .map(|alt| (alt.rewritten_text.clone(), alt.hypothesis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::stub::StubPlatform;
    use crate::platform::{KeyModifiers, RawKeyEvent};

    fn key(c: char) -> RawKeyEvent {
        RawKeyEvent { key_code: 0, modifiers: KeyModifiers::default(), direction: KeyDirection::Down, produced_char: Some(c) }
    }

    fn alt_tap() -> RawKeyEvent {
        RawKeyEvent {
            key_code: 0,
            modifiers: KeyModifiers { alt: true, ..Default::default() },
            direction: KeyDirection::Down,
            produced_char: None,
        }
    }

    fn type_word(pipeline: &mut CorrectionPipeline, platform: &mut StubPlatform, word: &str, now: Instant) -> Vec<PipelineAction> {
        let mut actions = vec![];
        for c in word.chars() {
            platform.send_type(&c.to_string());
            actions.extend(pipeline.handle_key_event(platform, &key(c), now));
        }
        actions
    }

    #[test]
    fn typing_ghbdtn_then_space_auto_corrects_to_privet() {
        let mut pipeline = CorrectionPipeline::new(Configuration::default());
        let mut platform = StubPlatform::new();
        let now = Instant::now();
        let mut actions = type_word(&mut pipeline, &mut platform, "ghbdtn", now);
        platform.send_type(" ");
        actions.extend(pipeline.handle_key_event(&mut platform, &key(' '), now));

        let committed = actions.iter().any(|a| matches!(a, PipelineAction::Committed { automatic: true, .. }));
        assert!(committed, "expected an automatic commit, got {actions:?}");
        assert!(platform.document.contains("привет"));
        assert!(pipeline.is_cycling_armed());
    }

    #[test]
    fn alt_tap_after_auto_correct_returns_to_original_and_learns_auto_reject() {
        let mut pipeline = CorrectionPipeline::new(Configuration::default());
        let mut platform = StubPlatform::new();
        let now = Instant::now();
        type_word(&mut pipeline, &mut platform, "ghbdtn", now);
        platform.send_type(" ");
        pipeline.handle_key_event(&mut platform, &key(' '), now);
        assert!(pipeline.is_cycling_armed());

        let actions = pipeline.handle_key_event(&mut platform, &alt_tap(), now);
        assert!(matches!(actions.first(), Some(PipelineAction::CycleAdvanced { text }) if text == "ghbdtn"));
        assert!(platform.document.contains("ghbdtn"));

        let rule = pipeline.dict().lookup("ghbdtn", &keyglot_core::RuleScope::Global).cloned();
        assert!(rule.is_some());
    }

    #[test]
    fn excluded_app_id_skips_correction() {
        let mut config = Configuration::default();
        config.excluded_app_ids.push("com.example.terminal".to_string());
        let mut pipeline = CorrectionPipeline::new(config);
        let mut platform = StubPlatform::new();
        platform.set_frontmost_app_id("com.example.terminal");
        let now = Instant::now();
        let mut actions = type_word(&mut pipeline, &mut platform, "ghbdtn", now);
        platform.send_type(" ");
        actions.extend(pipeline.handle_key_event(&mut platform, &key(' '), now));
        assert!(!actions.iter().any(|a| matches!(a, PipelineAction::Committed { .. })));
        assert!(platform.document.contains("ghbdtn"));
    }

    #[test]
    fn mid_confidence_token_is_deferred_not_replaced() {
        let mut pipeline = CorrectionPipeline::new(Configuration::default());
        let mut platform = StubPlatform::new();
        let now = Instant::now();
        let mut actions = type_word(&mut pipeline, &mut platform, "f", now);
        platform.send_type(" ");
        actions.extend(pipeline.handle_key_event(&mut platform, &key(' '), now));
        assert_eq!(platform.document, "f ");
    }
}
