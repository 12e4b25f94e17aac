//! InputBuffer & Boundary Tracker: the trailing token buffer, the bounded
//! phrase buffer, and the single pending-word slot.
//!
//! All indexing here operates on `char`s, never raw byte offsets, matching
//! the char-index-aware insertion/removal discipline the teacher's own
//! input buffer applies to its composed text.

use std::time::{Duration, Instant};

use crate::config::Configuration;

const PHRASE_BUFFER_CAP: usize = 256;
const TOKEN_BUFFER_RESERVE: usize = 64;
const TOKEN_BUFFER_HARD_CEILING: usize = 512;

/// What caused a token to be emitted from the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryReason {
    /// A character from the word-boundary set was typed.
    Character,
    /// No keystroke arrived for `buffer_timeout_ms`.
    Timeout,
    FocusChange,
    MouseClick,
    ArrowKey,
}

struct PendingWord {
    text: String,
    source_app_id: Option<String>,
    deferred_at: Instant,
    /// True when the pending word's own emission was a `Timeout`, meaning
    /// no actual boundary character separates it from whatever is typed next.
    adjoins_next: bool,
}

pub struct InputBuffer {
    token: String,
    last_keystroke_at: Option<Instant>,
    phrase: String,
    phrase_last_keystroke_at: Option<Instant>,
    pending_word: Option<PendingWord>,
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self {
            token: String::with_capacity(TOKEN_BUFFER_RESERVE),
            last_keystroke_at: None,
            phrase: String::with_capacity(PHRASE_BUFFER_CAP),
            phrase_last_keystroke_at: None,
            pending_word: None,
        }
    }
}

impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current (not-yet-boundaried) token text, for inspection/debugging.
    pub fn current_token(&self) -> &str {
        &self.token
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    fn push_phrase_char(&mut self, c: char, now: Instant) {
        self.phrase.push(c);
        let overflow = self.phrase.chars().count().saturating_sub(PHRASE_BUFFER_CAP);
        if overflow > 0 {
            let byte_start = self
                .phrase
                .char_indices()
                .nth(overflow)
                .map(|(i, _)| i)
                .unwrap_or(self.phrase.len());
            self.phrase.drain(..byte_start);
        }
        self.phrase_last_keystroke_at = Some(now);
    }

    pub fn reset_phrase(&mut self) {
        self.phrase.clear();
        self.phrase_last_keystroke_at = None;
    }

    /// Feed one printable character. Returns the completed token and its
    /// boundary reason if this character closed a token.
    pub fn push_char(
        &mut self,
        c: char,
        now: Instant,
        config: &Configuration,
    ) -> Option<(String, BoundaryReason)> {
        self.push_phrase_char(c, now);
        self.last_keystroke_at = Some(now);

        if c == '\n' {
            self.reset_phrase();
        }

        if config.punctuation.is_boundary(c) {
            return self.emit(BoundaryReason::Character);
        }

        self.token.push(c);
        if self.token.chars().count() > TOKEN_BUFFER_HARD_CEILING {
            self.token.clear();
            return None;
        }
        None
    }

    fn emit(&mut self, reason: BoundaryReason) -> Option<(String, BoundaryReason)> {
        if self.token.is_empty() {
            return None;
        }
        let token = std::mem::take(&mut self.token);
        self.token.reserve(TOKEN_BUFFER_RESERVE);
        Some((token, reason))
    }

    /// Called periodically (e.g. on every keystroke dispatch and by a
    /// low-frequency scheduler tick) to surface timeout-driven emissions.
    pub fn check_timeout(
        &mut self,
        now: Instant,
        config: &Configuration,
    ) -> Option<(String, BoundaryReason)> {
        let timed_out = self
            .last_keystroke_at
            .is_some_and(|last| now.duration_since(last) >= Duration::from_millis(config.timing.buffer_timeout_ms));
        if !timed_out {
            return None;
        }
        self.emit(BoundaryReason::Timeout)
    }

    pub fn check_phrase_idle(&mut self, now: Instant, config: &Configuration) {
        let idle = self
            .phrase_last_keystroke_at
            .is_some_and(|last| now.duration_since(last) >= Duration::from_millis(config.timing.phrase_buffer_idle_ms));
        if idle {
            self.reset_phrase();
        }
    }

    /// Explicit non-character boundaries: app-focus change, mouse click,
    /// arrow-key navigation. Always resets the phrase buffer.
    pub fn on_external_boundary(
        &mut self,
        reason: BoundaryReason,
        now: Instant,
    ) -> Option<(String, BoundaryReason)> {
        debug_assert!(!matches!(reason, BoundaryReason::Character | BoundaryReason::Timeout));
        self.reset_phrase();
        self.last_keystroke_at = Some(now);
        self.emit(reason)
    }

    /// Park a DEFER'd token. `reason` is the boundary reason under which
    /// this token itself was emitted.
    pub fn defer(&mut self, text: String, source_app_id: Option<String>, reason: BoundaryReason, now: Instant) {
        self.pending_word = Some(PendingWord {
            text,
            source_app_id,
            deferred_at: now,
            adjoins_next: reason == BoundaryReason::Timeout,
        });
    }

    pub fn pending_word_text(&self) -> Option<&str> {
        self.pending_word.as_ref().map(|p| p.text.as_str())
    }

    /// Drop an expired pending word. Call before attempting a merge.
    pub fn expire_pending_if_needed(&mut self, now: Instant, config: &Configuration) {
        if let Some(pending) = &self.pending_word {
            if now.duration_since(pending.deferred_at)
                >= Duration::from_millis(config.timing.pending_word_timeout_ms)
            {
                self.pending_word = None;
            }
        }
    }

    /// If a pending word exists, has not expired, and adjoins whatever is
    /// typed next (its own emission was a timeout, not a real boundary
    /// character), take and return its text plus source app id to prepend
    /// to the next emitted token for re-classification.
    pub fn take_adjoining_pending(
        &mut self,
        now: Instant,
        config: &Configuration,
    ) -> Option<(String, Option<String>)> {
        self.expire_pending_if_needed(now, config);
        let pending = self.pending_word.take()?;
        if pending.adjoins_next {
            Some((pending.text, pending.source_app_id))
        } else {
            None
        }
    }

    pub fn clear_pending(&mut self) {
        self.pending_word = None;
    }
}
