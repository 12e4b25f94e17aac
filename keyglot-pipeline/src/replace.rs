//! ReplacementEngine: selection-aware text mutation with self-check and
//! rollback. The clipboard snapshot/restore step is an RAII guard that
//! restores prior contents on drop only if the sequence number changed
//! underneath it, mirroring the "restore only if something actually
//! changed" clipboard discipline used for selection-conversion elsewhere
//! in this domain (see `ClipboardRestore` in the teacher's retrieval pack).

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::Configuration;
use crate::platform::{Clipboard, ReplacementOutcome, ReplacementTarget, TextHost};

const BACKSPACE_HARD_CAP: usize = 4096;

pub struct ReplacementEngine;

impl ReplacementEngine {
    pub fn replace<P: TextHost + Clipboard>(
        platform: &mut P,
        target: &ReplacementTarget,
        new_text: &str,
        config: &Configuration,
    ) -> ReplacementOutcome {
        match target {
            ReplacementTarget::SelectionConfirmed => {
                if !platform.has_confirmed_selection() {
                    return ReplacementOutcome::NoTarget;
                }
                selection_paste(platform, new_text, config)
            }
            ReplacementTarget::RecentInsertion { text, length } | ReplacementTarget::FreshBuffer { text, length } => {
                if accessibility_match_and_replace(platform, text, *length, new_text) {
                    return ReplacementOutcome::Committed;
                }
                bounded_backspace_and_type(platform, *length, new_text, config)
            }
        }
    }
}

fn verify_replaced<P: TextHost>(platform: &P, new_text: &str) -> bool {
    platform
        .read_text_behind_caret(new_text.chars().count())
        .as_deref()
        == Some(new_text)
}

fn accessibility_match_and_replace<P: TextHost>(platform: &mut P, expected: &str, length: usize, new_text: &str) -> bool {
    let Some(behind) = platform.read_text_behind_caret(length) else {
        return false;
    };
    if behind != expected {
        return false;
    }
    if !platform.accessibility_replace(length, new_text) {
        return false;
    }
    if verify_replaced(platform, new_text) {
        debug!("accessibility match-and-replace committed");
        true
    } else {
        warn!("accessibility replace post-state mismatch");
        platform.send_undo();
        false
    }
}

/// RAII guard restoring clipboard contents on drop, but only if the
/// sequence number moved during the guard's lifetime.
struct ClipboardGuard<'a, P: Clipboard> {
    platform: &'a mut P,
    before_seq: u64,
    snapshot: Option<String>,
}

impl<'a, P: Clipboard> ClipboardGuard<'a, P> {
    fn capture(platform: &'a mut P) -> Self {
        let before_seq = platform.sequence_number();
        let snapshot = platform.read_text();
        Self { platform, before_seq, snapshot }
    }
}

impl<P: Clipboard> Drop for ClipboardGuard<'_, P> {
    fn drop(&mut self) {
        if self.platform.sequence_number() == self.before_seq {
            return;
        }
        self.platform.restore(self.snapshot.take());
    }
}

fn selection_paste<P: TextHost + Clipboard>(platform: &mut P, new_text: &str, config: &Configuration) -> ReplacementOutcome {
    let mut guard = ClipboardGuard::capture(platform);
    guard.platform.write_text(new_text);
    thread::sleep(Duration::from_millis(config.timing.clipboard_delay_ms));
    guard.platform.send_paste();
    thread::sleep(Duration::from_millis(config.timing.paste_delay_ms));

    if verify_replaced(guard.platform, new_text) || !guard.platform.has_confirmed_selection() {
        debug!("selection paste committed");
        ReplacementOutcome::Committed
    } else {
        warn!("selection paste post-state mismatch");
        guard.platform.send_undo();
        ReplacementOutcome::Aborted
    }
}

fn bounded_backspace_and_type<P: TextHost>(
    platform: &mut P,
    length: usize,
    new_text: &str,
    config: &Configuration,
) -> ReplacementOutcome {
    let backspaces = length.min(BACKSPACE_HARD_CAP);
    platform.send_backspace(backspaces);

    let chars: Vec<char> = new_text.chars().collect();
    for chunk in chars.chunks(config.timing.type_chunk_chars.max(1)) {
        let text: String = chunk.iter().collect();
        platform.send_type(&text);
        thread::sleep(Duration::from_millis(config.timing.delete_chunk_delay_ms));
    }

    if verify_replaced(platform, new_text) {
        debug!("bounded backspace+type committed");
        ReplacementOutcome::Committed
    } else {
        warn!("backspace+type post-state mismatch");
        platform.send_undo();
        ReplacementOutcome::Aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::stub::StubPlatform;

    fn config() -> Configuration {
        let mut c = Configuration::default();
        c.timing.clipboard_delay_ms = 0;
        c.timing.paste_delay_ms = 0;
        c.timing.delete_chunk_delay_ms = 0;
        c
    }

    #[test]
    fn accessibility_path_commits_on_match() {
        let mut platform = StubPlatform::new();
        platform.document = "hello ghbdtn".to_string();
        let target = ReplacementTarget::RecentInsertion { text: "ghbdtn".to_string(), length: 6 };
        let outcome = ReplacementEngine::replace(&mut platform, &target, "привет", &config());
        assert_eq!(outcome, ReplacementOutcome::Committed);
        assert_eq!(platform.document, "hello привет");
    }

    #[test]
    fn mismatched_expected_text_falls_through_to_backspace_type() {
        let mut platform = StubPlatform::new();
        platform.document = "hello drifted".to_string();
        let target = ReplacementTarget::FreshBuffer { text: "ghbdtn".to_string(), length: 7 };
        let outcome = ReplacementEngine::replace(&mut platform, &target, "привет", &config());
        assert_eq!(outcome, ReplacementOutcome::Committed);
        assert_eq!(platform.document, "hello привет");
    }

    #[test]
    fn selection_paste_commits_and_restores_clipboard() {
        let mut platform = StubPlatform::new();
        platform.document = "select привет here".to_string();
        platform.write_text("previous clipboard contents");
        platform.set_selection(7, 13);
        let target = ReplacementTarget::SelectionConfirmed;
        let outcome = ReplacementEngine::replace(&mut platform, &target, "ghbdtn", &config());
        assert_eq!(outcome, ReplacementOutcome::Committed);
        assert_eq!(platform.read_text(), Some("previous clipboard contents".to_string()));
    }

    #[test]
    fn no_selection_confirmed_is_no_target() {
        let mut platform = StubPlatform::new();
        let target = ReplacementTarget::SelectionConfirmed;
        let outcome = ReplacementEngine::replace(&mut platform, &target, "привет", &config());
        assert_eq!(outcome, ReplacementOutcome::NoTarget);
    }

    #[test]
    fn backspace_count_never_exceeds_hard_cap() {
        let mut platform = StubPlatform::new();
        platform.document = "a".repeat(10);
        let target = ReplacementTarget::FreshBuffer { text: "x".repeat(10), length: 10 };
        let _ = ReplacementEngine::replace(&mut platform, &target, "y", &config());
        assert!(platform.document.chars().count() <= 1 + 10);
    }

    #[test]
    fn backspace_length_is_capped_at_sanity_bound() {
        let mut platform = StubPlatform::new();
        platform.document = "a".repeat(BACKSPACE_HARD_CAP + 500);
        bounded_backspace_and_type(&mut platform, BACKSPACE_HARD_CAP + 500, "y", &config());
        assert_eq!(platform.document.chars().count(), 500 + 1);
    }
}
