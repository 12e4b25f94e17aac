//! In-memory platform implementation used by tests and the debug CLI.
//! No real OS integration; everything lives in plain fields.

use std::collections::VecDeque;

use super::{
    AppObserver, Clipboard, KeyDirection, KeyModifiers, KeystrokeSource, LayoutSwitcher,
    RawKeyEvent, TextHost,
};

/// A scripted, in-memory platform: keystrokes are queued up front, text
/// mutations land in `document`, and the clipboard/layout/app-id are plain
/// fields a test can inspect after the fact.
#[derive(Debug, Default)]
pub struct StubPlatform {
    pending_keys: VecDeque<RawKeyEvent>,
    pub document: String,
    pub cursor: usize,
    pub selection: Option<(usize, usize)>,
    clipboard_text: Option<String>,
    clipboard_seq: u64,
    active_layout: Option<String>,
    frontmost_app_id: Option<String>,
    pub undo_log: Vec<String>,
}

impl StubPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a sequence of plain characters as Down keystroke events.
    pub fn queue_text(&mut self, text: &str) {
        for c in text.chars() {
            self.pending_keys.push_back(RawKeyEvent {
                key_code: 0,
                modifiers: KeyModifiers::default(),
                direction: KeyDirection::Down,
                produced_char: Some(c),
            });
        }
    }

    pub fn queue_event(&mut self, event: RawKeyEvent) {
        self.pending_keys.push_back(event);
    }

    pub fn set_frontmost_app_id(&mut self, id: impl Into<String>) {
        self.frontmost_app_id = Some(id.into());
    }

    pub fn set_selection(&mut self, start: usize, end: usize) {
        self.selection = Some((start, end));
    }

    fn char_count(&self) -> usize {
        self.document.chars().count()
    }

    fn byte_offset(&self, char_idx: usize) -> usize {
        self.document
            .char_indices()
            .nth(char_idx)
            .map(|(i, _)| i)
            .unwrap_or(self.document.len())
    }
}

impl KeystrokeSource for StubPlatform {
    fn poll(&mut self) -> Option<RawKeyEvent> {
        self.pending_keys.pop_front()
    }
}

impl TextHost for StubPlatform {
    fn read_text_behind_caret(&self, length: usize) -> Option<String> {
        let n = self.char_count();
        if length > n {
            return None;
        }
        let start = n - length;
        let start_byte = self.byte_offset(start);
        Some(self.document[start_byte..].to_string())
    }

    fn accessibility_replace(&mut self, length: usize, new_text: &str) -> bool {
        let n = self.char_count();
        if length > n {
            return false;
        }
        let start = n - length;
        let start_byte = self.byte_offset(start);
        self.undo_log.push(self.document.clone());
        self.document.replace_range(start_byte.., new_text);
        self.cursor = self.char_count();
        true
    }

    fn has_confirmed_selection(&self) -> bool {
        matches!(self.selection, Some((start, end)) if end > start)
    }

    fn send_paste(&mut self) {
        if let Some((start, end)) = self.selection.take() {
            let start_byte = self.byte_offset(start);
            let end_byte = self.byte_offset(end);
            self.undo_log.push(self.document.clone());
            if let Some(text) = self.clipboard_text.clone() {
                self.document.replace_range(start_byte..end_byte, &text);
            }
            self.cursor = self.char_count();
        }
    }

    fn send_backspace(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.undo_log.push(self.document.clone());
        let n = self.char_count();
        let remove_from = n.saturating_sub(count);
        let byte_start = self.byte_offset(remove_from);
        self.document.truncate(byte_start);
        self.cursor = self.char_count();
    }

    fn send_type(&mut self, text: &str) {
        self.document.push_str(text);
        self.cursor = self.char_count();
    }

    fn send_undo(&mut self) -> bool {
        if let Some(prev) = self.undo_log.pop() {
            self.document = prev;
            self.cursor = self.char_count();
            true
        } else {
            false
        }
    }
}

impl Clipboard for StubPlatform {
    fn sequence_number(&self) -> u64 {
        self.clipboard_seq
    }

    fn read_text(&self) -> Option<String> {
        self.clipboard_text.clone()
    }

    fn write_text(&mut self, text: &str) {
        self.clipboard_text = Some(text.to_string());
        self.clipboard_seq += 1;
    }

    fn restore(&mut self, snapshot: Option<String>) {
        self.clipboard_text = snapshot;
        self.clipboard_seq += 1;
    }
}

impl LayoutSwitcher for StubPlatform {
    fn set_active_layout(&mut self, layout_id: &str) -> bool {
        self.active_layout = Some(layout_id.to_string());
        true
    }

    fn active_layout(&self) -> Option<String> {
        self.active_layout.clone()
    }
}

impl AppObserver for StubPlatform {
    fn frontmost_app_id(&self) -> Option<String> {
        self.frontmost_app_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_text_behind_caret_returns_trailing_scalars() {
        let mut platform = StubPlatform::new();
        platform.document = "hello ghbdtn".to_string();
        assert_eq!(
            platform.read_text_behind_caret(6),
            Some("ghbdtn".to_string())
        );
    }

    #[test]
    fn accessibility_replace_swaps_trailing_range() {
        let mut platform = StubPlatform::new();
        platform.document = "hello ghbdtn".to_string();
        assert!(platform.accessibility_replace(6, "привет"));
        assert_eq!(platform.document, "hello привет");
    }

    #[test]
    fn send_backspace_then_type_round_trips() {
        let mut platform = StubPlatform::new();
        platform.document = "ghbdtn".to_string();
        platform.send_backspace(6);
        assert_eq!(platform.document, "");
        platform.send_type("привет");
        assert_eq!(platform.document, "привет");
    }

    #[test]
    fn undo_restores_prior_document() {
        let mut platform = StubPlatform::new();
        platform.document = "ghbdtn".to_string();
        platform.accessibility_replace(6, "привет");
        assert!(platform.send_undo());
        assert_eq!(platform.document, "ghbdtn");
    }

    #[test]
    fn clipboard_restore_resets_sequence_consumer_visible_state() {
        let mut platform = StubPlatform::new();
        let before = platform.read_text();
        platform.write_text("scratch");
        platform.restore(before.clone());
        assert_eq!(platform.read_text(), before);
    }
}
