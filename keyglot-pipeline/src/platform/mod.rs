//! Trait boundary standing in for the OS-specific collaborators: keystroke
//! injection, accessibility queries, clipboard I/O, and layout switching.
//! A real backend implements these traits; `stub` provides an in-memory
//! implementation used by tests and the debug CLI.

pub mod stub;

pub use keyglot_core::LanguageRecognizer;

/// A single low-level keyboard event, as delivered by the OS event tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawKeyEvent {
    pub key_code: u32,
    pub modifiers: KeyModifiers,
    pub direction: KeyDirection,
    /// The character the host's active layout actually produced, when known.
    pub produced_char: Option<char>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDirection {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyModifiers {
    pub shift: bool,
    pub alt: bool,
    pub control: bool,
    pub command: bool,
}

/// Low-level keystroke stream. The pipeline trusts `produced_char` when present.
pub trait KeystrokeSource {
    /// Pull the next pending event, if any, without blocking.
    fn poll(&mut self) -> Option<RawKeyEvent>;
}

/// A confirmed target for text mutation: either an accessibility selection,
/// a span the engine itself inserted recently, or the buffer's fresh content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplacementTarget {
    SelectionConfirmed,
    RecentInsertion { text: String, length: usize },
    FreshBuffer { text: String, length: usize },
}

/// Outcome of a replacement transaction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacementOutcome {
    Committed,
    NoTarget,
    Aborted,
}

/// Ability to synthesize keystrokes, query and mutate the focused element's
/// text through accessibility, and send paste commands.
pub trait TextHost {
    /// Read the text of the range of `length` scalars immediately behind the
    /// caret, if the host's accessibility surface supports it.
    fn read_text_behind_caret(&self, length: usize) -> Option<String>;

    /// Select the range immediately behind the caret of `length` scalars and
    /// set its value to `new_text`, through the accessibility API. Returns
    /// `true` on a confirmed post-state match.
    fn accessibility_replace(&mut self, length: usize, new_text: &str) -> bool;

    /// Whether the host currently reports a non-empty accessibility selection.
    fn has_confirmed_selection(&self) -> bool;

    /// Send the platform's paste command (e.g. Cmd+V / Ctrl+V).
    fn send_paste(&mut self);

    /// Send `count` backspace keystrokes.
    fn send_backspace(&mut self, count: usize);

    /// Type `text` verbatim.
    fn send_type(&mut self, text: &str);

    /// Send an undo command, if the host supports one. Returns `true` if sent.
    fn send_undo(&mut self) -> bool;
}

/// Atomic snapshot/restore of clipboard contents.
pub trait Clipboard {
    /// Opaque monotonically increasing id; changes whenever clipboard
    /// contents change, whether by this process or another.
    fn sequence_number(&self) -> u64;

    fn read_text(&self) -> Option<String>;

    fn write_text(&mut self, text: &str);

    /// Restore previously read contents. Only meaningful when paired with
    /// `read_text`; no-op if there was nothing to restore.
    fn restore(&mut self, snapshot: Option<String>);
}

/// Set the system's active keyboard layout by id.
pub trait LayoutSwitcher {
    fn set_active_layout(&mut self, layout_id: &str) -> bool;
    fn active_layout(&self) -> Option<String>;
}

/// Frontmost application id, opaque to the pipeline.
pub trait AppObserver {
    fn frontmost_app_id(&self) -> Option<String>;
}
