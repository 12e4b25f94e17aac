//! Character-by-character rewriting between layout variants.

use crate::layout::LayoutTables;
use crate::token::LayoutId;

/// Given a source and target layout, rewrites a string character by
/// character as if the target layout had been active the whole time.
pub struct LayoutTransliterator<'a> {
    tables: &'a LayoutTables,
}

impl<'a> LayoutTransliterator<'a> {
    pub fn new(tables: &'a LayoutTables) -> Self {
        Self { tables }
    }

    /// Returns `Some(rewritten)` if any character was actually
    /// remapped, `None` if the output would equal the input (nothing
    /// to correct under this hypothesis). Deterministic and O(|text|).
    /// Unmappable characters (digits, space, punctuation not present
    /// in the source layout) pass through unchanged; the
    /// transliterator never fails.
    pub fn transliterate(&self, text: &str, source: &LayoutId, target: &LayoutId) -> Option<String> {
        let mut changed = false;
        let mut out = String::with_capacity(text.len());
        for ch in text.chars() {
            match self.tables.position_of(source, ch) {
                Some((key, modifiers)) => match self.tables.lookup(target, &key, modifiers) {
                    Some(mapped) => {
                        if mapped != ch.to_string() {
                            changed = true;
                        }
                        out.push_str(mapped);
                    }
                    None => out.push(ch),
                },
                None => out.push(ch),
            }
        }
        if changed { Some(out) } else { None }
    }
}
