//! Bidirectional character maps per (layout, modifier mask).
//!
//! Tables are loaded from a bundled TOML data file at startup (the
//! format in §6 of the design: `schema_version`, `layouts`,
//! `layout_aliases`, `keys`, `map`). A minimal embedded fallback
//! covers `en_us`, `ru_pc`, `he_standard` so the system boots even
//! with a corrupt data file, in the same never-hard-fail spirit as
//! the teacher's settings loader falling back to `DEFAULT_CONFIG_TOML`.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::CoreError;
use crate::token::LayoutId;

/// Embedded minimal layout table, used whenever the bundled data file
/// is missing or fails validation.
const EMBEDDED_LAYOUT_TOML: &str = include_str!("../data/layouts.toml");

/// Modifier combination under which a key was pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers { shift: false, alt: false };
    pub const SHIFT: Modifiers = Modifiers { shift: true, alt: false };
    pub const ALT: Modifiers = Modifiers { shift: false, alt: true };
    pub const SHIFT_ALT: Modifiers = Modifiers { shift: true, alt: true };

    fn field_name(self) -> &'static str {
        match (self.shift, self.alt) {
            (false, false) => "n",
            (true, false) => "s",
            (false, true) => "a",
            (true, true) => "sa",
        }
    }
}

#[derive(Debug, Deserialize)]
struct LayoutDataFile {
    #[allow(dead_code)]
    schema_version: u32,
    #[allow(dead_code)]
    layouts: HashMap<String, LayoutMeta>,
    #[serde(default)]
    layout_aliases: HashMap<String, String>,
    keys: Vec<KeyDef>,
    map: HashMap<String, HashMap<String, KeyOutputs>>,
}

#[derive(Debug, Deserialize)]
struct LayoutMeta {
    #[allow(dead_code)]
    name: String,
    #[allow(dead_code)]
    platform: Option<String>,
    #[allow(dead_code)]
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KeyDef {
    code: String,
    #[allow(dead_code)]
    qwerty_label: String,
}

#[derive(Debug, Deserialize, Default, Clone)]
struct KeyOutputs {
    n: Option<String>,
    s: Option<String>,
    a: Option<String>,
    sa: Option<String>,
}

impl KeyOutputs {
    fn get(&self, modifiers: Modifiers) -> Option<&str> {
        match modifiers.field_name() {
            "n" => self.n.as_deref(),
            "s" => self.s.as_deref(),
            "a" => self.a.as_deref(),
            "sa" => self.sa.as_deref(),
            _ => unreachable!(),
        }
    }
}

/// Loaded, queryable set of layout key maps plus a reverse index used
/// by the transliterator to find where a character lives.
pub struct LayoutTables {
    aliases: HashMap<String, String>,
    /// layout id -> key code -> modifiers-indexed outputs
    forward: HashMap<String, HashMap<String, KeyOutputs>>,
    /// layout id -> char -> (key code, modifiers); built once at load time.
    reverse: HashMap<String, HashMap<char, (String, Modifiers)>>,
    key_order: Vec<String>,
}

impl LayoutTables {
    /// Load from a bundled data file's contents, falling back to the
    /// embedded minimal table (and logging a warning) if the document
    /// is malformed or missing required entries.
    pub fn load(data_file_contents: Option<&str>) -> Self {
        if let Some(contents) = data_file_contents {
            match Self::parse(contents) {
                Ok(tables) => return tables,
                Err(err) => {
                    tracing::warn!(error = %err, "layout data file invalid, falling back to embedded defaults");
                }
            }
        }
        Self::parse(EMBEDDED_LAYOUT_TOML).expect("embedded layout table must be valid")
    }

    pub fn embedded() -> Self {
        Self::parse(EMBEDDED_LAYOUT_TOML).expect("embedded layout table must be valid")
    }

    fn parse(contents: &str) -> Result<Self, CoreError> {
        let doc: LayoutDataFile =
            toml::from_str(contents).map_err(|e| CoreError::InvalidLayoutData(e.to_string()))?;

        let key_order: Vec<String> = doc.keys.iter().map(|k| k.code.clone()).collect();

        // Validate: every documented layout has n/s for every key it appears under.
        for (layout_id, per_layout) in &doc.map {
            for key in &doc.keys {
                if let Some(outputs) = per_layout.get(&key.code) {
                    if outputs.n.is_none() || outputs.s.is_none() {
                        return Err(CoreError::InvalidLayoutData(format!(
                            "layout {layout_id} missing base/shift output for key {}",
                            key.code
                        )));
                    }
                }
            }
        }

        let mut forward: HashMap<String, HashMap<String, KeyOutputs>> = HashMap::new();
        for (key_code, per_layout) in doc.map {
            for (layout_id, outputs) in per_layout {
                forward
                    .entry(layout_id)
                    .or_default()
                    .insert(key_code.clone(), outputs);
            }
        }

        let mut reverse: HashMap<String, HashMap<char, (String, Modifiers)>> = HashMap::new();
        for (layout_id, keys) in &forward {
            let rev = reverse.entry(layout_id.clone()).or_default();
            for (key_code, outputs) in keys {
                for (modifiers, text) in [
                    (Modifiers::NONE, &outputs.n),
                    (Modifiers::SHIFT, &outputs.s),
                    (Modifiers::ALT, &outputs.a),
                    (Modifiers::SHIFT_ALT, &outputs.sa),
                ] {
                    if let Some(text) = text {
                        for ch in text.chars() {
                            rev.entry(ch).or_insert_with(|| (key_code.clone(), modifiers));
                        }
                    }
                }
            }
        }

        Ok(LayoutTables {
            aliases: doc.layout_aliases,
            forward,
            reverse,
            key_order,
        })
    }

    /// Chase the alias map to a canonical layout id.
    pub fn canonicalize_owned(&self, layout_id: &str) -> LayoutId {
        let mut current = layout_id.to_string();
        let mut hops = 0;
        while let Some(target) = self.aliases.get(&current) {
            current = target.clone();
            hops += 1;
            if hops > 8 {
                break;
            }
        }
        LayoutId::new(current)
    }

    /// O(1): the string a key+modifier combination produces under `layout`.
    pub fn lookup(&self, layout: &LayoutId, key_code: &str, modifiers: Modifiers) -> Option<&str> {
        let canonical = self.canonicalize_owned(layout.as_str());
        self.forward
            .get(canonical.as_str())
            .and_then(|keys| keys.get(key_code))
            .and_then(|outputs| outputs.get(modifiers))
    }

    /// Reverse lookup used by the transliterator: where does `ch` live
    /// under `layout`?
    pub fn position_of(&self, layout: &LayoutId, ch: char) -> Option<(String, Modifiers)> {
        let canonical = self.canonicalize_owned(layout.as_str());
        self.reverse.get(canonical.as_str()).and_then(|rev| rev.get(&ch)).cloned()
    }

    pub fn has_layout(&self, layout: &LayoutId) -> bool {
        let canonical = self.canonicalize_owned(layout.as_str());
        self.forward.contains_key(canonical.as_str())
    }

    pub fn key_order(&self) -> &[String] {
        &self.key_order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_table_covers_three_languages() {
        let tables = LayoutTables::embedded();
        assert!(tables.has_layout(&LayoutId::new("en_us")));
        assert!(tables.has_layout(&LayoutId::new("ru_pc")));
        assert!(tables.has_layout(&LayoutId::new("he_standard")));
    }

    #[test]
    fn lookup_and_position_of_are_inverse() {
        let tables = LayoutTables::embedded();
        let layout = LayoutId::new("en_us");
        for key in tables.key_order().to_vec() {
            if let Some(text) = tables.lookup(&layout, &key, Modifiers::NONE) {
                for ch in text.chars() {
                    let (found_key, modifiers) = tables.position_of(&layout, ch).unwrap();
                    assert_eq!(found_key, key);
                    assert_eq!(modifiers, Modifiers::NONE);
                }
            }
        }
    }

    #[test]
    fn malformed_table_falls_back_to_embedded() {
        let tables = LayoutTables::load(Some("not valid toml {{{"));
        assert!(tables.has_layout(&LayoutId::new("en_us")));
    }

    #[test]
    fn canonicalize_chases_aliases() {
        let tables = LayoutTables::embedded();
        // en_us has no alias, should resolve to itself.
        assert_eq!(tables.canonicalize_owned("en_us").as_str(), "en_us");
    }
}
