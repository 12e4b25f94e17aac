//! Shared data types for tokens, languages, layouts, and classifier decisions.

use std::time::{SystemTime, UNIX_EPOCH};

/// Hard cap on token length in Unicode scalars. Longer runs are never
/// stored in the user dictionary and are rejected by the ensemble's
/// length gate.
pub const MAX_TOKEN_LEN: usize = 48;

/// One of the three supported languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    En,
    Ru,
    He,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::En, Language::Ru, Language::He];

    pub fn as_str(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ru => "ru",
            Language::He => "he",
        }
    }

    /// The layout id a language types under when nothing has gone wrong.
    pub fn canonical_layout(self) -> LayoutId {
        match self {
            Language::En => LayoutId::new("en_us"),
            Language::Ru => LayoutId::new("ru_pc"),
            Language::He => LayoutId::new("he_standard"),
        }
    }
}

/// An opaque keyboard layout identifier, e.g. `en_us`, `ru_phonetic_yasherty`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayoutId(String);

impl LayoutId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LayoutId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One of nine (language, origin-layout) tags: three "pure" (the token
/// is already correct in that language) and six "from-layout" (the
/// token was typed under the wrong layout for its intended language).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hypothesis {
    Pure(Language),
    FromLayout { intended: Language, typed_under: Language },
}

impl Hypothesis {
    pub fn language(self) -> Language {
        match self {
            Hypothesis::Pure(l) => l,
            Hypothesis::FromLayout { intended, .. } => intended,
        }
    }

    /// All six from-layout tags plus the three pure tags, in a fixed order.
    pub fn all() -> Vec<Hypothesis> {
        let mut v = Vec::with_capacity(9);
        for l in Language::ALL {
            v.push(Hypothesis::Pure(l));
        }
        for intended in Language::ALL {
            for typed_under in Language::ALL {
                if intended != typed_under {
                    v.push(Hypothesis::FromLayout { intended, typed_under });
                }
            }
        }
        v
    }
}

impl std::fmt::Display for Hypothesis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Hypothesis::Pure(l) => write!(f, "{}", l.as_str()),
            Hypothesis::FromLayout { intended, typed_under } => {
                write!(f, "{}_from_{}_layout", intended.as_str(), typed_under.as_str())
            }
        }
    }
}

/// Distribution of character scripts within a token.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScriptProfile {
    pub latin: usize,
    pub cyrillic: usize,
    pub hebrew: usize,
    pub digit: usize,
    pub other: usize,
}

impl ScriptProfile {
    pub fn of(text: &str) -> Self {
        let mut profile = ScriptProfile::default();
        for ch in text.chars() {
            if ch.is_ascii_digit() {
                profile.digit += 1;
            } else if ch.is_ascii_alphabetic() {
                profile.latin += 1;
            } else if ('\u{0400}'..='\u{04FF}').contains(&ch) {
                profile.cyrillic += 1;
            } else if ('\u{0590}'..='\u{05FF}').contains(&ch) {
                profile.hebrew += 1;
            } else {
                profile.other += 1;
            }
        }
        profile
    }

    pub fn total(&self) -> usize {
        self.latin + self.cyrillic + self.hebrew + self.digit + self.other
    }

    /// Fraction of scalars belonging to `language`'s script, ignoring digits/other.
    pub fn fraction(&self, language: Language) -> f32 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let n = match language {
            Language::En => self.latin,
            Language::Ru => self.cyrillic,
            Language::He => self.hebrew,
        };
        n as f32 / total as f32
    }

    /// The language whose script dominates, if any single script is >= 80%.
    pub fn dominant(&self) -> Option<Language> {
        Language::ALL
            .into_iter()
            .find(|&l| self.fraction(l) >= 0.8)
    }
}

/// A contiguous run of non-boundary characters captured by the input buffer.
#[derive(Debug, Clone)]
pub struct Token {
    pub raw_text: String,
    pub script_profile: ScriptProfile,
    pub origin_timestamp: u64,
    pub source_app_id: Option<String>,
}

impl Token {
    pub fn new(raw_text: impl Into<String>, source_app_id: Option<String>) -> Self {
        let raw_text = raw_text.into();
        let script_profile = ScriptProfile::of(&raw_text);
        Token {
            raw_text,
            script_profile,
            origin_timestamp: now_unix(),
            source_app_id,
        }
    }

    pub fn len(&self) -> usize {
        self.raw_text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.raw_text.is_empty()
    }
}

pub(crate) fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// One ranked interpretation of a token.
#[derive(Debug, Clone)]
pub struct Alternative {
    pub hypothesis: Hypothesis,
    pub rewritten_text: String,
    pub score: f32,
}

/// The outcome of running the ensemble over a token: a ranked list of
/// alternatives sorted by descending score, whose head is `hypothesis`.
#[derive(Debug, Clone)]
pub struct Decision {
    pub hypothesis: Hypothesis,
    pub confidence: f32,
    pub alternatives: Vec<Alternative>,
}

impl Decision {
    /// Re-sorts `alternatives` by descending score and refreshes
    /// `hypothesis`/`confidence` to match the new head.
    pub fn resort(&mut self) {
        self.alternatives
            .sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        if let Some(head) = self.alternatives.first() {
            self.hypothesis = head.hypothesis;
            self.confidence = head.score;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_profile_dominant_latin() {
        let p = ScriptProfile::of("ghbdtn");
        assert_eq!(p.dominant(), Some(Language::En));
    }

    #[test]
    fn script_profile_dominant_cyrillic() {
        let p = ScriptProfile::of("привет");
        assert_eq!(p.dominant(), Some(Language::Ru));
    }

    #[test]
    fn script_profile_mixed_has_no_dominant() {
        let p = ScriptProfile::of("abcпривет");
        assert_eq!(p.dominant(), None);
    }

    #[test]
    fn hypothesis_all_has_nine_entries() {
        assert_eq!(Hypothesis::all().len(), 9);
    }

    #[test]
    fn hypothesis_display_matches_spec_examples() {
        let h = Hypothesis::FromLayout {
            intended: Language::Ru,
            typed_under: Language::En,
        };
        assert_eq!(h.to_string(), "ru_from_en_layout");
    }

    #[test]
    fn decision_resort_updates_head() {
        let mut d = Decision {
            hypothesis: Hypothesis::Pure(Language::En),
            confidence: 0.1,
            alternatives: vec![
                Alternative {
                    hypothesis: Hypothesis::Pure(Language::En),
                    rewritten_text: "ghbdtn".into(),
                    score: 0.1,
                },
                Alternative {
                    hypothesis: Hypothesis::FromLayout {
                        intended: Language::Ru,
                        typed_under: Language::En,
                    },
                    rewritten_text: "привет".into(),
                    score: 0.9,
                },
            ],
        };
        d.resort();
        assert_eq!(d.confidence, 0.9);
        assert_eq!(d.alternatives[0].rewritten_text, "привет");
    }
}
