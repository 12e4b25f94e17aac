//! A character-n-gram scorer combined with a pluggable language
//! recognizer, treated as a black-box oracle that returns
//! `(top_hypothesis, confidence)` for raw text.
//!
//! The n-gram model is a small embedded trigram frequency table per
//! language, parsed once at construction (never on the hot path). The
//! "OS-provided language recognizer" is a trait so a real platform
//! implementation can be swapped in without touching the classifier;
//! this crate ships a char-set-heuristic fallback.

use std::collections::{HashMap, HashSet};

use crate::token::{Hypothesis, Language};

const CORPUS_EN: &str = include_str!("../data/corpus_en.txt");
const CORPUS_RU: &str = include_str!("../data/corpus_ru.txt");
const CORPUS_HE: &str = include_str!("../data/corpus_he.txt");

/// Restricted to {EN, RU, HE}, mirroring the OS-provided recognizer
/// named in the design. The classifier calls this once per `predict`
/// and blends its answer with the n-gram score.
pub trait LanguageRecognizer: Send + Sync {
    fn recognize(&self, text: &str) -> Option<Language>;
}

/// Vowel-presence / max-consonant-run / rare-letter heuristics per
/// script, good enough to drive the classifier without a real OS
/// integration.
#[derive(Default)]
pub struct HeuristicRecognizer;

impl LanguageRecognizer for HeuristicRecognizer {
    fn recognize(&self, text: &str) -> Option<Language> {
        let profile = crate::token::ScriptProfile::of(text);
        profile.dominant().filter(|&lang| match lang {
            Language::En => is_plausible_en_token(text),
            Language::Ru => is_plausible_ru_token(text),
            Language::He => true,
        })
    }
}

fn is_plausible_en_token(s: &str) -> bool {
    if !has_en_vowel(s) {
        return false;
    }
    max_consonant_run(s, is_en_vowel) <= 4
}

fn is_plausible_ru_token(s: &str) -> bool {
    if !has_ru_vowel(s) {
        return false;
    }
    max_consonant_run(s, is_ru_vowel) <= 4
}

fn has_en_vowel(s: &str) -> bool {
    s.chars().any(is_en_vowel)
}

fn has_ru_vowel(s: &str) -> bool {
    s.chars().any(is_ru_vowel)
}

fn is_en_vowel(c: char) -> bool {
    matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u' | 'y')
}

fn is_ru_vowel(c: char) -> bool {
    matches!(
        c.to_lowercase().next().unwrap_or(c),
        'а' | 'е' | 'ё' | 'и' | 'о' | 'у' | 'ы' | 'э' | 'ю' | 'я'
    )
}

fn max_consonant_run(s: &str, is_vowel: impl Fn(char) -> bool) -> usize {
    let mut run = 0usize;
    let mut max_run = 0usize;
    for ch in s.chars() {
        if !ch.is_alphabetic() {
            continue;
        }
        if is_vowel(ch) {
            run = 0;
        } else {
            run += 1;
            max_run = max_run.max(run);
        }
    }
    max_run
}

/// Per-language trigram frequency table, built once from a small
/// embedded corpus.
struct NgramModel {
    trigrams: HashSet<String>,
}

impl NgramModel {
    fn from_corpus(corpus: &str) -> Self {
        let mut trigrams = HashSet::new();
        for line in corpus.lines() {
            let normalized: String = line.chars().flat_map(|c| c.to_lowercase()).collect();
            let chars: Vec<char> = normalized.chars().collect();
            for window in chars.windows(3) {
                trigrams.insert(window.iter().collect());
            }
        }
        Self { trigrams }
    }

    /// Fraction of `text`'s trigrams present in this model, in [0,1].
    /// Texts shorter than 3 code-points yield 0.0 (caller falls back
    /// to the script-guess path).
    fn coverage(&self, text: &str) -> f32 {
        let normalized: String = text.chars().flat_map(|c| c.to_lowercase()).collect();
        let chars: Vec<char> = normalized.chars().collect();
        if chars.len() < 3 {
            return 0.0;
        }
        let windows: Vec<String> = chars.windows(3).map(|w| w.iter().collect()).collect();
        let hits = windows.iter().filter(|w| self.trigrams.contains(*w)).count();
        hits as f32 / windows.len() as f32
    }
}

/// Scores arbitrary text for plausibility under each supported
/// language. Allocated once and reused; `predict` performs no
/// allocation beyond what's needed to normalize the input text.
pub struct StatisticalClassifier {
    models: HashMap<Language, NgramModel>,
    recognizer: Box<dyn LanguageRecognizer>,
}

impl StatisticalClassifier {
    pub fn new(recognizer: Box<dyn LanguageRecognizer>) -> Self {
        let mut models = HashMap::new();
        models.insert(Language::En, NgramModel::from_corpus(CORPUS_EN));
        models.insert(Language::Ru, NgramModel::from_corpus(CORPUS_RU));
        models.insert(Language::He, NgramModel::from_corpus(CORPUS_HE));
        Self { models, recognizer }
    }

    pub fn with_heuristic_recognizer() -> Self {
        Self::new(Box::new(HeuristicRecognizer))
    }

    /// `predict(text) -> (Hypothesis, f32)`. Input shorter than 2
    /// code-points returns a low-confidence script guess; the
    /// returned hypothesis is always `Pure(language)` since the
    /// classifier has no notion of layouts — the ensemble re-tags it
    /// as a from-layout hypothesis when it already knows which
    /// transliteration produced `text`.
    pub fn predict(&self, text: &str) -> (Hypothesis, f32) {
        let len = text.chars().count();
        if len < 2 {
            let guess = crate::token::ScriptProfile::of(text)
                .dominant()
                .unwrap_or(Language::En);
            return (Hypothesis::Pure(guess), 0.2);
        }

        let mut best = (Language::En, 0.0f32);
        for lang in Language::ALL {
            let score = self.score(text, lang);
            if score > best.1 {
                best = (lang, score);
            }
        }
        (Hypothesis::Pure(best.0), best.1)
    }

    /// Plausibility of `text` under a specific `language`, in [0,1].
    /// Used by the ensemble to score a transliterated candidate
    /// against the language it claims to represent, independent of
    /// which language the classifier would have guessed first.
    pub fn score(&self, text: &str, language: Language) -> f32 {
        let ngram_score = self.models[&language].coverage(text);
        let recognizer_boost = if self.recognizer.recognize(text) == Some(language) {
            0.15
        } else {
            0.0
        };
        (ngram_score * 0.85 + recognizer_boost).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_input_returns_low_confidence_guess() {
        let classifier = StatisticalClassifier::with_heuristic_recognizer();
        let (hyp, conf) = classifier.predict("a");
        assert_eq!(hyp, Hypothesis::Pure(Language::En));
        assert!(conf <= 0.5);
    }

    #[test]
    fn predicts_russian_for_russian_text() {
        let classifier = StatisticalClassifier::with_heuristic_recognizer();
        let (hyp, conf) = classifier.predict("привет как дела");
        assert_eq!(hyp.language(), Language::Ru);
        assert!(conf > 0.0);
    }

    #[test]
    fn predicts_english_for_english_text() {
        let classifier = StatisticalClassifier::with_heuristic_recognizer();
        let (hyp, _) = classifier.predict("please send the report");
        assert_eq!(hyp.language(), Language::En);
    }

    #[test]
    fn heuristic_recognizer_rejects_unpronounceable_latin() {
        assert!(!is_plausible_en_token("ghbdtn"));
    }

    #[test]
    fn heuristic_recognizer_accepts_real_word() {
        assert!(is_plausible_en_token("hello"));
    }
}
