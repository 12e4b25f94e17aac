//! Assembles a ranked `Decision` from the statistical classifier,
//! char-set heuristics (via the classifier's recognizer), length
//! rules, and recent-context bias.

use crate::classifier::StatisticalClassifier;
use crate::layout::LayoutTables;
use crate::token::{Alternative, Decision, Hypothesis, Language, ScriptProfile};
use crate::transliterate::LayoutTransliterator;

/// Context carried across tokens within a host application, used for
/// the +0.20 recent-language boost.
#[derive(Debug, Clone, Default)]
pub struct EnsembleContext {
    pub last_language: Option<Language>,
}

const CONTEXT_BOOST: f32 = 0.20;
const MAX_REWRITE_HYPOTHESES: usize = 6;

pub struct Ensemble<'a> {
    classifier: &'a StatisticalClassifier,
    transliterator: LayoutTransliterator<'a>,
}

impl<'a> Ensemble<'a> {
    pub fn new(classifier: &'a StatisticalClassifier, tables: &'a LayoutTables) -> Self {
        Self {
            classifier,
            transliterator: LayoutTransliterator::new(tables),
        }
    }

    /// Run the full procedure over token text `raw` and produce a
    /// ranked `Decision`.
    pub fn decide(&self, raw: &str, context: &EnsembleContext) -> Decision {
        let n = raw.chars().count();
        let profile = ScriptProfile::of(raw);

        // Step 2: as-is score.
        let (as_is_hypothesis, as_is_conf) = self.classifier.predict(raw);
        let as_is_language = as_is_hypothesis.language();

        let mut alternatives = vec![Alternative {
            hypothesis: Hypothesis::Pure(as_is_language),
            rewritten_text: raw.to_string(),
            score: self.apply_script_bias(as_is_conf, as_is_language, &profile),
        }];

        // Step 5: length gating — reject from-layout hypotheses for n < 3.
        if n < 3 {
            let mut decision = Decision {
                hypothesis: alternatives[0].hypothesis,
                confidence: alternatives[0].score.min(0.5),
                alternatives,
            };
            decision.alternatives[0].score = decision.confidence;
            return decision;
        }

        // Step 3: hypothesis rewrites, bounded to at most six.
        for (typed_under, intended) in self.plausible_pairs(&profile) {
            let source_layout = typed_under.canonical_layout();
            let target_layout = intended.canonical_layout();
            let rewritten = self
                .transliterator
                .transliterate(raw, &source_layout, &target_layout)
                .unwrap_or_else(|| raw.to_string());
            let score = self.classifier.score(&rewritten, intended);
            let score = self.apply_script_bias(score, intended, &ScriptProfile::of(&rewritten));
            alternatives.push(Alternative {
                hypothesis: Hypothesis::FromLayout { intended, typed_under },
                rewritten_text: rewritten,
                score,
            });
        }

        // Step 4: context bias.
        if let Some(last_lang) = context.last_language {
            for alt in &mut alternatives {
                if alt.hypothesis.language() == last_lang {
                    alt.score = (alt.score + CONTEXT_BOOST).min(1.0);
                }
            }
        }

        // Step 6: aggregate.
        let mut decision = Decision {
            hypothesis: alternatives[0].hypothesis,
            confidence: alternatives[0].score,
            alternatives,
        };
        decision.resort();
        decision
    }

    fn apply_script_bias(&self, score: f32, language: Language, profile: &ScriptProfile) -> f32 {
        if profile.dominant() == Some(language) {
            (score + 0.05).min(1.0)
        } else {
            score
        }
    }

    /// Determines which (typed_under, intended) pairs are plausible
    /// for this token's script profile, bounded to at most six, with
    /// no hypothesis evaluated more than once.
    fn plausible_pairs(&self, profile: &ScriptProfile) -> Vec<(Language, Language)> {
        let mut pairs = Vec::with_capacity(MAX_REWRITE_HYPOTHESES);
        match profile.dominant() {
            Some(typed_under) => {
                for intended in Language::ALL {
                    if intended != typed_under {
                        pairs.push((typed_under, intended));
                    }
                }
            }
            None => {
                for typed_under in Language::ALL {
                    for intended in Language::ALL {
                        if intended != typed_under {
                            pairs.push((typed_under, intended));
                        }
                    }
                }
            }
        }
        pairs.truncate(MAX_REWRITE_HYPOTHESES);
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutTables;

    fn ensemble_parts() -> (StatisticalClassifier, LayoutTables) {
        (StatisticalClassifier::with_heuristic_recognizer(), LayoutTables::embedded())
    }

    #[test]
    fn ghbdtn_resolves_to_russian_from_layout() {
        let (classifier, tables) = ensemble_parts();
        let ensemble = Ensemble::new(&classifier, &tables);
        let decision = ensemble.decide("ghbdtn", &EnsembleContext::default());
        assert_eq!(decision.hypothesis.language(), Language::Ru);
        assert_eq!(decision.alternatives[0].rewritten_text, "привет");
    }

    #[test]
    fn short_token_is_length_gated() {
        let (classifier, tables) = ensemble_parts();
        let ensemble = Ensemble::new(&classifier, &tables);
        let decision = ensemble.decide("ab", &EnsembleContext::default());
        assert!(decision.confidence <= 0.5);
        assert_eq!(decision.alternatives.len(), 1);
    }

    #[test]
    fn dominant_script_never_evaluates_more_than_two_from_layout_hypotheses() {
        let (classifier, tables) = ensemble_parts();
        let ensemble = Ensemble::new(&classifier, &tables);
        let decision = ensemble.decide("ghbdtn", &EnsembleContext::default());
        // 1 as-is + 2 from-layout (en->ru, en->he)
        assert_eq!(decision.alternatives.len(), 3);
    }

    #[test]
    fn context_bias_boosts_matching_language() {
        let (classifier, tables) = ensemble_parts();
        let ensemble = Ensemble::new(&classifier, &tables);
        let ctx = EnsembleContext {
            last_language: Some(Language::He),
        };
        let decision = ensemble.decide("ghbdtn", &ctx);
        let he_alt = decision
            .alternatives
            .iter()
            .find(|a| a.hypothesis.language() == Language::He)
            .unwrap();
        assert!(he_alt.score > 0.15);
    }

    #[test]
    fn script_determinism_property() {
        let (classifier, tables) = ensemble_parts();
        let ensemble = Ensemble::new(&classifier, &tables);
        for word in ["привет", "спасибо", "пожалуйста"] {
            let decision = ensemble.decide(word, &EnsembleContext::default());
            assert_eq!(decision.hypothesis.language(), Language::Ru, "failed for {word}");
        }
    }
}
