//! ConfidenceRouter: a pure function mapping a scored `Decision` plus
//! context to a route outcome. Separated from any state so it can be unit
//! tested without constructing a pipeline or doing I/O, in the idiom of
//! the teacher's extracted `determine_conversion_strategy`.

use keyglot_core::{Decision, Hypothesis, RuleAction, UserDictionaryRule};

use crate::config::Configuration;

/// Everything the router needs besides the decision and the rule: recent
/// correction history and the token's own text/length.
#[derive(Debug, Clone, Default)]
pub struct RouterContext {
    pub token_text: String,
    pub token_length: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    KeepOriginal,
    AutoCorrect { hypothesis: Hypothesis, rewritten_text: String },
    Defer,
    CycleOnly { decision: Decision },
}

/// Recorded purely for debug logging; never shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    UserRuleKeepAsIs,
    BelowDeferThreshold,
    ValidationRejected(ValidationFailure),
    NoShortWordMapping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationFailure {
    EmptyOrUnchanged,
    ContainsControlCharacter,
    LengthOutOfRatio,
    PureDuplication,
}

/// §4.6.1 validation gates.
pub fn validate_rewrite(original: &str, rewritten: &str) -> Result<(), ValidationFailure> {
    if rewritten.is_empty() || rewritten == original {
        return Err(ValidationFailure::EmptyOrUnchanged);
    }
    let has_control = rewritten.chars().any(|c| {
        let code = c as u32;
        (code <= 0x1F && c != ' ' && c != '\t' && c != '\n') || code == 0x7F
    });
    if has_control {
        return Err(ValidationFailure::ContainsControlCharacter);
    }
    let n = original.chars().count() as f32;
    let m = rewritten.chars().count() as f32;
    if n > 0.0 && (m < 0.5 * n || m > 2.0 * n) {
        return Err(ValidationFailure::LengthOutOfRatio);
    }
    if rewritten == original {
        return Err(ValidationFailure::PureDuplication);
    }
    Ok(())
}

/// Apply a user rule's boost (if `prefer_hypothesis`) and re-sort.
fn apply_user_rule_boost(mut decision: Decision, rule: Option<&UserDictionaryRule>, boost: f32) -> Decision {
    let Some(rule) = rule else { return decision };
    if let RuleAction::PreferHypothesis(preferred) = rule.action {
        for alt in decision.alternatives.iter_mut() {
            if alt.hypothesis == preferred {
                alt.score = (alt.score + boost).min(1.0);
            }
        }
        decision.resort();
    }
    decision
}

/// Route a decision. Pure: no I/O, no mutation of any store.
pub fn route(
    decision: Decision,
    rule: Option<&UserDictionaryRule>,
    context: &RouterContext,
    config: &Configuration,
) -> (RouteOutcome, Option<SkipReason>) {
    if let Some(rule) = rule {
        if matches!(rule.action, RuleAction::KeepAsIs) {
            return (RouteOutcome::KeepOriginal, Some(SkipReason::UserRuleKeepAsIs));
        }
    }

    let decision = apply_user_rule_boost(decision, rule, config.correction.context_boost);

    let head = decision
        .alternatives
        .first()
        .cloned()
        .expect("Decision always carries at least one alternative");

    if decision.confidence >= config.detection.auto_threshold {
        match validate_rewrite(&context.token_text, &head.rewritten_text) {
            Ok(()) => {
                return (
                    RouteOutcome::AutoCorrect {
                        hypothesis: head.hypothesis,
                        rewritten_text: head.rewritten_text,
                    },
                    None,
                );
            }
            Err(failure) => {
                return (
                    RouteOutcome::CycleOnly { decision },
                    Some(SkipReason::ValidationRejected(failure)),
                );
            }
        }
    }

    let short_word_defer = context.token_length < 3
        && config
            .short_word_map
            .iter()
            .any(|mapping| context.token_text.starts_with(mapping.from_key))
        && decision.confidence >= config.scoring.short_word_min_confidence;

    if decision.confidence >= config.detection.defer_threshold || short_word_defer {
        return (RouteOutcome::Defer, None);
    }

    (RouteOutcome::CycleOnly { decision }, Some(SkipReason::BelowDeferThreshold))
}
