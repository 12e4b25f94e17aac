use keyglot_core::{Ensemble, EnsembleContext, Language, LayoutTables, StatisticalClassifier};

fn ensemble_parts() -> (StatisticalClassifier, LayoutTables) {
    (
        StatisticalClassifier::with_heuristic_recognizer(),
        LayoutTables::embedded(),
    )
}

#[test]
fn ghbdtn_corrects_to_privet() {
    let (classifier, tables) = ensemble_parts();
    let ensemble = Ensemble::new(&classifier, &tables);
    let decision = ensemble.decide("ghbdtn", &EnsembleContext::default());
    assert_eq!(decision.hypothesis.language(), Language::Ru);
    assert_eq!(decision.alternatives[0].rewritten_text, "привет");
}

#[test]
fn akuo_corrects_to_shalom() {
    let (classifier, tables) = ensemble_parts();
    let ensemble = Ensemble::new(&classifier, &tables);
    let decision = ensemble.decide("akuo", &EnsembleContext::default());
    assert_eq!(decision.hypothesis.language(), Language::He);
    assert_eq!(decision.alternatives[0].rewritten_text, "שלום");
}

#[test]
fn plain_english_sentence_word_stays_as_is() {
    let (classifier, tables) = ensemble_parts();
    let ensemble = Ensemble::new(&classifier, &tables);
    let decision = ensemble.decide("report", &EnsembleContext::default());
    assert_eq!(decision.hypothesis.language(), Language::En);
    assert_eq!(decision.alternatives[0].rewritten_text, "report");
}

#[test]
fn layout_tables_cover_every_documented_key_for_all_three_languages() {
    let tables = LayoutTables::embedded();
    for lang in Language::ALL {
        assert!(tables.has_layout(&lang.canonical_layout()));
    }
}
