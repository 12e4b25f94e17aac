pub mod classifier;
pub mod ensemble;
pub mod error;
pub mod layout;
pub mod token;
pub mod transliterate;
pub mod userdict;

pub use classifier::{LanguageRecognizer, StatisticalClassifier};
pub use ensemble::{Ensemble, EnsembleContext};
pub use error::CoreError;
pub use layout::{LayoutTables, Modifiers};
pub use token::{Alternative, Decision, Hypothesis, Language, LayoutId, ScriptProfile, Token};
pub use transliterate::LayoutTransliterator;
pub use userdict::{
    MatchMode, Mode, RuleAction, RuleScope, UserDictionary, UserDictionaryError, UserDictionaryRule,
};
