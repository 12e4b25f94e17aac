//! Persistent, bounded store of per-token user preferences.
//!
//! Learns from undo (`record_auto_reject`) and manual selection
//! (`record_manual_apply`); unlearns from override
//! (`record_override`). Persistence follows the teacher's
//! learning-cache idiom: a newline-delimited, comment-headed record
//! file, atomically rewritten, with a dirty flag to debounce writes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

use crate::token::{Hypothesis, Language, MAX_TOKEN_LEN};

const RECORD_VERSION: &str = "keyglot user-dictionary v1";
const MAX_RULES: usize = 500;
const MAX_EVIDENCE_TIMESTAMPS: usize = 10;
const AUTO_REJECT_WINDOW_SECS: u64 = 14 * 24 * 60 * 60;
const AUTO_REJECT_UPGRADE_THRESHOLD: u32 = 2;
const OVERRIDE_REMOVE_THRESHOLD: u32 = 2;

#[derive(Debug, Error)]
pub enum UserDictionaryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Exact,
    CaseInsensitive,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleScope {
    Global,
    PerApp(String),
    PerMode(Mode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Automatic,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    /// Pending: awaiting a second signal to become active.
    None,
    KeepAsIs,
    PreferLanguage(Language),
    PreferHypothesis(Hypothesis),
}

#[derive(Debug, Clone, Default)]
pub struct Evidence {
    pub auto_reject_count: u32,
    pub manual_apply_count: u32,
    pub override_count: u32,
    /// Sliding window of the last `MAX_EVIDENCE_TIMESTAMPS` events of any
    /// kind, kept for bookkeeping/display.
    pub timestamps: Vec<u64>,
    /// Sliding window of the last `MAX_EVIDENCE_TIMESTAMPS` auto-reject
    /// timestamps specifically, so an interleaved manual apply can never
    /// shift which timestamps count toward the 14-day upgrade window.
    pub auto_reject_timestamps: Vec<u64>,
}

impl Evidence {
    fn push_timestamp(&mut self, ts: u64) {
        self.timestamps.push(ts);
        if self.timestamps.len() > MAX_EVIDENCE_TIMESTAMPS {
            self.timestamps.remove(0);
        }
    }

    fn push_auto_reject_timestamp(&mut self, ts: u64) {
        self.auto_reject_timestamps.push(ts);
        if self.auto_reject_timestamps.len() > MAX_EVIDENCE_TIMESTAMPS {
            self.auto_reject_timestamps.remove(0);
        }
    }

    fn auto_rejects_within_window(&self, now: u64, window_secs: u64) -> u32 {
        self.auto_reject_timestamps
            .iter()
            .filter(|&&ts| now.saturating_sub(ts) <= window_secs)
            .count() as u32
    }
}

#[derive(Debug, Clone)]
pub struct UserDictionaryRule {
    pub id: u64,
    pub token: String,
    pub match_mode: MatchMode,
    pub scope: RuleScope,
    pub action: RuleAction,
    pub source: RuleSource,
    pub evidence: Evidence,
    pub created_at: u64,
    pub updated_at: u64,
    /// Monotonic touch counter, used to break ties in `updated_at`
    /// (wall-clock seconds) when deciding LRU eviction order.
    seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSource {
    Learned,
    Manual,
}

/// Normalizes a raw token: Unicode simple-case-fold (lowercase) and
/// NFC-normalized.
pub fn normalize(token: &str) -> String {
    token.nfc().collect::<String>().to_lowercase()
}

pub struct UserDictionary {
    rules: HashMap<(String, RuleScopeKey), UserDictionaryRule>,
    next_id: u64,
    next_seq: u64,
    dirty: bool,
    path: Option<PathBuf>,
}

/// Hashable key form of `RuleScope`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RuleScopeKey {
    Global,
    PerApp(String),
    PerMode(&'static str),
}

fn scope_key(scope: &RuleScope) -> RuleScopeKey {
    match scope {
        RuleScope::Global => RuleScopeKey::Global,
        RuleScope::PerApp(id) => RuleScopeKey::PerApp(id.clone()),
        RuleScope::PerMode(Mode::Automatic) => RuleScopeKey::PerMode("automatic"),
        RuleScope::PerMode(Mode::Manual) => RuleScopeKey::PerMode("manual"),
    }
}

impl Default for UserDictionary {
    fn default() -> Self {
        Self {
            rules: HashMap::new(),
            next_id: 1,
            next_seq: 1,
            dirty: false,
            path: None,
        }
    }
}

impl UserDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// `lookup(token) -> Option<&Rule>`. Normalizes the input and
    /// consults both exact-case and case-insensitive rules, exact
    /// winning. A pending (`action = None`) rule is returned for
    /// bookkeeping; routing ignores it.
    pub fn lookup(&self, token: &str, scope: &RuleScope) -> Option<&UserDictionaryRule> {
        let key = scope_key(scope);
        let exact = self.rules.get(&(token.to_string(), key.clone()));
        if exact.is_some() {
            return exact;
        }
        let normalized = normalize(token);
        self.rules.get(&(normalized, key))
    }

    /// `record_auto_reject(token)`: increment `auto_reject_count`,
    /// append timestamp, set `last_seen` via `updated_at`. Creates a
    /// pending rule if none existed; upgrades to `keep_as_is` once
    /// two auto-rejects occur within the 14-day window.
    pub fn record_auto_reject(&mut self, token: &str, scope: RuleScope) {
        if token.chars().count() > MAX_TOKEN_LEN {
            return;
        }
        let normalized = normalize(token);
        let now = now_unix();
        let key = (normalized.clone(), scope_key(&scope));
        let next_seq = &mut self.next_seq;
        let rule = self.rules.entry(key).or_insert_with(|| UserDictionaryRule {
            id: 0,
            token: normalized.clone(),
            match_mode: MatchMode::CaseInsensitive,
            scope,
            action: RuleAction::None,
            source: RuleSource::Learned,
            evidence: Evidence::default(),
            created_at: now,
            updated_at: now,
            seq: 0,
        });
        if rule.id == 0 {
            rule.id = self.next_id;
            self.next_id += 1;
        }
        rule.evidence.auto_reject_count += 1;
        rule.evidence.push_timestamp(now);
        rule.evidence.push_auto_reject_timestamp(now);
        rule.updated_at = now;
        rule.seq = *next_seq;
        *next_seq += 1;

        if rule.evidence.auto_rejects_within_window(now, AUTO_REJECT_WINDOW_SECS)
            >= AUTO_REJECT_UPGRADE_THRESHOLD
        {
            rule.action = RuleAction::KeepAsIs;
        }
        self.dirty = true;
        self.evict_if_needed();
    }

    /// `record_manual_apply(token, hypothesis)`: find-or-create rule;
    /// set `action = prefer_hypothesis(hypothesis)`; increment
    /// `manual_apply_count`. Always overrides a pending state, and
    /// most-recent-wins over a conflicting prior preference.
    pub fn record_manual_apply(&mut self, token: &str, hypothesis: Hypothesis, scope: RuleScope) {
        if token.chars().count() > MAX_TOKEN_LEN {
            return;
        }
        let normalized = normalize(token);
        let now = now_unix();
        let key = (normalized.clone(), scope_key(&scope));
        let next_seq = &mut self.next_seq;
        let rule = self.rules.entry(key).or_insert_with(|| UserDictionaryRule {
            id: 0,
            token: normalized.clone(),
            match_mode: MatchMode::CaseInsensitive,
            scope,
            action: RuleAction::None,
            source: RuleSource::Learned,
            evidence: Evidence::default(),
            created_at: now,
            updated_at: now,
            seq: 0,
        });
        if rule.id == 0 {
            rule.id = self.next_id;
            self.next_id += 1;
        }
        rule.action = RuleAction::PreferHypothesis(hypothesis);
        rule.evidence.manual_apply_count += 1;
        rule.evidence.push_timestamp(now);
        rule.updated_at = now;
        rule.seq = *next_seq;
        *next_seq += 1;
        self.dirty = true;
        self.evict_if_needed();
    }

    /// `record_override(token)`: the user manually corrected a token
    /// whose rule said `keep_as_is` or a conflicting preference.
    /// Increments `override_count`; removes the rule once it reaches
    /// the threshold.
    pub fn record_override(&mut self, token: &str, scope: RuleScope) {
        let normalized = normalize(token);
        let now = now_unix();
        let key = (normalized, scope_key(&scope));
        let Some(rule) = self.rules.get_mut(&key) else {
            return;
        };
        rule.evidence.override_count += 1;
        rule.updated_at = now;
        rule.seq = self.next_seq;
        self.next_seq += 1;
        if rule.evidence.override_count >= OVERRIDE_REMOVE_THRESHOLD {
            self.rules.remove(&key);
        }
        self.dirty = true;
    }

    /// LRU eviction once the store exceeds 500 entries, oldest
    /// `updated_at` first with `seq` (a monotonic touch counter) as
    /// tie-breaker so evictions stay deterministic within the same
    /// wall-clock second.
    fn evict_if_needed(&mut self) {
        while self.rules.len() > MAX_RULES {
            let oldest_key = self
                .rules
                .iter()
                .min_by_key(|(_, rule)| (rule.updated_at, rule.seq))
                .map(|(key, _)| key.clone());
            if let Some(key) = oldest_key {
                self.rules.remove(&key);
            } else {
                break;
            }
        }
    }

    /// Removes every learned/manual rule (the "clear all learned
    /// rules" administrative action).
    pub fn clear(&mut self) {
        self.rules.clear();
        self.dirty = true;
    }

    /// Load-time failures leave the in-memory store empty and rename
    /// the broken file aside; this never propagates an error upward.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut dict = Self {
            path: Some(path.to_path_buf()),
            ..Self::default()
        };
        match fs::read_to_string(path) {
            Ok(contents) => {
                if let Err(err) = dict.load_contents(&contents) {
                    tracing::warn!(error = %err, "user dictionary corrupt, starting empty");
                    Self::quarantine(path);
                    dict.rules.clear();
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(error = %err, "failed to read user dictionary file");
            }
        }
        dict.dirty = false;
        dict
    }

    fn quarantine(path: &Path) {
        let now = now_unix();
        let broken = path.with_extension(format!("corrupt.{now}"));
        let _ = fs::rename(path, broken);
    }

    fn load_contents(&mut self, contents: &str) -> Result<(), UserDictionaryError> {
        let mut max_id = 0u64;
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(rule) = parse_record(line) {
                max_id = max_id.max(rule.id);
                let key = (rule.token.clone(), scope_key(&rule.scope));
                self.rules.insert(key, rule);
            }
        }
        self.next_id = max_id + 1;
        Ok(())
    }

    /// Atomically rewrites the persistence file (write-temp-then-rename).
    pub fn save(&mut self) -> Result<(), UserDictionaryError> {
        let Some(path) = self.path.clone() else {
            self.dirty = false;
            return Ok(());
        };
        self.save_to(&path)?;
        self.dirty = false;
        Ok(())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), UserDictionaryError> {
        let mut out = String::new();
        out.push_str(&format!("# {RECORD_VERSION}\n"));
        for rule in self.rules.values() {
            out.push_str(&format_record(rule));
            out.push('\n');
        }
        let tmp_path = path.with_extension("tmp");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&tmp_path, out)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn format_record(rule: &UserDictionaryRule) -> String {
    let action = match &rule.action {
        RuleAction::None => "none".to_string(),
        RuleAction::KeepAsIs => "keep_as_is".to_string(),
        RuleAction::PreferLanguage(lang) => format!("prefer_language:{}", lang.as_str()),
        RuleAction::PreferHypothesis(h) => format!("prefer_hypothesis:{h}"),
    };
    let scope = match &rule.scope {
        RuleScope::Global => "global".to_string(),
        RuleScope::PerApp(id) => format!("app:{id}"),
        RuleScope::PerMode(Mode::Automatic) => "mode:automatic".to_string(),
        RuleScope::PerMode(Mode::Manual) => "mode:manual".to_string(),
    };
    let timestamps = rule
        .evidence
        .timestamps
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let auto_reject_timestamps = rule
        .evidence
        .auto_reject_timestamps
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "{id}\t{token}\t{scope}\t{action}\t{auto}\t{manual}\t{ovr}\t{ts}\t{created}\t{updated}\t{auto_ts}",
        id = rule.id,
        token = rule.token,
        auto = rule.evidence.auto_reject_count,
        manual = rule.evidence.manual_apply_count,
        ovr = rule.evidence.override_count,
        ts = timestamps,
        created = rule.created_at,
        updated = rule.updated_at,
        auto_ts = auto_reject_timestamps,
    )
}

fn parse_record(line: &str) -> Option<UserDictionaryRule> {
    let mut fields = line.split('\t');
    let id: u64 = fields.next()?.parse().ok()?;
    let token = fields.next()?.to_string();
    let scope = match fields.next()? {
        "global" => RuleScope::Global,
        s if s.starts_with("app:") => RuleScope::PerApp(s["app:".len()..].to_string()),
        "mode:automatic" => RuleScope::PerMode(Mode::Automatic),
        "mode:manual" => RuleScope::PerMode(Mode::Manual),
        _ => return None,
    };
    let action_field = fields.next()?;
    let action = parse_action(action_field)?;
    let auto_reject_count: u32 = fields.next()?.parse().ok()?;
    let manual_apply_count: u32 = fields.next()?.parse().ok()?;
    let override_count: u32 = fields.next()?.parse().ok()?;
    let timestamps = fields
        .next()?
        .split(',')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    let created_at: u64 = fields.next()?.parse().ok()?;
    let updated_at: u64 = fields.next()?.parse().ok()?;
    let auto_reject_timestamps = fields
        .next()
        .map(|field| field.split(',').filter(|s| !s.is_empty()).filter_map(|s| s.parse().ok()).collect())
        .unwrap_or_default();
    Some(UserDictionaryRule {
        id,
        token,
        match_mode: MatchMode::CaseInsensitive,
        scope,
        action,
        source: RuleSource::Learned,
        evidence: Evidence {
            auto_reject_count,
            manual_apply_count,
            override_count,
            timestamps,
            auto_reject_timestamps,
        },
        created_at,
        updated_at,
        seq: 0,
    })
}

fn parse_action(field: &str) -> Option<RuleAction> {
    if field == "none" {
        return Some(RuleAction::None);
    }
    if field == "keep_as_is" {
        return Some(RuleAction::KeepAsIs);
    }
    if let Some(lang) = field.strip_prefix("prefer_language:") {
        return parse_language(lang).map(RuleAction::PreferLanguage);
    }
    if let Some(hyp) = field.strip_prefix("prefer_hypothesis:") {
        return parse_hypothesis(hyp).map(RuleAction::PreferHypothesis);
    }
    None
}

fn parse_language(field: &str) -> Option<Language> {
    match field {
        "en" => Some(Language::En),
        "ru" => Some(Language::Ru),
        "he" => Some(Language::He),
        _ => None,
    }
}

/// Symmetric with `Hypothesis`'s `Display` impl: `"en"`/`"ru"`/`"he"` for
/// pure tags, `"{intended}_from_{typed_under}_layout"` for from-layout tags.
fn parse_hypothesis(field: &str) -> Option<Hypothesis> {
    if let Some(language) = parse_language(field) {
        return Some(Hypothesis::Pure(language));
    }
    let rest = field.strip_suffix("_layout")?;
    let mut parts = rest.splitn(2, "_from_");
    let intended = parse_language(parts.next()?)?;
    let typed_under = parse_language(parts.next()?)?;
    Some(Hypothesis::FromLayout { intended, typed_under })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn auto_reject_twice_upgrades_to_keep_as_is() {
        let mut dict = UserDictionary::new();
        dict.record_auto_reject("ytn", RuleScope::Global);
        dict.record_auto_reject("ytn", RuleScope::Global);
        let rule = dict.lookup("ytn", &RuleScope::Global).unwrap();
        assert_eq!(rule.action, RuleAction::KeepAsIs);
    }

    #[test]
    fn single_auto_reject_is_pending() {
        let mut dict = UserDictionary::new();
        dict.record_auto_reject("ytn", RuleScope::Global);
        let rule = dict.lookup("ytn", &RuleScope::Global).unwrap();
        assert_eq!(rule.action, RuleAction::None);
    }

    #[test]
    fn learning_monotonicity_property() {
        let mut dict = UserDictionary::new();
        dict.record_auto_reject("ytn", RuleScope::Global);
        dict.record_auto_reject("ytn", RuleScope::Global);
        assert_eq!(
            dict.lookup("ytn", &RuleScope::Global).unwrap().action,
            RuleAction::KeepAsIs
        );
        dict.record_override("ytn", RuleScope::Global);
        assert!(dict.lookup("ytn", &RuleScope::Global).is_some());
        dict.record_override("ytn", RuleScope::Global);
        assert!(dict.lookup("ytn", &RuleScope::Global).is_none());
    }

    #[test]
    fn interleaved_manual_apply_does_not_dilute_auto_reject_window() {
        let mut dict = UserDictionary::new();
        dict.record_auto_reject("ytn", RuleScope::Global);
        dict.record_manual_apply("ytn", Hypothesis::Pure(Language::Ru), RuleScope::Global);
        dict.record_auto_reject("ytn", RuleScope::Global);
        let rule = dict.lookup("ytn", &RuleScope::Global).unwrap();
        assert_eq!(rule.evidence.auto_reject_count, 2);
        assert_eq!(rule.action, RuleAction::KeepAsIs);
    }

    #[test]
    fn manual_apply_overrides_pending_and_most_recent_wins() {
        let mut dict = UserDictionary::new();
        dict.record_auto_reject("foo", RuleScope::Global);
        let h1 = Hypothesis::Pure(Language::Ru);
        dict.record_manual_apply("foo", h1, RuleScope::Global);
        assert_eq!(
            dict.lookup("foo", &RuleScope::Global).unwrap().action,
            RuleAction::PreferHypothesis(h1)
        );
        let h2 = Hypothesis::Pure(Language::He);
        dict.record_manual_apply("foo", h2, RuleScope::Global);
        assert_eq!(
            dict.lookup("foo", &RuleScope::Global).unwrap().action,
            RuleAction::PreferHypothesis(h2)
        );
    }

    #[test]
    fn dictionary_cap_evicts_least_recently_updated() {
        let mut dict = UserDictionary::new();
        for i in 0..501 {
            dict.record_auto_reject(&format!("word{i}"), RuleScope::Global);
        }
        assert_eq!(dict.len(), 500);
        assert!(dict.lookup("word0", &RuleScope::Global).is_none());
        assert!(dict.lookup("word500", &RuleScope::Global).is_some());
    }

    #[test]
    fn tokens_over_cap_length_are_silently_dropped() {
        let mut dict = UserDictionary::new();
        let long_token = "a".repeat(49);
        dict.record_auto_reject(&long_token, RuleScope::Global);
        assert!(dict.is_empty());
    }

    #[test]
    fn normalize_lowercases_and_nfc_normalizes() {
        assert_eq!(normalize("YTN"), "ytn");
    }

    #[test]
    fn round_trip_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("userdict.tsv");
        let mut dict = UserDictionary::load(&path);
        dict.record_auto_reject("ytn", RuleScope::Global);
        dict.record_auto_reject("ytn", RuleScope::Global);
        dict.save_to(&path).unwrap();

        let reloaded = UserDictionary::load(&path);
        let rule = reloaded.lookup("ytn", &RuleScope::Global).unwrap();
        assert_eq!(rule.action, RuleAction::KeepAsIs);
        assert_eq!(rule.evidence.auto_reject_count, 2);
    }

    #[test]
    fn round_trip_persistence_preserves_prefer_hypothesis() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("userdict.tsv");
        let mut dict = UserDictionary::load(&path);
        let hypothesis = Hypothesis::FromLayout { intended: Language::He, typed_under: Language::En };
        dict.record_manual_apply("akuo", hypothesis, RuleScope::Global);
        dict.save_to(&path).unwrap();

        let reloaded = UserDictionary::load(&path);
        let rule = reloaded.lookup("akuo", &RuleScope::Global).unwrap();
        assert_eq!(rule.action, RuleAction::PreferHypothesis(hypothesis));
        assert_eq!(rule.evidence.manual_apply_count, 1);
    }

    #[test]
    fn corrupt_file_starts_empty_and_is_quarantined() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("userdict.tsv");
        fs::write(&path, "not\ta\tvalid\trecord\n").unwrap();
        let dict = UserDictionary::load(&path);
        assert!(dict.is_empty());
    }

    #[test]
    fn exact_case_wins_over_case_insensitive() {
        let mut dict = UserDictionary::new();
        dict.record_manual_apply("Foo", Hypothesis::Pure(Language::Ru), RuleScope::Global);
        // normalized lookup still finds it since only one form exists
        assert!(dict.lookup("foo", &RuleScope::Global).is_some());
    }
}
