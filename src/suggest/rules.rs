//! Deterministic cleanup rules evaluated before the classifier.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use std::collections::HashMap;

use crate::constants::{PREF_AUTO_CLEAN_AGE_DAYS, PREF_UNWANTED_SENDERS};
use crate::types::{MailRecord, SuggestedAction};

const SECS_PER_DAY: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub action: SuggestedAction,
    pub reason: String,
}

/// A user's rule set, compiled once per generation run.
#[derive(Debug, Default)]
pub struct Rules {
    unwanted: Option<SenderMatcher>,
    max_age_days: Option<i64>,
}

#[derive(Debug)]
struct SenderMatcher {
    automaton: AhoCorasick,
    patterns: Vec<String>,
}

impl Rules {
    pub fn new(unwanted_senders: Vec<String>, max_age_days: Option<i64>) -> Self {
        let patterns: Vec<String> = unwanted_senders
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let unwanted = if patterns.is_empty() {
            None
        } else {
            match AhoCorasickBuilder::new()
                .ascii_case_insensitive(true)
                .match_kind(MatchKind::LeftmostFirst)
                .build(&patterns)
            {
                Ok(automaton) => Some(SenderMatcher {
                    automaton,
                    patterns,
                }),
                Err(e) => {
                    tracing::warn!(error = %e, "Could not build unwanted sender matcher");
                    None
                }
            }
        };

        Self {
            unwanted,
            max_age_days: max_age_days.filter(|d| *d >= 0),
        }
    }

    /// Build rules from stored preferences.
    ///
    /// `unwanted_senders` is a JSON array of strings; `auto_clean_age_days` is
    /// an integer. Values that don't parse are logged and ignored.
    pub fn from_preferences(user_id: &str, prefs: &HashMap<String, String>) -> Self {
        let unwanted = prefs
            .get(PREF_UNWANTED_SENDERS)
            .and_then(|raw| match serde_json::from_str::<Vec<String>>(raw) {
                Ok(list) => Some(list),
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "Malformed unwanted_senders preference");
                    None
                }
            })
            .unwrap_or_default();

        let max_age = prefs
            .get(PREF_AUTO_CLEAN_AGE_DAYS)
            .and_then(|raw| match raw.trim().parse::<i64>() {
                Ok(days) if days >= 0 && days.checked_mul(SECS_PER_DAY).is_some() => Some(days),
                _ => {
                    tracing::warn!(user_id, value = %raw, "Malformed auto_clean_age_days preference");
                    None
                }
            });

        Self::new(unwanted, max_age)
    }

    /// First matching rule wins: unwanted sender, then age.
    pub fn evaluate(&self, record: &MailRecord, now: i64) -> Option<RuleMatch> {
        if let Some(matcher) = &self.unwanted
            && let Some(found) = matcher.automaton.find(&record.from)
        {
            return Some(RuleMatch {
                action: SuggestedAction::Trash,
                reason: format!(
                    "Sender matches unwanted list: {}",
                    matcher.patterns[found.pattern().as_usize()]
                ),
            });
        }

        // An age limit too large to express in seconds never matches
        if let Some(days) = self.max_age_days
            && let Some(limit) = days.checked_mul(SECS_PER_DAY)
            && now.saturating_sub(record.internal_date) > limit
        {
            return Some(RuleMatch {
                action: SuggestedAction::Archive,
                reason: format!("Older than {} days", days),
            });
        }

        None
    }
}
