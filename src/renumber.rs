// 🔁 Renumber Detection - New account, or an old one under a new code?
// For each current-only code, scan every previous account by name similarity.
//
// Tie-break: a candidate replaces the running best only on a strictly higher
// score, so the first previous account (snapshot file order) wins ties.
//
// Cost is O(|current-only| × |previous|). Fine at trial-balance scale
// (hundreds to low thousands of rows); this is the first thing to index if
// ledgers grow much larger.

use crate::models::{Account, AccountStatus, NewAccountResult};
use crate::normalize::normalize_name;
use crate::similarity::similarity;
use std::collections::HashMap;
use tracing::debug;

// ============================================================================
// PREVIOUS SNAPSHOT INDEX
// ============================================================================

/// Previous accounts with their names normalized once, plus a code lookup
pub struct PreviousSnapshot<'a> {
    entries: Vec<(&'a Account, String)>,
    by_code: HashMap<&'a str, &'a Account>,
}

impl<'a> PreviousSnapshot<'a> {
    pub fn new(previous: &'a [Account]) -> Self {
        PreviousSnapshot {
            entries: previous
                .iter()
                .map(|account| (account, normalize_name(&account.account_name)))
                .collect(),
            by_code: previous
                .iter()
                .map(|account| (account.account_code.as_str(), account))
                .collect(),
        }
    }

    pub fn contains_code(&self, code: &str) -> bool {
        self.by_code.contains_key(code)
    }

    pub fn get(&self, code: &str) -> Option<&'a Account> {
        self.by_code.get(code).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most similar previous account at or above `threshold`; first wins ties
    pub fn best_match(&self, name_norm: &str, threshold: f64) -> Option<RenumberMatch<'a>> {
        if self.is_empty() {
            return None;
        }

        let mut best: Option<RenumberMatch<'a>> = None;
        let mut best_score = 0.0;

        for (account, prev_norm) in &self.entries {
            let score = similarity(name_norm, prev_norm);
            if score > best_score && score >= threshold {
                best_score = score;
                best = Some(RenumberMatch {
                    account: *account,
                    score,
                });
            }
        }

        best
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenumberMatch<'a> {
    pub account: &'a Account,
    pub score: f64,
}

// ============================================================================
// RENUMBER DETECTOR
// ============================================================================

pub struct RenumberDetector {
    /// Minimum similarity for `likely_renumbered` (default: 0.90)
    pub similarity_threshold: f64,
}

impl RenumberDetector {
    pub const DEFAULT_THRESHOLD: f64 = 0.90;

    pub fn new() -> Self {
        RenumberDetector {
            similarity_threshold: Self::DEFAULT_THRESHOLD,
        }
    }

    pub fn with_threshold(similarity_threshold: f64) -> Self {
        RenumberDetector {
            similarity_threshold,
        }
    }

    /// Flag every current account whose code is absent from `previous`.
    /// Accounts present in both snapshots produce no row.
    pub fn detect(&self, previous: &[Account], current: &[Account]) -> Vec<NewAccountResult> {
        let snapshot = PreviousSnapshot::new(previous);

        let results: Vec<NewAccountResult> = current
            .iter()
            .filter(|account| !snapshot.contains_code(&account.account_code))
            .map(|account| self.detect_one(account, &snapshot))
            .collect();

        debug!(
            previous = snapshot.len(),
            current = current.len(),
            flagged = results.len(),
            "renumber detection complete"
        );

        results
    }

    fn detect_one(&self, account: &Account, snapshot: &PreviousSnapshot<'_>) -> NewAccountResult {
        let name_norm = normalize_name(&account.account_name);
        let source = self.find_source(&name_norm, snapshot);

        NewAccountResult {
            account_code: account.account_code.clone(),
            account_name: account.account_name.clone(),
            parent_code: account.parent_code.clone(),
            status: if source.is_some() {
                AccountStatus::LikelyRenumbered
            } else {
                AccountStatus::New
            },
            renumbered_from_code: source.map(|m| m.account.account_code.clone()),
            renumbered_from_name: source.map(|m| m.account.account_name.clone()),
        }
    }

    /// Previous account this name was most likely renumbered from
    pub fn find_source<'a>(
        &self,
        name_norm: &str,
        snapshot: &PreviousSnapshot<'a>,
    ) -> Option<RenumberMatch<'a>> {
        snapshot.best_match(name_norm, self.similarity_threshold)
    }
}

impl Default for RenumberDetector {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_difference_is_renumbered() {
        let previous = vec![Account::new("1000", "Cash")];
        let current = vec![Account::new("1050", "Cash ")];

        let results = RenumberDetector::new().detect(&previous, &current);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, AccountStatus::LikelyRenumbered);
        assert_eq!(results[0].renumbered_from_code, Some("1000".to_string()));
        assert_eq!(results[0].renumbered_from_name, Some("Cash".to_string()));
    }

    #[test]
    fn test_dissimilar_name_is_new() {
        let previous = vec![Account::new("1000", "Cash")];
        let current = vec![Account::new("2000", "Accounts Payable")];

        let results = RenumberDetector::new().detect(&previous, &current);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, AccountStatus::New);
        assert_eq!(results[0].renumbered_from_code, None);
    }

    #[test]
    fn test_existing_code_is_skipped_even_when_renamed() {
        let previous = vec![Account::new("1000", "Cash")];
        let current = vec![
            Account::new("1000", "Completely Different Name"),
            Account::new("3000", "Retained Earnings"),
        ];

        let results = RenumberDetector::new().detect(&previous, &current);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].account_code, "3000");
    }

    #[test]
    fn test_first_previous_account_wins_ties() {
        let previous = vec![
            Account::new("1000", "Petty Cash"),
            Account::new("1001", "Petty-Cash"),
        ];
        let current = vec![Account::new("1500", "PETTY CASH")];

        let results = RenumberDetector::new().detect(&previous, &current);

        assert_eq!(results[0].renumbered_from_code, Some("1000".to_string()));
    }

    #[test]
    fn test_scans_all_previous_accounts() {
        // The source still exists in current under its old code
        let previous = vec![Account::new("1000", "Inventory")];
        let current = vec![
            Account::new("1000", "Inventory"),
            Account::new("1400", "Inventory"),
        ];

        let results = RenumberDetector::new().detect(&previous, &current);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, AccountStatus::LikelyRenumbered);
        assert_eq!(results[0].renumbered_from_code, Some("1000".to_string()));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let previous = vec![Account::new("1000", "Accounts Receivable")];
        let current = vec![Account::new("1100", "Acounts Receivable")];

        let name = normalize_name("Acounts Receivable");
        let snapshot = PreviousSnapshot::new(&previous);
        let score = snapshot.best_match(&name, 0.0).unwrap().score;

        let at = RenumberDetector::with_threshold(score).detect(&previous, &current);
        assert_eq!(at[0].status, AccountStatus::LikelyRenumbered);

        let above = RenumberDetector::with_threshold(score + 0.001).detect(&previous, &current);
        assert_eq!(above[0].status, AccountStatus::New);
    }

    #[test]
    fn test_output_follows_current_order() {
        let previous = vec![Account::new("1", "Cash")];
        let current = vec![
            Account::new("9", "Zeta"),
            Account::new("1", "Cash"),
            Account::new("5", "Alpha"),
        ];

        let codes: Vec<String> = RenumberDetector::new()
            .detect(&previous, &current)
            .into_iter()
            .map(|r| r.account_code)
            .collect();
        assert_eq!(codes, vec!["9", "5"]);
    }

    #[test]
    fn test_empty_previous_marks_everything_new() {
        let current = vec![Account::new("1", "Cash")];
        let results = RenumberDetector::new().detect(&[], &current);
        assert_eq!(results[0].status, AccountStatus::New);
    }
}
