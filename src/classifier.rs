// 🏷️ Classification Engine - Four evidence signals → category + confidence
//
// Signals, always evaluated in this order and independently of each other:
//   1. memory   exact (name, parent) hit in the client's learned mappings
//   2. keyword  first configured keyword contained in the normalized name
//   3. parent   code-prefix ontology lookup (keys off the account's OWN code;
//               the name is historical, the behavior is intended)
//   4. fuzzy    best similarity against every learned mapping name
//
// The first signal to fire seeds `suggested_category`. Every signal that fires
// adds `weight × score` to the confidence, so two signals that disagree on the
// category still both raise one number attached to the first category.
//
//   confidence = min(100, round(100 × Σ weight_i × score_i))

use crate::config::ClassificationConfig;
use crate::memory::{self, MemoryStore};
use crate::models::{
    Account, AccountStatus, ClassificationResult, ClassificationSummary, Evidence, EvidenceMethod,
    MemoryMapping, UNCATEGORIZED,
};
use crate::normalize::normalize_name;
use crate::renumber::{PreviousSnapshot, RenumberDetector};
use std::sync::Arc;
use tracing::{debug, info, info_span};

// ============================================================================
// SIGNAL OUTCOME
// ============================================================================

/// Category, weighted contribution and evidence for one account
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub category: String,
    pub confidence: u8,
    pub evidence: Vec<Evidence>,
}

// ============================================================================
// CLASSIFICATION ENGINE
// ============================================================================

pub struct ClassificationEngine {
    config: ClassificationConfig,
    memory: Arc<MemoryStore>,
}

impl ClassificationEngine {
    pub fn new(config: ClassificationConfig, memory: Arc<MemoryStore>) -> Self {
        ClassificationEngine { config, memory }
    }

    pub fn config(&self) -> &ClassificationConfig {
        &self.config
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// Classify every current account whose code is absent from `previous`.
    /// Output follows the order of `current`.
    pub fn classify(
        &self,
        previous: &[Account],
        current: &[Account],
        client_id: &str,
    ) -> Vec<ClassificationResult> {
        let span = info_span!("classify", client_id, previous = previous.len(), current = current.len());
        let _enter = span.enter();

        let run = self.prepare_run(previous, client_id);
        let results: Vec<ClassificationResult> = current
            .iter()
            .filter(|account| !run.snapshot.contains_code(&account.account_code))
            .map(|account| self.classify_account(account, &run))
            .collect();

        log_outcome(&results);
        results
    }

    /// Same as `classify`, with accounts spread across the rayon pool
    #[cfg(feature = "parallel")]
    pub fn classify_parallel(
        &self,
        previous: &[Account],
        current: &[Account],
        client_id: &str,
    ) -> Vec<ClassificationResult> {
        use rayon::prelude::*;

        let span = info_span!("classify_parallel", client_id, previous = previous.len(), current = current.len());
        let _enter = span.enter();

        let run = self.prepare_run(previous, client_id);
        let results: Vec<ClassificationResult> = current
            .par_iter()
            .filter(|account| !run.snapshot.contains_code(&account.account_code))
            .map(|account| self.classify_account(account, &run))
            .collect();

        log_outcome(&results);
        results
    }

    pub fn summarize(&self, client_id: &str, results: &[ClassificationResult]) -> ClassificationSummary {
        ClassificationSummary::from_results(client_id, results)
    }

    fn prepare_run<'a>(&self, previous: &'a [Account], client_id: &str) -> RunContext<'a> {
        // One memory read per run; every account sees the same snapshot
        let mappings = self.memory.load(client_id);
        let snapshot = PreviousSnapshot::new(previous);
        debug!(client_id, mappings = mappings.len(), previous = snapshot.len(), "memory snapshot loaded");

        RunContext {
            snapshot,
            mappings,
            detector: RenumberDetector::with_threshold(self.config.thresholds.renumbered_similarity),
        }
    }

    fn classify_account(&self, account: &Account, run: &RunContext<'_>) -> ClassificationResult {
        let name_norm = normalize_name(&account.account_name);

        // Parent name comes from the previous snapshot; a missing parent is an empty key
        let parent_norm = account.parent().map(|code| {
            run.snapshot
                .get(code)
                .map(|parent| normalize_name(&parent.account_name))
                .unwrap_or_default()
        });

        let source = run.detector.find_source(&name_norm, &run.snapshot);

        let suggestion = self.suggest(
            &name_norm,
            parent_norm.as_deref(),
            &account.account_code,
            &run.mappings,
        );

        let result = ClassificationResult {
            account_code: account.account_code.clone(),
            account_name: account.account_name.clone(),
            parent_code: account.parent_code.clone(),
            status: if source.is_some() {
                AccountStatus::LikelyRenumbered
            } else {
                AccountStatus::New
            },
            suggested_category: Some(suggestion.category),
            confidence: suggestion.confidence,
            needs_review: self.needs_review(suggestion.confidence),
            renumbered_from_code: source.map(|m| m.account.account_code.clone()),
            renumbered_from_name: source.map(|m| m.account.account_name.clone()),
            evidence: suggestion.evidence,
        };

        debug!(
            account_code = %result.account_code,
            status = result.status.as_str(),
            category = result.category(),
            confidence = result.confidence,
            "account classified"
        );
        result
    }

    pub fn needs_review(&self, confidence: u8) -> bool {
        confidence < self.config.thresholds.needs_review_below
    }

    /// Run all four signals for one normalized name against a memory snapshot
    pub fn suggest(
        &self,
        name_norm: &str,
        parent_norm: Option<&str>,
        account_code: &str,
        mappings: &[MemoryMapping],
    ) -> Suggestion {
        let thresholds = &self.config.thresholds;
        let weights = &self.config.weights;

        let mut evidence = Vec::new();
        let mut total = 0.0;
        let mut category: Option<String> = None;

        // 1. Memory (exact)
        if let Some(hit) = memory::find_exact(mappings, name_norm, parent_norm) {
            let score = thresholds.memory_exact_match;
            evidence.push(Evidence {
                matched_name: Some(name_norm.to_string()),
                matched_parent: parent_norm.map(str::to_string),
                ..Evidence::new(EvidenceMethod::Memory, score, &hit.category)
            });
            total += weights.memory * score;
            category.get_or_insert_with(|| hit.category.clone());
        }

        // 2. Keyword
        if let Some((keyword, keyword_category)) = self.keyword_match(name_norm) {
            let score = thresholds.keyword_match;
            evidence.push(Evidence {
                matched_keyword: Some(keyword.to_string()),
                ..Evidence::new(EvidenceMethod::Keyword, score, keyword_category)
            });
            total += weights.keyword * score;
            category.get_or_insert_with(|| keyword_category.to_string());
        }

        // 3. Ontology by own code prefix
        if let Some(ontology_category) = self.ontology_match(account_code) {
            let score = thresholds.parent_match;
            evidence.push(Evidence {
                matched_parent: Some(account_code.to_string()),
                ..Evidence::new(EvidenceMethod::Parent, score, ontology_category)
            });
            total += weights.parent * score;
            category.get_or_insert_with(|| ontology_category.to_string());
        }

        // 4. Fuzzy memory: the only signal whose score varies continuously
        if let Some((hit, score)) = memory::find_fuzzy(mappings, name_norm, thresholds.fuzzy_match) {
            evidence.push(Evidence {
                matched_name: Some(hit.name_norm.clone()),
                ..Evidence::new(EvidenceMethod::Fuzzy, score, &hit.category)
            });
            total += weights.fuzzy * score;
            category.get_or_insert_with(|| hit.category.clone());
        }

        match category {
            Some(category) => Suggestion {
                category,
                confidence: confidence_from_score(total),
                evidence,
            },
            None => Suggestion {
                category: UNCATEGORIZED.to_string(),
                confidence: 0,
                evidence: vec![Evidence::uncategorized()],
            },
        }
    }

    /// First (keyword, category) whose normalized keyword occurs in the name.
    /// Table order, then keyword order. Keywords that normalize to nothing never match.
    fn keyword_match(&self, name_norm: &str) -> Option<(&str, &str)> {
        self.config.keywords.iter().find_map(|rule| {
            rule.keywords.iter().find_map(|keyword| {
                let keyword_norm = normalize_name(keyword);
                (!keyword_norm.is_empty() && name_norm.contains(&keyword_norm))
                    .then(|| (keyword.as_str(), rule.category.as_str()))
            })
        })
    }

    /// Longest prefix of the code (full code first, down to one character)
    /// that is an exact ontology key
    fn ontology_match(&self, account_code: &str) -> Option<&str> {
        let mut ends: Vec<usize> = account_code
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .collect();
        ends.reverse();

        ends.into_iter()
            .find_map(|end| self.config.ontology_category(&account_code[..end]))
    }
}

struct RunContext<'a> {
    snapshot: PreviousSnapshot<'a>,
    mappings: Vec<MemoryMapping>,
    detector: RenumberDetector,
}

/// Weighted sum → integer percentage, clamped to 0..=100
pub fn confidence_from_score(total: f64) -> u8 {
    (total * 100.0).round().clamp(0.0, 100.0) as u8
}

fn log_outcome(results: &[ClassificationResult]) {
    let renumbered = results.iter().filter(|r| r.is_renumbered()).count();
    let review = results.iter().filter(|r| r.needs_review).count();
    info!(
        classified = results.len(),
        renumbered,
        needs_review = review,
        "classification complete"
    );
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KeywordRule, OntologyEntry};

    fn engine_with(config: ClassificationConfig) -> ClassificationEngine {
        ClassificationEngine::new(config, Arc::new(MemoryStore::in_memory()))
    }

    fn chart_config() -> ClassificationConfig {
        ClassificationConfig::default()
            .with_keywords(vec![
                KeywordRule::new("Cash & Equivalents", &["cash", "bank"]),
                KeywordRule::new("Payables", &["payable"]),
            ])
            .with_ontology(vec![
                OntologyEntry::new("1", "Assets"),
                OntologyEntry::new("11", "Current Assets"),
                OntologyEntry::new("2", "Liabilities"),
            ])
    }

    fn remember(engine: &ClassificationEngine, client: &str, name: &str, parent: Option<&str>, category: &str) {
        engine
            .memory()
            .upsert(MemoryMapping::new(
                client,
                &normalize_name(name),
                parent.map(normalize_name).as_deref(),
                category,
                "test",
            ))
            .unwrap();
    }

    #[test]
    fn test_unchanged_codes_are_skipped() {
        let engine = engine_with(chart_config());
        let previous = vec![Account::new("1000", "Cash")];
        let current = vec![Account::new("1000", "Cash Renamed Entirely"), Account::new("5000", "Rent")];

        let results = engine.classify(&previous, &current, "ACME");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].account_code, "5000");
    }

    #[test]
    fn test_no_signal_is_uncategorized_zero() {
        let engine = engine_with(ClassificationConfig::default());
        let results = engine.classify(&[], &[Account::new("9000", "Miscellaneous")], "ACME");

        let result = &results[0];
        assert_eq!(result.suggested_category.as_deref(), Some("Uncategorized"));
        assert_eq!(result.confidence, 0);
        assert!(result.needs_review);
        assert_eq!(result.evidence, vec![Evidence::uncategorized()]);
        assert_eq!(result.status, AccountStatus::New);
    }

    #[test]
    fn test_keyword_and_ontology_sum() {
        let engine = engine_with(chart_config());
        let results = engine.classify(&[], &[Account::new("1150", "Petty Cash")], "ACME");

        let result = &results[0];
        assert_eq!(result.suggested_category.as_deref(), Some("Cash & Equivalents"));
        // 0.25 × 0.85 + 0.15 × 0.80 = 0.3325
        assert_eq!(result.confidence, 33);
        assert!(result.needs_review);

        let methods: Vec<EvidenceMethod> = result.evidence.iter().map(|e| e.method).collect();
        assert_eq!(methods, vec![EvidenceMethod::Keyword, EvidenceMethod::Parent]);
        assert_eq!(result.evidence[0].matched_keyword.as_deref(), Some("cash"));
        // Longest prefix wins: "11" before "1"
        assert_eq!(result.evidence[1].category.as_deref(), Some("Current Assets"));
        assert_eq!(result.evidence[1].matched_parent.as_deref(), Some("1150"));
    }

    #[test]
    fn test_all_four_signals() {
        let engine = engine_with(chart_config());
        remember(&engine, "ACME", "Petty Cash", None, "Cash on Hand");

        let results = engine.classify(&[], &[Account::new("1150", "Petty Cash")], "ACME");
        let result = &results[0];

        // Memory seeds the category even though keyword disagrees
        assert_eq!(result.suggested_category.as_deref(), Some("Cash on Hand"));
        // 0.50 + 0.2125 + 0.12 + 0.10 = 0.9325
        assert_eq!(result.confidence, 93);
        assert!(!result.needs_review);

        let methods: Vec<EvidenceMethod> = result.evidence.iter().map(|e| e.method).collect();
        assert_eq!(
            methods,
            vec![
                EvidenceMethod::Memory,
                EvidenceMethod::Keyword,
                EvidenceMethod::Parent,
                EvidenceMethod::Fuzzy
            ]
        );
        assert_eq!(result.evidence[3].score, 1.0);
    }

    #[test]
    fn test_exact_memory_beats_fuzzy_neighbour() {
        let engine = engine_with(ClassificationConfig::default());
        remember(&engine, "ACME", "Prepaid Insurance X", None, "Other Prepaids");
        remember(&engine, "ACME", "Prepaid Insurance", None, "Prepaid Expenses");

        let results = engine.classify(&[], &[Account::new("1300", "Prepaid Insurance")], "ACME");
        let result = &results[0];

        assert_eq!(result.suggested_category.as_deref(), Some("Prepaid Expenses"));
        assert_eq!(result.evidence[0].method, EvidenceMethod::Memory);
    }

    #[test]
    fn test_fuzzy_only_uses_actual_similarity() {
        let engine = engine_with(ClassificationConfig::default());
        remember(&engine, "ACME", "Accounts Receivable", None, "Receivables");

        let results = engine.classify(&[], &[Account::new("1200", "Acounts Receivable")], "ACME");
        let result = &results[0];

        assert_eq!(result.evidence.len(), 1);
        let fuzzy = &result.evidence[0];
        assert_eq!(fuzzy.method, EvidenceMethod::Fuzzy);
        assert_eq!(fuzzy.matched_name.as_deref(), Some("accountsreceivable"));
        assert!(fuzzy.score > 0.9 && fuzzy.score < 1.0);
        assert_eq!(result.suggested_category.as_deref(), Some("Receivables"));
        assert_eq!(result.confidence, confidence_from_score(0.10 * fuzzy.score));
    }

    #[test]
    fn test_plural_rename_is_renumbered() {
        let engine = engine_with(ClassificationConfig::default());
        let previous = vec![Account::new("6100", "Rent Expense")];
        let current = vec![Account::new("6150", "Rent Expenses")];

        let results = engine.classify(&previous, &current, "ACME");

        // 0.96 clears the 0.92 renumber threshold
        assert_eq!(results[0].status, AccountStatus::LikelyRenumbered);
        assert_eq!(results[0].renumbered_from_code.as_deref(), Some("6100"));
    }

    #[test]
    fn test_transposed_letters_hit_fuzzy_threshold() {
        let engine = engine_with(ClassificationConfig::default());
        remember(&engine, "ACME", "Cash", None, "Cash");

        let results = engine.classify(&[], &[Account::new("1010", "Cahs")], "ACME");
        let result = &results[0];

        assert_eq!(result.suggested_category.as_deref(), Some("Cash"));
        assert_eq!(result.evidence[0].method, EvidenceMethod::Fuzzy);
        assert_eq!(result.evidence[0].score, 0.75);
        assert_eq!(result.confidence, confidence_from_score(0.10 * 0.75));
        assert!(result.needs_review);
    }

    #[test]
    fn test_memory_is_client_scoped() {
        let engine = engine_with(ClassificationConfig::default());
        remember(&engine, "GLOBEX", "Petty Cash", None, "Cash");

        let results = engine.classify(&[], &[Account::new("1150", "Petty Cash")], "ACME");
        assert_eq!(results[0].suggested_category.as_deref(), Some("Uncategorized"));
    }

    #[test]
    fn test_parent_name_from_previous_snapshot() {
        let engine = engine_with(ClassificationConfig::default());
        remember(&engine, "ACME", "Deposits", None, "Generic Deposits");
        remember(&engine, "ACME", "Deposits", Some("Other Assets"), "Long-term Deposits");

        let previous = vec![Account::new("1900", "Other Assets")];
        let current = vec![
            Account::with_parent("1950", "Deposits", "1900"),
            Account::with_parent("1960", "Deposits", "7777"),
        ];

        let results = engine.classify(&previous, &current, "ACME");

        assert_eq!(results[0].suggested_category.as_deref(), Some("Long-term Deposits"));
        assert_eq!(results[0].evidence[0].matched_parent.as_deref(), Some("otherassets"));

        // Unknown parent → empty parent key → name-only fallback
        assert_eq!(results[1].suggested_category.as_deref(), Some("Generic Deposits"));
        assert_eq!(results[1].evidence[0].matched_parent.as_deref(), Some(""));
    }

    #[test]
    fn test_needs_review_boundary() {
        let mut config = ClassificationConfig::default();
        config.weights.memory = 0.70;
        config.weights.fuzzy = 0.0;
        let engine = engine_with(config);
        remember(&engine, "ACME", "Suspense", None, "Suspense");

        let results = engine.classify(&[], &[Account::new("9990", "Suspense")], "ACME");
        assert_eq!(results[0].confidence, 70);
        assert!(!results[0].needs_review);

        assert!(engine.needs_review(69));
        assert!(!engine.needs_review(70));
    }

    #[test]
    fn test_confidence_caps_at_100() {
        let mut config = chart_config();
        config.weights.memory = 1.0;
        config.weights.keyword = 1.0;
        let engine = engine_with(config);
        remember(&engine, "ACME", "Cash", None, "Cash");

        let results = engine.classify(&[], &[Account::new("1000", "Cash")], "ACME");
        assert_eq!(results[0].confidence, 100);
    }

    #[test]
    fn test_adding_a_signal_never_lowers_confidence() {
        let keyword_only = ClassificationConfig::default()
            .with_keywords(vec![KeywordRule::new("Payables", &["payable"])]);
        let with_ontology = keyword_only
            .clone()
            .with_ontology(vec![OntologyEntry::new("2", "Liabilities")]);

        let account = vec![Account::new("2100", "Accounts Payable")];
        let a = engine_with(keyword_only).classify(&[], &account, "ACME");
        let b = engine_with(with_ontology).classify(&[], &account, "ACME");

        assert!(b[0].confidence >= a[0].confidence);
        assert_eq!(b[0].suggested_category, a[0].suggested_category);
    }

    #[test]
    fn test_keyword_table_order_decides() {
        let config = ClassificationConfig::default().with_keywords(vec![
            KeywordRule::new("Receivables", &["receivable"]),
            KeywordRule::new("Trade", &["trade"]),
        ]);
        let engine = engine_with(config);

        let results = engine.classify(&[], &[Account::new("1210", "Trade Receivable")], "ACME");
        assert_eq!(results[0].suggested_category.as_deref(), Some("Receivables"));
    }

    #[test]
    fn test_keyword_is_normalized_and_blank_keywords_skipped() {
        let config = ClassificationConfig::default().with_keywords(vec![
            KeywordRule::new("Broken", &[" - "]),
            KeywordRule::new("Payroll", &["Payroll-Tax"]),
        ]);
        let engine = engine_with(config);

        let results = engine.classify(&[], &[Account::new("2300", "Payroll Tax Payable")], "ACME");
        assert_eq!(results[0].suggested_category.as_deref(), Some("Payroll"));
        assert_eq!(results[0].evidence[0].matched_keyword.as_deref(), Some("Payroll-Tax"));
    }

    #[test]
    fn test_renumbered_status_uses_config_threshold() {
        let engine = engine_with(ClassificationConfig::default());
        let previous = vec![Account::new("1000", "Cash")];
        let current = vec![Account::new("1050", "Cash "), Account::new("2000", "Accounts Payable")];

        let results = engine.classify(&previous, &current, "ACME");

        assert_eq!(results[0].status, AccountStatus::LikelyRenumbered);
        assert_eq!(results[0].renumbered_from_code.as_deref(), Some("1000"));
        assert_eq!(results[0].renumbered_from_name.as_deref(), Some("Cash"));
        assert_eq!(results[1].status, AccountStatus::New);
    }

    #[test]
    fn test_evidence_serializes_as_json_array() {
        let engine = engine_with(chart_config());
        let results = engine.classify(&[], &[Account::new("2100", "Trade Payables")], "ACME");

        let parsed: serde_json::Value = serde_json::from_str(&results[0].evidence_json()).unwrap();
        assert_eq!(parsed[0]["method"], "keyword");
        assert_eq!(parsed[1]["method"], "parent");
        assert_eq!(parsed[1]["category"], "Liabilities");
    }

    #[test]
    fn test_summary() {
        let engine = engine_with(chart_config());
        let previous = vec![Account::new("1000", "Cash")];
        let current = vec![Account::new("1050", "Cash"), Account::new("3000", "Share Capital")];

        let results = engine.classify(&previous, &current, "ACME");
        let summary = engine.summarize("ACME", &results);

        assert_eq!(summary.total, 2);
        assert_eq!(summary.renumbered_accounts, 1);
        assert_eq!(summary.new_accounts, 1);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_sequential() {
        let engine = engine_with(chart_config());
        remember(&engine, "ACME", "Bank Deposit", None, "Cash");

        let previous: Vec<Account> = (0..50)
            .map(|i| Account::new(&format!("{}", 1000 + i), &format!("Account {}", i)))
            .collect();
        let current: Vec<Account> = (0..80)
            .map(|i| Account::new(&format!("{}", 1020 + i), &format!("Account {}", i + 3)))
            .collect();

        let sequential = engine.classify(&previous, &current, "ACME");
        let parallel = engine.classify_parallel(&previous, &current, "ACME");
        assert_eq!(sequential, parallel);
    }
}
