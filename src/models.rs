// 📒 Data Model - Trial balance accounts, classification output, memory records
// Everything the engine reads or produces lives here; no behavior beyond small helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category reported when no evidence signal fires
pub const UNCATEGORIZED: &str = "Uncategorized";

// ============================================================================
// ACCOUNT (input)
// ============================================================================

/// One row of a trial balance snapshot.
///
/// `account_code` and `account_name` are guaranteed non-empty and codes are
/// unique per snapshot (enforced by `ingest`). The ledger fields are carried
/// through untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Account {
    pub account_code: String,
    pub account_name: String,

    /// Code of the parent account within the same snapshot
    #[serde(default)]
    pub parent_code: Option<String>,

    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub opening_balance: Option<String>,
    #[serde(default)]
    pub debit: Option<String>,
    #[serde(default)]
    pub credit: Option<String>,
    #[serde(default)]
    pub closing_balance: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl Account {
    pub fn new(code: &str, name: &str) -> Self {
        Account {
            account_code: code.to_string(),
            account_name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_parent(code: &str, name: &str, parent_code: &str) -> Self {
        Account {
            parent_code: Some(parent_code.to_string()),
            ..Account::new(code, name)
        }
    }

    /// Parent code, if present and non-blank
    pub fn parent(&self) -> Option<&str> {
        self.parent_code
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

// ============================================================================
// STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// No previous account is similar enough
    New,

    /// Name matches a previous account under a different code
    LikelyRenumbered,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::New => "new",
            AccountStatus::LikelyRenumbered => "likely_renumbered",
        }
    }
}

// ============================================================================
// COMPARISON-ONLY RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAccountResult {
    pub account_code: String,
    pub account_name: String,
    pub parent_code: Option<String>,
    pub status: AccountStatus,
    pub renumbered_from_code: Option<String>,
    pub renumbered_from_name: Option<String>,
}

// ============================================================================
// EVIDENCE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceMethod {
    Memory,
    Keyword,
    /// Ontology lookup by the account's own code prefix
    Parent,
    Fuzzy,
    Uncategorized,
}

/// One signal that fired for an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub method: EvidenceMethod,

    /// Raw signal score (0.0 - 1.0), before weighting
    pub score: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_parent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_keyword: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Evidence {
    pub fn new(method: EvidenceMethod, score: f64, category: &str) -> Self {
        Evidence {
            method,
            score,
            matched_name: None,
            matched_parent: None,
            matched_keyword: None,
            category: Some(category.to_string()),
        }
    }

    pub fn uncategorized() -> Self {
        Evidence::new(EvidenceMethod::Uncategorized, 0.0, UNCATEGORIZED)
    }
}

// ============================================================================
// CLASSIFICATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub account_code: String,
    pub account_name: String,
    pub parent_code: Option<String>,
    pub status: AccountStatus,
    pub suggested_category: Option<String>,

    /// 0 - 100
    pub confidence: u8,
    pub needs_review: bool,
    pub renumbered_from_code: Option<String>,
    pub renumbered_from_name: Option<String>,

    /// Every signal that contributed, in evaluation order
    pub evidence: Vec<Evidence>,
}

impl ClassificationResult {
    pub fn is_renumbered(&self) -> bool {
        self.status == AccountStatus::LikelyRenumbered
    }

    /// Evidence list as the JSON blob persisted alongside tabular output
    pub fn evidence_json(&self) -> String {
        serde_json::to_string(&self.evidence).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn category(&self) -> &str {
        self.suggested_category.as_deref().unwrap_or(UNCATEGORIZED)
    }
}

// ============================================================================
// MEMORY MAPPING
// ============================================================================

/// A user-confirmed (name, parent) → category mapping for one client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMapping {
    pub client_id: String,
    pub name_norm: String,

    #[serde(default)]
    pub parent_norm: Option<String>,
    pub category: String,

    /// Provenance tag (e.g. "cli", "api", "review")
    #[serde(default)]
    pub source: String,

    #[serde(default = "chrono::Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl MemoryMapping {
    /// Build a mapping from already-normalized keys. An empty parent is stored as `None`.
    pub fn new(
        client_id: &str,
        name_norm: &str,
        parent_norm: Option<&str>,
        category: &str,
        source: &str,
    ) -> Self {
        MemoryMapping {
            client_id: client_id.to_string(),
            name_norm: name_norm.to_string(),
            parent_norm: parent_norm
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            category: category.to_string(),
            source: source.to_string(),
            updated_at: Utc::now(),
        }
    }

    /// Parent key with `None` and `""` treated as the same key
    pub fn parent_key(&self) -> &str {
        self.parent_norm.as_deref().unwrap_or("")
    }

    /// True when both mappings occupy the same (name, parent) slot
    pub fn same_key(&self, other: &MemoryMapping) -> bool {
        self.name_norm == other.name_norm && self.parent_key() == other.parent_key()
    }
}

// ============================================================================
// RUN SUMMARY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationSummary {
    pub run_id: String,
    pub client_id: String,
    pub classified_at: DateTime<Utc>,
    pub total: usize,
    pub new_accounts: usize,
    pub renumbered_accounts: usize,
    pub needs_review: usize,
}

impl ClassificationSummary {
    pub fn from_results(client_id: &str, results: &[ClassificationResult]) -> Self {
        let renumbered_accounts = results.iter().filter(|r| r.is_renumbered()).count();

        ClassificationSummary {
            run_id: uuid::Uuid::new_v4().to_string(),
            client_id: client_id.to_string(),
            classified_at: Utc::now(),
            total: results.len(),
            new_accounts: results.len() - renumbered_accounts,
            renumbered_accounts,
            needs_review: results.iter().filter(|r| r.needs_review).count(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
