// Trial Balance Classifier - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod models;
pub mod normalize;      // Name normalization - the one comparison key
pub mod similarity;     // Fuzzy name similarity
pub mod config;         // Thresholds, weights, keyword + ontology tables
pub mod memory;         // Per-client learned mappings
pub mod renumber;       // New vs likely-renumbered detection
pub mod classifier;     // Multi-signal classification engine
pub mod ingest;         // Trial balance CSV in / results CSV out
pub mod logging;

#[cfg(feature = "server")]
pub mod server;

// Re-export commonly used types
pub use models::{
    Account, AccountStatus, NewAccountResult,
    Evidence, EvidenceMethod, ClassificationResult, ClassificationSummary,
    MemoryMapping, UNCATEGORIZED,
};
pub use normalize::{normalize_name, normalize_optional};
pub use similarity::similarity;
pub use config::{
    ClassificationConfig, Thresholds, Weights, KeywordRule, OntologyEntry,
};
pub use memory::{
    MemoryStore, MemoryBackend, CsvMemoryBackend, SqliteMemoryBackend, InMemoryBackend,
    storage_key,
};
pub use renumber::{RenumberDetector, PreviousSnapshot, RenumberMatch};
pub use classifier::{ClassificationEngine, Suggestion};
pub use ingest::{
    read_trial_balance, read_trial_balance_from_reader,
    write_new_accounts, write_classification_results,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
