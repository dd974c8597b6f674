// ⚙️ Classification Config - Thresholds, weights, keyword rules, code ontology
// Config as data: loaded once per run and passed explicitly to the engine.
//
// File format (YAML, or JSON with a .json extension), camelCase keys:
//
//   thresholds: { renumberedSimilarity: 0.92, keywordMatch: 0.85, ... }
//   weights:    { memory: 0.5, keyword: 0.25, parent: 0.15, fuzzy: 0.1 }
//   keywords:   { Cash: [cash, petty cash], Receivables: [receivable] }
//   ontology:   { "1": Assets, "11": Current Assets }
//
// Keyword and ontology tables keep document order: tie-breaks depend on it.

use anyhow::{Context as AnyhowContext, Result};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::Path;
use tracing::{debug, warn};

// ============================================================================
// THRESHOLDS & WEIGHTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Thresholds {
    /// Minimum name similarity for `likely_renumbered`
    pub renumbered_similarity: f64,

    /// Score reported by an exact memory hit
    pub memory_exact_match: f64,

    /// Score reported by a keyword hit
    pub keyword_match: f64,

    /// Score reported by an ontology (code prefix) hit
    pub parent_match: f64,

    /// Minimum similarity for a fuzzy memory hit
    pub fuzzy_match: f64,

    /// Confidence below this requires review
    pub needs_review_below: u8,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            renumbered_similarity: 0.92,
            memory_exact_match: 1.0,
            keyword_match: 0.85,
            parent_match: 0.80,
            fuzzy_match: 0.75,
            needs_review_below: 70,
        }
    }
}

/// Contribution weights. Conventionally sum to <= 1.0, not enforced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub memory: f64,
    pub keyword: f64,
    pub parent: f64,
    pub fuzzy: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Weights {
            memory: 0.50,
            keyword: 0.25,
            parent: 0.15,
            fuzzy: 0.10,
        }
    }
}

// ============================================================================
// LOOKUP TABLES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct KeywordRule {
    pub category: String,
    pub keywords: Vec<String>,
}

impl KeywordRule {
    pub fn new(category: &str, keywords: &[&str]) -> Self {
        KeywordRule {
            category: category.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OntologyEntry {
    /// Account-code prefix, matched exactly
    pub prefix: String,
    pub category: String,
}

impl OntologyEntry {
    pub fn new(prefix: &str, category: &str) -> Self {
        OntologyEntry {
            prefix: prefix.to_string(),
            category: category.to_string(),
        }
    }
}

// ============================================================================
// CLASSIFICATION CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub thresholds: Thresholds,
    pub weights: Weights,

    #[serde(
        serialize_with = "serialize_keywords",
        deserialize_with = "deserialize_keywords"
    )]
    pub keywords: Vec<KeywordRule>,

    #[serde(
        serialize_with = "serialize_ontology",
        deserialize_with = "deserialize_ontology"
    )]
    pub ontology: Vec<OntologyEntry>,
}

impl ClassificationConfig {
    /// Load config from a YAML or JSON file (JSON when the extension is `.json`)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            serde_json::from_str(&content).context("Failed to parse config JSON")
        } else {
            Self::from_yaml_str(&content)
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to a struct
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).context("Failed to parse config YAML")
    }

    /// Load config, falling back to built-in defaults when the file is missing or malformed
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Self::default();
        }

        match Self::from_file(path) {
            Ok(config) => {
                debug!(
                    path = %path.display(),
                    keyword_rules = config.keywords.len(),
                    ontology_entries = config.ontology.len(),
                    "loaded classification config"
                );
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %format!("{:#}", e), "invalid config, using defaults");
                Self::default()
            }
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<KeywordRule>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_ontology(mut self, ontology: Vec<OntologyEntry>) -> Self {
        self.ontology = ontology;
        self
    }

    /// Category for an exact ontology key (first entry wins on duplicates)
    pub fn ontology_category(&self, prefix: &str) -> Option<&str> {
        self.ontology
            .iter()
            .find(|entry| entry.prefix == prefix)
            .map(|entry| entry.category.as_str())
    }
}

// ============================================================================
// ORDERED TABLE (DE)SERIALIZATION
// ============================================================================

/// Collects a map into `(key, value)` pairs in document order
struct OrderedPairs<K, V>(PhantomData<(K, V)>);

impl<'de, K, V> Visitor<'de> for OrderedPairs<K, V>
where
    K: Deserialize<'de>,
    V: Deserialize<'de>,
{
    type Value = Vec<(K, V)>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map")
    }

    fn visit_unit<E>(self) -> std::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Vec::new())
    }

    fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut pairs = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some(pair) = access.next_entry()? {
            pairs.push(pair);
        }
        Ok(pairs)
    }
}

/// Ontology prefix key; YAML users often leave numeric codes unquoted
struct CodeKey(String);

impl<'de> Deserialize<'de> for CodeKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct CodeKeyVisitor;

        impl<'de> Visitor<'de> for CodeKeyVisitor {
            type Value = CodeKey;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an account code prefix")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<CodeKey, E> {
                Ok(CodeKey(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<CodeKey, E> {
                Ok(CodeKey(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<CodeKey, E> {
                Ok(CodeKey(v.to_string()))
            }
        }

        deserializer.deserialize_any(CodeKeyVisitor)
    }
}

fn deserialize_keywords<'de, D>(deserializer: D) -> std::result::Result<Vec<KeywordRule>, D::Error>
where
    D: Deserializer<'de>,
{
    let pairs: Vec<(String, Option<Vec<String>>)> =
        deserializer.deserialize_any(OrderedPairs(PhantomData))?;
    Ok(pairs
        .into_iter()
        .map(|(category, keywords)| KeywordRule {
            category,
            keywords: keywords.unwrap_or_default(),
        })
        .collect())
}

fn deserialize_ontology<'de, D>(deserializer: D) -> std::result::Result<Vec<OntologyEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    let pairs: Vec<(CodeKey, String)> = deserializer.deserialize_any(OrderedPairs(PhantomData))?;
    Ok(pairs
        .into_iter()
        .map(|(CodeKey(prefix), category)| OntologyEntry { prefix, category })
        .collect())
}

fn serialize_keywords<S>(rules: &[KeywordRule], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(rules.len()))?;
    for rule in rules {
        map.serialize_entry(&rule.category, &rule.keywords)?;
    }
    map.end()
}

fn serialize_ontology<S>(entries: &[OntologyEntry], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(entries.len()))?;
    for entry in entries {
        map.serialize_entry(&entry.prefix, &entry.category)?;
    }
    map.end()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
thresholds:
  renumberedSimilarity: 0.95
  needsReviewBelow: 60
weights:
  memory: 0.6
keywords:
  Receivables: [receivable, debtors]
  Cash: [cash, bank]
  Assets: [asset]
ontology:
  "11": Current Assets
  1: Assets
"#;

    #[test]
    fn test_defaults() {
        let config = ClassificationConfig::default();
        assert_eq!(config.thresholds.renumbered_similarity, 0.92);
        assert_eq!(config.thresholds.memory_exact_match, 1.0);
        assert_eq!(config.thresholds.keyword_match, 0.85);
        assert_eq!(config.thresholds.parent_match, 0.80);
        assert_eq!(config.thresholds.fuzzy_match, 0.75);
        assert_eq!(config.thresholds.needs_review_below, 70);
        assert_eq!(config.weights.memory, 0.50);
        assert_eq!(config.weights.fuzzy, 0.10);
        assert!(config.keywords.is_empty());
        assert!(config.ontology.is_empty());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = ClassificationConfig::from_yaml_str(SAMPLE).unwrap();

        assert_eq!(config.thresholds.renumbered_similarity, 0.95);
        assert_eq!(config.thresholds.needs_review_below, 60);
        assert_eq!(config.thresholds.keyword_match, 0.85);
        assert_eq!(config.weights.memory, 0.6);
        assert_eq!(config.weights.keyword, 0.25);
    }

    #[test]
    fn test_tables_keep_document_order() {
        let config = ClassificationConfig::from_yaml_str(SAMPLE).unwrap();

        let categories: Vec<&str> = config.keywords.iter().map(|r| r.category.as_str()).collect();
        assert_eq!(categories, vec!["Receivables", "Cash", "Assets"]);
        assert_eq!(config.keywords[1].keywords, vec!["cash", "bank"]);

        assert_eq!(config.ontology[0], OntologyEntry::new("11", "Current Assets"));
        assert_eq!(config.ontology_category("1"), Some("Assets"));
        assert_eq!(config.ontology_category("2"), None);
    }

    #[test]
    fn test_json_config() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"thresholds": {{"fuzzyMatch": 0.8}}, "keywords": {{"Cash": ["cash"]}}, "ontology": {{"2": "Liabilities"}}}}"#
        )
        .unwrap();

        let config = ClassificationConfig::from_file(file.path()).unwrap();
        assert_eq!(config.thresholds.fuzzy_match, 0.8);
        assert_eq!(config.keywords, vec![KeywordRule::new("Cash", &["cash"])]);
        assert_eq!(config.ontology_category("2"), Some("Liabilities"));
    }

    #[test]
    fn test_missing_file_defaults() {
        let config = ClassificationConfig::load_or_default("/nonexistent/config.yaml");
        assert_eq!(config, ClassificationConfig::default());
    }

    #[test]
    fn test_malformed_file_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(file, "thresholds: {{renumberedSimilarity: high}}").unwrap();

        assert!(ClassificationConfig::from_file(file.path()).is_err());
        let config = ClassificationConfig::load_or_default(file.path());
        assert_eq!(config, ClassificationConfig::default());
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = ClassificationConfig::from_yaml_str("").unwrap();
        assert_eq!(config, ClassificationConfig::default());
    }

    #[test]
    fn test_serialize_round_trips_order() {
        let config = ClassificationConfig::default()
            .with_keywords(vec![
                KeywordRule::new("Payables", &["payable"]),
                KeywordRule::new("Cash", &["cash"]),
            ])
            .with_ontology(vec![OntologyEntry::new("2", "Liabilities")]);

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed = ClassificationConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }
}
