// 📂 Trial Balance I/O - CSV in, validated accounts out; results back to CSV
//
// Required columns: account_code, account_name (header match is case-insensitive)
// Optional columns: parent_code, level, opening_balance, debit, credit,
//                   closing_balance, currency
//
// Rows with an empty code or name, or a repeated code, reject the whole file:
// the engine trusts its input and never re-validates.

use crate::models::{Account, ClassificationResult, NewAccountResult};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

const REQUIRED_COLUMNS: [&str; 2] = ["account_code", "account_name"];
const OPTIONAL_COLUMNS: [&str; 7] = [
    "parent_code",
    "level",
    "opening_balance",
    "debit",
    "credit",
    "closing_balance",
    "currency",
];

const FORMAT_HINT: &str = "Required format:
  account_code,account_name[,parent_code,level,opening_balance,debit,credit,closing_balance,currency]

Example:
  account_code,account_name,parent_code,opening_balance
  1000,Cash,,5000.00
  1100,Bank Account,1000,15000.00";

// ============================================================================
// READING
// ============================================================================

pub fn read_trial_balance<P: AsRef<Path>>(path: P) -> Result<Vec<Account>> {
    let path = path.as_ref();
    if !path.exists() {
        bail!("File not found: {}", path.display());
    }

    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    read_trial_balance_from_reader(file, &path.display().to_string())
}

/// Parse a trial balance from any reader. `label` names the source in error messages.
pub fn read_trial_balance_from_reader<R: Read>(reader: R, label: &str) -> Result<Vec<Account>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .with_context(|| format!("No header found in file: {}", label))?
        .clone();
    let columns = ColumnMap::from_headers(&headers, label)?;

    let mut accounts = Vec::new();
    let mut seen_codes = HashSet::new();

    for (index, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Malformed CSV in file: {}", label))?;

        // Header is row 1
        let row = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(index + 2);

        // Blank lines come through as a single empty field
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        let account = columns.account(&record);

        if account.account_code.is_empty() {
            bail!("Empty account_code found at row {} in file: {}", row, label);
        }
        if account.account_name.is_empty() {
            bail!("Empty account_name found at row {} in file: {}", row, label);
        }
        if !seen_codes.insert(account.account_code.clone()) {
            bail!(
                "Duplicate account_code '{}' found at row {} in file: {}",
                account.account_code,
                row,
                label
            );
        }

        accounts.push(account);
    }

    debug!(source = label, accounts = accounts.len(), "trial balance loaded");
    Ok(accounts)
}

/// Header positions for the columns we know about
struct ColumnMap {
    code: usize,
    name: usize,
    optional: [Option<usize>; 7],
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord, label: &str) -> Result<Self> {
        let position = |column: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(column))
        };

        for required in REQUIRED_COLUMNS {
            if position(required).is_none() {
                bail!(
                    "Missing required column '{}' in file: {}\n\n{}",
                    required,
                    label,
                    FORMAT_HINT
                );
            }
        }

        Ok(ColumnMap {
            code: position("account_code").unwrap_or_default(),
            name: position("account_name").unwrap_or_default(),
            optional: OPTIONAL_COLUMNS.map(position),
        })
    }

    fn account(&self, record: &csv::StringRecord) -> Account {
        let field = |i: usize| record.get(i).unwrap_or("").to_string();
        let optional = |slot: usize| {
            self.optional[slot]
                .and_then(|i| record.get(i))
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Account {
            account_code: field(self.code),
            account_name: field(self.name),
            parent_code: optional(0),
            level: optional(1),
            opening_balance: optional(2),
            debit: optional(3),
            credit: optional(4),
            closing_balance: optional(5),
            currency: optional(6),
        }
    }
}

// ============================================================================
// WRITING
// ============================================================================

/// Flat CSV row for a classification result; evidence stays a JSON blob
#[derive(Debug, Serialize)]
struct ClassificationRow<'a> {
    account_code: &'a str,
    account_name: &'a str,
    parent_code: Option<&'a str>,
    status: &'static str,
    suggested_category: Option<&'a str>,
    confidence: u8,
    needs_review: bool,
    renumbered_from_code: Option<&'a str>,
    renumbered_from_name: Option<&'a str>,
    evidence: String,
}

impl<'a> From<&'a ClassificationResult> for ClassificationRow<'a> {
    fn from(result: &'a ClassificationResult) -> Self {
        ClassificationRow {
            account_code: &result.account_code,
            account_name: &result.account_name,
            parent_code: result.parent_code.as_deref(),
            status: result.status.as_str(),
            suggested_category: result.suggested_category.as_deref(),
            confidence: result.confidence,
            needs_review: result.needs_review,
            renumbered_from_code: result.renumbered_from_code.as_deref(),
            renumbered_from_name: result.renumbered_from_name.as_deref(),
            evidence: result.evidence_json(),
        }
    }
}

pub fn write_new_accounts<P: AsRef<Path>>(path: P, results: &[NewAccountResult]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    write_new_accounts_to(file, results)
}

pub fn write_new_accounts_to<W: Write>(writer: W, results: &[NewAccountResult]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for result in results {
        wtr.serialize(result).context("Failed to write account row")?;
    }
    wtr.flush().context("Failed to flush CSV output")?;
    Ok(())
}

pub fn write_classification_results<P: AsRef<Path>>(
    path: P,
    results: &[ClassificationResult],
) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    write_classification_results_to(file, results)
}

pub fn write_classification_results_to<W: Write>(
    writer: W,
    results: &[ClassificationResult],
) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for result in results {
        wtr.serialize(ClassificationRow::from(result))
            .context("Failed to write classification row")?;
    }
    wtr.flush().context("Failed to flush CSV output")?;
    Ok(())
}

/// Classification results rendered to an in-memory CSV document
pub fn classification_results_csv(results: &[ClassificationResult]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    write_classification_results_to(&mut buffer, results)?;
    Ok(buffer)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountStatus, Evidence, EvidenceMethod};

    fn parse(csv: &str) -> Result<Vec<Account>> {
        read_trial_balance_from_reader(csv.as_bytes(), "test.csv")
    }

    #[test]
    fn test_reads_required_and_optional_columns() {
        let accounts = parse(
            "Account_Code,Account_Name,Parent_Code,Opening_Balance,Currency\n\
             1000, Cash ,,5000.00,USD\n\
             1100,Bank Account,1000,15000.00,USD\n",
        )
        .unwrap();

        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].account_name, "Cash");
        assert_eq!(accounts[0].parent_code, None);
        assert_eq!(accounts[1].parent_code.as_deref(), Some("1000"));
        assert_eq!(accounts[1].opening_balance.as_deref(), Some("15000.00"));
        assert_eq!(accounts[1].currency.as_deref(), Some("USD"));
        assert_eq!(accounts[1].debit, None);
    }

    #[test]
    fn test_skips_blank_lines() {
        let accounts = parse("account_code,account_name\n1000,Cash\n\n2000,Payables\n").unwrap();
        assert_eq!(accounts.len(), 2);
    }

    #[test]
    fn test_missing_required_column() {
        let err = parse("code,account_name\n1000,Cash\n").unwrap_err();
        let message = format!("{}", err);
        assert!(message.contains("Missing required column 'account_code'"));
        assert!(message.contains("Required format"));
    }

    #[test]
    fn test_empty_code_or_name_rejected() {
        let err = parse("account_code,account_name\n1000,Cash\n,Orphan\n").unwrap_err();
        assert!(format!("{}", err).contains("Empty account_code found at row 3"));

        let err = parse("account_code,account_name\n1000,  \n").unwrap_err();
        assert!(format!("{}", err).contains("Empty account_name found at row 2"));
    }

    #[test]
    fn test_duplicate_code_rejected() {
        let err = parse("account_code,account_name\n1000,Cash\n1000,Bank\n").unwrap_err();
        assert!(format!("{}", err).contains("Duplicate account_code '1000'"));
    }

    #[test]
    fn test_missing_file() {
        let err = read_trial_balance("/nonexistent/tb.csv").unwrap_err();
        assert!(format!("{}", err).contains("File not found"));
    }

    #[test]
    fn test_write_new_accounts() {
        let results = vec![NewAccountResult {
            account_code: "1050".to_string(),
            account_name: "Cash".to_string(),
            parent_code: None,
            status: AccountStatus::LikelyRenumbered,
            renumbered_from_code: Some("1000".to_string()),
            renumbered_from_name: Some("Cash".to_string()),
        }];

        let mut buffer = Vec::new();
        write_new_accounts_to(&mut buffer, &results).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("account_code,account_name,parent_code,status,renumbered_from_code,renumbered_from_name")
        );
        assert_eq!(lines.next(), Some("1050,Cash,,likely_renumbered,1000,Cash"));
    }

    #[test]
    fn test_classification_csv_keeps_evidence_as_json() {
        let result = ClassificationResult {
            account_code: "2100".to_string(),
            account_name: "Trade Payables".to_string(),
            parent_code: Some("2000".to_string()),
            status: AccountStatus::New,
            suggested_category: Some("Payables".to_string()),
            confidence: 21,
            needs_review: true,
            renumbered_from_code: None,
            renumbered_from_name: None,
            evidence: vec![Evidence {
                matched_keyword: Some("payable".to_string()),
                ..Evidence::new(EvidenceMethod::Keyword, 0.85, "Payables")
            }],
        };

        let bytes = classification_results_csv(&[result]).unwrap();
        let mut rdr = csv::Reader::from_reader(bytes.as_slice());

        let headers = rdr.headers().unwrap().clone();
        assert_eq!(headers.get(9), Some("evidence"));

        let record = rdr.records().next().unwrap().unwrap();
        assert_eq!(record.get(3), Some("new"));
        assert_eq!(record.get(5), Some("21"));
        assert_eq!(record.get(6), Some("true"));

        let evidence: Vec<Evidence> = serde_json::from_str(record.get(9).unwrap()).unwrap();
        assert_eq!(evidence[0].method, EvidenceMethod::Keyword);
        assert_eq!(evidence[0].matched_keyword.as_deref(), Some("payable"));
    }
}
