use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use trial_balance_classifier::logging::init_tracing;
use trial_balance_classifier::{
    normalize_name, normalize_optional, read_trial_balance, write_classification_results,
    write_new_accounts, Account, ClassificationConfig, ClassificationEngine, MemoryMapping,
    MemoryStore, RenumberDetector, VERSION,
};

#[derive(Parser, Debug)]
#[command(name = "tbx")]
#[command(about = "Trial balance classifier: detect new / renumbered accounts and suggest categories")]
#[command(version)]
struct Cli {
    /// Log level when TBX_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify accounts that appear only in the current trial balance
    Classify {
        #[command(flatten)]
        files: SnapshotFiles,

        /// Client ID for memory lookups
        #[arg(long, default_value = "DEFAULT")]
        client: String,

        /// Classification config (YAML, or JSON with a .json extension)
        #[arg(long, default_value = "config.yaml")]
        config: PathBuf,

        #[command(flatten)]
        memory: MemoryLocation,
    },

    /// Only detect new vs renumbered accounts (no categories)
    Compare {
        #[command(flatten)]
        files: SnapshotFiles,

        /// Minimum name similarity for a renumber match
        #[arg(long, default_value_t = RenumberDetector::DEFAULT_THRESHOLD)]
        threshold: f64,
    },

    /// Inspect or update a client's learned mappings
    Memory {
        #[command(subcommand)]
        action: MemoryAction,

        #[command(flatten)]
        memory: MemoryLocation,
    },
}

#[derive(Args, Debug)]
struct SnapshotFiles {
    /// Previous period trial balance CSV
    #[arg(long)]
    prev: PathBuf,

    /// Current period trial balance CSV
    #[arg(long)]
    curr: PathBuf,

    /// Output CSV
    #[arg(long)]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct MemoryLocation {
    /// Directory holding per-client memory CSV files
    #[arg(long, global = true, default_value = "Memory", env = "TBX_MEMORY_DIR")]
    memory_dir: PathBuf,

    /// Use a SQLite memory database instead of CSV files
    #[arg(long, global = true, env = "TBX_MEMORY_DB")]
    memory_db: Option<PathBuf>,
}

impl MemoryLocation {
    fn open(&self) -> Result<MemoryStore> {
        match &self.memory_db {
            Some(db) => MemoryStore::sqlite(db),
            None => MemoryStore::csv(&self.memory_dir),
        }
    }
}

#[derive(Subcommand, Debug)]
enum MemoryAction {
    /// List every mapping stored for a client
    Show {
        #[arg(long)]
        client: String,
    },

    /// Confirm a category for an account name (normalized before storing)
    Set {
        #[arg(long)]
        client: String,

        /// Account display name
        #[arg(long)]
        name: String,

        /// Parent account display name
        #[arg(long)]
        parent: Option<String>,

        #[arg(long)]
        category: String,

        /// Provenance tag recorded with the mapping
        #[arg(long, default_value = "cli")]
        source: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Classify {
            files,
            client,
            config,
            memory,
        } => run_classify(&files, &client, &config, &memory),
        Command::Compare { files, threshold } => run_compare(&files, threshold),
        Command::Memory { action, memory } => run_memory(action, &memory),
    }
}

fn run_classify(
    files: &SnapshotFiles,
    client: &str,
    config_path: &Path,
    memory: &MemoryLocation,
) -> Result<()> {
    println!("📒 Trial Balance Classifier v{}", VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let started = Instant::now();
    let (previous, current) = load_snapshots(files)?;

    println!("\n🔍 Analyzing accounts...");
    let config = ClassificationConfig::load_or_default(config_path);
    let store = Arc::new(memory.open()?);
    let engine = ClassificationEngine::new(config, store);

    let results = engine.classify(&previous, &current, client);
    let summary = engine.summarize(client, &results);

    println!("✓ Found {} new account(s)", summary.new_accounts);
    println!("✓ Found {} likely renumbered account(s)", summary.renumbered_accounts);
    println!("✓ {} account(s) need review", summary.needs_review);

    println!("\n💾 Writing results to: {}", files.out.display());
    write_classification_results(&files.out, &results)?;
    println!("✓ Wrote {} record(s)", results.len());

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Completed in {}ms (run {})", started.elapsed().as_millis(), summary.run_id);

    Ok(())
}

fn run_compare(files: &SnapshotFiles, threshold: f64) -> Result<()> {
    println!("📒 Trial Balance Comparison v{}", VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let (previous, current) = load_snapshots(files)?;

    let results = RenumberDetector::with_threshold(threshold).detect(&previous, &current);
    let renumbered = results
        .iter()
        .filter(|r| r.renumbered_from_code.is_some())
        .count();

    println!("\n✓ Found {} new account(s)", results.len() - renumbered);
    println!("✓ Found {} likely renumbered account(s)", renumbered);

    write_new_accounts(&files.out, &results)?;
    println!("\n💾 Wrote {} record(s) to {}", results.len(), files.out.display());

    Ok(())
}

fn run_memory(action: MemoryAction, location: &MemoryLocation) -> Result<()> {
    let store = location.open()?;

    match action {
        MemoryAction::Show { client } => {
            let mappings = store.load(&client);
            println!("🧠 {} mapping(s) for client {}", mappings.len(), client);
            let json = serde_json::to_string_pretty(&mappings).context("Failed to render mappings")?;
            println!("{}", json);
        }
        MemoryAction::Set {
            client,
            name,
            parent,
            category,
            source,
        } => {
            let name_norm = normalize_name(&name);
            if name_norm.is_empty() {
                anyhow::bail!("Account name '{}' is empty after normalization", name);
            }
            let parent_norm = normalize_optional(parent.as_deref());

            store.upsert(MemoryMapping::new(
                &client,
                &name_norm,
                parent_norm.as_deref(),
                &category,
                &source,
            ))?;
            println!("✓ {} → {} saved for client {}", name_norm, category, client);
        }
    }

    Ok(())
}

fn load_snapshots(files: &SnapshotFiles) -> Result<(Vec<Account>, Vec<Account>)> {
    println!("\n📂 Reading previous trial balance: {}", files.prev.display());
    let previous = read_trial_balance(&files.prev)?;
    println!("✓ Loaded {} accounts", previous.len());

    println!("\n📂 Reading current trial balance: {}", files.curr.display());
    let current = read_trial_balance(&files.curr)?;
    println!("✓ Loaded {} accounts", current.len());

    Ok((previous, current))
}
