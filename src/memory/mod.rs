// 🧠 Memory Store - Per-client learned (name, parent) → category mappings
// The feedback loop: a user confirms or edits a suggestion, `upsert` records it,
// and every later classification for that client reads it back.
//
// Physically a flat ordered list per client; logically a last-write-wins map
// keyed by (name_norm, parent_norm). Insertion order is preserved so the
// name-only fallback in `find_exact` stays deterministic.
//
// Backends:
// - CsvMemoryBackend: one flat file per client
// - SqliteMemoryBackend: one table, rows ordered by rowid
// - InMemoryBackend: process-local, for tests and embedding

pub mod csv_backend;
pub mod sqlite_backend;

pub use csv_backend::CsvMemoryBackend;
pub use sqlite_backend::SqliteMemoryBackend;

use crate::models::MemoryMapping;
use crate::similarity::similarity;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

// ============================================================================
// BACKEND TRAIT
// ============================================================================

/// Durable storage for one client's mapping collection
pub trait MemoryBackend: Send + Sync {
    /// Read the full collection. `Ok(vec![])` when the client has no record yet.
    fn read(&self, client_id: &str) -> Result<Vec<MemoryMapping>>;

    /// Replace the full collection. Readers must never observe a partial write.
    fn write(&self, client_id: &str, mappings: &[MemoryMapping]) -> Result<()>;
}

/// Filesystem-safe key for a client identifier.
///
/// Anything other than ASCII alphanumerics, `-` and `_` becomes `_`. When that
/// changes the id (or the id is empty) a short SHA-256 suffix keeps distinct
/// clients such as `a/b` and `a_b` apart.
pub fn storage_key(client_id: &str) -> String {
    let sanitized: String = client_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();

    if sanitized == client_id && !client_id.is_empty() {
        return sanitized;
    }

    let digest = Sha256::digest(client_id.as_bytes());
    let suffix: String = digest.iter().take(4).map(|b| format!("{:02x}", b)).collect();
    format!("{}-{}", sanitized, suffix)
}

// ============================================================================
// LOOKUPS (shared by MemoryStore and engine snapshots)
// ============================================================================

/// Exact lookup: (name, parent) first when parent is non-empty, then name alone.
/// First match in insertion order wins.
pub fn find_exact<'a>(
    mappings: &'a [MemoryMapping],
    name_norm: &str,
    parent_norm: Option<&str>,
) -> Option<&'a MemoryMapping> {
    if let Some(parent) = parent_norm.filter(|p| !p.is_empty()) {
        let with_parent = mappings
            .iter()
            .find(|m| m.name_norm == name_norm && m.parent_key() == parent);
        if with_parent.is_some() {
            return with_parent;
        }
    }

    mappings.iter().find(|m| m.name_norm == name_norm)
}

/// Best fuzzy match by name similarity, accepted only at or above `threshold`.
/// Ties keep the earliest mapping.
pub fn find_fuzzy<'a>(
    mappings: &'a [MemoryMapping],
    name_norm: &str,
    threshold: f64,
) -> Option<(&'a MemoryMapping, f64)> {
    let mut best: Option<(&MemoryMapping, f64)> = None;
    let mut best_score = 0.0;

    for mapping in mappings {
        let score = similarity(name_norm, &mapping.name_norm);
        if score > best_score && score >= threshold {
            best_score = score;
            best = Some((mapping, score));
        }
    }

    best
}

// ============================================================================
// MEMORY STORE
// ============================================================================

pub struct MemoryStore {
    backend: Box<dyn MemoryBackend>,

    /// Per-client write locks serializing upsert's read-modify-write
    client_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MemoryStore {
    pub fn new(backend: impl MemoryBackend + 'static) -> Self {
        MemoryStore {
            backend: Box::new(backend),
            client_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Store backed by one CSV file per client under `dir`
    pub fn csv<P: Into<std::path::PathBuf>>(dir: P) -> Result<Self> {
        Ok(MemoryStore::new(CsvMemoryBackend::new(dir)?))
    }

    /// Store backed by a SQLite database file
    pub fn sqlite<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        Ok(MemoryStore::new(SqliteMemoryBackend::open(path)?))
    }

    pub fn in_memory() -> Self {
        MemoryStore::new(InMemoryBackend::new())
    }

    /// All mappings for a client. Missing or unreadable storage yields an empty list.
    pub fn load(&self, client_id: &str) -> Vec<MemoryMapping> {
        match self.backend.read(client_id) {
            Ok(mappings) => mappings,
            Err(e) => {
                warn!(client_id, error = %format!("{:#}", e), "memory unreadable, treating as empty");
                Vec::new()
            }
        }
    }

    /// Replace the client's whole collection
    pub fn save(&self, client_id: &str, mappings: &[MemoryMapping]) -> Result<()> {
        self.backend.write(client_id, mappings)?;
        debug!(client_id, count = mappings.len(), "memory saved");
        Ok(())
    }

    pub fn find_exact(
        &self,
        client_id: &str,
        name_norm: &str,
        parent_norm: Option<&str>,
    ) -> Option<MemoryMapping> {
        let mappings = self.load(client_id);
        find_exact(&mappings, name_norm, parent_norm).cloned()
    }

    /// Record a confirmed mapping, replacing any entry with the same (name, parent) key.
    /// Unlike `load`, a read failure is an error here; an unreadable collection is never overwritten.
    pub fn upsert(&self, mapping: MemoryMapping) -> Result<()> {
        let lock = self.client_lock(&mapping.client_id);
        let _guard = lock_ignoring_poison(&lock);

        let mut mappings = self
            .backend
            .read(&mapping.client_id)
            .with_context(|| format!("Refusing to update unreadable memory for client {}", mapping.client_id))?;
        let before = mappings.len();
        mappings.retain(|m| !m.same_key(&mapping));
        let replaced = before != mappings.len();

        info!(
            client_id = %mapping.client_id,
            name_norm = %mapping.name_norm,
            category = %mapping.category,
            source = %mapping.source,
            replaced,
            "memory upsert"
        );

        let client_id = mapping.client_id.clone();
        mappings.push(mapping);
        self.save(&client_id, &mappings)
    }

    fn client_lock(&self, client_id: &str) -> Arc<Mutex<()>> {
        let mut locks = lock_ignoring_poison(&self.client_locks);
        locks
            .entry(client_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// A panic while holding a lock leaves no partial state behind here; keep going
fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// IN-MEMORY BACKEND
// ============================================================================

#[derive(Default)]
pub struct InMemoryBackend {
    clients: RwLock<HashMap<String, Vec<MemoryMapping>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryBackend for InMemoryBackend {
    fn read(&self, client_id: &str) -> Result<Vec<MemoryMapping>> {
        let clients = self.clients.read().unwrap_or_else(|p| p.into_inner());
        Ok(clients.get(client_id).cloned().unwrap_or_default())
    }

    fn write(&self, client_id: &str, mappings: &[MemoryMapping]) -> Result<()> {
        let mut clients = self.clients.write().unwrap_or_else(|p| p.into_inner());
        clients.insert(client_id.to_string(), mappings.to_vec());
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
