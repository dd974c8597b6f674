// 📄 CSV Memory Backend - One flat file per client: <dir>/<storage_key>_memory.csv
// Columns: client_id,name_norm,parent_norm,category,source,updated_at
// Writes go to a sibling temp file and are renamed into place.

use super::{storage_key, MemoryBackend};
use crate::models::MemoryMapping;
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

pub struct CsvMemoryBackend {
    dir: PathBuf,
}

impl CsvMemoryBackend {
    /// Create the backend, creating `dir` if needed
    pub fn new<P: Into<PathBuf>>(dir: P) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create memory directory: {:?}", dir))?;
        Ok(CsvMemoryBackend { dir })
    }

    pub fn file_path(&self, client_id: &str) -> PathBuf {
        self.dir.join(format!("{}_memory.csv", storage_key(client_id)))
    }
}

impl MemoryBackend for CsvMemoryBackend {
    fn read(&self, client_id: &str) -> Result<Vec<MemoryMapping>> {
        let path = self.file_path(client_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .with_context(|| format!("Failed to open memory file: {:?}", path))?;

        let mut mappings = Vec::new();
        for result in rdr.deserialize() {
            let mapping: MemoryMapping =
                result.with_context(|| format!("Failed to parse memory file: {:?}", path))?;
            mappings.push(mapping);
        }

        Ok(mappings)
    }

    fn write(&self, client_id: &str, mappings: &[MemoryMapping]) -> Result<()> {
        let path = self.file_path(client_id);
        let tmp_path = path.with_extension(format!("csv.{}.tmp", uuid::Uuid::new_v4().simple()));

        {
            let mut wtr = csv::Writer::from_path(&tmp_path)
                .with_context(|| format!("Failed to create memory file: {:?}", tmp_path))?;
            for mapping in mappings {
                wtr.serialize(mapping).context("Failed to write memory mapping")?;
            }
            wtr.flush().context("Failed to flush memory file")?;
        }

        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e).with_context(|| format!("Failed to replace memory file: {:?}", path));
        }

        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
