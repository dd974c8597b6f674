// 🗄️ SQLite Memory Backend - All clients in one table, WAL mode
// Rows are read back ordered by rowid, so insertion order survives a save.

use super::MemoryBackend;
use crate::models::MemoryMapping;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

pub struct SqliteMemoryBackend {
    conn: Mutex<Connection>,
}

impl SqliteMemoryBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open memory database: {:?}", path))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        setup_memory_schema(&conn)?;
        Ok(SqliteMemoryBackend {
            conn: Mutex::new(conn),
        })
    }
}

pub fn setup_memory_schema(conn: &Connection) -> Result<()> {
    // WAL: readers see the last committed collection while a save is in flight
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS memory_mappings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            client_id TEXT NOT NULL,
            name_norm TEXT NOT NULL,
            parent_norm TEXT,
            category TEXT NOT NULL,
            source TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_memory_client ON memory_mappings(client_id)",
        [],
    )?;

    Ok(())
}

impl MemoryBackend for SqliteMemoryBackend {
    fn read(&self, client_id: &str) -> Result<Vec<MemoryMapping>> {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());

        let mut stmt = conn.prepare(
            "SELECT client_id, name_norm, parent_norm, category, source, updated_at
             FROM memory_mappings
             WHERE client_id = ?1
             ORDER BY id",
        )?;

        let rows = stmt.query_map(params![client_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut mappings = Vec::new();
        for row in rows {
            let (client_id, name_norm, parent_norm, category, source, updated_at) = row?;
            let updated_at = DateTime::parse_from_rfc3339(&updated_at)
                .with_context(|| format!("Invalid updated_at in memory row: {}", updated_at))?
                .with_timezone(&Utc);

            mappings.push(MemoryMapping {
                client_id,
                name_norm,
                parent_norm,
                category,
                source,
                updated_at,
            });
        }

        Ok(mappings)
    }

    fn write(&self, client_id: &str, mappings: &[MemoryMapping]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM memory_mappings WHERE client_id = ?1",
            params![client_id],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO memory_mappings
                 (client_id, name_norm, parent_norm, category, source, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;

            for mapping in mappings {
                stmt.execute(params![
                    client_id,
                    mapping.name_norm,
                    mapping.parent_norm,
                    mapping.category,
                    mapping.source,
                    mapping.updated_at.to_rfc3339(),
                ])?;
            }
        }

        tx.commit().context("Failed to commit memory mappings")?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
