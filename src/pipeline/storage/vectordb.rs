use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, OptionalExtension};

use super::index::CodeIndex;
use super::types::IndexStore;
use super::StorageError;
use crate::db::open_database;
use crate::models::CodeSystem;

/// Persists code indices in a SQLite file, one `code_indices` row per system.
pub struct SqliteIndexStore {
    path: PathBuf,
}

impl SqliteIndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IndexStore for SqliteIndexStore {
    fn save(&self, index: &CodeIndex) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut conn = open_database(&self.path)?;
        let codes = serde_json::to_string(index.codes())?;
        let descriptions = serde_json::to_string(index.descriptions())?;
        let blob = encode_embeddings(index.embeddings());
        let built_at = chrono::Utc::now().to_rfc3339();

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO code_indices
             (system, dimension, row_count, codes, descriptions, embeddings, catalog_fingerprint, built_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                index.system().as_str(),
                index.dimension() as i64,
                index.len() as i64,
                codes,
                descriptions,
                blob,
                index.catalog_fingerprint(),
                built_at,
            ],
        )?;
        tx.commit()?;

        tracing::info!(
            system = %index.system(),
            rows = index.len(),
            path = %self.path.display(),
            "Code index persisted"
        );
        Ok(())
    }

    fn load(&self, system: CodeSystem) -> Result<Option<CodeIndex>, StorageError> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "No index database yet");
            return Ok(None);
        }

        let conn = open_database(&self.path)?;
        let row = conn
            .query_row(
                "SELECT dimension, row_count, codes, descriptions, embeddings, catalog_fingerprint
                 FROM code_indices WHERE system = ?1",
                params![system.as_str()],
                |row| {
                    Ok(StoredIndexRow {
                        dimension: row.get(0)?,
                        row_count: row.get(1)?,
                        codes: row.get(2)?,
                        descriptions: row.get(3)?,
                        embeddings: row.get(4)?,
                        catalog_fingerprint: row.get(5)?,
                    })
                },
            )
            .optional()?;

        let Some(stored) = row else {
            return Ok(None);
        };

        let index = stored.into_index(system)?;
        tracing::debug!(system = %system, rows = index.len(), "Code index loaded");
        Ok(Some(index))
    }
}

struct StoredIndexRow {
    dimension: i64,
    row_count: i64,
    codes: String,
    descriptions: String,
    embeddings: Vec<u8>,
    catalog_fingerprint: Option<String>,
}

impl StoredIndexRow {
    fn into_index(self, system: CodeSystem) -> Result<CodeIndex, StorageError> {
        let corrupt = |reason: String| StorageError::CorruptIndex {
            system: system.to_string(),
            reason,
        };

        let dimension = usize::try_from(self.dimension)
            .map_err(|_| corrupt(format!("negative dimension {}", self.dimension)))?;
        let row_count = usize::try_from(self.row_count)
            .map_err(|_| corrupt(format!("negative row count {}", self.row_count)))?;

        let codes: Vec<String> = serde_json::from_str(&self.codes)?;
        let descriptions: Vec<String> = serde_json::from_str(&self.descriptions)?;
        let embeddings = decode_embeddings(&self.embeddings, dimension, row_count)
            .ok_or_else(|| {
                corrupt(format!(
                    "embedding blob of {} bytes does not hold {row_count} x {dimension} f32",
                    self.embeddings.len()
                ))
            })?;

        if codes.len() != row_count {
            return Err(corrupt(format!(
                "row count {row_count} but {} codes",
                codes.len()
            )));
        }

        let index = CodeIndex::from_parts(system, codes, descriptions, embeddings, dimension)?;
        Ok(match self.catalog_fingerprint {
            Some(fp) => index.with_fingerprint(fp),
            None => index,
        })
    }
}

/// Row-major little-endian f32.
fn encode_embeddings(embeddings: &[Vec<f32>]) -> Vec<u8> {
    embeddings
        .iter()
        .flat_map(|row| row.iter().flat_map(|v| v.to_le_bytes()))
        .collect()
}

fn decode_embeddings(blob: &[u8], dimension: usize, rows: usize) -> Option<Vec<Vec<f32>>> {
    let expected = rows.checked_mul(dimension)?.checked_mul(4)?;
    if blob.len() != expected {
        return None;
    }
    if dimension == 0 {
        return Some(vec![Vec::new(); rows]);
    }

    let values: Vec<f32> = blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Some(values.chunks(dimension).map(<[f32]>::to_vec).collect())
}

/// In-memory index store for testing.
pub struct InMemoryIndexStore {
    indices: Mutex<HashMap<CodeSystem, CodeIndex>>,
}

impl InMemoryIndexStore {
    pub fn new() -> Self {
        Self {
            indices: Mutex::new(HashMap::new()),
        }
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<CodeSystem, CodeIndex>>, StorageError> {
        self.indices.lock().map_err(|_| StorageError::CorruptIndex {
            system: "*".into(),
            reason: "store lock poisoned".into(),
        })
    }
}

impl Default for InMemoryIndexStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexStore for InMemoryIndexStore {
    fn save(&self, index: &CodeIndex) -> Result<(), StorageError> {
        self.lock()?.insert(index.system(), index.clone());
        Ok(())
    }

    fn load(&self, system: CodeSystem) -> Result<Option<CodeIndex>, StorageError> {
        Ok(self.lock()?.get(&system).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CatalogEntry;
    use crate::pipeline::storage::MockEmbedder;

    fn built(system: CodeSystem, entries: &[CatalogEntry]) -> CodeIndex {
        CodeIndex::build(system, entries, &MockEmbedder::with_dimension(16), 64).unwrap()
    }

    fn icd_entries() -> Vec<CatalogEntry> {
        vec![
            CatalogEntry::new("K57.90", "Diverticulosis of intestine"),
            CatalogEntry::new("K64.8", "Other hemorrhoids"),
            CatalogEntry::new("K57.90", "Duplicate row"),
        ]
    }

    #[test]
    fn round_trip_preserves_rows_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteIndexStore::new(dir.path().join("vector_db").join("code_index.db"));
        let index = built(CodeSystem::Icd, &icd_entries()).with_fingerprint("fp-1");

        store.save(&index).unwrap();
        let loaded = store.load(CodeSystem::Icd).unwrap().unwrap();

        assert_eq!(loaded, index);
        assert_eq!(loaded.catalog_fingerprint(), Some("fp-1"));
    }

    #[test]
    fn systems_are_stored_independently() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteIndexStore::new(dir.path().join("code_index.db"));
        let cpt = built(CodeSystem::Cpt, &[CatalogEntry::new("45378", "Colonoscopy")]);

        store.save(&cpt).unwrap();

        assert!(store.load(CodeSystem::Icd).unwrap().is_none());
        assert_eq!(store.load(CodeSystem::Cpt).unwrap().unwrap().codes(), &["45378"]);
    }

    #[test]
    fn save_overwrites_previous_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteIndexStore::new(dir.path().join("code_index.db"));

        store.save(&built(CodeSystem::Icd, &icd_entries())).unwrap();
        let replacement = built(
            CodeSystem::Icd,
            &[CatalogEntry::new("Z86.010", "History of polyps")],
        );
        store.save(&replacement).unwrap();

        let loaded = store.load(CodeSystem::Icd).unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.codes(), &["Z86.010"]);
    }

    #[test]
    fn missing_database_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteIndexStore::new(dir.path().join("absent.db"));
        assert!(store.load(CodeSystem::Icd).unwrap().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn empty_index_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteIndexStore::new(dir.path().join("code_index.db"));
        store.save(&CodeIndex::empty(CodeSystem::Cpt)).unwrap();

        let loaded = store.load(CodeSystem::Cpt).unwrap().unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn truncated_blob_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("code_index.db");
        let store = SqliteIndexStore::new(&path);
        store.save(&built(CodeSystem::Icd, &icd_entries())).unwrap();

        let conn = open_database(&path).unwrap();
        conn.execute(
            "UPDATE code_indices SET embeddings = substr(embeddings, 1, 10) WHERE system = 'icd'",
            [],
        )
        .unwrap();
        drop(conn);

        let err = store.load(CodeSystem::Icd).unwrap_err();
        assert!(matches!(err, StorageError::CorruptIndex { .. }));
    }

    #[test]
    fn blob_encoding_is_little_endian_row_major() {
        let blob = encode_embeddings(&[vec![1.0, -2.5], vec![0.25, 3.0]]);
        assert_eq!(blob.len(), 16);
        assert_eq!(&blob[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&blob[12..16], &3.0f32.to_le_bytes());
        assert_eq!(
            decode_embeddings(&blob, 2, 2).unwrap(),
            vec![vec![1.0, -2.5], vec![0.25, 3.0]]
        );
        assert!(decode_embeddings(&blob, 3, 2).is_none());
    }

    #[test]
    fn in_memory_store_round_trips() {
        let store = InMemoryIndexStore::new();
        assert!(store.load(CodeSystem::Icd).unwrap().is_none());
        let index = built(CodeSystem::Icd, &icd_entries());
        store.save(&index).unwrap();
        assert_eq!(store.load(CodeSystem::Icd).unwrap(), Some(index));
    }
}
