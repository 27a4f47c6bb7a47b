//! File-backed entity store
//!
//! One pretty-printed JSON file per table, named after the lowercased table
//! name, inside a single data directory that is created on first write.
//!
//! Writers of the same table are serialised by a per-name async lock, so the
//! read-merge-write sequence of an upsert cannot interleave with another one.
//! A lock lives in the registry only while someone holds or awaits it.
//! Records are written to a hidden temp file first and renamed into place; a
//! batch only starts renaming once every record of the batch has been staged.

use dashmap::DashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core::merge::merge_entity;
use crate::core::schema::{Entity, normalize_table_name};

const RECORD_EXTENSION: &str = "json";

/// Entity store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid table name: {0:?}")]
    InvalidName(String),

    #[error("Entity with name \"{0}\" not found")]
    NotFound(String),

    #[error("Failed to write {}: {source}", path.display())]
    NotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt entity file {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

type LockRegistry = DashMap<String, Arc<Mutex<()>>>;

/// Exclusive access to one table name
///
/// Dropping it releases the lock and removes the registry entry once no other
/// task holds or waits on it.
struct KeyGuard {
    key: String,
    locks: Arc<LockRegistry>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Waiters hold a clone of the Arc, so a count of one is the registry's own
        self.locks
            .remove_if(self.key.as_str(), |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// Record staged next to its final location
struct StagedRecord {
    temp: PathBuf,
    target: PathBuf,
}

/// Persistent table records, keyed by lowercased table name
#[derive(Clone)]
pub struct EntityStore {
    dir: PathBuf,
    locks: Arc<LockRegistry>,
}

impl EntityStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All stored tables, sorted by name. A missing directory is an empty store.
    pub async fn get_all(&self) -> Result<Vec<Entity>, StoreError> {
        let read_error = |source: std::io::Error| StoreError::Read {
            path: self.dir.clone(),
            source,
        };

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(read_error(e)),
        };

        let mut tables = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(read_error)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            // Deleted between listing and reading
            if let Some(entity) = read_record(&path).await? {
                tables.push(entity);
            }
        }

        tables.sort_by(|a, b| a.table_name.cmp(&b.table_name));
        Ok(tables)
    }

    /// One stored table
    pub async fn get(&self, table_name: &str) -> Result<Entity, StoreError> {
        let key = record_key(table_name)?;
        read_record(&self.record_path(&key))
            .await?
            .ok_or(StoreError::NotFound(key))
    }

    /// Merge `incoming` into the record stored under `table_name` and persist it
    pub async fn upsert(&self, table_name: &str, incoming: &Entity) -> Result<Entity, StoreError> {
        let key = record_key(table_name)?;
        let _guard = self.lock(&key).await;

        let existing = read_record(&self.record_path(&key)).await?;
        let merged = merge_as(existing.as_ref(), incoming, &key);

        self.write_records(&[(key, &merged)]).await?;
        tracing::info!(
            "Saved table '{}' ({} columns, {} relationships)",
            merged.table_name,
            merged.columns.len(),
            merged.relationships.len()
        );

        Ok(merged)
    }

    /// Upsert every table of a batch; either all records are staged or none is written
    ///
    /// A table repeated inside the batch is merged in order, the later entry on
    /// top of the earlier one. Returns the merged records in first-seen order.
    pub async fn upsert_all(&self, tables: &[Entity]) -> Result<Vec<Entity>, StoreError> {
        let keys = tables
            .iter()
            .map(|t| record_key(&t.table_name))
            .collect::<Result<Vec<_>, _>>()?;

        // Sorted acquisition: two batches never wait on each other in a cycle
        let mut lock_order = keys.clone();
        lock_order.sort();
        lock_order.dedup();
        let mut guards = Vec::with_capacity(lock_order.len());
        for key in &lock_order {
            guards.push(self.lock(key).await);
        }

        let mut records: Vec<(String, Entity)> = Vec::with_capacity(tables.len());
        for (key, table) in keys.into_iter().zip(tables) {
            if let Some((_, pending)) = records.iter_mut().find(|(k, _)| *k == key) {
                *pending = merge_as(Some(&*pending), table, &key);
            } else {
                let existing = read_record(&self.record_path(&key)).await?;
                let merged = merge_as(existing.as_ref(), table, &key);
                records.push((key, merged));
            }
        }

        {
            let batch: Vec<(String, &Entity)> =
                records.iter().map(|(k, e)| (k.clone(), e)).collect();
            self.write_records(&batch).await?;
        }
        drop(guards);

        tracing::info!("Saved {} table(s)", records.len());
        Ok(records.into_iter().map(|(_, entity)| entity).collect())
    }

    /// Remove the record stored under `table_name`
    pub async fn delete(&self, table_name: &str) -> Result<(), StoreError> {
        let key = record_key(table_name)?;
        let _guard = self.lock(&key).await;
        let path = self.record_path(&key);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!("Deleted table '{}'", key);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(key)),
            Err(source) => Err(StoreError::NotWritable { path, source }),
        }
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, RECORD_EXTENSION))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!(".{}.{}.tmp", key, RECORD_EXTENSION))
    }

    async fn lock(&self, key: &str) -> KeyGuard {
        let mutex = self.locks.entry(key.to_string()).or_default().clone();
        let guard = mutex.lock_owned().await;

        KeyGuard {
            key: key.to_string(),
            locks: self.locks.clone(),
            guard: Some(guard),
        }
    }

    /// Stage every record, then rename them all into place
    async fn write_records(&self, records: &[(String, &Entity)]) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StoreError::NotWritable {
                path: self.dir.clone(),
                source,
            })?;

        let mut staged = Vec::with_capacity(records.len());
        for (key, entity) in records {
            match self.stage(key, entity).await {
                Ok(record) => staged.push(record),
                Err(e) => {
                    discard(&staged).await;
                    return Err(e);
                }
            }
        }

        for (i, record) in staged.iter().enumerate() {
            if let Err(source) = tokio::fs::rename(&record.temp, &record.target).await {
                tracing::error!(
                    "Commit failed after {} of {} record(s): {}",
                    i,
                    staged.len(),
                    source
                );
                discard(&staged[i..]).await;
                return Err(StoreError::NotWritable {
                    path: record.target.clone(),
                    source,
                });
            }
        }

        Ok(())
    }

    async fn stage(&self, key: &str, entity: &Entity) -> Result<StagedRecord, StoreError> {
        let temp = self.temp_path(key);
        let json = serde_json::to_string_pretty(entity).map_err(|e| StoreError::NotWritable {
            path: temp.clone(),
            source: std::io::Error::new(ErrorKind::InvalidData, e),
        })?;

        tokio::fs::write(&temp, json)
            .await
            .map_err(|source| StoreError::NotWritable {
                path: temp.clone(),
                source,
            })?;

        Ok(StagedRecord {
            temp,
            target: self.record_path(key),
        })
    }
}

/// Merge and pin the record to the name it is stored under
fn merge_as(existing: Option<&Entity>, incoming: &Entity, key: &str) -> Entity {
    let mut merged = merge_entity(existing, incoming);
    merged.table_name = key.to_string();
    merged
}

async fn discard(staged: &[StagedRecord]) {
    for record in staged {
        if let Err(e) = tokio::fs::remove_file(&record.temp).await {
            tracing::warn!("Failed to remove {}: {}", record.temp.display(), e);
        }
    }
}

/// `None` when the file does not exist: the first save of a table
async fn read_record(path: &Path) -> Result<Option<Entity>, StoreError> {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    serde_json::from_str(&data)
        .map(Some)
        .map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Lowercased storage key; rejects names that would escape the data directory
pub fn record_key(table_name: &str) -> Result<String, StoreError> {
    let key = normalize_table_name(table_name);
    let escapes = key.contains(['/', '\\', '\0']) || key == "." || key == "..";

    if key.trim().is_empty() || escapes {
        return Err(StoreError::InvalidName(table_name.to_string()));
    }
    Ok(key)
}
