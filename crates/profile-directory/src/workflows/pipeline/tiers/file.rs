use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{apply_batch, apply_insert, apply_upsert, TierError, TierKind, TierRecord, TierStore};

/// Secondary tier: one JSON document per collection, rewritten in full on every change.
///
/// Writers are serialized through an async mutex and replace the document via a temp file plus
/// rename, so readers never observe a half-written file.
///
/// A seeded store writes its seed the first time it finds no file. Once the file exists its
/// contents are authoritative, even when every record has been deleted.
#[derive(Debug)]
pub struct FileStore<R> {
    path: PathBuf,
    seed: Vec<R>,
    write_lock: Mutex<()>,
}

impl<R: TierRecord> FileStore<R> {
    /// Store rooted at `data_dir`, using `<data_dir>/<collection>.json`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self::at_path(data_dir.as_ref().join(format!("{}.json", R::COLLECTION)))
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seed: Vec::new(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_seed(mut self, seed: Vec<R>) -> Self {
        self.seed = seed;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unavailable(&self, err: impl std::fmt::Display) -> TierError {
        TierError::unavailable(
            TierKind::Secondary,
            format!("{}: {err}", self.path.display()),
        )
    }

    /// Parsed file contents, or `None` when the file does not exist yet.
    async fn load_existing(&self) -> Result<Option<BTreeMap<String, R>>, TierError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.unavailable(err)),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Some(BTreeMap::new()));
        }

        let records: Vec<R> = serde_json::from_slice(&bytes).map_err(|err| self.unavailable(err))?;
        Ok(Some(
            records
                .into_iter()
                .map(|record| (record.record_id().to_string(), record))
                .collect(),
        ))
    }

    /// Callers hold `write_lock`. A missing file is created from the seed.
    async fn load(&self) -> Result<BTreeMap<String, R>, TierError> {
        if let Some(rows) = self.load_existing().await? {
            return Ok(rows);
        }

        let rows: BTreeMap<String, R> = self
            .seed
            .iter()
            .map(|record| (record.record_id().to_string(), record.clone()))
            .collect();
        if !rows.is_empty() {
            info!(path = %self.path.display(), rows = rows.len(), "initializing secondary store from seed");
            self.persist(&rows).await?;
        } else {
            debug!(path = %self.path.display(), "secondary store file missing; treating as empty");
        }
        Ok(rows)
    }

    async fn read(&self) -> Result<BTreeMap<String, R>, TierError> {
        if let Some(rows) = self.load_existing().await? {
            return Ok(rows);
        }
        let _guard = self.write_lock.lock().await;
        self.load().await
    }

    async fn persist(&self, rows: &BTreeMap<String, R>) -> Result<(), TierError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|err| self.unavailable(err))?;
            }
        }

        let records: Vec<&R> = rows.values().collect();
        let body = serde_json::to_vec_pretty(&records).map_err(|err| self.unavailable(err))?;
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, body)
            .await
            .map_err(|err| self.unavailable(err))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|err| self.unavailable(err))
    }

    async fn modify<T>(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, R>) -> Result<T, TierError>,
    ) -> Result<T, TierError> {
        let _guard = self.write_lock.lock().await;
        let mut rows = self.load().await?;
        let outcome = apply(&mut rows)?;
        self.persist(&rows).await?;
        Ok(outcome)
    }
}

#[async_trait]
impl<R: TierRecord> TierStore<R> for FileStore<R> {
    fn kind(&self) -> TierKind {
        TierKind::Secondary
    }

    async fn read_all(&self) -> Result<Vec<R>, TierError> {
        Ok(self.read().await?.into_values().collect())
    }

    async fn read_one(&self, id: &str) -> Result<Option<R>, TierError> {
        Ok(self.read().await?.remove(id))
    }

    async fn write_all(&self, records: &[R]) -> Result<(), TierError> {
        self.modify(|rows| apply_batch(rows, records)).await
    }

    async fn upsert(&self, record: &R) -> Result<(), TierError> {
        self.modify(|rows| apply_upsert(rows, record)).await
    }

    async fn insert(&self, record: &R) -> Result<(), TierError> {
        self.modify(|rows| apply_insert(rows, record)).await
    }

    async fn delete(&self, id: &str) -> Result<bool, TierError> {
        let _guard = self.write_lock.lock().await;
        let mut rows = self.load().await?;
        if rows.remove(id).is_none() {
            return Ok(false);
        }
        self.persist(&rows).await?;
        Ok(true)
    }
}
