//! Durable home of the trained scaler/model pair.
//!
//! The pair lives in one SQLite row (scaler blob, model blob, format version,
//! SHA-256 fingerprint over both blobs) replaced with a single `INSERT OR
//! REPLACE`, so a reader sees either the previous pair or the new one.

use crate::error::PersistenceError;
use crate::features::FeatureVector;
use crate::model::{AnomalyModel, IsolationForest, ModelState, Scaler, MODEL_FORMAT_VERSION};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Mutex, RwLock};

/// Persistence boundary for [`ModelState`]. Implementations must be thread-safe.
pub trait ModelStore: Send + Sync {
    /// Replace any persisted state with `state`, atomically.
    fn save(&self, state: &ModelState) -> Result<(), PersistenceError>;

    /// `Ok(None)` on a cold start.
    fn load(&self) -> Result<Option<ModelState>, PersistenceError>;

    /// Remove every persisted artifact; nothing to remove is not an error.
    fn delete(&self) -> Result<(), PersistenceError>;

    /// Extracted training matrix of the last successful retrain, for offline inspection.
    fn save_training_snapshot(
        &self,
        generation: u64,
        rows: &[FeatureVector],
    ) -> Result<(), PersistenceError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

fn fingerprint(scaler: &[u8], model: &[u8]) -> Vec<u8> {
    let mut h = Sha256::new();
    h.update((scaler.len() as u64).to_le_bytes());
    h.update(scaler);
    h.update(model);
    h.finalize().to_vec()
}

pub struct SqliteModelStore {
    conn: Mutex<Connection>,
}

impl SqliteModelStore {
    /// Open or create the store at `path`.
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS model_state (
                slot INTEGER PRIMARY KEY CHECK (slot = 1),
                format_version INTEGER NOT NULL,
                generation INTEGER NOT NULL,
                trained_at TEXT NOT NULL,
                samples INTEGER NOT NULL,
                scaler BLOB NOT NULL,
                model BLOB NOT NULL,
                fingerprint BLOB NOT NULL
            );
            CREATE TABLE IF NOT EXISTS training_snapshot (
                row_idx INTEGER PRIMARY KEY,
                generation INTEGER NOT NULL,
                features TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, PersistenceError> {
        self.conn.lock().map_err(|_| PersistenceError::Poisoned)
    }

    /// Rows of the last training snapshot, in batch order.
    pub fn training_snapshot(&self) -> Result<Vec<FeatureVector>, PersistenceError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT features FROM training_snapshot ORDER BY row_idx")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for json in rows {
            out.push(FeatureVector::new(serde_json::from_str(&json?)?));
        }
        Ok(out)
    }
}

impl ModelStore for SqliteModelStore {
    fn save(&self, state: &ModelState) -> Result<(), PersistenceError> {
        let scaler = serde_json::to_vec(&state.scaler)?;
        let model = serde_json::to_vec(&state.model)?;
        let digest = fingerprint(&scaler, &model);
        self.conn()?.execute(
            "INSERT OR REPLACE INTO model_state
                (slot, format_version, generation, trained_at, samples, scaler, model, fingerprint)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                state.format_version,
                state.generation as i64,
                state.trained_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
                state.samples as i64,
                scaler,
                model,
                digest,
            ],
        )?;
        Ok(())
    }

    fn load(&self) -> Result<Option<ModelState>, PersistenceError> {
        let row = self
            .conn()?
            .query_row(
                "SELECT format_version, generation, trained_at, samples, scaler, model, fingerprint
                 FROM model_state WHERE slot = 1",
                [],
                |r| {
                    Ok((
                        r.get::<_, u32>(0)?,
                        r.get::<_, i64>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, i64>(3)?,
                        r.get::<_, Vec<u8>>(4)?,
                        r.get::<_, Vec<u8>>(5)?,
                        r.get::<_, Vec<u8>>(6)?,
                    ))
                },
            )
            .optional()?;
        let Some((format_version, generation, trained_at, samples, scaler, model, digest)) = row
        else {
            return Ok(None);
        };

        if format_version != MODEL_FORMAT_VERSION {
            return Err(PersistenceError::IncompatibleFormat {
                found: format_version,
                expected: MODEL_FORMAT_VERSION,
            });
        }
        if fingerprint(&scaler, &model) != digest {
            return Err(PersistenceError::Corrupt(
                "scaler/model fingerprint mismatch".to_string(),
            ));
        }
        let trained_at = DateTime::parse_from_rfc3339(&trained_at)
            .map_err(|e| PersistenceError::Corrupt(format!("trained_at: {}", e)))?
            .with_timezone(&Utc);
        let scaler: Scaler = serde_json::from_slice(&scaler)?;
        let model: IsolationForest = serde_json::from_slice(&model)?;
        if scaler.dim() != model.n_features() {
            return Err(PersistenceError::Corrupt(format!(
                "scaler has {} dimensions, model {}",
                scaler.dim(),
                model.n_features()
            )));
        }

        Ok(Some(ModelState {
            format_version,
            generation: generation as u64,
            trained_at,
            samples: samples as usize,
            scaler,
            model,
        }))
    }

    fn delete(&self) -> Result<(), PersistenceError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM model_state", [])?;
        tx.execute("DELETE FROM training_snapshot", [])?;
        tx.commit()?;
        Ok(())
    }

    fn save_training_snapshot(
        &self,
        generation: u64,
        rows: &[FeatureVector],
    ) -> Result<(), PersistenceError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM training_snapshot", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO training_snapshot (row_idx, generation, features) VALUES (?1, ?2, ?3)",
            )?;
            for (i, fv) in rows.iter().enumerate() {
                stmt.execute(params![
                    i as i64,
                    generation as i64,
                    serde_json::to_string(&fv.values)?
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

/// Non-durable store for tests and ephemeral deployments. Data lost on restart.
#[derive(Default)]
pub struct InMemoryModelStore {
    state: RwLock<Option<ModelState>>,
    snapshot: RwLock<Vec<FeatureVector>>,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn training_snapshot(&self) -> Vec<FeatureVector> {
        self.snapshot
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl ModelStore for InMemoryModelStore {
    fn save(&self, state: &ModelState) -> Result<(), PersistenceError> {
        *self.state.write().map_err(|_| PersistenceError::Poisoned)? = Some(state.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<ModelState>, PersistenceError> {
        Ok(self
            .state
            .read()
            .map_err(|_| PersistenceError::Poisoned)?
            .clone())
    }

    fn delete(&self) -> Result<(), PersistenceError> {
        *self.state.write().map_err(|_| PersistenceError::Poisoned)? = None;
        self.snapshot
            .write()
            .map_err(|_| PersistenceError::Poisoned)?
            .clear();
        Ok(())
    }

    fn save_training_snapshot(
        &self,
        _generation: u64,
        rows: &[FeatureVector],
    ) -> Result<(), PersistenceError> {
        *self.snapshot.write().map_err(|_| PersistenceError::Poisoned)? = rows.to_vec();
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
