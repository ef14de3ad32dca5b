//! SQLite-backed prediction audit log. Decision columns are stored in clear for
//! querying; the raw sample payload is AES-GCM encrypted.
//! Key derived from a device-bound secret.

use crate::error::AuditError;
use crate::features::RawSample;
use crate::policy::Verdict;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

fn derive_key(seed: &[u8]) -> [u8; KEY_LEN] {
    use ring::digest;
    let mut out = [0u8; KEY_LEN];
    let h = digest::digest(&digest::SHA256, seed);
    out[..h.as_ref().len().min(KEY_LEN)].copy_from_slice(h.as_ref());
    out
}

fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<String, AuditError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| AuditError::Crypto)?;
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt((&nonce).into(), plaintext)
        .map_err(|_| AuditError::Crypto)?;
    let mut out = nonce.to_vec();
    out.extend(ciphertext);
    Ok(BASE64.encode(&out))
}

fn decrypt(key: &[u8; KEY_LEN], encoded: &str) -> Result<Vec<u8>, AuditError> {
    let raw = BASE64.decode(encoded)?;
    if raw.len() < NONCE_LEN {
        return Err(AuditError::Crypto);
    }
    let (nonce, ct) = raw.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| AuditError::Crypto)?;
    cipher.decrypt(nonce.into(), ct).map_err(|_| AuditError::Crypto)
}

/// One scored sample as written to the audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub ts: DateTime<Utc>,
    pub is_anomaly: bool,
    pub score: f64,
    /// Model generation that produced the score
    pub generation: u64,
    pub sample: RawSample,
}

impl AuditRecord {
    pub fn new(sample: RawSample, verdict: &Verdict, generation: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            ts: Utc::now(),
            is_anomaly: verdict.is_anomaly,
            score: verdict.score,
            generation,
            sample,
        }
    }
}

pub struct PredictionLog {
    conn: Mutex<Connection>,
    key: [u8; KEY_LEN],
}

impl PredictionLog {
    /// Open or create DB at path. Key is derived from `secret` (in production: device-bound).
    pub fn open(path: &Path, secret: &[u8]) -> Result<Self, AuditError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS predictions (
                id TEXT PRIMARY KEY,
                ts INTEGER NOT NULL,
                is_anomaly INTEGER NOT NULL,
                score REAL NOT NULL,
                generation INTEGER NOT NULL,
                payload_enc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_predictions_ts ON predictions(ts);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            key: derive_key(secret),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, AuditError> {
        self.conn.lock().map_err(|_| AuditError::Poisoned)
    }

    /// Append a record (sample payload stored encrypted)
    pub fn record(&self, rec: &AuditRecord) -> Result<(), AuditError> {
        let payload = serde_json::to_vec(&rec.sample)?;
        let enc = encrypt(&self.key, &payload)?;
        self.conn()?.execute(
            "INSERT INTO predictions (id, ts, is_anomaly, score, generation, payload_enc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                rec.id,
                rec.ts.timestamp_millis(),
                rec.is_anomaly,
                rec.score,
                rec.generation as i64,
                enc
            ],
        )?;
        Ok(())
    }

    /// Read a record by id (decrypts the payload)
    pub fn get(&self, id: &str) -> Result<Option<AuditRecord>, AuditError> {
        let row = self
            .conn()?
            .query_row(
                "SELECT id, ts, is_anomaly, score, generation, payload_enc FROM predictions WHERE id = ?1",
                params![id],
                Self::read_row,
            )
            .optional()?;
        row.map(|r| self.decode(r)).transpose()
    }

    /// Most recent records first
    pub fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>, AuditError> {
        let rows: Vec<RawRow> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT id, ts, is_anomaly, score, generation, payload_enc FROM predictions
                 ORDER BY ts DESC, rowid DESC LIMIT ?1",
            )?;
            let mapped = stmt.query_map(params![limit as i64], Self::read_row)?;
            let collected = mapped.collect::<Result<Vec<_>, _>>()?;
            collected
        };
        rows.into_iter().map(|r| self.decode(r)).collect()
    }

    pub fn count(&self) -> Result<u64, AuditError> {
        let n: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM predictions", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    fn read_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
        Ok(RawRow {
            id: r.get(0)?,
            ts: r.get(1)?,
            is_anomaly: r.get(2)?,
            score: r.get(3)?,
            generation: r.get(4)?,
            payload_enc: r.get(5)?,
        })
    }

    fn decode(&self, r: RawRow) -> Result<AuditRecord, AuditError> {
        let plain = decrypt(&self.key, &r.payload_enc)?;
        Ok(AuditRecord {
            id: r.id,
            ts: Utc
                .timestamp_millis_opt(r.ts)
                .single()
                .unwrap_or_else(Utc::now),
            is_anomaly: r.is_anomaly,
            score: r.score,
            generation: r.generation as u64,
            sample: serde_json::from_slice(&plain)?,
        })
    }
}

struct RawRow {
    id: String,
    ts: i64,
    is_anomaly: bool,
    score: f64,
    generation: i64,
    payload_enc: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::SampleMode;
    use crate::model::Label;

    fn verdict(is_anomaly: bool, score: f64) -> Verdict {
        Verdict {
            is_anomaly,
            score,
            label: if is_anomaly { Label::Outlier } else { Label::Normal },
        }
    }

    fn sample(rms: f64) -> RawSample {
        RawSample {
            rms_x: Some(rms),
            spectrum_x: Some(vec![0.5; 5]),
            ..Default::default()
        }
        .with_mode(SampleMode::Prediction)
    }

    #[test]
    fn record_roundtrip_decrypts_payload() {
        let dir = tempfile::tempdir().unwrap();
        let log = PredictionLog::open(&dir.path().join("audit.db"), b"test-secret").unwrap();
        let rec = AuditRecord::new(sample(0.25), &verdict(true, -0.41), 2);
        log.record(&rec).unwrap();

        let out = log.get(&rec.id).unwrap().unwrap();
        assert_eq!(out.sample, rec.sample);
        assert_eq!(out.score, -0.41);
        assert!(out.is_anomaly);
        assert_eq!(out.generation, 2);
        assert_eq!(out.ts.timestamp_millis(), rec.ts.timestamp_millis());
        assert!(log.get("missing").unwrap().is_none());
    }

    #[test]
    fn payload_is_not_stored_in_clear() {
        let dir = tempfile::tempdir().unwrap();
        let log = PredictionLog::open(&dir.path().join("audit.db"), b"test-secret").unwrap();
        log.record(&AuditRecord::new(sample(0.125), &verdict(false, 0.2), 1))
            .unwrap();
        let enc: String = log
            .conn()
            .unwrap()
            .query_row("SELECT payload_enc FROM predictions", [], |r| r.get(0))
            .unwrap();
        assert!(!enc.contains("rms_x"));
    }

    #[test]
    fn wrong_secret_cannot_decrypt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");
        let rec = AuditRecord::new(sample(0.3), &verdict(false, 0.1), 1);
        PredictionLog::open(&path, b"right").unwrap().record(&rec).unwrap();
        let other = PredictionLog::open(&path, b"wrong").unwrap();
        assert!(matches!(other.get(&rec.id), Err(AuditError::Crypto)));
    }

    #[test]
    fn recent_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let log = PredictionLog::open(&dir.path().join("audit.db"), b"s").unwrap();
        for i in 0..3 {
            log.record(&AuditRecord::new(sample(i as f64), &verdict(false, 0.1), 1))
                .unwrap();
        }
        assert_eq!(log.count().unwrap(), 3);
        let recent = log.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].sample.rms_x, Some(2.0));
    }
}
