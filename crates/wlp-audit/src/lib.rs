//! Append-only audit log encoding. Writes JSON Lines (one event per line).
//! Optional hash chain: each event can include hash_prev + hash_self, so a
//! regulator (or our own tooling) can prove the exported trail was neither
//! reordered nor edited.
//!
//! The store persists raw [`AuditEntry`] rows inside each mutating
//! transaction; chain decoration happens here, at export time, where the
//! full ordered history is in hand.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use wlp_schemas::{AuditAction, AuditEntity, AuditEntry};

/// One exported audit event: the stored entry plus chain decoration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub entity: AuditEntity,
    pub entity_id: i64,
    pub action: AuditAction,
    pub actor_id: Option<i64>,
    pub old: Option<Value>,
    pub new: Option<Value>,
    pub ts_utc: chrono::DateTime<chrono::Utc>,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// Append-only audit writer.
pub struct AuditWriter {
    path: PathBuf,
    hash_chain: bool,
    last_hash: Option<String>,
    /// Monotonically increasing sequence counter for `event_id` derivation.
    /// Starts at 0 and increments on every `append` call. When resuming an
    /// existing log, restore with `set_seq` alongside `set_last_hash`.
    seq: u64,
}

impl AuditWriter {
    /// Creates the audit writer and ensures parent dirs exist.
    pub fn new(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }

        Ok(Self {
            path,
            hash_chain,
            last_hash: None,
            seq: 0,
        })
    }

    /// Set last hash explicitly (e.g., after reading the last line of an
    /// existing log on restart).
    pub fn set_last_hash(&mut self, last_hash: Option<String>) {
        self.last_hash = last_hash;
    }

    pub fn last_hash(&self) -> Option<String> {
        self.last_hash.clone()
    }

    /// Set the sequence counter when resuming an existing log. Pass the
    /// number of events already written; must be paired with
    /// `set_last_hash` for correct restart semantics.
    pub fn set_seq(&mut self, seq: u64) {
        self.seq = seq;
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Append one entry, returning the decorated event.
    pub fn append(&mut self, entry: &AuditEntry) -> Result<AuditEvent> {
        // event_id derived deterministically from chain state + payload +
        // seq. No RNG anywhere in the audit path, so replaying the same
        // entries yields the same ids.
        let event_id = derive_event_id(self.last_hash.as_deref(), entry, self.seq)?;
        self.seq += 1;

        let mut ev = AuditEvent {
            event_id,
            entity: entry.entity,
            entity_id: entry.entity_id,
            action: entry.action,
            actor_id: entry.actor_id,
            old: entry.old.clone(),
            new: entry.new.clone(),
            ts_utc: entry.ts_utc,
            hash_prev: None,
            hash_self: None,
        };

        if self.hash_chain {
            ev.hash_prev = self.last_hash.clone();

            let self_hash = compute_event_hash(&ev)?;
            ev.hash_self = Some(self_hash.clone());
            self.last_hash = Some(self_hash);
        }

        let line = canonical_json_line(&ev)?;
        append_line(&self.path, &line)?;

        Ok(ev)
    }
}

/// Write a single line to file (with trailing newline).
fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open audit log {:?}", path))?;
    f.write_all(line.as_bytes())
        .context("write audit line failed")?;
    f.write_all(b"\n").context("write newline failed")?;
    Ok(())
}

/// Canonicalize by sorting keys recursively and emitting compact JSON.
/// One event == one JSON line.
pub fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize audit event failed")?;
    let sorted = sort_keys(&raw);
    serde_json::to_string(&sorted).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Deterministic event id: uuid v5 over chain head + sequence + canonical
/// entry payload.
fn derive_event_id(last_hash: Option<&str>, entry: &AuditEntry, seq: u64) -> Result<Uuid> {
    let payload = canonical_json_line(entry)?;
    let material = format!("{}|{}|{}", last_hash.unwrap_or(""), seq, payload);
    Ok(Uuid::new_v5(&Uuid::NAMESPACE_OID, material.as_bytes()))
}

/// Hash chain is computed from canonical JSON of the event WITHOUT
/// hash_self (to avoid self-reference).
pub fn compute_event_hash(ev: &AuditEvent) -> Result<String> {
    let mut clone = ev.clone();
    clone.hash_self = None;

    let canonical = canonical_json_line(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Verify the hash chain integrity of an audit log file.
pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read audit log {:?}", path.as_ref()))?;
    verify_hash_chain_str(&content)
}

/// Verify the hash chain integrity of an audit log string (JSONL content).
///
/// Same logic as [`verify_hash_chain`] but operates on an in-memory `&str`;
/// useful for tests and for verifying exports before they leave the box.
pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;
    let mut line_count = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let ev: AuditEvent = serde_json::from_str(trimmed)
            .with_context(|| format!("parse audit event at line {}", i + 1))?;

        line_count += 1;

        // 1. hash_prev must match the previous event's hash_self.
        if ev.hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, ev.hash_prev
                ),
            });
        }

        // 2. hash_self must be correct for this event's content.
        if let Some(ref claimed_hash) = ev.hash_self {
            let recomputed = compute_event_hash(&ev)?;
            if *claimed_hash != recomputed {
                return Ok(VerifyResult::Broken {
                    line: i + 1,
                    reason: format!(
                        "hash_self mismatch: claimed {}, recomputed {}",
                        claimed_hash, recomputed
                    ),
                });
            }
        }

        prev_hash = ev.hash_self.clone();
    }

    Ok(VerifyResult::Valid { lines: line_count })
}

/// Result of hash chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    /// The entire chain is valid.
    Valid { lines: usize },
    /// The chain is broken at the given line.
    Broken { line: usize, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn entry(entity_id: i64, action: AuditAction) -> AuditEntry {
        AuditEntry {
            entity: AuditEntity::Order,
            entity_id,
            action,
            actor_id: Some(10),
            old: None,
            new: Some(json!({ "status": "REQUESTED", "version": 0 })),
            ts_utc: Utc.with_ymd_and_hms(2026, 6, 10, 12, 0, 0).unwrap(),
        }
    }

    fn temp_log() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        (dir, path)
    }

    #[test]
    fn chained_log_verifies_clean() {
        let (_dir, path) = temp_log();
        let mut w = AuditWriter::new(&path, true).unwrap();
        w.append(&entry(1, AuditAction::Created)).unwrap();
        w.append(&entry(1, AuditAction::StatusChange)).unwrap();
        w.append(&entry(1, AuditAction::PaymentCaptured)).unwrap();

        assert_eq!(
            verify_hash_chain(&path).unwrap(),
            VerifyResult::Valid { lines: 3 }
        );
    }

    #[test]
    fn tampered_line_breaks_the_chain() {
        let (_dir, path) = temp_log();
        let mut w = AuditWriter::new(&path, true).unwrap();
        w.append(&entry(1, AuditAction::Created)).unwrap();
        w.append(&entry(1, AuditAction::StatusChange)).unwrap();

        let tampered = fs::read_to_string(&path)
            .unwrap()
            .replace("\"STATUS_CHANGE\"", "\"PAYMENT_REFUNDED\"");
        match verify_hash_chain_str(&tampered).unwrap() {
            VerifyResult::Broken { line, .. } => assert_eq!(line, 2),
            other => panic!("tampering must be detected, got {other:?}"),
        }
    }

    #[test]
    fn dropped_line_breaks_the_chain() {
        let (_dir, path) = temp_log();
        let mut w = AuditWriter::new(&path, true).unwrap();
        w.append(&entry(1, AuditAction::Created)).unwrap();
        w.append(&entry(1, AuditAction::StatusChange)).unwrap();
        w.append(&entry(1, AuditAction::PaymentCaptured)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let without_middle: Vec<&str> = content
            .lines()
            .enumerate()
            .filter(|(i, _)| *i != 1)
            .map(|(_, l)| l)
            .collect();
        match verify_hash_chain_str(&without_middle.join("\n")).unwrap() {
            VerifyResult::Broken { line, .. } => assert_eq!(line, 2),
            other => panic!("gap must be detected, got {other:?}"),
        }
    }

    #[test]
    fn event_ids_are_deterministic_across_replays() {
        let (_dir, path_a) = temp_log();
        let (_dir2, path_b) = temp_log();
        let mut a = AuditWriter::new(&path_a, true).unwrap();
        let mut b = AuditWriter::new(&path_b, true).unwrap();

        let ev_a = a.append(&entry(1, AuditAction::Created)).unwrap();
        let ev_b = b.append(&entry(1, AuditAction::Created)).unwrap();
        assert_eq!(ev_a.event_id, ev_b.event_id);

        // A different position in the chain yields a different id.
        let ev_a2 = a.append(&entry(1, AuditAction::Created)).unwrap();
        assert_ne!(ev_a.event_id, ev_a2.event_id);
    }

    #[test]
    fn unchained_log_still_verifies_line_count() {
        let (_dir, path) = temp_log();
        let mut w = AuditWriter::new(&path, false).unwrap();
        w.append(&entry(1, AuditAction::Created)).unwrap();
        w.append(&entry(2, AuditAction::Created)).unwrap();

        assert_eq!(
            verify_hash_chain(&path).unwrap(),
            VerifyResult::Valid { lines: 2 }
        );
    }

    #[test]
    fn resume_continues_the_chain() {
        let (_dir, path) = temp_log();
        let mut w = AuditWriter::new(&path, true).unwrap();
        w.append(&entry(1, AuditAction::Created)).unwrap();
        let head = w.last_hash();
        let seq = w.seq();
        drop(w);

        let mut resumed = AuditWriter::new(&path, true).unwrap();
        resumed.set_last_hash(head);
        resumed.set_seq(seq);
        resumed.append(&entry(1, AuditAction::StatusChange)).unwrap();

        assert_eq!(
            verify_hash_chain(&path).unwrap(),
            VerifyResult::Valid { lines: 2 }
        );
    }
}
