//! Append-only audit trail
//!
//! Every state-changing action is recorded here. Entries are hash-chained
//! with blake3 so the trail is tamper-evident. Whether a sink failure
//! aborts the triggering business operation is an explicit configuration
//! choice, not an inherited accident.

use crate::error::{CbamError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    /// Monotonic sequence within this trail
    pub seq: u64,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub details: serde_json::Value,
    /// Hash of the previous entry in the chain
    pub prev_hash: String,
    /// blake3 over prev_hash + this entry's payload
    pub hash: String,
}

/// Durability policy for audit writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditMode {
    /// Sink failure aborts the triggering business operation.
    Transactional,
    /// Sink failure is logged to the operational channel and the business
    /// operation proceeds. Matches the source system's behavior.
    BestEffort,
}

/// Destination for audit entries. Append-only; nothing here updates or
/// deletes.
pub trait AuditSink: Send + Sync {
    fn append(&self, entry: AuditEntry) -> Result<()>;
    fn entries_for(&self, entity_type: &str, entity_id: &str) -> Vec<AuditEntry>;
    fn all(&self) -> Vec<AuditEntry>;
}

/// In-memory sink.
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, entry: AuditEntry) -> Result<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn entries_for(&self, entity_type: &str, entity_id: &str) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .cloned()
            .collect()
    }

    fn all(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }
}

/// The recorder every component writes through.
pub struct AuditTrail {
    sink: Arc<dyn AuditSink>,
    mode: AuditMode,
    seq: AtomicU64,
    last_hash: Mutex<String>,
}

const GENESIS_HASH: &str = "blake3:genesis";

impl AuditTrail {
    pub fn new(sink: Arc<dyn AuditSink>, mode: AuditMode) -> Self {
        Self {
            sink,
            mode,
            seq: AtomicU64::new(0),
            last_hash: Mutex::new(GENESIS_HASH.to_string()),
        }
    }

    pub fn in_memory(mode: AuditMode) -> Self {
        Self::new(Arc::new(MemoryAuditSink::new()), mode)
    }

    pub fn mode(&self) -> AuditMode {
        self.mode
    }

    /// Record one state-changing action. In best-effort mode a sink
    /// failure is logged and swallowed; in transactional mode it
    /// propagates as `AUDIT/`.
    pub fn record(
        &self,
        entity_type: &str,
        entity_id: &str,
        action: &str,
        actor: &str,
        details: serde_json::Value,
    ) -> Result<String> {
        let mut last = self.last_hash.lock().unwrap();
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let timestamp = Utc::now();
        let payload = format!(
            "{}|{}|{}|{}|{}|{}|{}",
            last, seq, entity_type, entity_id, action, actor, details
        );
        let hash = format!("blake3:{}", blake3::hash(payload.as_bytes()));

        let entry = AuditEntry {
            id: uuid::Uuid::new_v4().to_string(),
            seq,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            action: action.to_string(),
            actor: actor.to_string(),
            timestamp,
            details,
            prev_hash: last.clone(),
            hash: hash.clone(),
        };
        let entry_id = entry.id.clone();

        match self.sink.append(entry) {
            Ok(()) => {
                *last = hash;
                Ok(entry_id)
            }
            Err(err) => match self.mode {
                AuditMode::Transactional => Err(CbamError::Audit(err.to_string())),
                AuditMode::BestEffort => {
                    tracing::error!(
                        entity_type,
                        entity_id,
                        action,
                        error = %err,
                        "audit write failed; continuing per best-effort policy"
                    );
                    *last = hash;
                    Ok(entry_id)
                }
            },
        }
    }

    /// Ordered trail for one entity.
    pub fn trail(&self, entity_type: &str, entity_id: &str) -> Vec<AuditEntry> {
        let mut entries = self.sink.entries_for(entity_type, entity_id);
        entries.sort_by_key(|e| e.seq);
        entries
    }

    /// Verify the full hash chain links up.
    pub fn chain_ok(&self) -> bool {
        let mut entries = self.sink.all();
        entries.sort_by_key(|e| e.seq);
        let mut prev = GENESIS_HASH.to_string();
        for entry in entries {
            if entry.prev_hash != prev {
                return false;
            }
            let payload = format!(
                "{}|{}|{}|{}|{}|{}|{}",
                entry.prev_hash,
                entry.seq,
                entry.entity_type,
                entry.entity_id,
                entry.action,
                entry.actor,
                entry.details
            );
            if entry.hash != format!("blake3:{}", blake3::hash(payload.as_bytes())) {
                return false;
            }
            prev = entry.hash;
        }
        true
    }

    pub fn stats(&self) -> AuditStats {
        let entries = self.sink.all();
        let total = entries.len();
        let mut by_entity: std::collections::BTreeMap<String, usize> = Default::default();
        for entry in &entries {
            *by_entity.entry(entry.entity_type.clone()).or_insert(0) += 1;
        }
        AuditStats { total, by_entity }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditStats {
    pub total: usize,
    pub by_entity: std::collections::BTreeMap<String, usize>,
}
