//! Persistent, capped, newest-first log of diagnosis records.
//!
//! The whole log lives under one key as a JSON array. The shell's key-value
//! capability does the I/O; this module interprets what was read and builds
//! what gets written. `HistoryQueue` keeps reads and writes of that key from
//! interleaving.

use std::collections::VecDeque;
use thiserror::Error;
use tracing::{info, warn};

use crate::capabilities::{check_value_size, KeyNamespace, KvError, KvKey};
use crate::config::{AppConfig, ConfigError};
use crate::model::{DiagnosisRecord, HistoryLog, RecordId};
use crate::{DEFAULT_HISTORY_CAP, DEFAULT_HISTORY_KEY};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("history storage unavailable: {0}")]
    StorageUnavailable(KvError),

    #[error("failed to persist history: {0}")]
    StoragePersistFailure(KvError),

    #[error("record {0} is already in the history")]
    DuplicateId(RecordId),

    #[error("failed to encode history: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryStore {
    key: String,
    cap: usize,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self {
            key: format!("{}:{DEFAULT_HISTORY_KEY}", KeyNamespace::History.prefix()),
            cap: DEFAULT_HISTORY_CAP,
        }
    }
}

impl HistoryStore {
    /// A cap of zero is treated as one.
    pub fn new(key: &KvKey, cap: usize) -> Self {
        Self {
            key: key.raw(),
            cap: cap.max(1),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        if config.history_cap == 0 {
            return Err(ConfigError::InvalidCap);
        }
        Ok(Self::new(&config.history_kv_key()?, config.history_cap))
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Raw key handed to the key-value capability.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Interpret a read of the history key.
    ///
    /// Missing key and unparsable values both read as an empty log; an
    /// over-cap array keeps its newest `cap` records.
    pub fn decode(
        &self,
        stored: Result<Option<Vec<u8>>, KvError>,
    ) -> Result<HistoryLog, HistoryError> {
        let Some(bytes) = stored.map_err(HistoryError::StorageUnavailable)? else {
            return Ok(HistoryLog::new());
        };

        match serde_json::from_slice::<Vec<DiagnosisRecord>>(&bytes) {
            Ok(records) => {
                if records.len() > self.cap {
                    warn!(stored = records.len(), cap = self.cap, "truncating over-cap history");
                }
                Ok(HistoryLog::from_records(records, self.cap))
            }
            Err(e) => {
                warn!(size = bytes.len(), "discarding unreadable history: {}", e);
                Ok(HistoryLog::new())
            }
        }
    }

    /// Prepend `record` to the log just read and evict beyond the cap.
    /// Returns the new log and the bytes to write back.
    pub fn prepend(
        &self,
        mut log: HistoryLog,
        record: DiagnosisRecord,
    ) -> Result<(HistoryLog, Vec<u8>), HistoryError> {
        if log.contains(record.id()) {
            warn!(id = %record.id(), "rejecting duplicate record id");
            return Err(HistoryError::DuplicateId(record.id().clone()));
        }

        log.prepend(record, self.cap);
        let bytes = self.encode(&log)?;
        Ok((log, bytes))
    }

    pub fn encode(&self, log: &HistoryLog) -> Result<Vec<u8>, HistoryError> {
        let bytes = serde_json::to_vec(log).map_err(|e| HistoryError::Encode(e.to_string()))?;
        check_value_size(&bytes).map_err(HistoryError::StoragePersistFailure)?;
        Ok(bytes)
    }

    pub fn persisted(&self, written: Result<(), KvError>) -> Result<(), HistoryError> {
        written.map_err(HistoryError::StoragePersistFailure)
    }

    /// Idempotent. After a failure the stored state is unknown; reload it.
    pub fn cleared(&self, deleted: Result<(), KvError>) -> Result<(), HistoryError> {
        deleted.map_err(HistoryError::StoragePersistFailure)?;
        info!(key = %self.key, "history cleared");
        Ok(())
    }
}

/// One logical operation on the history key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryOp {
    /// Read and replace the browser's projection.
    Load,
    /// Read, prepend, write back.
    Append(DiagnosisRecord),
    Clear,
}

/// Runs history operations one at a time, in arrival order.
#[derive(Debug, Default)]
pub struct HistoryQueue {
    current: Option<HistoryOp>,
    pending: VecDeque<HistoryOp>,
}

impl HistoryQueue {
    /// Queue `op`. Returns it back when nothing is running, meaning the
    /// caller must start it now.
    pub fn push(&mut self, op: HistoryOp) -> Option<HistoryOp> {
        if self.current.is_none() {
            self.current = Some(op.clone());
            return Some(op);
        }
        if op == HistoryOp::Load && self.pending.back() == Some(&HistoryOp::Load) {
            return None;
        }
        self.pending.push_back(op);
        None
    }

    pub fn current(&self) -> Option<&HistoryOp> {
        self.current.as_ref()
    }

    /// Mark the running operation done and hand out the next one to start.
    pub fn finish(&mut self) -> Option<HistoryOp> {
        self.current = self.pending.pop_front();
        self.current.clone()
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    pub fn len(&self) -> usize {
        self.pending.len() + usize::from(self.current.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
