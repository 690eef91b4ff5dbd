//! starkclaw-activity
//!
//! Append-only record of every policy-relevant event, correlated by
//! transaction hash. Records are held in memory behind a mutex (reads are
//! cheap clones) and written through to the secure store on every mutation,
//! keeping the most recent 50.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use starknet::core::types::Felt;

use starkclaw_core::constants::ACTIVITY_CAP;
use starkclaw_core::{CoreError, Timestamp};
use starkclaw_keystore::{namespace, SecureStore};

// ── Record model ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Onboarding,
    PolicyUpdated,
    TransferSubmitted,
    SwapSubmitted,
    SessionCreated,
    SessionRegistered,
    SessionRevoked,
    EmergencyRevoke,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Pending,
    Succeeded,
    Reverted,
    Unknown,
}

impl ActivityStatus {
    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActivityStatus::Succeeded | ActivityStatus::Reverted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub id: u64,
    pub created_at: Timestamp,
    pub kind: ActivityKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<Felt>,
    pub status: ActivityStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_action_id: Option<String>,
}

/// Fields a status-poll cycle may apply to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: ActivityStatus,
    pub execution_status: Option<String>,
    pub revert_reason: Option<String>,
}

// ── Log ──────────────────────────────────────────────────────────────────────

#[derive(Default, Serialize, Deserialize)]
struct Persisted {
    next_id: u64,
    records: Vec<ActivityRecord>,
}

pub struct ActivityLog {
    store: Arc<dyn SecureStore>,
    inner: Mutex<Persisted>,
}

impl ActivityLog {
    /// Load the persisted log (or start empty) from the secure store.
    pub fn open(store: Arc<dyn SecureStore>) -> Result<Self, CoreError> {
        let state = match store.get(namespace::ACTIVITY)? {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| CoreError::Internal(format!("activity log corrupt: {e}")))?,
            None => Persisted::default(),
        };
        Ok(Self { store, inner: Mutex::new(state) })
    }

    fn persist(&self, state: &Persisted) -> Result<(), CoreError> {
        let json = serde_json::to_string(state)
            .map_err(|e| CoreError::Internal(format!("activity log encode: {e}")))?;
        self.store.set(namespace::ACTIVITY, &json)
    }

    /// Append a new record, assigning the next monotonic id. Returns the
    /// stored record.
    pub fn append(&self, draft: ActivityDraft) -> Result<ActivityRecord, CoreError> {
        let mut state = self.inner.lock().map_err(|_| poisoned())?;
        state.next_id += 1;
        let record = ActivityRecord {
            id: state.next_id,
            created_at: starkclaw_core::unix_now(),
            kind: draft.kind,
            title: draft.title,
            subtitle: draft.subtitle,
            tx_hash: draft.tx_hash,
            status: draft.status,
            execution_status: None,
            revert_reason: None,
            signer_mode: draft.signer_mode,
            signer_request_id: draft.signer_request_id,
            mobile_action_id: draft.mobile_action_id,
        };
        state.records.push(record.clone());
        // Keep only the most recent records; order is append order.
        if state.records.len() > ACTIVITY_CAP {
            let drop = state.records.len() - ACTIVITY_CAP;
            state.records.drain(..drop);
        }
        self.persist(&state)?;
        Ok(record)
    }

    /// Apply a polling outcome to the record carrying `tx_hash`.
    ///
    /// Idempotent: re-applying the same terminal status is a no-op, and a
    /// terminal record never regresses to pending/unknown.
    pub fn update_by_tx_hash(
        &self,
        tx_hash: &Felt,
        update: StatusUpdate,
    ) -> Result<Option<ActivityRecord>, CoreError> {
        let mut state = self.inner.lock().map_err(|_| poisoned())?;
        let Some(record) = state
            .records
            .iter_mut()
            .find(|r| r.tx_hash.as_ref() == Some(tx_hash))
        else {
            return Ok(None);
        };

        if record.status.is_terminal() {
            return Ok(Some(record.clone()));
        }
        if record.status == update.status
            && record.execution_status == update.execution_status
            && record.revert_reason == update.revert_reason
        {
            return Ok(Some(record.clone()));
        }

        record.status = update.status;
        if update.execution_status.is_some() {
            record.execution_status = update.execution_status;
        }
        if update.revert_reason.is_some() {
            record.revert_reason = update.revert_reason;
        }
        let updated = record.clone();
        self.persist(&state)?;
        Ok(Some(updated))
    }

    /// All records, oldest first (append order).
    pub fn list(&self) -> Result<Vec<ActivityRecord>, CoreError> {
        let state = self.inner.lock().map_err(|_| poisoned())?;
        Ok(state.records.clone())
    }

    /// Records still pending with a transaction hash — the poller's work list.
    pub fn pending_with_tx_hash(&self) -> Result<Vec<ActivityRecord>, CoreError> {
        let state = self.inner.lock().map_err(|_| poisoned())?;
        Ok(state
            .records
            .iter()
            .filter(|r| r.status == ActivityStatus::Pending && r.tx_hash.is_some())
            .cloned()
            .collect())
    }
}

fn poisoned() -> CoreError {
    CoreError::Internal("activity log lock poisoned".into())
}

/// Input for `append`; ids and timestamps are assigned by the log.
#[derive(Debug, Clone)]
pub struct ActivityDraft {
    pub kind: ActivityKind,
    pub title: String,
    pub subtitle: Option<String>,
    pub tx_hash: Option<Felt>,
    pub status: ActivityStatus,
    pub signer_mode: Option<String>,
    pub signer_request_id: Option<String>,
    pub mobile_action_id: Option<String>,
}

impl ActivityDraft {
    pub fn new(kind: ActivityKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            subtitle: None,
            tx_hash: None,
            status: ActivityStatus::Pending,
            signer_mode: None,
            signer_request_id: None,
            mobile_action_id: None,
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn with_tx_hash(mut self, tx_hash: Felt) -> Self {
        self.tx_hash = Some(tx_hash);
        self
    }

    pub fn with_status(mut self, status: ActivityStatus) -> Self {
        self.status = status;
        self
    }
}
