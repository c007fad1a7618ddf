//! Field-commit lifecycle of a single row.
//!
//! `idle -> saving -> {saved, error}`, re-entering `saving` on every fired
//! commit. Each dispatched commit carries a per-row sequence number and only
//! the resolution of the most recently dispatched one may move the state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use shared::protocol::FieldCommitPayload;
use tracing::{debug, info, warn};

use crate::{
    events::{SaveSource, ValuationEvent},
    row::{RowCell, RowContext},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    Error,
}

impl SaveStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Saving => "saving",
            Self::Saved => "saved",
            Self::Error => "error",
        }
    }
}

/// Snapshot of a row's fields taken when its debounce fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveTicket {
    pub seq: u64,
    pub payload: FieldCommitPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveResolution {
    Saved,
    Failed(String),
    /// A newer ticket was dispatched after this one.
    Stale,
}

#[derive(Debug, Default)]
pub struct RowSaveStateMachine {
    status: SaveStatus,
    message: Option<String>,
    last_dispatched_seq: u64,
    last_saved_at: Option<DateTime<Utc>>,
}

impl RowSaveStateMachine {
    pub fn status(&self) -> SaveStatus {
        self.status
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.last_saved_at
    }

    pub fn last_dispatched_seq(&self) -> u64 {
        self.last_dispatched_seq
    }

    pub fn begin_commit(&mut self, payload: FieldCommitPayload) -> SaveTicket {
        self.last_dispatched_seq += 1;
        self.status = SaveStatus::Saving;
        self.message = None;
        SaveTicket {
            seq: self.last_dispatched_seq,
            payload,
        }
    }

    /// Applies the outcome of ticket `seq`. Local field values are never
    /// touched here, so a failed save loses no edits.
    pub fn resolve(&mut self, seq: u64, outcome: Result<(), String>) -> SaveResolution {
        if seq != self.last_dispatched_seq {
            return SaveResolution::Stale;
        }
        match outcome {
            Ok(()) => {
                self.status = SaveStatus::Saved;
                self.message = None;
                self.last_saved_at = Some(Utc::now());
                SaveResolution::Saved
            }
            Err(message) => {
                self.status = SaveStatus::Error;
                self.message = Some(message.clone());
                SaveResolution::Failed(message)
            }
        }
    }
}

/// Re-arms the row's debounce. No-op for rows without a token.
pub(crate) async fn schedule_commit(ctx: &RowContext, row: &Arc<RowCell>) -> bool {
    if row.state.lock().await.active_token().is_none() {
        debug!(srd_id = row.srd_id.0, "save: row is read-only, not scheduling");
        return false;
    }

    let task_ctx = ctx.clone();
    let task_row = Arc::clone(row);
    ctx.scheduler
        .schedule(
            row.srd_id,
            Box::new(move || fire_commit(task_ctx, task_row).boxed()),
        )
        .await;
    true
}

/// Runs when the quiet period elapses: sends the row's current fields.
async fn fire_commit(ctx: RowContext, row: Arc<RowCell>) {
    let srd_id = row.srd_id;
    if ctx.is_closed() {
        debug!(srd_id = srd_id.0, "save: controller closed before commit fired");
        return;
    }
    let (token, ticket) = {
        let mut state = row.state.lock().await;
        let Some(token) = state.active_token().cloned() else {
            debug!(srd_id = srd_id.0, "save: row became read-only before commit fired");
            return;
        };
        let payload = state.fields.to_payload();
        (token, state.save.begin_commit(payload))
    };

    info!(
        srd_id = srd_id.0,
        seq = ticket.seq,
        token = %token.redacted(),
        "save: dispatching field commit"
    );
    ctx.events.emit(ValuationEvent::SaveStatusChanged {
        srd_id,
        status: SaveStatus::Saving,
        message: None,
    });

    let outcome = ctx
        .transport
        .submit_field_commit(&token, &ticket.payload)
        .await
        .map_err(|err| err.to_string());

    let resolution = {
        let mut state = row.state.lock().await;
        if state.disposed || ctx.is_closed() {
            debug!(srd_id = srd_id.0, seq = ticket.seq, "save: discarding response for removed row");
            return;
        }
        state.save.resolve(ticket.seq, outcome)
    };

    match resolution {
        SaveResolution::Stale => {
            debug!(srd_id = srd_id.0, seq = ticket.seq, "save: discarding stale response");
        }
        SaveResolution::Saved => {
            ctx.events.emit(ValuationEvent::SaveStatusChanged {
                srd_id,
                status: SaveStatus::Saved,
                message: None,
            });
            ctx.events.notify_saved(srd_id, SaveSource::Fields);
        }
        SaveResolution::Failed(message) => {
            warn!(srd_id = srd_id.0, seq = ticket.seq, error = %message, "save: field commit failed");
            ctx.events.emit(ValuationEvent::SaveStatusChanged {
                srd_id,
                status: SaveStatus::Error,
                message: Some(message),
            });
        }
    }
}

#[cfg(test)]
#[path = "tests/save_tests.rs"]
mod tests;
