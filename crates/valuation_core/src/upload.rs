//! Attachment upload lifecycle of a single row.
//!
//! Independent of the field-commit machine: a row may be saving and
//! uploading at the same time. Batches dispatch immediately on selection,
//! are never retried automatically, and stay attached to the row on failure.

use std::sync::Arc;

use shared::{domain::InviteToken, protocol::UploadBatch};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    events::{SaveSource, ValuationEvent},
    row::{RowCell, RowContext},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadStatus {
    #[default]
    Idle,
    Uploading,
    Uploaded,
    Error,
}

impl UploadStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Uploading => "uploading",
            Self::Uploaded => "uploaded",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadResolution {
    Uploaded(usize),
    Failed(String),
    /// A newer selection replaced this batch, but the server stored it.
    Superseded(usize),
    Stale,
}

#[derive(Debug, Default)]
pub struct UploadStateMachine {
    status: UploadStatus,
    progress: u8,
    message: Option<String>,
    pending: Option<Arc<UploadBatch>>,
    seq: u64,
}

impl UploadStateMachine {
    pub fn status(&self) -> UploadStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn pending_batch(&self) -> Option<&Arc<UploadBatch>> {
        self.pending.as_ref()
    }

    /// Replaces any pending batch and enters `uploading`. Returns the
    /// batch's sequence number, or `None` for an empty selection.
    pub fn begin(&mut self, batch: Arc<UploadBatch>) -> Option<u64> {
        if batch.is_empty() {
            return None;
        }
        self.seq += 1;
        self.status = UploadStatus::Uploading;
        self.progress = 0;
        self.message = None;
        self.pending = Some(batch);
        Some(self.seq)
    }

    /// Takes the latest reported value as-is; reports may arrive out of
    /// order and are not forced to increase.
    pub fn record_progress(&mut self, seq: u64, percent: u8) -> bool {
        if seq != self.seq || self.status != UploadStatus::Uploading {
            return false;
        }
        self.progress = percent.min(100);
        true
    }

    /// Only the current batch moves the state. An older batch that still
    /// succeeded is reported as `Superseded` so dependents can refetch.
    pub fn resolve(&mut self, seq: u64, outcome: Result<usize, String>) -> UploadResolution {
        if seq != self.seq || self.status != UploadStatus::Uploading {
            return match outcome {
                Ok(count) if seq < self.seq => UploadResolution::Superseded(count),
                _ => UploadResolution::Stale,
            };
        }
        match outcome {
            Ok(count) => {
                self.status = UploadStatus::Uploaded;
                self.progress = 100;
                self.message = None;
                self.pending = None;
                UploadResolution::Uploaded(count)
            }
            Err(message) => {
                self.status = UploadStatus::Error;
                self.message = Some(message.clone());
                UploadResolution::Failed(message)
            }
        }
    }
}

/// Starts uploading `batch` for the row right away. Returns `false` when
/// the row is read-only, removed, or the selection is empty.
pub(crate) async fn select_files(ctx: &RowContext, row: &Arc<RowCell>, batch: UploadBatch) -> bool {
    let srd_id = row.srd_id;
    if ctx.is_closed() {
        return false;
    }
    let batch = Arc::new(batch);
    let (token, seq) = {
        let mut state = row.state.lock().await;
        let Some(token) = state.active_token().cloned() else {
            debug!(srd_id = srd_id.0, "upload: row is read-only, ignoring selection");
            return false;
        };
        let Some(seq) = state.upload.begin(Arc::clone(&batch)) else {
            debug!(srd_id = srd_id.0, "upload: empty selection");
            return false;
        };
        (token, seq)
    };

    info!(
        srd_id = srd_id.0,
        seq,
        files = batch.len(),
        kind = ?batch.kind,
        token = %token.redacted(),
        "upload: dispatching batch"
    );
    ctx.events.emit(ValuationEvent::UploadStatusChanged {
        srd_id,
        status: UploadStatus::Uploading,
        message: None,
    });

    tokio::spawn(run_upload(ctx.clone(), Arc::clone(row), token, seq, batch));
    true
}

async fn run_upload(
    ctx: RowContext,
    row: Arc<RowCell>,
    token: InviteToken,
    seq: u64,
    batch: Arc<UploadBatch>,
) {
    let srd_id = row.srd_id;
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let upload = ctx.transport.upload_files(&token, &batch, progress_tx);
    tokio::pin!(upload);

    let outcome = loop {
        tokio::select! {
            result = &mut upload => break result,
            Some(percent) = progress_rx.recv() => {
                let mut state = row.state.lock().await;
                if !state.disposed && !ctx.is_closed() && state.upload.record_progress(seq, percent) {
                    drop(state);
                    ctx.events.emit(ValuationEvent::UploadProgress { srd_id, progress: percent.min(100) });
                }
            }
        }
    };

    let resolution = {
        let mut state = row.state.lock().await;
        if state.disposed || ctx.is_closed() {
            debug!(srd_id = srd_id.0, seq, "upload: discarding response for removed row");
            return;
        }
        state.upload.resolve(seq, outcome.map_err(|err| err.to_string()))
    };

    match resolution {
        UploadResolution::Stale => {
            debug!(srd_id = srd_id.0, seq, "upload: discarding stale response");
        }
        UploadResolution::Superseded(count) => {
            info!(srd_id = srd_id.0, seq, uploaded = count, "upload: replaced batch was stored");
            ctx.events.notify_saved(srd_id, SaveSource::Upload);
        }
        UploadResolution::Uploaded(count) => {
            info!(srd_id = srd_id.0, seq, uploaded = count, "upload: batch stored");
            ctx.events.emit(ValuationEvent::UploadProgress { srd_id, progress: 100 });
            ctx.events.emit(ValuationEvent::UploadStatusChanged {
                srd_id,
                status: UploadStatus::Uploaded,
                message: None,
            });
            ctx.events.notify_saved(srd_id, SaveSource::Upload);
        }
        UploadResolution::Failed(message) => {
            warn!(srd_id = srd_id.0, seq, error = %message, "upload: batch failed");
            ctx.events.emit(ValuationEvent::UploadStatusChanged {
                srd_id,
                status: UploadStatus::Error,
                message: Some(message),
            });
        }
    }
}

#[cfg(test)]
#[path = "tests/upload_tests.rs"]
mod tests;
