use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};
use shared::{
    domain::{AttachmentKind, CurrencyField, InviteToken, SrdId},
    protocol::{ExternalRow, FieldCommitPayload},
};
use tokio::sync::Mutex;

use crate::{
    debounce::CommitScheduler,
    events::EventSink,
    format::FieldDraft,
    save::{RowSaveStateMachine, SaveStatus},
    transport::ValuationTransport,
    upload::{UploadStateMachine, UploadStatus},
};

/// Collaborators every row task needs; cheap to clone into spawned tasks.
#[derive(Clone)]
pub(crate) struct RowContext {
    pub transport: Arc<dyn ValuationTransport>,
    pub scheduler: Arc<dyn CommitScheduler>,
    pub events: EventSink,
    /// Set when the owning controller shuts down or is dropped.
    pub closed: Arc<AtomicBool>,
}

impl RowContext {
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFields {
    pub as_is: FieldDraft,
    pub arv: FieldDraft,
    pub rehab: FieldDraft,
    pub notes: String,
}

impl RowFields {
    fn from_external(row: &ExternalRow) -> Self {
        Self {
            as_is: FieldDraft::from_value(row.as_is_value),
            arv: FieldDraft::from_value(row.arv_value),
            rehab: FieldDraft::from_value(row.rehab_estimate),
            notes: row.notes.clone().unwrap_or_default(),
        }
    }

    pub fn field(&self, field: CurrencyField) -> &FieldDraft {
        match field {
            CurrencyField::AsIs => &self.as_is,
            CurrencyField::Arv => &self.arv,
            CurrencyField::Rehab => &self.rehab,
        }
    }

    fn field_mut(&mut self, field: CurrencyField) -> &mut FieldDraft {
        match field {
            CurrencyField::AsIs => &mut self.as_is,
            CurrencyField::Arv => &mut self.arv,
            CurrencyField::Rehab => &mut self.rehab,
        }
    }

    pub fn to_payload(&self) -> FieldCommitPayload {
        FieldCommitPayload {
            as_is_value: self.as_is.value,
            arv_value: self.arv.value,
            rehab_estimate: self.rehab.value,
            notes: (!self.notes.is_empty()).then(|| self.notes.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingUploadSummary {
    pub kind: AttachmentKind,
    pub file_count: usize,
    pub total_bytes: u64,
}

/// Point-in-time view of one row for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSnapshot {
    pub srd_id: SrdId,
    pub address: String,
    pub links: Vec<String>,
    pub read_only: bool,
    pub fields: RowFields,
    pub save_status: SaveStatus,
    pub save_message: Option<String>,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub commit_pending: bool,
    pub upload_status: UploadStatus,
    pub upload_progress: u8,
    pub upload_message: Option<String>,
    pub pending_upload: Option<PendingUploadSummary>,
}

pub(crate) struct RowState {
    pub token: Option<InviteToken>,
    pub address: String,
    pub links: Vec<String>,
    pub fields: RowFields,
    pub save: RowSaveStateMachine,
    pub upload: UploadStateMachine,
    /// Set once the row leaves the collection; late responses are dropped.
    pub disposed: bool,
}

impl RowState {
    /// Token to act with, if the row may still be mutated.
    pub fn active_token(&self) -> Option<&InviteToken> {
        if self.disposed {
            None
        } else {
            self.token.as_ref()
        }
    }
}

pub(crate) struct RowCell {
    pub srd_id: SrdId,
    pub state: Mutex<RowState>,
}

impl RowCell {
    pub fn from_external(row: &ExternalRow) -> Arc<Self> {
        Arc::new(Self {
            srd_id: row.srd_id,
            state: Mutex::new(RowState {
                token: row.invite_token.clone(),
                address: row.address.clone(),
                links: row.links.clone(),
                fields: RowFields::from_external(row),
                save: RowSaveStateMachine::default(),
                upload: UploadStateMachine::default(),
                disposed: false,
            }),
        })
    }

    /// Picks up new read-only attributes; fields and lifecycle state stay.
    /// Returns whether the row just lost its token.
    pub async fn refresh_external(&self, row: &ExternalRow) -> bool {
        let mut state = self.state.lock().await;
        let revoked = state.token.is_some() && row.invite_token.is_none();
        state.token = row.invite_token.clone();
        state.address = row.address.clone();
        state.links = row.links.clone();
        revoked
    }

    pub async fn dispose(&self) {
        self.state.lock().await.disposed = true;
    }

    pub async fn edit_currency(&self, field: CurrencyField, raw: &str) -> bool {
        let mut state = self.state.lock().await;
        if state.active_token().is_none() {
            return false;
        }
        *state.fields.field_mut(field) = FieldDraft::from_input(raw);
        true
    }

    pub async fn edit_notes(&self, text: &str) -> bool {
        let mut state = self.state.lock().await;
        if state.active_token().is_none() {
            return false;
        }
        state.fields.notes = text.to_string();
        true
    }

    pub async fn snapshot(&self, commit_pending: bool) -> RowSnapshot {
        let state = self.state.lock().await;
        RowSnapshot {
            srd_id: self.srd_id,
            address: state.address.clone(),
            links: state.links.clone(),
            read_only: state.token.is_none(),
            fields: state.fields.clone(),
            save_status: state.save.status(),
            save_message: state.save.message().map(str::to_string),
            last_saved_at: state.save.last_saved_at(),
            commit_pending,
            upload_status: state.upload.status(),
            upload_progress: state.upload.progress(),
            upload_message: state.upload.message().map(str::to_string),
            pending_upload: state.upload.pending_batch().map(|batch| PendingUploadSummary {
                kind: batch.kind,
                file_count: batch.len(),
                total_bytes: batch.total_bytes(),
            }),
        }
    }
}
