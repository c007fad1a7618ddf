//! Notifications fanned out to the embedding page.

use shared::domain::SrdId;
use tokio::sync::broadcast;
use tracing::info;

use crate::{save::SaveStatus, upload::UploadStatus};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveSource {
    Fields,
    Upload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValuationEvent {
    SaveStatusChanged {
        srd_id: SrdId,
        status: SaveStatus,
        message: Option<String>,
    },
    UploadStatusChanged {
        srd_id: SrdId,
        status: UploadStatus,
        message: Option<String>,
    },
    UploadProgress {
        srd_id: SrdId,
        progress: u8,
    },
    /// Row data changed on the server; dependent views should refetch.
    Saved { srd_id: SrdId, source: SaveSource },
}

#[derive(Clone)]
pub(crate) struct EventSink {
    tx: broadcast::Sender<ValuationEvent>,
}

impl EventSink {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ValuationEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: ValuationEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    pub(crate) fn notify_saved(&self, srd_id: SrdId, source: SaveSource) {
        info!(srd_id = srd_id.0, source = ?source, "row saved");
        self.emit(ValuationEvent::Saved { srd_id, source });
    }
}
