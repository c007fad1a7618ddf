//! Keyed collection of row machines behind the multi-row entry form.
//!
//! Rows are addressed by their stable `SrdId`, never by position, so a
//! reload that inserts or removes rows leaves every surviving row's pending
//! timer and in-flight work attached to the right record. None of the
//! operations here fail; per-row problems stay inside that row.

use std::{
    collections::{HashMap, HashSet},
    sync::{atomic::AtomicBool, Arc},
};

use shared::{
    domain::{CurrencyField, SrdId},
    protocol::{ExternalRow, UploadBatch},
};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::{
    debounce::{CommitScheduler, DebounceScheduler},
    events::{EventSink, ValuationEvent},
    row::{RowCell, RowContext, RowSnapshot},
    save,
    transport::ValuationTransport,
    upload,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResizeReport {
    pub added: usize,
    pub removed: usize,
    pub retained: usize,
}

#[derive(Default)]
struct RowTable {
    order: Vec<SrdId>,
    cells: HashMap<SrdId, Arc<RowCell>>,
}

pub struct RowCollectionController {
    ctx: RowContext,
    table: RwLock<RowTable>,
}

impl RowCollectionController {
    pub fn new(transport: Arc<dyn ValuationTransport>) -> Self {
        Self::with_scheduler(transport, Arc::new(DebounceScheduler::new()))
    }

    pub fn with_scheduler(
        transport: Arc<dyn ValuationTransport>,
        scheduler: Arc<dyn CommitScheduler>,
    ) -> Self {
        Self {
            ctx: RowContext {
                transport,
                scheduler,
                events: EventSink::new(),
                closed: Arc::new(AtomicBool::new(false)),
            },
            table: RwLock::new(RowTable::default()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ValuationEvent> {
        self.ctx.events.subscribe()
    }

    /// Reconciles the collection with a freshly received external row list.
    pub async fn resize(&self, rows: Vec<ExternalRow>) -> ResizeReport {
        let mut report = ResizeReport::default();
        let mut table = self.table.write().await;

        let mut seen = HashSet::with_capacity(rows.len());
        let mut order = Vec::with_capacity(rows.len());
        let mut cells = HashMap::with_capacity(rows.len());

        for row in rows {
            if !seen.insert(row.srd_id) {
                warn!(srd_id = row.srd_id.0, "collection: duplicate row key, keeping first");
                continue;
            }
            let cell = match table.cells.remove(&row.srd_id) {
                Some(cell) => {
                    if cell.refresh_external(&row).await {
                        info!(srd_id = row.srd_id.0, "collection: row token revoked");
                        self.ctx.scheduler.cancel(row.srd_id).await;
                    }
                    report.retained += 1;
                    cell
                }
                None => {
                    report.added += 1;
                    RowCell::from_external(&row)
                }
            };
            order.push(row.srd_id);
            cells.insert(row.srd_id, cell);
        }

        for (srd_id, cell) in table.cells.drain() {
            let cancelled = self.ctx.scheduler.cancel(srd_id).await;
            cell.dispose().await;
            debug!(srd_id = srd_id.0, cancelled_pending_commit = cancelled, "collection: row removed");
            report.removed += 1;
        }

        table.order = order;
        table.cells = cells;
        info!(
            added = report.added,
            removed = report.removed,
            retained = report.retained,
            "collection: resized"
        );
        report
    }

    /// Applies a keystroke to a currency field and re-arms the row's commit.
    pub async fn edit_currency(&self, srd_id: SrdId, field: CurrencyField, raw: &str) -> bool {
        let Some(cell) = self.cell(srd_id).await else {
            return false;
        };
        if !cell.edit_currency(field, raw).await {
            debug!(srd_id = srd_id.0, field = field.label(), "collection: edit on read-only row ignored");
            return false;
        }
        save::schedule_commit(&self.ctx, &cell).await
    }

    pub async fn edit_notes(&self, srd_id: SrdId, text: &str) -> bool {
        let Some(cell) = self.cell(srd_id).await else {
            return false;
        };
        if !cell.edit_notes(text).await {
            debug!(srd_id = srd_id.0, "collection: notes edit on read-only row ignored");
            return false;
        }
        save::schedule_commit(&self.ctx, &cell).await
    }

    pub async fn select_files(&self, srd_id: SrdId, batch: UploadBatch) -> bool {
        let Some(cell) = self.cell(srd_id).await else {
            return false;
        };
        upload::select_files(&self.ctx, &cell, batch).await
    }

    pub async fn snapshot(&self, srd_id: SrdId) -> Option<RowSnapshot> {
        let cell = self.cell(srd_id).await?;
        let pending = self.ctx.scheduler.is_pending(srd_id).await;
        Some(cell.snapshot(pending).await)
    }

    /// Snapshots in the order of the last external row list.
    pub async fn snapshots(&self) -> Vec<RowSnapshot> {
        let cells: Vec<Arc<RowCell>> = {
            let table = self.table.read().await;
            table
                .order
                .iter()
                .filter_map(|srd_id| table.cells.get(srd_id).cloned())
                .collect()
        };
        let mut out = Vec::with_capacity(cells.len());
        for cell in cells {
            let pending = self.ctx.scheduler.is_pending(cell.srd_id).await;
            out.push(cell.snapshot(pending).await);
        }
        out
    }

    pub async fn row_keys(&self) -> Vec<SrdId> {
        self.table.read().await.order.clone()
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Disposes every row and drops all pending commits. In-flight calls
    /// run to completion but their results are ignored.
    pub async fn shutdown(&self) -> usize {
        self.ctx.close();
        let cells: Vec<Arc<RowCell>> = {
            let mut table = self.table.write().await;
            table.order.clear();
            table.cells.drain().map(|(_, cell)| cell).collect()
        };
        for cell in &cells {
            cell.dispose().await;
        }
        let cancelled = self.ctx.scheduler.cancel_all().await;
        info!(rows = cells.len(), cancelled, "collection: shut down");
        cancelled
    }

    async fn cell(&self, srd_id: SrdId) -> Option<Arc<RowCell>> {
        let cell = self.table.read().await.cells.get(&srd_id).cloned();
        if cell.is_none() {
            debug!(srd_id = srd_id.0, "collection: unknown row");
        }
        cell
    }
}

impl Drop for RowCollectionController {
    fn drop(&mut self) {
        // Timers armed before the drop still fire; they see the flag and
        // send nothing.
        self.ctx.close();
    }
}

#[cfg(test)]
#[path = "tests/collection_tests.rs"]
mod tests;
