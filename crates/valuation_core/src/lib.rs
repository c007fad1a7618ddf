//! Per-row autosave and attachment upload engine for multi-row valuation
//! entry. Each row commits its fields after a quiet period and uploads file
//! batches on selection, authorized by its own invite token.

pub mod collection;
pub mod config;
pub mod debounce;
pub mod error;
pub mod events;
pub mod format;
mod row;
pub mod save;
pub mod transport;
pub mod upload;

pub use collection::{ResizeReport, RowCollectionController};
pub use debounce::{CommitScheduler, DebounceScheduler, COMMIT_QUIET_PERIOD};
pub use error::TransportError;
pub use events::{SaveSource, ValuationEvent};
pub use row::{PendingUploadSummary, RowFields, RowSnapshot};
pub use save::SaveStatus;
pub use transport::{HttpValuationTransport, ValuationTransport};
pub use upload::UploadStatus;

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
