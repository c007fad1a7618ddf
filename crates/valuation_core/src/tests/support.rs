//! In-memory transport for engine tests.

use std::{collections::VecDeque, sync::Mutex as StdMutex};

use async_trait::async_trait;
use shared::{
    domain::InviteToken,
    protocol::{FieldCommitPayload, UploadBatch},
};
use tokio::sync::oneshot;

use crate::{
    error::TransportError,
    transport::{ProgressSender, ValuationTransport},
};

pub(crate) struct PendingUpload {
    pub progress: ProgressSender,
    pub reply: oneshot::Sender<Result<usize, TransportError>>,
}

/// Records every call. In auto mode calls resolve immediately with the
/// configured outcome; in manual mode each call parks until the test
/// resolves it, in any order.
pub(crate) struct FakeTransport {
    manual: bool,
    commit_failure: StdMutex<Option<TransportError>>,
    upload_failure: StdMutex<Option<TransportError>>,
    commits: StdMutex<Vec<(InviteToken, FieldCommitPayload)>>,
    uploads: StdMutex<Vec<(InviteToken, UploadBatch)>>,
    parked_commits: StdMutex<Vec<Option<oneshot::Sender<Result<(), TransportError>>>>>,
    parked_uploads: StdMutex<VecDeque<PendingUpload>>,
}

impl FakeTransport {
    pub fn auto() -> Self {
        Self::build(false)
    }

    pub fn manual() -> Self {
        Self::build(true)
    }

    fn build(manual: bool) -> Self {
        Self {
            manual,
            commit_failure: StdMutex::new(None),
            upload_failure: StdMutex::new(None),
            commits: StdMutex::new(Vec::new()),
            uploads: StdMutex::new(Vec::new()),
            parked_commits: StdMutex::new(Vec::new()),
            parked_uploads: StdMutex::new(VecDeque::new()),
        }
    }

    pub fn fail_commits_with(&self, err: Option<TransportError>) {
        *self.commit_failure.lock().expect("lock") = err;
    }

    pub fn fail_uploads_with(&self, err: Option<TransportError>) {
        *self.upload_failure.lock().expect("lock") = err;
    }

    pub fn commits(&self) -> Vec<(InviteToken, FieldCommitPayload)> {
        self.commits.lock().expect("lock").clone()
    }

    pub fn uploads(&self) -> Vec<(InviteToken, UploadBatch)> {
        self.uploads.lock().expect("lock").clone()
    }

    /// Resolves the `index`-th parked commit (in dispatch order).
    pub fn resolve_commit(&self, index: usize, result: Result<(), TransportError>) {
        let reply = self.parked_commits.lock().expect("lock")[index]
            .take()
            .expect("commit already resolved");
        let _ = reply.send(result);
    }

    pub fn take_upload(&self) -> PendingUpload {
        self.parked_uploads
            .lock()
            .expect("lock")
            .pop_front()
            .expect("no parked upload")
    }
}

#[async_trait]
impl ValuationTransport for FakeTransport {
    async fn submit_field_commit(
        &self,
        token: &InviteToken,
        payload: &FieldCommitPayload,
    ) -> Result<(), TransportError> {
        self.commits
            .lock()
            .expect("lock")
            .push((token.clone(), payload.clone()));
        if !self.manual {
            return match self.commit_failure.lock().expect("lock").clone() {
                Some(err) => Err(err),
                None => Ok(()),
            };
        }
        let (tx, rx) = oneshot::channel();
        self.parked_commits.lock().expect("lock").push(Some(tx));
        rx.await
            .unwrap_or_else(|_| Err(TransportError::Network("test dropped reply".into())))
    }

    async fn upload_files(
        &self,
        token: &InviteToken,
        batch: &UploadBatch,
        progress: ProgressSender,
    ) -> Result<usize, TransportError> {
        self.uploads
            .lock()
            .expect("lock")
            .push((token.clone(), batch.clone()));
        if !self.manual {
            return match self.upload_failure.lock().expect("lock").clone() {
                Some(err) => Err(err),
                None => {
                    let _ = progress.send(50);
                    Ok(batch.len())
                }
            };
        }
        let (tx, rx) = oneshot::channel();
        self.parked_uploads
            .lock()
            .expect("lock")
            .push_back(PendingUpload { progress, reply: tx });
        rx.await
            .unwrap_or_else(|_| Err(TransportError::Network("test dropped reply".into())))
    }
}
