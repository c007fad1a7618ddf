use serde::{Deserialize, Serialize};

use crate::domain::{AttachmentKind, InviteToken, SrdId};

/// One row of the externally supplied valuation list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalRow {
    pub srd_id: SrdId,
    #[serde(default)]
    pub invite_token: Option<InviteToken>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub as_is_value: Option<u64>,
    #[serde(default)]
    pub arv_value: Option<u64>,
    #[serde(default)]
    pub rehab_estimate: Option<u64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub links: Vec<String>,
}

/// Full-state write of a row's valuation fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCommitPayload {
    pub as_is_value: Option<u64>,
    pub arv_value: Option<u64>,
    pub rehab_estimate: Option<u64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub uploaded: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Files picked in one selection for one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadBatch {
    pub kind: AttachmentKind,
    pub files: Vec<UploadFile>,
}

impl UploadBatch {
    pub fn new(kind: AttachmentKind, files: Vec<UploadFile>) -> Self {
        Self { kind, files }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(UploadFile::size_bytes).sum()
    }
}
