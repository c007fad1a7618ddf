//! Token-addressed remote operations the engine depends on.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream;
use reqwest::{
    multipart::{Form, Part},
    Body, Client, Response,
};
use shared::{
    domain::InviteToken,
    error::ApiError,
    protocol::{FieldCommitPayload, UploadBatch, UploadReceipt},
};
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

use crate::{config::Settings, error::TransportError};

/// Receives whole-batch upload progress as a percentage in `0..=100`.
pub type ProgressSender = mpsc::UnboundedSender<u8>;

const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

#[async_trait]
pub trait ValuationTransport: Send + Sync {
    /// Idempotent full-state write of a row's fields.
    async fn submit_field_commit(
        &self,
        token: &InviteToken,
        payload: &FieldCommitPayload,
    ) -> Result<(), TransportError>;

    /// Uploads one batch, returning how many files the server stored.
    async fn upload_files(
        &self,
        token: &InviteToken,
        batch: &UploadBatch,
        progress: ProgressSender,
    ) -> Result<usize, TransportError>;
}

pub struct HttpValuationTransport {
    http: Client,
    base_url: Url,
}

impl HttpValuationTransport {
    pub fn new(base_url: Url) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.validated_base_url()?;
        let mut builder = Client::builder();
        if let Some(timeout) = settings.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("failed to build valuation http client")?;
        Ok(Self::with_client(http, base_url))
    }

    fn valuation_url(&self, token: &InviteToken, tail: Option<&str>) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                TransportError::InvalidRequest(format!("base url cannot carry a path: {}", self.base_url))
            })?;
            segments.pop_if_empty().push("valuations").push(token.as_str());
            if let Some(tail) = tail {
                segments.push(tail);
            }
        }
        Ok(url)
    }

    fn build_form(batch: &UploadBatch, progress: ProgressSender) -> Result<Form, TransportError> {
        let total = batch.total_bytes();
        let sent = Arc::new(AtomicU64::new(0));
        let mut form = Form::new();

        for file in &batch.files {
            let chunks: Vec<Vec<u8>> = file
                .bytes
                .chunks(UPLOAD_CHUNK_BYTES)
                .map(<[u8]>::to_vec)
                .collect();
            let sent = Arc::clone(&sent);
            let progress = progress.clone();
            let body = Body::wrap_stream(stream::iter(chunks.into_iter().map(move |chunk| {
                let so_far = sent.fetch_add(chunk.len() as u64, Ordering::Relaxed) + chunk.len() as u64;
                if total > 0 {
                    // The receiver goes away once the upload resolves.
                    let _ = progress.send(percent_of(so_far, total));
                }
                Ok::<_, std::io::Error>(chunk)
            })));

            let mut part = Part::stream_with_length(body, file.size_bytes())
                .file_name(file.filename.clone());
            if let Some(mime_type) = &file.mime_type {
                part = part.mime_str(mime_type)?;
            }
            form = form.part("files", part);
        }
        Ok(form)
    }
}

fn percent_of(done: u64, total: u64) -> u8 {
    ((done.min(total) * 100) / total) as u8
}

async fn ensure_success(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => api_error.message,
        Err(_) if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
        Err(_) => body.trim().to_string(),
    };
    Err(TransportError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ValuationTransport for HttpValuationTransport {
    async fn submit_field_commit(
        &self,
        token: &InviteToken,
        payload: &FieldCommitPayload,
    ) -> Result<(), TransportError> {
        let url = self.valuation_url(token, None)?;
        debug!(token = %token.redacted(), "http: PUT valuation fields");
        let response = self.http.put(url).json(payload).send().await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn upload_files(
        &self,
        token: &InviteToken,
        batch: &UploadBatch,
        progress: ProgressSender,
    ) -> Result<usize, TransportError> {
        let url = self.valuation_url(token, Some(batch.kind.path_segment()))?;
        debug!(
            token = %token.redacted(),
            files = batch.len(),
            bytes = batch.total_bytes(),
            "http: POST valuation attachments"
        );
        let form = Self::build_form(batch, progress)?;
        let response = self.http.post(url).multipart(form).send().await?;
        let receipt: UploadReceipt = ensure_success(response).await?.json().await?;
        Ok(receipt.uploaded)
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
