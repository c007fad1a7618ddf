use super::*;
use std::collections::HashMap;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response as AxumResponse},
    routing::{post, put},
    Json, Router,
};
use shared::{
    domain::AttachmentKind,
    error::ErrorCode,
    protocol::UploadFile,
};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredUpload {
    token: String,
    kind: String,
    files: Vec<(String, usize)>,
}

#[derive(Clone, Default)]
struct ServerState {
    fields: Arc<Mutex<HashMap<String, FieldCommitPayload>>>,
    writes: Arc<Mutex<usize>>,
    uploads: Arc<Mutex<Vec<StoredUpload>>>,
}

async fn handle_put_fields(
    State(state): State<ServerState>,
    Path(token): Path<String>,
    Json(payload): Json<FieldCommitPayload>,
) -> AxumResponse {
    if token == "revoked" {
        return (
            StatusCode::FORBIDDEN,
            Json(ApiError::new(ErrorCode::Forbidden, "invite has been revoked")),
        )
            .into_response();
    }
    if token == "bare-failure" {
        return StatusCode::BAD_GATEWAY.into_response();
    }
    *state.writes.lock().await += 1;
    state.fields.lock().await.insert(token, payload);
    StatusCode::NO_CONTENT.into_response()
}

async fn handle_post_files(
    State(state): State<ServerState>,
    Path((token, kind)): Path<(String, String)>,
    mut multipart: Multipart,
) -> Result<Json<UploadReceipt>, StatusCode> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
        files.push((filename, bytes.len()));
    }
    let uploaded = files.len();
    state.uploads.lock().await.push(StoredUpload { token, kind, files });
    Ok(Json(UploadReceipt { uploaded }))
}

async fn spawn_valuation_server() -> (Url, ServerState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = ServerState::default();
    let app = Router::new()
        .route("/api/valuations/:token", put(handle_put_fields))
        .route("/api/valuations/:token/:kind", post(handle_post_files))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let base_url = Url::parse(&format!("http://{addr}/api")).expect("base url");
    (base_url, state)
}

fn payload() -> FieldCommitPayload {
    FieldCommitPayload {
        as_is_value: Some(1750),
        arv_value: Some(240_000),
        rehab_estimate: None,
        notes: Some("new roof in 2019".into()),
    }
}

#[tokio::test]
async fn field_commit_puts_full_state_under_token() {
    let (base_url, state) = spawn_valuation_server().await;
    let transport = HttpValuationTransport::new(base_url);

    transport
        .submit_field_commit(&InviteToken::new("tok-1"), &payload())
        .await
        .expect("commit");

    let fields = state.fields.lock().await;
    assert_eq!(fields.get("tok-1"), Some(&payload()));
}

#[tokio::test]
async fn repeated_identical_commit_leaves_same_server_state() {
    let (base_url, state) = spawn_valuation_server().await;
    let transport = HttpValuationTransport::new(base_url);
    let token = InviteToken::new("tok-1");

    transport
        .submit_field_commit(&token, &payload())
        .await
        .expect("first");
    let after_first = state.fields.lock().await.clone();
    transport
        .submit_field_commit(&token, &payload())
        .await
        .expect("second");

    assert_eq!(*state.writes.lock().await, 2);
    assert_eq!(*state.fields.lock().await, after_first);
    assert_eq!(after_first.len(), 1);
}

#[tokio::test]
async fn rejected_commit_surfaces_api_error_message() {
    let (base_url, _state) = spawn_valuation_server().await;
    let transport = HttpValuationTransport::new(base_url);

    let err = transport
        .submit_field_commit(&InviteToken::new("revoked"), &payload())
        .await
        .expect_err("must fail");
    assert_eq!(
        err,
        TransportError::Rejected {
            status: 403,
            message: "invite has been revoked".into(),
        }
    );
}

#[tokio::test]
async fn rejected_commit_without_body_uses_status_text() {
    let (base_url, _state) = spawn_valuation_server().await;
    let transport = HttpValuationTransport::new(base_url);

    let err = transport
        .submit_field_commit(&InviteToken::new("bare-failure"), &payload())
        .await
        .expect_err("must fail");
    assert_eq!(
        err,
        TransportError::Rejected {
            status: 502,
            message: "Bad Gateway".into(),
        }
    );
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let transport =
        HttpValuationTransport::new(Url::parse(&format!("http://{addr}/api")).expect("url"));

    let err = transport
        .submit_field_commit(&InviteToken::new("tok-1"), &payload())
        .await
        .expect_err("must fail");
    assert!(matches!(err, TransportError::Network(_)), "unexpected: {err:?}");
}

#[tokio::test]
async fn upload_streams_every_file_and_reports_progress() {
    let (base_url, state) = spawn_valuation_server().await;
    let transport = HttpValuationTransport::new(base_url);
    let batch = UploadBatch::new(
        AttachmentKind::Document,
        vec![
            UploadFile {
                filename: "appraisal.pdf".into(),
                mime_type: Some("application/pdf".into()),
                bytes: vec![1; UPLOAD_CHUNK_BYTES * 2 + 10],
            },
            UploadFile {
                filename: "notes.txt".into(),
                mime_type: None,
                bytes: b"kitchen gutted".to_vec(),
            },
        ],
    );
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();

    let uploaded = transport
        .upload_files(&InviteToken::new("tok-7"), &batch, progress_tx)
        .await
        .expect("upload");
    assert_eq!(uploaded, 2);

    let mut reports = Vec::new();
    while let Ok(percent) = progress_rx.try_recv() {
        reports.push(percent);
    }
    assert!(!reports.is_empty());
    assert!(reports.iter().all(|percent| *percent <= 100));
    assert_eq!(reports.last().copied(), Some(100));

    let uploads = state.uploads.lock().await;
    assert_eq!(
        *uploads,
        vec![StoredUpload {
            token: "tok-7".into(),
            kind: "documents".into(),
            files: vec![
                ("appraisal.pdf".into(), UPLOAD_CHUNK_BYTES * 2 + 10),
                ("notes.txt".into(), 14),
            ],
        }]
    );
}

#[tokio::test]
async fn invalid_mime_type_fails_before_sending() {
    let transport =
        HttpValuationTransport::new(Url::parse("http://127.0.0.1:9/api").expect("url"));
    let batch = UploadBatch::new(
        AttachmentKind::Photo,
        vec![UploadFile {
            filename: "x.jpg".into(),
            mime_type: Some("not a mime".into()),
            bytes: vec![0; 4],
        }],
    );
    let (progress_tx, _progress_rx) = mpsc::unbounded_channel();

    let err = transport
        .upload_files(&InviteToken::new("tok"), &batch, progress_tx)
        .await
        .expect_err("must fail");
    assert!(matches!(err, TransportError::InvalidRequest(_)), "unexpected: {err:?}");
}

#[test]
fn token_is_escaped_into_a_single_path_segment() {
    let transport =
        HttpValuationTransport::new(Url::parse("https://api.example.com/v1/").expect("url"));
    let url = transport
        .valuation_url(&InviteToken::new("a/b c"), Some("photos"))
        .expect("url");
    assert_eq!(
        url.as_str(),
        "https://api.example.com/v1/valuations/a%2Fb%20c/photos"
    );
}

#[test]
fn percent_is_clamped() {
    assert_eq!(percent_of(0, 10), 0);
    assert_eq!(percent_of(5, 10), 50);
    assert_eq!(percent_of(15, 10), 100);
}
