use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use shared::{
    domain::{AttachmentKind, CurrencyField},
    protocol::{ExternalRow, UploadBatch, UploadFile},
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use valuation_core::{
    config::{load_settings, load_settings_from},
    HttpValuationTransport, RowCollectionController, RowSnapshot, SaveStatus, UploadStatus,
    ValuationEvent, COMMIT_QUIET_PERIOD,
};

mod commands;

use commands::{parse_command, Command, HELP};

const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(about = "Enter valuations for invited rows from a terminal")]
struct Args {
    /// JSON array of rows to edit.
    #[arg(long)]
    rows: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the configured API base URL.
    #[arg(long)]
    api_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = match &args.config {
        Some(path) => load_settings_from(path),
        None => load_settings(),
    };
    if let Some(api_url) = args.api_url {
        settings.api_base_url = api_url;
    }

    let filter = EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let transport = HttpValuationTransport::from_settings(&settings)?;
    let controller = RowCollectionController::new(Arc::new(transport));

    let rows = read_rows(&args.rows).await?;
    let report = controller.resize(rows).await;
    println!(
        "Loaded {} rows ({} read-only)",
        report.added,
        controller
            .snapshots()
            .await
            .iter()
            .filter(|row| row.read_only)
            .count()
    );

    let mut events = controller.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => println!("{}", describe_event(&event)),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event printer fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        if let Err(err) = run_command(&controller, command).await {
            println!("error: {err:#}");
        }
    }

    flush(&controller, settings.request_timeout()).await;
    let dropped = controller.shutdown().await;
    if dropped > 0 {
        warn!(dropped, "exiting with uncommitted edits");
    }
    Ok(())
}

async fn run_command(controller: &RowCollectionController, command: Command) -> Result<()> {
    match command {
        Command::Rows => {
            for row in controller.snapshots().await {
                println!("{}", describe_row(&row));
            }
        }
        Command::Edit { srd_id, field, raw } => {
            if !controller.edit_currency(srd_id, field, &raw).await {
                println!("row {srd_id} is not editable");
            }
        }
        Command::Note { srd_id, text } => {
            if !controller.edit_notes(srd_id, &text).await {
                println!("row {srd_id} is not editable");
            }
        }
        Command::Upload {
            srd_id,
            kind,
            paths,
        } => {
            let batch = read_batch(kind, &paths).await?;
            if !controller.select_files(srd_id, batch).await {
                println!("row {srd_id} does not accept uploads");
            }
        }
        Command::Reload(path) => {
            let report = controller.resize(read_rows(&path).await?).await;
            println!(
                "rows: {} added, {} removed, {} kept",
                report.added, report.removed, report.retained
            );
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
    Ok(())
}

async fn read_rows(path: &Path) -> Result<Vec<ExternalRow>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read rows file '{}'", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("rows file '{}' is not a JSON row list", path.display()))
}

async fn read_batch(kind: AttachmentKind, paths: &[PathBuf]) -> Result<UploadBatch> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        files.push(UploadFile {
            filename,
            mime_type: mime_guess::from_path(path).first().map(|mime| mime.to_string()),
            bytes,
        });
    }
    Ok(UploadBatch::new(kind, files))
}

/// Waits for pending commits and in-flight work before exiting.
async fn flush(controller: &RowCollectionController, request_timeout: Option<Duration>) {
    let deadline = COMMIT_QUIET_PERIOD + request_timeout.unwrap_or(Duration::from_secs(30));
    let started = tokio::time::Instant::now();
    while started.elapsed() < deadline {
        let busy = controller.snapshots().await.iter().any(|row| {
            row.commit_pending
                || row.save_status == SaveStatus::Saving
                || row.upload_status == UploadStatus::Uploading
        });
        if !busy {
            return;
        }
        tokio::time::sleep(FLUSH_POLL_INTERVAL).await;
    }
    warn!("exiting with unsettled rows");
}

fn describe_row(row: &RowSnapshot) -> String {
    let mut line = format!("[{}] {}", row.srd_id, row.address);
    for field in CurrencyField::ALL {
        line.push_str(&format!(
            " | {} {}",
            field.label(),
            or_dash(&row.fields.field(field).draft)
        ));
    }
    line.push_str(&format!(" | save {}", row.save_status.label()));
    if row.read_only {
        line.push_str(" (read-only)");
    }
    if row.commit_pending {
        line.push_str(" (editing)");
    }
    if let Some(message) = &row.save_message {
        line.push_str(&format!(": {message}"));
    }
    line.push_str(&format!(" | upload {}", row.upload_status.label()));
    if row.upload_status == UploadStatus::Uploading {
        line.push_str(&format!(" {}%", row.upload_progress));
    }
    if let Some(message) = &row.upload_message {
        line.push_str(&format!(": {message}"));
    }
    if let Some(pending) = &row.pending_upload {
        line.push_str(&format!(
            " ({} {:?} file(s), {} bytes pending)",
            pending.file_count, pending.kind, pending.total_bytes
        ));
    }
    if !row.fields.notes.is_empty() {
        line.push_str(&format!("\n      note: {}", row.fields.notes));
    }
    for link in &row.links {
        line.push_str(&format!("\n      link: {link}"));
    }
    line
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

fn describe_event(event: &ValuationEvent) -> String {
    match event {
        ValuationEvent::SaveStatusChanged {
            srd_id,
            status,
            message,
        } => match message {
            Some(message) => format!("row {srd_id}: save {} ({message})", status.label()),
            None => format!("row {srd_id}: save {}", status.label()),
        },
        ValuationEvent::UploadStatusChanged {
            srd_id,
            status,
            message,
        } => match message {
            Some(message) => format!("row {srd_id}: upload {} ({message})", status.label()),
            None => format!("row {srd_id}: upload {}", status.label()),
        },
        ValuationEvent::UploadProgress { srd_id, progress } => {
            format!("row {srd_id}: upload {progress}%")
        }
        ValuationEvent::Saved { srd_id, source } => {
            format!("row {srd_id}: stored ({source:?})")
        }
    }
}
