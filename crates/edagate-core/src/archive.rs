//! Result archival.
//!
//! Packs one evaluation into `<submission_id>.zip`:
//!
//! ```text
//! result.json              the EvaluationResult document
//! reports/<backend>.json   raw tool report (or the terminal outcome on failure)
//! logs/<backend>.log       tool logs, when the backend produced any
//! ```
//!
//! The local copy is written atomically under the results directory. A copy
//! is uploaded to the optional [`ResultSink`]; an upload failure becomes a
//! warning and never loses the local copy.

use crate::domain::{ArchiveLocation, EvaluationResult};
use crate::error::StorageError;
use crate::metrics::METRICS;
use crate::obs;
use async_trait::async_trait;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub type Result<T> = std::result::Result<T, StorageError>;

/// Key prefix for archives in the external sink.
pub const SINK_PREFIX: &str = "eda_results";

/// Upload failure at the external sink.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("sink rejected upload with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("sink transport error: {0}")]
    Transport(String),
}

/// External object store for result archives.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Store `bytes` under `key`, returning the remote location.
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> std::result::Result<String, SinkError>;
}

/// Outcome of archiving one result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReceipt {
    pub location: ArchiveLocation,
    /// Non-fatal problems (sink failures).
    pub warnings: Vec<String>,
    pub bytes: usize,
}

/// Writes result archives locally and mirrors them to a sink.
#[derive(Clone)]
pub struct ResultArchiver {
    results_dir: PathBuf,
    sink: Option<Arc<dyn ResultSink>>,
}

impl ResultArchiver {
    pub fn new(results_dir: impl Into<PathBuf>, sink: Option<Arc<dyn ResultSink>>) -> Self {
        Self {
            results_dir: results_dir.into(),
            sink,
        }
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Local path of the archive for `result`.
    pub fn archive_path(&self, result: &EvaluationResult) -> PathBuf {
        self.results_dir.join(format!("{}.zip", result.submission_id))
    }

    /// Pack and store `result`.
    pub async fn archive(&self, result: &EvaluationResult) -> Result<ArchiveReceipt> {
        let local_path = self.archive_path(result);
        let mut document = result.clone();
        document.archive = Some(ArchiveLocation {
            local_path: local_path.clone(),
            remote: None,
        });

        let dir = self.results_dir.clone();
        let dest = local_path.clone();
        let bytes = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let bytes = pack(&document)?;
            write_atomic(&dir, &dest, &bytes)?;
            Ok(bytes)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))??;

        obs::emit_archive_written(result.submission_id, &local_path, bytes.len());

        let mut receipt = ArchiveReceipt {
            location: ArchiveLocation {
                local_path,
                remote: None,
            },
            warnings: Vec::new(),
            bytes: bytes.len(),
        };

        if let Some(sink) = &self.sink {
            let key = format!("{}/{}.zip", SINK_PREFIX, result.submission_id);
            match sink.upload(&key, bytes).await {
                Ok(remote) => receipt.location.remote = Some(remote),
                Err(err) => {
                    METRICS.inc_archive_failures();
                    obs::emit_archive_sink_failed(result.submission_id, &err);
                    receipt
                        .warnings
                        .push(format!("result upload to sink failed: {}", err));
                }
            }
        }

        Ok(receipt)
    }
}

/// Build the zip in memory.
pub fn pack(result: &EvaluationResult) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("result.json", options)?;
    zip.write_all(&serde_json::to_vec_pretty(result)?)?;

    for (kind, outcome) in &result.outcomes {
        let report = match outcome.report() {
            Some(report) => serde_json::to_vec_pretty(report.raw())?,
            None => serde_json::to_vec_pretty(outcome)?,
        };
        zip.start_file(format!("reports/{}.json", kind.name()), options)?;
        zip.write_all(&report)?;

        if let Some(logs) = outcome.logs() {
            zip.start_file(format!("logs/{}.log", kind.name()), options)?;
            zip.write_all(logs.as_bytes())?;
        }
    }

    Ok(zip.finish()?.into_inner())
}

fn write_atomic(dir: &Path, dest: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}
