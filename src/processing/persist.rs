//! Persistence of finished summary records.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::types::{ProcessingError, SummaryRecord};

/// Hex-encoded SHA-256 digest of `bytes`.
pub fn document_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Current UTC time formatted as RFC 3339.
pub fn timestamp_now() -> Result<String, ProcessingError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|err| ProcessingError::Resource(format!("failed to format timestamp: {err}")))
}

/// File name used for the record of `job_id`.
pub fn record_file_name(job_id: &str) -> String {
    format!("summary-{job_id}.json")
}

/// Write `record` as pretty JSON under `dir`, creating the directory when missing.
pub async fn persist_summary(dir: &Path, record: &SummaryRecord) -> Result<PathBuf, ProcessingError> {
    tokio::fs::create_dir_all(dir).await.map_err(|err| {
        ProcessingError::Resource(format!(
            "failed to create summary directory {}: {err}",
            dir.display()
        ))
    })?;

    let payload = serde_json::to_vec_pretty(record)
        .map_err(|err| ProcessingError::Resource(format!("failed to encode summary: {err}")))?;
    let path = dir.join(record_file_name(&record.job_id));
    tokio::fs::write(&path, payload).await.map_err(|err| {
        ProcessingError::Resource(format!("failed to write {}: {err}", path.display()))
    })?;

    tracing::info!(path = %path.display(), "Summary record written");
    Ok(path)
}
