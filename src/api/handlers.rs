//! API request handlers

use axum::body::Bytes;
use axum::extract::Multipart;
use std::io::{self, Read};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use super::models::{ApiError, HealthResponse};
use crate::processing::{validate_upload, IngestionCoordinator, IngestionReport, NO_VIDEO_PROVIDED};
use crate::AnalyzerError;

/// Multipart field carrying the video
pub const VIDEO_FIELD: &str = "video";

/// Upload chunks buffered between the request and the blocking writer
const CHUNK_QUEUE_DEPTH: usize = 8;

/// Handle health check requests
pub fn health_check(coordinator: &IngestionCoordinator) -> HealthResponse {
    HealthResponse {
        status: "healthy".to_string(),
        service: "road-analyzer".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        decoder: coordinator.backend_name().to_string(),
        detector: coordinator.detector_name().to_string(),
        frame_skip: coordinator.policy().frame_skip(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}

/// Blocking reader over upload chunks sent from the async side.
///
/// A closed channel is end of input. Must be read from a blocking thread.
pub struct ChunkReader {
    rx: mpsc::Receiver<io::Result<Bytes>>,
    pending: Bytes,
}

impl ChunkReader {
    pub fn new(rx: mpsc::Receiver<io::Result<Bytes>>) -> Self {
        Self { rx, pending: Bytes::new() }
    }
}

impl Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pending.is_empty() {
            match self.rx.blocking_recv() {
                Some(Ok(chunk)) => self.pending = chunk,
                Some(Err(e)) => return Err(e),
                None => return Ok(0),
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending = self.pending.slice(n..);
        Ok(n)
    }
}

/// Handle an upload: stream the video part into the blocking pool, where it
/// is written to a transient file and sampled.
///
/// Parts with a missing or empty filename are rejected before any of their
/// contents are read.
pub async fn process_video(
    coordinator: Arc<IngestionCoordinator>,
    mut multipart: Multipart,
) -> Result<IngestionReport, ApiError> {
    let mut field = loop {
        match multipart.next_field().await? {
            Some(field) if field.name() == Some(VIDEO_FIELD) => break field,
            Some(field) => debug!("Skipping multipart field {:?}", field.name()),
            None => return Err(AnalyzerError::MissingUpload(NO_VIDEO_PROVIDED.to_string()).into()),
        }
    };
    let filename = validate_upload(field.file_name())?.to_string();

    let (tx, rx) = mpsc::channel(CHUNK_QUEUE_DEPTH);
    let task = tokio::task::spawn_blocking(move || {
        coordinator.ingest(Some(&filename), ChunkReader::new(rx))
    });

    let mut received = 0u64;
    let mut upload_error = None;
    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                received += chunk.len() as u64;
                if tx.send(Ok(chunk)).await.is_err() {
                    // Writer gave up; its error is reported below
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = tx.send(Err(io::Error::new(io::ErrorKind::Other, e.to_string()))).await;
                upload_error = Some(e);
                break;
            }
        }
    }
    drop(tx);

    let result = task
        .await
        .map_err(|e| ApiError::internal(format!("Processing task failed: {}", e)))?;

    if let Some(e) = upload_error {
        return Err(e.into());
    }
    debug!("Streamed {} upload bytes", received);

    Ok(result?)
}
