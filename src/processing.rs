use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempPath;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::decoder::{self, DecoderBackend};
use crate::detection::{DefectCounts, DefectDetector, MockDetector};
use crate::sampler::{FrameSampler, SamplingPolicy};
use crate::{AnalyzerError, Result, UnreadableReason};

/// Number of timestamps included in a report
pub const TIMESTAMP_PREVIEW_LEN: usize = 10;

const TRANSIENT_PREFIX: &str = "upload_";
const TRANSIENT_SUFFIX: &str = ".mp4";

/// Rejection message when the request carries no video part
pub const NO_VIDEO_PROVIDED: &str = "No video file provided";

/// Summary returned for one processed upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub total_frames_processed: u64,
    /// Earliest sample timestamps in milliseconds, at most [`TIMESTAMP_PREVIEW_LEN`]
    pub timestamps: Vec<f64>,
    pub mock_detections: DefectCounts,
    pub processing_complete: bool,
}

impl IngestionReport {
    pub fn from_samples(total_frames_processed: u64, timestamps: &[f64], detector: &dyn DefectDetector) -> Self {
        let preview = timestamps.len().min(TIMESTAMP_PREVIEW_LEN);
        Self {
            total_frames_processed,
            timestamps: timestamps[..preview].to_vec(),
            mock_detections: detector.detect(total_frames_processed),
            processing_complete: true,
        }
    }
}

/// Request-scoped on-disk copy of an upload.
///
/// The file is deleted by [`TransientFile::release`] or, failing that, when
/// the value is dropped, so every exit path out of a request removes it.
#[derive(Debug)]
pub struct TransientFile {
    path: Option<TempPath>,
}

impl TransientFile {
    /// Create a uniquely named `.mp4` file in `dir` (system temp dir if
    /// `None`) and copy `body` into it. Returns the file and bytes written.
    pub fn create_from(dir: Option<&Path>, body: &mut impl Read) -> Result<(Self, u64)> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(TRANSIENT_PREFIX).suffix(TRANSIENT_SUFFIX);
        let mut file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        let written = std::io::copy(body, file.as_file_mut())?;
        file.as_file_mut().flush()?;

        let path = file.into_temp_path();
        debug!("Wrote {} bytes to {}", written, path.display());
        Ok((Self { path: Some(path) }, written))
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Delete the file now. Failures are logged, never returned.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let Some(path) = self.path.take() {
            let removed_path = path.to_path_buf();
            match path.close() {
                Ok(()) => debug!("Removed transient file {}", removed_path.display()),
                Err(source) => {
                    let fault = AnalyzerError::CleanupFault { path: removed_path, source };
                    warn!("🧹 {}", fault);
                }
            }
        }
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Check the declared upload filename before anything is allocated
pub fn validate_upload(filename: Option<&str>) -> Result<&str> {
    match filename {
        None => Err(AnalyzerError::MissingUpload(NO_VIDEO_PROVIDED.to_string())),
        Some("") => Err(AnalyzerError::MissingUpload("No video file selected".to_string())),
        Some(name) => Ok(name),
    }
}

/// Drives one upload from raw bytes to an [`IngestionReport`]
#[derive(Clone)]
pub struct IngestionCoordinator {
    backend: Arc<dyn DecoderBackend>,
    detector: Arc<dyn DefectDetector>,
    policy: SamplingPolicy,
    temp_dir: Option<PathBuf>,
}

impl IngestionCoordinator {
    pub fn new(
        backend: Arc<dyn DecoderBackend>,
        detector: Arc<dyn DefectDetector>,
        policy: SamplingPolicy,
    ) -> Self {
        Self {
            backend,
            detector,
            policy,
            temp_dir: None,
        }
    }

    /// Build a coordinator from configuration, using the mock detector
    pub fn from_config(config: &Config) -> Result<Self> {
        let policy = SamplingPolicy::new(config.sampling.frame_skip)?;
        let mut coordinator = Self::new(decoder::backend_for(&config.decoder), Arc::new(MockDetector), policy);
        coordinator.temp_dir = config.storage.temp_dir.clone();
        Ok(coordinator)
    }

    /// Place transient files in `dir` instead of the system temp dir
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn policy(&self) -> SamplingPolicy {
        self.policy
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    /// Process an uploaded video.
    ///
    /// The upload is written to a transient file which is removed before this
    /// returns, whether sampling succeeded or not.
    pub fn ingest<R: Read>(&self, filename: Option<&str>, mut body: R) -> Result<IngestionReport> {
        let filename = validate_upload(filename)?;
        let start_time = Instant::now();

        let (transient, bytes_written) = TransientFile::create_from(self.temp_dir.as_deref(), &mut body)?;
        let result = self.process_path(transient.path());
        transient.release();

        match &result {
            Ok(report) => info!("✅ Processed {} ({} bytes): {} samples in {:.2}s",
                                filename,
                                bytes_written,
                                report.total_frames_processed,
                                start_time.elapsed().as_secs_f64()),
            Err(e) => warn!("❌ Failed to process {}: {}", filename, e),
        }

        result
    }

    /// Sample a video that is already on disk and build its report
    pub fn process_path(&self, path: &Path) -> Result<IngestionReport> {
        let mut sampler = FrameSampler::open(self.backend.as_ref(), path, self.policy)?;

        let mut total_frames_processed = 0u64;
        let mut timestamps = Vec::new();
        for sample in sampler.by_ref() {
            total_frames_processed += 1;
            timestamps.push(sample.timestamp_ms);
        }

        if let Some(fault) = sampler.fault() {
            if sampler.frames_read() == 0 {
                return Err(AnalyzerError::unreadable(
                    path,
                    UnreadableReason::Undecodable,
                    fault.to_string(),
                ));
            }
            warn!("Partial result for {}: {} samples from {} decoded frames ({})",
                  path.display(),
                  total_frames_processed,
                  sampler.frames_read(),
                  fault);
        } else {
            debug!("Decoded {} frames from {}", sampler.frames_read(), path.display());
        }

        Ok(IngestionReport::from_samples(total_frames_processed, &timestamps, self.detector.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dir_entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_report_preview_is_bounded() {
        let timestamps: Vec<f64> = (0..25).map(|i| i as f64 * 1000.0).collect();
        let report = IngestionReport::from_samples(25, &timestamps, &MockDetector);

        assert_eq!(report.timestamps.len(), TIMESTAMP_PREVIEW_LEN);
        assert_eq!(report.timestamps[..], timestamps[..10]);
        assert_eq!(report.mock_detections, DefectCounts { potholes: 2, cracks: 1, surface_wear: 1 });
        assert!(report.processing_complete);
    }

    #[test]
    fn test_report_with_few_samples() {
        let report = IngestionReport::from_samples(3, &[0.0, 1000.0, 2000.0], &MockDetector);

        assert_eq!(report.timestamps, vec![0.0, 1000.0, 2000.0]);
        assert_eq!(report.mock_detections, DefectCounts::default());
    }

    #[test]
    fn test_report_json_shape() {
        let report = IngestionReport::from_samples(0, &[], &MockDetector);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json, serde_json::json!({
            "total_frames_processed": 0,
            "timestamps": [],
            "mock_detections": {"potholes": 0, "cracks": 0, "surface_wear": 0},
            "processing_complete": true
        }));
    }

    #[test]
    fn test_validate_upload() {
        assert!(matches!(validate_upload(None), Err(AnalyzerError::MissingUpload(m)) if m == "No video file provided"));
        assert!(matches!(validate_upload(Some("")), Err(AnalyzerError::MissingUpload(m)) if m == "No video file selected"));
        assert_eq!(validate_upload(Some("dashcam.mp4")).unwrap(), "dashcam.mp4");
    }

    #[test]
    fn test_transient_file_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let (transient, written) =
            TransientFile::create_from(Some(temp_dir.path()), &mut &b"frame data"[..]).unwrap();

        let path = transient.path().to_path_buf();
        assert_eq!(written, 10);
        assert_eq!(std::fs::read(&path).unwrap(), b"frame data");
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("upload_") && name.ends_with(".mp4"));

        transient.release();
        assert!(!path.exists());
        assert_eq!(dir_entries(temp_dir.path()), 0);
    }

    #[test]
    fn test_transient_file_removed_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        {
            let (_transient, _) = TransientFile::create_from(Some(temp_dir.path()), &mut &b"abc"[..]).unwrap();
            assert_eq!(dir_entries(temp_dir.path()), 1);
        }
        assert_eq!(dir_entries(temp_dir.path()), 0);
    }

    #[test]
    fn test_release_tolerates_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let (transient, _) = TransientFile::create_from(Some(temp_dir.path()), &mut &b"abc"[..]).unwrap();

        std::fs::remove_file(transient.path()).unwrap();
        transient.release();
    }

    #[test]
    fn test_transient_files_are_unique() {
        let temp_dir = TempDir::new().unwrap();
        let (a, _) = TransientFile::create_from(Some(temp_dir.path()), &mut &b"a"[..]).unwrap();
        let (b, _) = TransientFile::create_from(Some(temp_dir.path()), &mut &b"b"[..]).unwrap();

        assert_ne!(a.path(), b.path());
    }
}
