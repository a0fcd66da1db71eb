//! Strided frame sampling over a decode session

use std::iter::FusedIterator;
use std::num::NonZeroU32;
use std::path::Path;
use tracing::{debug, trace, warn};

use crate::decoder::{DecoderBackend, Frame, FrameDecoder};
use crate::{AnalyzerError, Result, UnreadableReason};

/// Default sampling stride
pub const DEFAULT_FRAME_SKIP: u32 = 30;

/// Which frames to emit: indices 0, k, 2k, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPolicy {
    frame_skip: NonZeroU32,
}

impl SamplingPolicy {
    pub fn new(frame_skip: u32) -> Result<Self> {
        NonZeroU32::new(frame_skip)
            .map(|frame_skip| Self { frame_skip })
            .ok_or_else(|| AnalyzerError::InvalidPolicy("frame_skip must be a positive integer".to_string()))
    }

    pub fn frame_skip(&self) -> u32 {
        self.frame_skip.get()
    }

    pub fn selects(&self, frame_index: u64) -> bool {
        frame_index % u64::from(self.frame_skip.get()) == 0
    }
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self {
            frame_skip: NonZeroU32::new(DEFAULT_FRAME_SKIP).unwrap_or(NonZeroU32::MIN),
        }
    }
}

/// A selected frame and the decoder position when it was read
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSample {
    pub frame: Frame,
    pub timestamp_ms: f64,
}

/// Lazy, single-pass iterator of [`FrameSample`]s.
///
/// The decode session is released exactly once: at end of stream, on the
/// first decode fault, or when the sampler is dropped early. After that the
/// iterator only yields `None`.
pub struct FrameSampler {
    decoder: Option<Box<dyn FrameDecoder>>,
    policy: SamplingPolicy,
    frame_index: u64,
    fault: Option<AnalyzerError>,
}

impl FrameSampler {
    /// Open `path` with `backend` and sample it under `policy`
    pub fn open(backend: &dyn DecoderBackend, path: &Path, policy: SamplingPolicy) -> Result<Self> {
        if !path.is_file() {
            return Err(AnalyzerError::unreadable(
                path,
                UnreadableReason::NotFound,
                "no such file",
            ));
        }

        let decoder = backend.open(path).map_err(|e| match e {
            AnalyzerError::DecodeFault(detail) => {
                AnalyzerError::unreadable(path, UnreadableReason::Undecodable, detail)
            }
            other => other,
        })?;

        debug!("Sampling {} every {} frames via {}", path.display(), policy.frame_skip(), backend.name());
        Ok(Self::new(decoder, policy))
    }

    /// Sample an already open decode session
    pub fn new(decoder: Box<dyn FrameDecoder>, policy: SamplingPolicy) -> Self {
        Self {
            decoder: Some(decoder),
            policy,
            frame_index: 0,
            fault: None,
        }
    }

    /// Frames decoded so far, selected or not
    pub fn frames_read(&self) -> u64 {
        self.frame_index
    }

    /// The decode fault that ended iteration, if any
    pub fn fault(&self) -> Option<&AnalyzerError> {
        self.fault.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.decoder.is_none()
    }

    fn close(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            decoder.release();
            trace!("Released decoder after {} frames", self.frame_index);
        }
    }
}

impl Iterator for FrameSampler {
    type Item = FrameSample;

    fn next(&mut self) -> Option<FrameSample> {
        loop {
            let decoder = self.decoder.as_mut()?;

            let frame = match decoder.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    self.close();
                    return None;
                }
                Err(e) => {
                    warn!("⚠️ Decode stopped after {} frames: {}", self.frame_index, e);
                    self.fault = Some(e);
                    self.close();
                    return None;
                }
            };

            let index = self.frame_index;
            self.frame_index += 1;

            if self.policy.selects(index) {
                let timestamp_ms = decoder.position_ms();
                trace!("Sampled frame {} at {:.1}ms", index, timestamp_ms);
                return Some(FrameSample { frame, timestamp_ms });
            }
        }
    }
}

impl FusedIterator for FrameSampler {}

impl Drop for FrameSampler {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{SyntheticBackend, SyntheticDecoder, SyntheticVideo};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Wraps a synthetic decoder and counts release calls
    struct CountingDecoder {
        inner: SyntheticDecoder,
        releases: Arc<AtomicUsize>,
    }

    impl FrameDecoder for CountingDecoder {
        fn read_frame(&mut self) -> Result<Option<Frame>> {
            self.inner.read_frame()
        }

        fn position_ms(&self) -> f64 {
            self.inner.position_ms()
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
            self.inner.release();
        }
    }

    fn counting_sampler(video: SyntheticVideo, frame_skip: u32) -> (FrameSampler, Arc<AtomicUsize>) {
        let releases = Arc::new(AtomicUsize::new(0));
        let decoder = CountingDecoder {
            inner: SyntheticDecoder::new(video),
            releases: Arc::clone(&releases),
        };
        let sampler = FrameSampler::new(Box::new(decoder), SamplingPolicy::new(frame_skip).unwrap());
        (sampler, releases)
    }

    #[test]
    fn test_zero_frame_skip_is_rejected() {
        assert!(matches!(SamplingPolicy::new(0), Err(AnalyzerError::InvalidPolicy(_))));
        assert_eq!(SamplingPolicy::default().frame_skip(), 30);
    }

    #[test]
    fn test_policy_selection() {
        let policy = SamplingPolicy::new(30).unwrap();
        assert!(policy.selects(0));
        assert!(!policy.selects(29));
        assert!(policy.selects(30));
        assert!(policy.selects(60));

        let every = SamplingPolicy::new(1).unwrap();
        assert!((0..10).all(|i| every.selects(i)));
    }

    #[test]
    fn test_sample_count_is_ceiling_of_frames_over_stride() {
        for (frames, skip, expected) in [(0, 30, 0), (1, 30, 1), (30, 30, 1), (31, 30, 2), (300, 30, 10), (7, 1, 7), (10, 3, 4)] {
            let (sampler, _) = counting_sampler(SyntheticVideo::new(frames, 30.0), skip);
            assert_eq!(sampler.count(), expected, "frames={} skip={}", frames, skip);
        }
    }

    #[test]
    fn test_timestamps_are_positions_of_selected_frames() {
        let (sampler, _) = counting_sampler(SyntheticVideo::new(100, 10.0), 25);
        let timestamps: Vec<f64> = sampler.map(|s| s.timestamp_ms).collect();

        assert_eq!(timestamps, vec![0.0, 2500.0, 5000.0, 7500.0]);
    }

    #[test]
    fn test_samples_carry_selected_frames() {
        let (sampler, _) = counting_sampler(SyntheticVideo::new(10, 30.0), 4);
        let shades: Vec<u8> = sampler.map(|s| s.frame.pixels()[0]).collect();

        assert_eq!(shades, vec![0, 4, 8]);
    }

    #[test]
    fn test_release_once_on_exhaustion() {
        let (mut sampler, releases) = counting_sampler(SyntheticVideo::new(5, 30.0), 2);
        assert_eq!(sampler.by_ref().count(), 3);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(sampler.is_finished());
        assert_eq!(sampler.frames_read(), 5);

        drop(sampler);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_once_on_early_drop() {
        let (mut sampler, releases) = counting_sampler(SyntheticVideo::new(100, 30.0), 1);
        assert!(sampler.next().is_some());
        assert_eq!(releases.load(Ordering::SeqCst), 0);

        drop(sampler);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_not_restartable() {
        let (mut sampler, _) = counting_sampler(SyntheticVideo::new(3, 30.0), 1);
        assert_eq!(sampler.by_ref().count(), 3);
        assert!(sampler.next().is_none());
        assert!(sampler.next().is_none());
    }

    #[test]
    fn test_decode_fault_keeps_partial_samples() {
        let (mut sampler, releases) = counting_sampler(SyntheticVideo::new(300, 30.0).failing_after(95), 30);
        let samples: Vec<FrameSample> = sampler.by_ref().collect();

        assert_eq!(samples.len(), 4);
        assert!(matches!(sampler.fault(), Some(AnalyzerError::DecodeFault(_))));
        assert_eq!(sampler.frames_read(), 95);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(sampler.next().is_none());
    }

    #[test]
    fn test_open_missing_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.mp4");

        let result = FrameSampler::open(&SyntheticBackend::new(), &path, SamplingPolicy::default());
        assert!(matches!(
            result,
            Err(AnalyzerError::SourceUnreadable { reason: UnreadableReason::NotFound, .. })
        ));
    }

    #[test]
    fn test_open_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("corrupt.mp4");
        std::fs::write(&path, b"definitely not a video").unwrap();

        let result = FrameSampler::open(&SyntheticBackend::new(), &path, SamplingPolicy::default());
        assert!(matches!(
            result,
            Err(AnalyzerError::SourceUnreadable { reason: UnreadableReason::Undecodable, .. })
        ));
    }

    #[test]
    fn test_open_and_sample_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clip.mp4");
        std::fs::write(&path, SyntheticVideo::new(61, 30.0).to_string()).unwrap();

        let sampler = FrameSampler::open(&SyntheticBackend::new(), &path, SamplingPolicy::default()).unwrap();
        let timestamps: Vec<f64> = sampler.map(|s| s.timestamp_ms).collect();

        assert_eq!(timestamps, vec![0.0, 1000.0, 2000.0]);
    }
}
