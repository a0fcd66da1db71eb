//! Video decoding backends
//!
//! The sampler only ever talks to a decoder through four operations: open a
//! path, read the next frame, report the current position in milliseconds and
//! release the session. Anything that can do those four things can back a
//! [`FrameSampler`](crate::sampler::FrameSampler).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::DecoderConfig;
use crate::{AnalyzerError, Result};

pub mod ffmpeg;
pub mod synthetic;

pub use ffmpeg::{FfmpegBackend, FfmpegDecoder, StreamInfo};
pub use synthetic::{SyntheticBackend, SyntheticDecoder, SyntheticVideo};

/// One decoded 8-bit grayscale image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize);
        Self { width, height, pixels }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major pixel data, one byte per pixel
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// An open decode session over a single video source
pub trait FrameDecoder: Send {
    /// Decode the next frame. `Ok(None)` marks end of stream; `Err` is a
    /// mid-stream decode fault.
    fn read_frame(&mut self) -> Result<Option<Frame>>;

    /// Position of the most recently decoded frame in milliseconds.
    fn position_ms(&self) -> f64;

    /// Release the session. Must be safe to call more than once.
    fn release(&mut self);
}

/// Factory that opens decode sessions by path
pub trait DecoderBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn open(&self, path: &Path) -> Result<Box<dyn FrameDecoder>>;
}

/// Which decoder backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderKind {
    Ffmpeg,
    Synthetic,
}

impl FromStr for DecoderKind {
    type Err = AnalyzerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ffmpeg" => Ok(DecoderKind::Ffmpeg),
            "synthetic" => Ok(DecoderKind::Synthetic),
            other => Err(AnalyzerError::Config(format!("unknown decoder backend: {}", other))),
        }
    }
}

/// Build the backend selected by the decoder configuration
pub fn backend_for(config: &DecoderConfig) -> Arc<dyn DecoderBackend> {
    match config.kind {
        DecoderKind::Ffmpeg => Arc::new(FfmpegBackend::new(
            config.ffmpeg_path.clone(),
            config.ffprobe_path.clone(),
        )),
        DecoderKind::Synthetic => Arc::new(SyntheticBackend::new()),
    }
}
