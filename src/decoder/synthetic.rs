//! Deterministic decoder for ffmpeg-less environments
//!
//! A synthetic "video" is a one-line text descriptor:
//!
//! ```text
//! SYNTHETIC frames=300 fps=30 width=4 height=4 fail_after=120
//! ```
//!
//! `width`, `height` and `fail_after` are optional. Anything else in the file
//! is treated as a corrupt source.

use std::fmt;
use std::path::Path;
use tracing::debug;

use super::{DecoderBackend, Frame, FrameDecoder};
use crate::{AnalyzerError, Result, UnreadableReason};

const MAGIC: &str = "SYNTHETIC";

/// Description of a synthetic video source
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticVideo {
    pub frames: u64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// Report a decode fault instead of producing this frame index
    pub fail_after: Option<u64>,
}

impl SyntheticVideo {
    pub fn new(frames: u64, fps: f64) -> Self {
        Self {
            frames,
            fps,
            width: 4,
            height: 4,
            fail_after: None,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn failing_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    /// Parse a descriptor line
    pub fn parse(text: &str) -> std::result::Result<Self, String> {
        let mut tokens = text.split_whitespace();
        if tokens.next() != Some(MAGIC) {
            return Err("missing SYNTHETIC header".to_string());
        }

        let mut frames = None;
        let mut fps = None;
        let mut video = SyntheticVideo::new(0, 0.0);

        for token in tokens {
            let (key, value) = token
                .split_once('=')
                .ok_or_else(|| format!("malformed field: {}", token))?;
            let bad = || format!("invalid value for {}: {}", key, value);
            match key {
                "frames" => frames = Some(value.parse::<u64>().map_err(|_| bad())?),
                "fps" => fps = Some(value.parse::<f64>().map_err(|_| bad())?),
                "width" => video.width = value.parse::<u32>().map_err(|_| bad())?,
                "height" => video.height = value.parse::<u32>().map_err(|_| bad())?,
                "fail_after" => video.fail_after = Some(value.parse::<u64>().map_err(|_| bad())?),
                other => return Err(format!("unknown field: {}", other)),
            }
        }

        video.frames = frames.ok_or("missing frames")?;
        video.fps = fps.ok_or("missing fps")?;
        if !(video.fps.is_finite() && video.fps > 0.0) {
            return Err(format!("fps must be positive, got {}", video.fps));
        }
        if video.width == 0 || video.height == 0 {
            return Err(format!("invalid frame size {}x{}", video.width, video.height));
        }
        Ok(video)
    }
}

impl fmt::Display for SyntheticVideo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames={} fps={} width={} height={}",
            MAGIC, self.frames, self.fps, self.width, self.height
        )?;
        if let Some(k) = self.fail_after {
            write!(f, " fail_after={}", k)?;
        }
        Ok(())
    }
}

/// Opens synthetic descriptor files
#[derive(Debug, Clone, Default)]
pub struct SyntheticBackend;

impl SyntheticBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DecoderBackend for SyntheticBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn FrameDecoder>> {
        let bytes = std::fs::read(path)?;
        let video = std::str::from_utf8(&bytes)
            .map_err(|e| e.to_string())
            .and_then(SyntheticVideo::parse)
            .map_err(|detail| AnalyzerError::unreadable(path, UnreadableReason::Undecodable, detail))?;

        debug!("Opened synthetic source {}: {}", path.display(), video);
        Ok(Box::new(SyntheticDecoder::new(video)))
    }
}

/// Decode session over a [`SyntheticVideo`]
#[derive(Debug)]
pub struct SyntheticDecoder {
    video: SyntheticVideo,
    next_index: u64,
    released: bool,
}

impl SyntheticDecoder {
    pub fn new(video: SyntheticVideo) -> Self {
        Self {
            video,
            next_index: 0,
            released: false,
        }
    }
}

impl FrameDecoder for SyntheticDecoder {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if self.released || self.next_index >= self.video.frames {
            return Ok(None);
        }
        if self.video.fail_after == Some(self.next_index) {
            return Err(AnalyzerError::DecodeFault(format!(
                "synthetic fault at frame {}",
                self.next_index
            )));
        }

        let shade = (self.next_index % 256) as u8;
        let len = self.video.width as usize * self.video.height as usize;
        self.next_index += 1;
        Ok(Some(Frame::new(self.video.width, self.video.height, vec![shade; len])))
    }

    fn position_ms(&self) -> f64 {
        match self.next_index {
            0 => 0.0,
            n => (n - 1) as f64 * 1000.0 / self.video.fps,
        }
    }

    fn release(&mut self) {
        self.released = true;
    }
}
