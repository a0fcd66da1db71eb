//! FFmpeg command line decoder
//!
//! Geometry and frame rate come from `ffprobe`; frames are streamed as raw
//! grayscale from an `ffmpeg` child process.

use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::{debug, info, warn};

use super::{DecoderBackend, Frame, FrameDecoder};
use crate::{AnalyzerError, Result, UnreadableReason};

/// Video stream properties reported by ffprobe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    /// Average frame rate, if the container declares one
    pub fps: Option<f64>,
}

/// Opens decode sessions by shelling out to ffprobe/ffmpeg
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
}

impl FfmpegBackend {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// Extract stream geometry and frame rate using ffprobe
    pub fn probe(&self, video_path: &Path) -> Result<StreamInfo> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v", "error",
                "-select_streams", "v:0",
                "-show_entries", "stream=width,height,avg_frame_rate,r_frame_rate",
                "-print_format", "json",
            ])
            .arg(video_path)
            .stdin(Stdio::null())
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AnalyzerError::unreadable(
                video_path,
                UnreadableReason::Undecodable,
                format!("ffprobe failed: {}", stderr.trim()),
            ));
        }

        parse_probe_output(&output.stdout).map_err(|detail| {
            AnalyzerError::unreadable(video_path, UnreadableReason::Undecodable, detail)
        })
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl DecoderBackend for FfmpegBackend {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn FrameDecoder>> {
        let info = self.probe(path)?;

        let mut child = Command::new(&self.ffmpeg_path)
            .args(["-nostdin", "-v", "error", "-i"])
            .arg(path)
            .args([
                "-map", "0:v:0",
                "-fps_mode", "passthrough",
                "-f", "rawvideo",
                "-pix_fmt", "gray",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| {
            AnalyzerError::DecodeFault("ffmpeg stdout was not captured".to_string())
        })?;

        info!("📹 Opened {} ({}x{}, {} fps)",
              path.display(),
              info.width,
              info.height,
              info.fps.map(|f| format!("{:.2}", f)).unwrap_or_else(|| "unknown".to_string()));

        Ok(Box::new(FfmpegDecoder {
            frame_len: info.width as usize * info.height as usize,
            info,
            child: Some(child),
            stdout: Some(stdout),
            frames_read: 0,
        }))
    }
}

/// Decode session backed by an ffmpeg child process
pub struct FfmpegDecoder {
    info: StreamInfo,
    frame_len: usize,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    frames_read: u64,
}

impl FfmpegDecoder {
    /// Reap the child once its output is exhausted and check how it exited
    fn finish(&mut self) -> Result<()> {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let status = child.wait()?;
            if !status.success() {
                return Err(AnalyzerError::DecodeFault(format!(
                    "ffmpeg exited with {} after {} frames",
                    status, self.frames_read
                )));
            }
        }
        Ok(())
    }
}

impl FrameDecoder for FfmpegDecoder {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut buffer = vec![0u8; self.frame_len];
        let filled = fill_buffer(stdout, &mut buffer)
            .map_err(|e| AnalyzerError::DecodeFault(format!("reading ffmpeg output: {}", e)))?;

        if filled == 0 {
            self.finish()?;
            return Ok(None);
        }

        if filled < self.frame_len {
            return Err(AnalyzerError::DecodeFault(format!(
                "truncated frame {} ({} of {} bytes)",
                self.frames_read, filled, self.frame_len
            )));
        }

        self.frames_read += 1;
        Ok(Some(Frame::new(self.info.width, self.info.height, buffer)))
    }

    fn position_ms(&self) -> f64 {
        match (self.info.fps, self.frames_read) {
            (Some(fps), n) if n > 0 => (n - 1) as f64 * 1000.0 / fps,
            _ => 0.0,
        }
    }

    fn release(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!("ffmpeg already exited: {}", e);
            }
            if let Err(e) = child.wait() {
                warn!("Failed to reap ffmpeg process: {}", e);
            }
        }
    }
}

impl Drop for FfmpegDecoder {
    fn drop(&mut self) {
        self.release();
    }
}

/// Read until the buffer is full or the stream ends, returning bytes read
fn fill_buffer(reader: &mut impl Read, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn parse_probe_output(stdout: &[u8]) -> std::result::Result<StreamInfo, String> {
    let probe: serde_json::Value = serde_json::from_slice(stdout)
        .map_err(|e| format!("unreadable ffprobe output: {}", e))?;

    let stream = probe["streams"]
        .as_array()
        .and_then(|streams| streams.first())
        .ok_or_else(|| "no video stream found".to_string())?;

    let width = stream["width"].as_u64().unwrap_or(0) as u32;
    let height = stream["height"].as_u64().unwrap_or(0) as u32;
    if width == 0 || height == 0 {
        return Err(format!("invalid frame size {}x{}", width, height));
    }

    let fps = stream["avg_frame_rate"]
        .as_str()
        .and_then(parse_frame_rate)
        .or_else(|| stream["r_frame_rate"].as_str().and_then(parse_frame_rate));

    Ok(StreamInfo { width, height, fps })
}

/// Parse ffprobe rates like "30000/1001" or "25"
fn parse_frame_rate(s: &str) -> Option<f64> {
    let rate = match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => s.trim().parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_frame_rate_parsing() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn test_probe_output_parsing() {
        let json = br#"{"streams":[{"width":1280,"height":720,"avg_frame_rate":"30/1","r_frame_rate":"30/1"}]}"#;
        let info = parse_probe_output(json).unwrap();

        assert_eq!(info, StreamInfo { width: 1280, height: 720, fps: Some(30.0) });
    }

    #[test]
    fn test_probe_output_falls_back_to_real_frame_rate() {
        let json = br#"{"streams":[{"width":640,"height":480,"avg_frame_rate":"0/0","r_frame_rate":"25/1"}]}"#;
        let info = parse_probe_output(json).unwrap();

        assert_eq!(info.fps, Some(25.0));
    }

    #[test]
    fn test_probe_output_without_video_stream() {
        assert!(parse_probe_output(br#"{"streams":[]}"#).is_err());
        assert!(parse_probe_output(b"not json").is_err());
        assert!(parse_probe_output(br#"{"streams":[{"width":0,"height":0}]}"#).is_err());
    }

    #[test]
    fn test_fill_buffer_reports_short_reads() {
        let mut reader = Cursor::new(vec![7u8; 5]);
        let mut buffer = [0u8; 8];

        assert_eq!(fill_buffer(&mut reader, &mut buffer).unwrap(), 5);
        assert_eq!(fill_buffer(&mut reader, &mut buffer).unwrap(), 0);
    }

    #[test]
    fn test_missing_ffprobe_is_io_error() {
        let backend = FfmpegBackend::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        let result = backend.open(Path::new("video.mp4"));

        assert!(matches!(result, Err(AnalyzerError::Io(_))));
    }
}
