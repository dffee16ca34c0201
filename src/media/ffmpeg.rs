//! FFmpeg encoder wrapper
//!
//! Video artifacts are produced by piping raw RGBA frames into an FFmpeg
//! child process. The `FrameEncoder` trait is the seam between the
//! recording/composition logic and the process plumbing.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use thiserror::Error;

use crate::capture::traits::VideoFrame;

/// Media encoding errors.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    #[error("frame size mismatch: got {got}x{got_h}, encoder expects {want}x{want_h}")]
    FrameSize {
        got: u32,
        got_h: u32,
        want: u32,
        want_h: u32,
    },
}

/// Destination for RGBA frames.
///
/// `finish` finalizes the artifact and is called exactly once, after the
/// last frame. Tests substitute an in-memory implementation so the logic
/// around encoding runs without FFmpeg installed.
pub trait FrameEncoder: Send {
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<(), MediaError>;
    fn finish(&mut self) -> Result<(), MediaError>;
}

/// H.264 MP4 encoder backed by an FFmpeg child process.
pub struct FfmpegEncoder {
    process: Option<Child>,
    stdin: Option<ChildStdin>,
    width: u32,
    height: u32,
    frames: u64,
    output: PathBuf,
}

impl FfmpegEncoder {
    /// Spawn FFmpeg reading raw RGBA from stdin and writing an MP4.
    pub fn create(output: &Path, width: u32, height: u32, fps: f64) -> Result<Self, MediaError> {
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let gop = (fps * 2.0).round().max(1.0) as u32;
        let mut process = Command::new("ffmpeg")
            .args([
                "-y",
                "-f",
                "rawvideo",
                "-pixel_format",
                "rgba",
                "-video_size",
                &format!("{width}x{height}"),
                "-framerate",
                &fps.to_string(),
                "-i",
                "-",
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-pix_fmt",
                "yuv420p",
                "-crf",
                "18",
                "-g",
                &gop.to_string(),
                "-movflags",
                "+faststart",
            ])
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MediaError::Ffmpeg(format!("failed to start FFmpeg: {e}")))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| MediaError::Ffmpeg("failed to capture FFmpeg stdin".to_string()))?;

        tracing::info!(
            ?output,
            width,
            height,
            fps,
            "started FFmpeg encoder"
        );

        Ok(Self {
            process: Some(process),
            stdin: Some(stdin),
            width,
            height,
            frames: 0,
            output: output.to_path_buf(),
        })
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl FrameEncoder for FfmpegEncoder {
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<(), MediaError> {
        if frame.width != self.width || frame.height != self.height {
            return Err(MediaError::FrameSize {
                got: frame.width,
                got_h: frame.height,
                want: self.width,
                want_h: self.height,
            });
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::Ffmpeg("encoder already finished".to_string()))?;
        stdin.write_all(&frame.data)?;
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), MediaError> {
        // Closing stdin signals EOF; FFmpeg then flushes the container.
        drop(self.stdin.take());
        if let Some(process) = self.process.take() {
            let output = process.wait_with_output()?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(MediaError::Ffmpeg(format!(
                    "FFmpeg exited with {}: {}",
                    output.status, stderr
                )));
            }
            tracing::info!(output = ?self.output, frames = self.frames, "FFmpeg encoder finished");
        }
        Ok(())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        // An encoder abandoned mid-stream must not leave a child behind.
        if let Some(mut process) = self.process.take() {
            let _ = process.kill();
            let _ = process.wait();
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Collects frames in memory for tests that assert on encoder traffic.
    #[derive(Default)]
    pub struct MemoryEncoder {
        pub frames: Vec<VideoFrame>,
        pub finished: bool,
    }

    impl FrameEncoder for MemoryEncoder {
        fn write_frame(&mut self, frame: &VideoFrame) -> Result<(), MediaError> {
            assert!(!self.finished, "write after finish");
            self.frames.push(frame.clone());
            Ok(())
        }

        fn finish(&mut self) -> Result<(), MediaError> {
            assert!(!self.finished, "double finish");
            self.finished = true;
            Ok(())
        }
    }
}
