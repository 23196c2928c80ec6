use std::fmt;
use std::path::PathBuf;

use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};

use super::{FrameSource, SourceError};

#[derive(Debug, Clone)]
pub enum CaptureTarget {
    Device(i32),
    File(PathBuf),
}

impl fmt::Display for CaptureTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureTarget::Device(index) => write!(f, "device {index}"),
            CaptureTarget::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Frames from a capture device or a stored clip.
pub struct VideoSource {
    capture: VideoCapture,
    target: CaptureTarget,
    frames_read: u64,
}

impl VideoSource {
    pub fn open(target: CaptureTarget) -> Result<Self, SourceError> {
        let capture = match &target {
            CaptureTarget::Device(index) => VideoCapture::new(*index, videoio::CAP_ANY)?,
            CaptureTarget::File(path) => {
                if !path.is_file() {
                    return Err(SourceError::Unavailable(target.to_string()));
                }
                let path = path
                    .to_str()
                    .ok_or_else(|| SourceError::Unavailable(target.to_string()))?;
                VideoCapture::from_file(path, videoio::CAP_ANY)?
            }
        };

        if !capture.is_opened()? {
            return Err(SourceError::Unavailable(target.to_string()));
        }

        tracing::info!(source = %target, "capture opened");

        Ok(Self {
            capture,
            target,
            frames_read: 0,
        })
    }
}

impl FrameSource for VideoSource {
    type Frame = Mat;

    fn next_frame(&mut self) -> Result<Option<Mat>, SourceError> {
        let mut frame = Mat::default();
        if !self.capture.read(&mut frame)? || frame.empty() {
            return Ok(None);
        }
        self.frames_read += 1;
        Ok(Some(frame))
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        if let Err(e) = self.capture.release() {
            tracing::warn!(source = %self.target, error = %e, "failed to release capture");
        }
        tracing::debug!(
            source = %self.target,
            frames = self.frames_read,
            "capture released"
        );
    }
}
