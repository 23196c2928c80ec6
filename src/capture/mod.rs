mod image;
mod video;

use thiserror::Error;

pub use image::ImageSource;
pub use video::{CaptureTarget, VideoSource};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("could not open {0}")]
    Unavailable(String),
    #[error("opencv error: {0}")]
    OpenCv(#[from] opencv::Error),
}

/// A lazy, possibly endless sequence of frames.
///
/// `Ok(None)` is end-of-stream. Opening is done by each source's own
/// constructor, and release happens on drop.
pub trait FrameSource {
    type Frame;

    fn next_frame(&mut self) -> Result<Option<Self::Frame>, SourceError>;
}
