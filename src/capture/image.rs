use std::path::Path;

use opencv::core::Mat;
use opencv::imgcodecs;
use opencv::prelude::*;

use super::{FrameSource, SourceError};

/// A single still image served as a one-frame stream.
pub struct ImageSource {
    frame: Option<Mat>,
}

impl ImageSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let unavailable = || SourceError::Unavailable(path.display().to_string());

        let path_str = path.to_str().ok_or_else(unavailable)?;
        let frame = imgcodecs::imread(path_str, imgcodecs::IMREAD_COLOR)?;
        if frame.empty() {
            return Err(unavailable());
        }

        tracing::debug!(
            path = %path.display(),
            width = frame.cols(),
            height = frame.rows(),
            "image loaded"
        );

        Ok(Self { frame: Some(frame) })
    }
}

impl FrameSource for ImageSource {
    type Frame = Mat;

    fn next_frame(&mut self) -> Result<Option<Mat>, SourceError> {
        Ok(self.frame.take())
    }
}
