use std::path::Path;

use opencv::core::{Mat, Rect, Size, Vector};
use opencv::imgproc;
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;

const SCALE_FACTOR: f64 = 1.1;
const MIN_NEIGHBORS: i32 = 5;

/// Haar-cascade face finder used to decide whether a frame has a subject.
pub struct FaceLocator {
    cascade: CascadeClassifier,
    min_size: i32,
}

impl FaceLocator {
    pub fn new(
        cascade_path: &Path,
        min_size: i32,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let path = cascade_path
            .to_str()
            .ok_or("cascade path is not valid UTF-8")?;
        let cascade = CascadeClassifier::new(path)?;
        if cascade.empty()? {
            return Err(format!("failed to load face cascade {}", cascade_path.display()).into());
        }

        Ok(Self { cascade, min_size })
    }

    /// Largest face in a BGR frame.
    pub fn largest_face(&mut self, frame: &Mat) -> opencv::Result<Option<Rect>> {
        let mut gray = Mat::default();
        imgproc::cvt_color(frame, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;
        let mut equalized = Mat::default();
        imgproc::equalize_hist(&gray, &mut equalized)?;

        let mut faces = Vector::<Rect>::new();
        self.cascade.detect_multi_scale(
            &equalized,
            &mut faces,
            SCALE_FACTOR,
            MIN_NEIGHBORS,
            0,
            Size::new(self.min_size, self.min_size),
            Size::new(0, 0),
        )?;

        Ok(faces.iter().max_by_key(|r| r.area()))
    }
}
