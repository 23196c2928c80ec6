use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use opencv::core::{Mat, Point, Scalar};
use opencv::highgui;
use opencv::imgproc;
use opencv::prelude::*;

use crate::session::FrameObserver;

const QUIT_KEY: i32 = 'q' as i32;

/// Shows each frame in a HighGUI window with the frame's dominant label.
/// Pressing `q` raises the shared cancel flag.
pub struct PreviewWindow {
    title: String,
    cancel: Arc<AtomicBool>,
    hold: bool,
    last: Option<Mat>,
}

impl PreviewWindow {
    pub fn new(title: impl Into<String>, cancel: Arc<AtomicBool>) -> Self {
        Self {
            title: title.into(),
            cancel,
            hold: false,
            last: None,
        }
    }

    /// Keep the last frame on screen until a key is pressed when the window
    /// closes. Used for still photos.
    pub fn hold_last_frame(mut self) -> Self {
        self.hold = true;
        self
    }

    fn show(&mut self, frame: &Mat, dominant: Option<&str>) -> opencv::Result<()> {
        let mut annotated = frame.try_clone()?;
        if let Some(label) = dominant {
            annotate(&mut annotated, label)?;
        }
        highgui::imshow(&self.title, &annotated)?;

        let key = highgui::wait_key(1)?;
        if key & 0xFF == QUIT_KEY {
            tracing::info!("quit requested from preview window");
            self.cancel.store(true, Ordering::Relaxed);
        }

        if self.hold {
            self.last = Some(annotated);
        }
        Ok(())
    }
}

impl FrameObserver<Mat> for PreviewWindow {
    fn on_frame(&mut self, frame: &Mat, dominant: Option<&str>) {
        if let Err(e) = self.show(frame, dominant) {
            tracing::debug!(error = %e, "preview failed");
        }
    }
}

impl Drop for PreviewWindow {
    fn drop(&mut self) {
        if self.last.is_some() {
            let _ = highgui::wait_key(0);
        }
        let _ = highgui::destroy_all_windows();
    }
}

pub fn annotate(frame: &mut Mat, label: &str) -> opencv::Result<()> {
    imgproc::put_text(
        frame,
        &format!("Dominant: {label}"),
        Point::new(50, 50),
        imgproc::FONT_HERSHEY_SIMPLEX,
        1.0,
        Scalar::new(0.0, 255.0, 0.0, 0.0),
        2,
        imgproc::LINE_8,
        false,
    )
}
