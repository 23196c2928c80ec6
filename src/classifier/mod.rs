mod face;
mod onnx;

use thiserror::Error;

use crate::session::Probabilities;

pub use onnx::OnnxClassifier;

/// What a classifier saw in one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inference {
    /// Scores in percent, keyed by category label.
    Scored(Probabilities),
    NoSubject,
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("opencv error: {0}")]
    OpenCv(#[from] opencv::Error),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("unexpected model output: {0}")]
    Model(String),
}

pub trait Classifier<F> {
    fn infer(&mut self, frame: &F) -> Result<Inference, ClassifierError>;
}
