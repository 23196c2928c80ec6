use ndarray::Array4;
use opencv::core::{Mat, Size};
use opencv::imgproc;
use opencv::prelude::*;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;

use crate::config::ClassifierConfig;
use crate::session::Probabilities;

use super::face::FaceLocator;
use super::{Classifier, ClassifierError, Inference};

/// ONNX image classifier over a face crop (or the whole frame when no face
/// cascade is configured). Output index `i` is the score of `labels[i]`.
pub struct OnnxClassifier {
    session: Session,
    face_locator: Option<FaceLocator>,
    labels: Vec<String>,
    input_size: u32,
    apply_softmax: bool,
    mean: [f32; 3],
    std: [f32; 3],
}

impl OnnxClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads)?;

        let model_path = &config.model_path;
        let session = if model_path.starts_with("http://") || model_path.starts_with("https://") {
            builder.commit_from_url(model_path)?
        } else {
            builder.commit_from_file(model_path)?
        };

        let face_locator = match &config.face_cascade {
            Some(path) => Some(FaceLocator::new(path, config.min_face_size)?),
            None => None,
        };

        tracing::info!(
            model = %model_path,
            labels = ?config.labels,
            face_detection = face_locator.is_some(),
            "classifier loaded"
        );

        Ok(Self {
            session,
            face_locator,
            labels: config.labels.clone(),
            input_size: config.input_size,
            apply_softmax: config.apply_softmax,
            mean: config.mean,
            std: config.std,
        })
    }

    fn preprocess(&self, region: &Mat) -> Result<Array4<f32>, ClassifierError> {
        let side = self.input_size as i32;

        let mut resized = Mat::default();
        imgproc::resize(
            region,
            &mut resized,
            Size::new(side, side),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;

        let mut rgb = Mat::default();
        imgproc::cvt_color(&resized, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

        let data = rgb.data_bytes()?;
        let size = self.input_size as usize;
        if data.len() < size * size * 3 {
            return Err(ClassifierError::Model("frame data too small".to_string()));
        }

        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for y in 0..size {
            for x in 0..size {
                let idx = (y * size + x) * 3;
                for c in 0..3 {
                    let value = data[idx + c] as f32 / 255.0;
                    tensor[[0, c, y, x]] = (value - self.mean[c]) / self.std[c];
                }
            }
        }

        Ok(tensor)
    }
}

impl Classifier<Mat> for OnnxClassifier {
    fn infer(&mut self, frame: &Mat) -> Result<Inference, ClassifierError> {
        if frame.rows() == 0 || frame.cols() == 0 {
            return Err(ClassifierError::Model("empty frame".to_string()));
        }

        let face;
        let region = match &mut self.face_locator {
            Some(locator) => match locator.largest_face(frame)? {
                Some(rect) => {
                    face = Mat::roi(frame, rect)?.try_clone()?;
                    &face
                }
                None => return Ok(Inference::NoSubject),
            },
            None => frame,
        };

        let input = self.preprocess(region)?;

        let tensor = TensorRef::from_array_view(input.view())
            .map_err(|e| ClassifierError::Inference(e.to_string()))?
            .into_dyn();
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;
        let raw: Vec<f32> = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| ClassifierError::Inference(e.to_string()))?
            .iter()
            .copied()
            .collect();

        to_percentages(&raw, &self.labels, self.apply_softmax).map(Inference::Scored)
    }
}

fn softmax(values: &[f32]) -> Vec<f32> {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = values.iter().map(|v| (v - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.iter().map(|e| e / total).collect()
}

/// Maps a model output vector onto labels as percentages.
fn to_percentages(
    raw: &[f32],
    labels: &[String],
    apply_softmax: bool,
) -> Result<Probabilities, ClassifierError> {
    if raw.len() != labels.len() {
        return Err(ClassifierError::Model(format!(
            "expected {} scores, got {}",
            labels.len(),
            raw.len()
        )));
    }

    let scores = if apply_softmax {
        softmax(raw)
    } else {
        raw.to_vec()
    };

    Ok(labels
        .iter()
        .cloned()
        .zip(scores.iter().map(|s| *s as f64 * 100.0))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["Woman".to_string(), "Man".to_string()]
    }

    #[test]
    fn softmax_normalises() {
        let p = softmax(&[2.0, 1.0, 0.1]);
        let total: f32 = p.iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert!(p[0] > p[1] && p[1] > p[2]);
    }

    #[test]
    fn softmax_handles_large_logits() {
        let p = softmax(&[1000.0, 1000.0]);
        assert!((p[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn scores_become_percentages_keyed_by_label() {
        let p = to_percentages(&[0.25, 0.75], &labels(), false).unwrap();
        assert!((p["Woman"] - 25.0).abs() < 1e-4);
        assert!((p["Man"] - 75.0).abs() < 1e-4);

        let p = to_percentages(&[0.0, 0.0], &labels(), true).unwrap();
        assert!((p["Woman"] - 50.0).abs() < 1e-4);
    }

    #[test]
    fn output_length_must_match_labels() {
        let err = to_percentages(&[0.1, 0.2, 0.7], &labels(), true).unwrap_err();
        assert!(matches!(err, ClassifierError::Model(ref m) if m.contains("expected 2")));
    }
}
