use crate::classifier::{ClassifierError, Inference};

use super::category::{CategorySet, Probabilities};

/// Outcome of classifying one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameResult {
    Scored(Probabilities),
    NoSubject,
    ClassifierError { message: String },
}

impl FrameResult {
    /// Classifies a raw classifier outcome. A score map holding a value that is
    /// not a finite, non-negative number is treated as a failed inference,
    /// even under a label outside the category set: such a value means the
    /// model output as a whole cannot be trusted.
    pub fn from_inference(outcome: Result<Inference, ClassifierError>) -> Self {
        match outcome {
            Ok(Inference::Scored(probabilities)) => {
                if let Some((label, value)) = probabilities
                    .iter()
                    .find(|(_, v)| !v.is_finite() || **v < 0.0)
                {
                    return FrameResult::ClassifierError {
                        message: format!("invalid score for {label}: {value}"),
                    };
                }
                FrameResult::Scored(probabilities)
            }
            Ok(Inference::NoSubject) => FrameResult::NoSubject,
            Err(e) => FrameResult::ClassifierError {
                message: e.to_string(),
            },
        }
    }

    /// Dominant label of this frame alone, recomputed on every call.
    pub fn dominant<'a>(&self, categories: &'a CategorySet) -> Option<&'a str> {
        match self {
            FrameResult::Scored(probabilities) => categories.dominant(probabilities),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(pairs: &[(&str, f64)]) -> Inference {
        Inference::Scored(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }

    #[test]
    fn valid_scores_pass_through() {
        let result = FrameResult::from_inference(Ok(scored(&[("Woman", 70.0), ("Man", 30.0)])));
        assert!(matches!(result, FrameResult::Scored(ref p) if p["Woman"] == 70.0));
    }

    #[test]
    fn non_finite_or_negative_scores_become_errors() {
        for bad in [f64::NAN, f64::INFINITY, -1.0] {
            let result = FrameResult::from_inference(Ok(scored(&[("Woman", bad)])));
            assert!(
                matches!(result, FrameResult::ClassifierError { .. }),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn invalid_score_under_unknown_label_fails_the_frame() {
        let result = FrameResult::from_inference(Ok(scored(&[
            ("Woman", 70.0),
            ("Man", 30.0),
            ("Other", f64::NAN),
        ])));
        match result {
            FrameResult::ClassifierError { message } => assert!(message.contains("Other")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn classifier_failure_keeps_message() {
        let result =
            FrameResult::from_inference(Err(ClassifierError::Model("bad tensor".to_string())));
        match result {
            FrameResult::ClassifierError { message } => assert!(message.contains("bad tensor")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn only_scored_frames_have_a_dominant_label() {
        let set = CategorySet::new(["Woman", "Man"]).unwrap();
        let frame = FrameResult::from_inference(Ok(scored(&[("Woman", 10.0), ("Man", 90.0)])));
        assert_eq!(frame.dominant(&set), Some("Man"));
        assert_eq!(FrameResult::NoSubject.dominant(&set), None);
        assert_eq!(
            FrameResult::ClassifierError {
                message: String::new()
            }
            .dominant(&set),
            None
        );
    }
}
