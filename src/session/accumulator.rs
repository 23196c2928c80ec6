use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::category::CategorySet;
use super::frame_result::FrameResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TimeBudgetExpired,
    UserCancelled,
    SourceExhausted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::TimeBudgetExpired => "time budget expired",
            StopReason::UserCancelled => "cancelled",
            StopReason::SourceExhausted => "end of stream",
        };
        f.write_str(text)
    }
}

/// Final result of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Mean score per category over scored frames. Empty when nothing scored.
    pub averages: BTreeMap<String, f64>,
    pub final_dominant: Option<String>,
    pub frames_seen: u64,
    pub scored_frame_count: u64,
    pub no_subject_count: u64,
    pub error_count: u64,
    pub stop_reason: StopReason,
    #[serde(default)]
    pub elapsed_secs: f64,
}

/// Running per-category sums for a single session.
pub struct SessionAccumulator {
    categories: CategorySet,
    sums: Vec<f64>,
    scored_frame_count: u64,
    no_subject_count: u64,
    error_count: u64,
}

impl SessionAccumulator {
    pub fn new(categories: &CategorySet) -> Self {
        Self {
            categories: categories.clone(),
            sums: vec![0.0; categories.len()],
            scored_frame_count: 0,
            no_subject_count: 0,
            error_count: 0,
        }
    }

    pub fn fold(&mut self, result: &FrameResult) {
        match result {
            FrameResult::Scored(probabilities) => {
                for (sum, label) in self.sums.iter_mut().zip(self.categories.labels()) {
                    *sum += probabilities.get(label).copied().unwrap_or(0.0);
                }
                self.scored_frame_count += 1;
            }
            FrameResult::NoSubject => self.no_subject_count += 1,
            FrameResult::ClassifierError { .. } => self.error_count += 1,
        }
    }

    pub fn frames_seen(&self) -> u64 {
        self.scored_frame_count + self.no_subject_count + self.error_count
    }

    /// Consumes the accumulator into the session verdict.
    pub fn finish(self, stop_reason: StopReason) -> SessionSummary {
        let frames_seen = self.frames_seen();

        let (averages, final_dominant) = if self.scored_frame_count == 0 {
            (BTreeMap::new(), None)
        } else {
            let n = self.scored_frame_count as f64;
            let means: Vec<f64> = self.sums.iter().map(|s| s / n).collect();
            let dominant = self
                .categories
                .argmax_index(|i| means[i])
                .map(|i| self.categories.labels()[i].clone());
            let averages = self
                .categories
                .labels()
                .iter()
                .cloned()
                .zip(means)
                .collect();
            (averages, dominant)
        };

        SessionSummary {
            averages,
            final_dominant,
            frames_seen,
            scored_frame_count: self.scored_frame_count,
            no_subject_count: self.no_subject_count,
            error_count: self.error_count,
            stop_reason,
            elapsed_secs: 0.0,
        }
    }
}
