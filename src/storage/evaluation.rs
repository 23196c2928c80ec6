use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::session::CategorySet;

use super::summary_log::{SessionRecord, StorageError};

/// Known label per image file name, read from a `Filename,Actual ...` CSV.
#[derive(Debug, Default)]
pub struct GroundTruth {
    labels: HashMap<String, String>,
}

impl GroundTruth {
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// The header must name a `Filename` column and a column starting with
    /// `Actual`. Rows missing either value are skipped; a later row for the
    /// same file wins.
    pub fn parse(text: &str) -> Result<Self, StorageError> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header = split_row(lines.next().unwrap_or_default());

        let file_col = header
            .iter()
            .position(|h| h.eq_ignore_ascii_case("filename"))
            .ok_or_else(|| StorageError::Labels("no Filename column".to_string()))?;
        let label_col = header
            .iter()
            .position(|h| h.to_ascii_lowercase().starts_with("actual"))
            .ok_or_else(|| StorageError::Labels("no Actual column".to_string()))?;

        let mut labels = HashMap::new();
        for (n, line) in lines.enumerate() {
            let row = split_row(line);
            match (row.get(file_col), row.get(label_col)) {
                (Some(file), Some(label)) if !file.is_empty() && !label.is_empty() => {
                    labels.insert(file.clone(), label.clone());
                }
                _ => tracing::warn!(row = n + 2, "skipping incomplete label row"),
            }
        }

        Ok(Self { labels })
    }

    pub fn get(&self, file_name: &str) -> Option<&str> {
        self.labels.get(file_name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }
}

fn split_row(line: &str) -> Vec<String> {
    line.split(',')
        .map(|field| field.trim().trim_matches('"').trim().to_string())
        .collect()
}

/// Session verdicts scored against their recorded actual labels.
#[derive(Debug, PartialEq)]
pub struct Evaluation {
    /// Configured categories in precedence order, then any other label found
    /// in the records.
    pub labels: Vec<String>,
    /// `confusion[actual][predicted]`. The extra last column counts labelled
    /// sessions that ended without a verdict.
    pub confusion: Vec<Vec<u64>>,
    pub evaluated: u64,
    pub correct: u64,
}

#[derive(Debug, PartialEq)]
pub struct ClassReport {
    pub label: String,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub support: u64,
}

impl ClassReport {
    pub fn f1(&self) -> Option<f64> {
        let (p, r) = (self.precision?, self.recall?);
        if p + r == 0.0 {
            return Some(0.0);
        }
        Some(2.0 * p * r / (p + r))
    }
}

impl Evaluation {
    /// Only records carrying an actual label take part. A labelled session
    /// with no verdict counts as a miss.
    pub fn from_records(records: &[SessionRecord], categories: &CategorySet) -> Self {
        let labelled: Vec<(&str, Option<&str>)> = records
            .iter()
            .filter_map(|r| {
                r.actual
                    .as_deref()
                    .map(|actual| (actual, r.summary.final_dominant.as_deref()))
            })
            .collect();

        let mut labels: Vec<String> = categories.labels().to_vec();
        for (actual, predicted) in &labelled {
            for label in std::iter::once(*actual).chain(*predicted) {
                if !labels.iter().any(|l| l == label) {
                    labels.push(label.to_string());
                }
            }
        }

        let index = |label: &str| labels.iter().position(|l| l == label);
        let none_col = labels.len();
        let mut confusion = vec![vec![0u64; labels.len() + 1]; labels.len()];
        let mut correct = 0;

        for (actual, predicted) in &labelled {
            let Some(row) = index(*actual) else { continue };
            let col = predicted.and_then(|p| index(p)).unwrap_or(none_col);
            confusion[row][col] += 1;
            if col == row {
                correct += 1;
            }
        }

        Self {
            labels,
            confusion,
            evaluated: labelled.len() as u64,
            correct,
        }
    }

    /// Fraction of labelled sessions whose verdict matched. `None` when
    /// nothing was labelled.
    pub fn accuracy(&self) -> Option<f64> {
        (self.evaluated > 0).then(|| self.correct as f64 / self.evaluated as f64)
    }

    pub fn no_verdict(&self, row: usize) -> u64 {
        self.confusion[row][self.labels.len()]
    }

    pub fn class_reports(&self) -> Vec<ClassReport> {
        self.labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let hits = self.confusion[i][i] as f64;
                let predicted: u64 = self.confusion.iter().map(|row| row[i]).sum();
                let support: u64 = self.confusion[i].iter().sum();
                ClassReport {
                    label: label.clone(),
                    precision: (predicted > 0).then(|| hits / predicted as f64),
                    recall: (support > 0).then(|| hits / support as f64),
                    support,
                }
            })
            .collect()
    }
}
