use crate::session::CategorySet;

use super::summary_log::SessionRecord;

/// How often each category was the session verdict.
#[derive(Debug, PartialEq)]
pub struct DominantTally {
    /// Configured categories first in precedence order, then any other label
    /// found in older records.
    pub counts: Vec<(String, u64)>,
    pub no_verdict: u64,
}

impl DominantTally {
    pub fn from_records(records: &[SessionRecord], categories: &CategorySet) -> Self {
        let mut counts: Vec<(String, u64)> = categories
            .labels()
            .iter()
            .map(|l| (l.clone(), 0))
            .collect();
        let mut no_verdict = 0;

        for record in records {
            match &record.summary.final_dominant {
                Some(label) => match counts.iter_mut().find(|(l, _)| l == label) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((label.clone(), 1)),
                },
                None => no_verdict += 1,
            }
        }

        Self { counts, no_verdict }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|(_, n)| n).sum::<u64>() + self.no_verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionSummary, StopReason};
    use std::collections::BTreeMap;

    fn record(dominant: Option<&str>) -> SessionRecord {
        SessionRecord {
            source: "clip".to_string(),
            actual: None,
            recorded_at: 0,
            summary: SessionSummary {
                averages: BTreeMap::new(),
                final_dominant: dominant.map(str::to_string),
                frames_seen: 0,
                scored_frame_count: 0,
                no_subject_count: 0,
                error_count: 0,
                stop_reason: StopReason::SourceExhausted,
                elapsed_secs: 0.0,
            },
        }
    }

    #[test]
    fn counts_verdicts_in_precedence_order() {
        let categories = CategorySet::new(["Woman", "Man"]).unwrap();
        let records = vec![
            record(Some("Man")),
            record(Some("Woman")),
            record(Some("Man")),
            record(None),
            record(Some("Cat")),
        ];

        let tally = DominantTally::from_records(&records, &categories);
        assert_eq!(
            tally.counts,
            vec![
                ("Woman".to_string(), 1),
                ("Man".to_string(), 2),
                ("Cat".to_string(), 1)
            ]
        );
        assert_eq!(tally.no_verdict, 1);
        assert_eq!(tally.total(), 5);
    }

    #[test]
    fn empty_log_has_zero_counts() {
        let categories = CategorySet::new(["Woman", "Man"]).unwrap();
        let tally = DominantTally::from_records(&[], &categories);
        assert_eq!(tally.total(), 0);
        assert_eq!(tally.counts.len(), 2);
    }
}
