use std::collections::BTreeMap;

/// Per-category scores as reported by a classifier, keyed by label.
pub type Probabilities = BTreeMap<String, f64>;

/// The fixed, ordered set of categories a session scores against.
///
/// Order is precedence: when two categories score exactly the same, the one
/// listed first wins. The order is set once from configuration and never
/// derived from classifier output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySet {
    labels: Vec<String>,
}

impl CategorySet {
    /// Builds a set from labels in precedence order. Returns `None` when the
    /// list is empty or contains duplicates.
    pub fn new<I, S>(labels: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return None;
        }
        for (i, label) in labels.iter().enumerate() {
            if labels[..i].contains(label) {
                return None;
            }
        }
        Some(Self { labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Index of the highest score, scanning in precedence order. Ties keep the
    /// earlier category since only a strictly greater score replaces the best.
    pub(crate) fn argmax_index(&self, score: impl Fn(usize) -> f64) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for i in 0..self.labels.len() {
            let s = score(i);
            match best {
                Some((_, best_score)) if s > best_score => best = Some((i, s)),
                None => best = Some((i, s)),
                _ => {}
            }
        }
        best.map(|(i, _)| i)
    }

    /// Dominant label of a single probability map. Missing labels score 0.0.
    pub fn dominant<'a>(&'a self, probabilities: &Probabilities) -> Option<&'a str> {
        let idx = self.argmax_index(|i| {
            probabilities
                .get(&self.labels[i])
                .copied()
                .unwrap_or(0.0)
        })?;
        Some(self.labels[idx].as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probs(pairs: &[(&str, f64)]) -> Probabilities {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn rejects_empty_and_duplicate_labels() {
        assert!(CategorySet::new(Vec::<String>::new()).is_none());
        assert!(CategorySet::new(["Woman", "Man", "Woman"]).is_none());
        assert_eq!(CategorySet::new(["Woman", "Man"]).unwrap().len(), 2);
    }

    #[test]
    fn dominant_picks_highest_score() {
        let set = CategorySet::new(["Woman", "Man"]).unwrap();
        assert_eq!(
            set.dominant(&probs(&[("Woman", 20.0), ("Man", 80.0)])),
            Some("Man")
        );
    }

    #[test]
    fn ties_resolve_to_earlier_category() {
        let set = CategorySet::new(["Woman", "Man"]).unwrap();
        let tied = probs(&[("Man", 50.0), ("Woman", 50.0)]);
        assert_eq!(set.dominant(&tied), Some("Woman"));

        let reversed = CategorySet::new(["Man", "Woman"]).unwrap();
        assert_eq!(reversed.dominant(&tied), Some("Man"));
    }

    #[test]
    fn missing_labels_count_as_zero() {
        let set = CategorySet::new(["a", "b", "c"]).unwrap();
        assert_eq!(set.dominant(&probs(&[("c", 0.5)])), Some("c"));
        assert_eq!(set.dominant(&Probabilities::new()), Some("a"));
    }

    #[test]
    fn unknown_labels_are_ignored() {
        let set = CategorySet::new(["a", "b"]).unwrap();
        assert_eq!(
            set.dominant(&probs(&[("b", 1.0), ("z", 99.0)])),
            Some("b")
        );
    }
}
