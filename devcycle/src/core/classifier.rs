//! Pass/fail classification of agent output.

use crate::core::types::Verdict;

/// Literal markers that make an output count as passing.
///
/// `PASS` is the generic marker; the phrases are what the reviewer and tester
/// profiles print on success. Matching is case-sensitive.
pub const PASS_MARKERS: [&str; 3] = ["PASS", "No issues", "All tests passed"];

/// Decides whether an agent's textual output reports success.
pub trait Classifier {
    fn classify(&self, output: &str) -> Verdict;
}

/// Substring matcher over a fixed marker list.
#[derive(Debug, Clone)]
pub struct MarkerClassifier {
    markers: Vec<String>,
}

impl MarkerClassifier {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for MarkerClassifier {
    fn default() -> Self {
        Self::new(PASS_MARKERS)
    }
}

impl Classifier for MarkerClassifier {
    fn classify(&self, output: &str) -> Verdict {
        if self
            .markers
            .iter()
            .any(|marker| output.contains(marker.as_str()))
        {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }
}

/// Classify with the default markers.
pub fn classify(output: &str) -> Verdict {
    MarkerClassifier::default().classify(output)
}
