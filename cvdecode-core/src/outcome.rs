//! Per-item transcription outcomes

use crate::error::OutcomeError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A successful transcription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcription {
    /// The transcribed text
    pub text: String,
    /// Audio duration as reported by the inference service
    pub duration: String,
}

/// Result of the single transcription attempt made for one corpus item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionOutcome {
    pub filename: String,
    pub result: std::result::Result<Transcription, OutcomeError>,
}

impl TranscriptionOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// The `(generated_text, duration)` pair written into the merged dataset,
    /// or `None` when the outcome carries no usable values
    pub fn merged_values(&self) -> Option<(String, String)> {
        match &self.result {
            Ok(transcription) => Some((transcription.text.clone(), transcription.duration.clone())),
            Err(err) => err.marker().map(|marker| (marker.clone(), marker)),
        }
    }
}

/// Progress event emitted after each completed item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    /// Items finished so far, this one included
    pub completed: usize,
    /// Items admitted to the batch
    pub total: usize,
    /// Item that just finished
    pub filename: String,
    pub succeeded: bool,
}

/// Every outcome of a batch, one per admitted item, in completion order
#[derive(Debug, Clone, Default)]
pub struct BatchOutcomes {
    outcomes: Vec<TranscriptionOutcome>,
    index: HashMap<String, usize>,
}

impl BatchOutcomes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome. Outcomes are write-once per filename: a second outcome
    /// for the same filename is ignored and `false` is returned.
    pub fn insert(&mut self, outcome: TranscriptionOutcome) -> bool {
        if self.index.contains_key(&outcome.filename) {
            return false;
        }
        self.index
            .insert(outcome.filename.clone(), self.outcomes.len());
        self.outcomes.push(outcome);
        true
    }

    pub fn get(&self, filename: &str) -> Option<&TranscriptionOutcome> {
        self.index.get(filename).map(|&i| &self.outcomes[i])
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TranscriptionOutcome> {
        self.outcomes.iter()
    }
}

impl FromIterator<TranscriptionOutcome> for BatchOutcomes {
    fn from_iter<I: IntoIterator<Item = TranscriptionOutcome>>(iter: I) -> Self {
        let mut outcomes = BatchOutcomes::new();
        for outcome in iter {
            outcomes.insert(outcome);
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(filename: &str, text: &str) -> TranscriptionOutcome {
        TranscriptionOutcome {
            filename: filename.to_string(),
            result: Ok(Transcription {
                text: text.to_string(),
                duration: "1.0".to_string(),
            }),
        }
    }

    #[test]
    fn test_outcomes_are_write_once() {
        let mut outcomes = BatchOutcomes::new();
        assert!(outcomes.is_empty());
        assert!(outcomes.insert(success("a.mp3", "first")));
        assert!(!outcomes.insert(success("a.mp3", "second")));

        assert_eq!(outcomes.len(), 1);
        let kept = outcomes.get("a.mp3").unwrap();
        assert_eq!(kept.result.as_ref().unwrap().text, "first");
    }

    #[test]
    fn test_counts() {
        let outcomes: BatchOutcomes = vec![
            success("a.mp3", "hi"),
            TranscriptionOutcome {
                filename: "b.mp3".to_string(),
                result: Err(OutcomeError::Status(500)),
            },
        ]
        .into_iter()
        .collect();

        assert_eq!(outcomes.succeeded(), 1);
        assert_eq!(outcomes.failed(), 1);
        assert_eq!(
            outcomes.get("b.mp3").unwrap().merged_values(),
            Some(("Error: 500".to_string(), "Error: 500".to_string()))
        );
        assert!(outcomes.get("c.mp3").is_none());
        assert!(!outcomes.is_empty());
        let names: Vec<_> = outcomes.iter().map(|o| o.filename.as_str()).collect();
        assert_eq!(names, vec!["a.mp3", "b.mp3"]);
    }
}
