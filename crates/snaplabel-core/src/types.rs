//! Core data types: class vocabulary and prediction results

use crate::error::{Error, Result};
use crate::rank::{rank, RankedEntry};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::sync::Arc;

/// Position of a class label inside a [`Vocabulary`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ClassId(usize);

impl ClassId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// Fixed, ordered set of class labels a predictor can output.
///
/// Built once from the model artifact and shared by every prediction made
/// against it. Labels are non-empty and unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    labels: Box<[String]>,
}

impl Vocabulary {
    /// Build a vocabulary, rejecting empty or duplicated labels
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(Error::model_load("vocabulary has no labels"));
        }

        let mut seen = HashSet::with_capacity(labels.len());
        for label in &labels {
            if label.is_empty() {
                return Err(Error::model_load("vocabulary contains an empty label"));
            }
            if !seen.insert(label.as_str()) {
                return Err(Error::model_load(format!(
                    "vocabulary contains duplicate label '{}'",
                    label
                )));
            }
        }

        Ok(Self {
            labels: labels.into_boxed_slice(),
        })
    }

    /// Number of classes
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always false for a constructed vocabulary
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label for a class id
    pub fn get(&self, id: ClassId) -> Option<&str> {
        self.labels.get(id.0).map(String::as_str)
    }

    /// Class id for a label
    pub fn position(&self, label: &str) -> Option<ClassId> {
        self.labels.iter().position(|l| l == label).map(ClassId)
    }

    /// Labels in vocabulary order
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClassId, &str)> {
        self.labels
            .iter()
            .enumerate()
            .map(|(i, l)| (ClassId(i), l.as_str()))
    }
}

impl Serialize for Vocabulary {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.labels.serialize(serializer)
    }
}

/// Normalized output of one prediction.
///
/// Holds one probability per vocabulary entry, in vocabulary order, and the
/// class the predictor chose. Construction validates the predictor output so
/// that consumers can rely on:
/// - exactly one probability per label
/// - every probability finite and within `[0, 1]`
/// - probabilities summing to 1 within [`PredictionResult::SUM_TOLERANCE`]
/// - the predicted class holding the maximum probability
#[derive(Debug, Clone)]
pub struct PredictionResult {
    vocabulary: Arc<Vocabulary>,
    predicted: ClassId,
    probabilities: Box<[f32]>,
}

impl PredictionResult {
    /// Allowed deviation of the probability sum from 1.0
    pub const SUM_TOLERANCE: f32 = 1e-3;

    pub fn new(
        vocabulary: Arc<Vocabulary>,
        predicted: ClassId,
        probabilities: Vec<f32>,
    ) -> Result<Self> {
        if probabilities.len() != vocabulary.len() {
            return Err(Error::inference(format!(
                "predictor returned {} probabilities for {} classes",
                probabilities.len(),
                vocabulary.len()
            )));
        }

        if let Some((i, p)) = probabilities
            .iter()
            .enumerate()
            .find(|(_, p)| !p.is_finite() || !(0.0..=1.0).contains(*p))
        {
            return Err(Error::inference(format!(
                "probability {} for class '{}' is outside [0, 1]",
                p,
                vocabulary.labels[i]
            )));
        }

        let sum: f32 = probabilities.iter().sum();
        if (sum - 1.0).abs() > Self::SUM_TOLERANCE {
            return Err(Error::inference(format!(
                "probabilities sum to {} instead of 1",
                sum
            )));
        }

        let Some(&chosen) = probabilities.get(predicted.0) else {
            return Err(Error::inference(format!(
                "predicted class index {} is out of range",
                predicted.0
            )));
        };
        let max = probabilities.iter().copied().fold(f32::MIN, f32::max);
        if chosen < max {
            return Err(Error::inference(format!(
                "predicted class '{}' ({}) is not the most probable ({})",
                vocabulary.labels[predicted.0], chosen, max
            )));
        }

        Ok(Self {
            vocabulary,
            predicted,
            probabilities: probabilities.into_boxed_slice(),
        })
    }

    /// Predicted label
    pub fn label(&self) -> &str {
        &self.vocabulary.labels[self.predicted.0]
    }

    /// Predicted class id
    pub fn predicted(&self) -> ClassId {
        self.predicted
    }

    /// Probability of the predicted class
    pub fn confidence(&self) -> f32 {
        self.probabilities[self.predicted.0]
    }

    pub fn probability(&self, id: ClassId) -> Option<f32> {
        self.probabilities.get(id.0).copied()
    }

    pub fn probability_of(&self, label: &str) -> Option<f32> {
        self.vocabulary
            .position(label)
            .and_then(|id| self.probability(id))
    }

    /// Probabilities in vocabulary order
    pub fn probabilities(&self) -> &[f32] {
        &self.probabilities
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.vocabulary
    }

    /// `(label, probability)` pairs in vocabulary order
    pub fn entries(&self) -> impl Iterator<Item = (&str, f32)> {
        self.vocabulary
            .labels
            .iter()
            .map(String::as_str)
            .zip(self.probabilities.iter().copied())
    }

    /// Entries in presentation order with the predicted label flagged
    pub fn ranked(&self) -> Vec<RankedEntry> {
        rank(self.entries(), self.label())
    }
}

struct ProbabilityMap<'a>(&'a PredictionResult);

impl Serialize for ProbabilityMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.probabilities.len()))?;
        for (label, p) in self.0.entries() {
            map.serialize_entry(label, &p)?;
        }
        map.end()
    }
}

impl Serialize for PredictionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PredictionResult", 3)?;
        state.serialize_field("label", self.label())?;
        state.serialize_field("index", &self.predicted)?;
        state.serialize_field("probabilities", &ProbabilityMap(self))?;
        state.end()
    }
}
