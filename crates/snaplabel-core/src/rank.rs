//! Presentation ordering for prediction results

use serde::Serialize;

/// One row of the ranked probability breakdown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    pub label: String,
    pub probability: f32,
    /// `probability` expressed in percent
    pub percent: f32,
    /// Set on the row whose label equals the predicted label
    pub highlighted: bool,
}

/// Order `(label, probability)` pairs for display.
///
/// Descending by probability; equal probabilities keep their input order.
/// A row is highlighted when its label is exactly `predicted_label`, so the
/// top pick is never recomputed from floats.
pub fn rank<'a, I>(entries: I, predicted_label: &str) -> Vec<RankedEntry>
where
    I: IntoIterator<Item = (&'a str, f32)>,
{
    let mut ranked: Vec<RankedEntry> = entries
        .into_iter()
        .map(|(label, probability)| RankedEntry {
            label: label.to_string(),
            probability,
            percent: probability * 100.0,
            highlighted: label == predicted_label,
        })
        .collect();

    // sort_by is stable
    ranked.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    ranked
}
