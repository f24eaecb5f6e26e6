use serde::{ser::SerializeMap, Serialize, Serializer};
use thiserror::Error;

const LOW_CONFIDENCE_SUFFIX: &str = " (low confidence)";
const OUTPUT_DECIMALS: i32 = 4;

#[derive(Error, Debug, PartialEq)]
pub enum ScoreError {
    #[error("Model returned no scores")]
    EmptyOutput,
    #[error("Predicted index {index} out of range for {labels} class labels")]
    IndexOutOfRange { index: usize, labels: usize },
}

/// Per-class scores keyed by label, serialized as a JSON object in label order.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreDistribution(Vec<(String, f64)>);

#[cfg(test)]
impl ScoreDistribution {
    pub fn get(&self, label: &str) -> Option<f64> {
        self.0
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, score)| *score)
    }

    pub fn max(&self) -> Option<f64> {
        self.0.iter().map(|(_, score)| *score).reduce(f64::max)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ScoreDistribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, score) in &self.0 {
            map.serialize_entry(label, score)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub predicted_class: String,
    pub confidence: f64,
    pub is_match: bool,
    pub expected_label: String,
    pub all_predictions: ScoreDistribution,
}

/// Index and value of the highest score. Ties go to the lowest index.
pub fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .reduce(|best, current| if current.1 > best.1 { current } else { best })
}

pub fn round_score(score: f32) -> f64 {
    let factor = 10f64.powi(OUTPUT_DECIMALS);
    (score as f64 * factor).round() / factor
}

/// Turns raw model scores into a [`Prediction`].
///
/// Below `threshold` the prediction is accepted whatever the expected label
/// is, and the label is annotated as low confidence. At or above it the
/// predicted and expected labels must be equal ignoring case.
pub fn evaluate_scores(
    scores: &[f32],
    labels: &[String],
    threshold: f32,
    expected_label: &str,
) -> Result<Prediction, ScoreError> {
    let (index, confidence) = argmax(scores).ok_or(ScoreError::EmptyOutput)?;
    let label = labels.get(index).ok_or(ScoreError::IndexOutOfRange {
        index,
        labels: labels.len(),
    })?;

    let (predicted_class, is_match) = if confidence < threshold {
        (format!("{}{}", label, LOW_CONFIDENCE_SUFFIX), true)
    } else {
        (
            label.clone(),
            label.to_lowercase() == expected_label.to_lowercase(),
        )
    };

    let all_predictions = ScoreDistribution(
        labels
            .iter()
            .zip(scores)
            .map(|(label, score)| (label.clone(), round_score(*score)))
            .collect(),
    );

    Ok(Prediction {
        predicted_class,
        confidence: round_score(confidence),
        is_match,
        expected_label: expected_label.to_string(),
        all_predictions,
    })
}
