use crate::{
    model_service::{ModelError, ModelService},
    prediction::{evaluate_scores, Prediction, ScoreError},
    preprocess::{ImageTransform, PreprocessError},
    state::State,
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error(transparent)]
    Decode(#[from] PreprocessError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Scores(#[from] ScoreError),
    #[error("label list has {labels} entries but model emits {scores} scores")]
    LabelMismatch { labels: usize, scores: usize },
    #[error("inference task failed: {0}")]
    Task(String),
}

pub struct InferenceService<M: ModelService, S: State> {
    model_service: Arc<M>,
    service_state: Arc<S>,
    transform: ImageTransform,
}

impl<M: ModelService, S: State> Clone for InferenceService<M, S> {
    fn clone(&self) -> Self {
        Self {
            model_service: self.model_service.clone(),
            service_state: self.service_state.clone(),
            transform: self.transform,
        }
    }
}

impl<M: ModelService, S: State> InferenceService<M, S> {
    pub fn new(model_service: M, state: S, transform: ImageTransform) -> Self {
        Self {
            model_service: Arc::new(model_service),
            service_state: Arc::new(state),
            transform,
        }
    }

    pub fn labels(&self) -> &[String] {
        self.service_state.get_labels()
    }

    /// Runs the model once on a blank image and checks that it emits one score
    /// per configured label.
    pub fn verify_output_width(&self) -> Result<(), ClassifyError> {
        let scores = self.model_service.predict(&self.transform.blank_input())?;
        let labels = self.labels().len();
        if scores.len() != labels {
            return Err(ClassifyError::LabelMismatch {
                labels,
                scores: scores.len(),
            });
        }
        Ok(())
    }

    /// Decode, resize, run the model and judge the result against
    /// `expected_label`. Blocking.
    pub fn classify_blocking(
        &self,
        image_data: &[u8],
        expected_label: &str,
    ) -> Result<Prediction, ClassifyError> {
        let input = self.transform.transform(image_data)?;
        let scores = self.model_service.predict(&input)?;

        let prediction = evaluate_scores(
            &scores,
            self.labels(),
            self.service_state.confidence_threshold(),
            expected_label,
        )?;

        tracing::debug!(
            "Predicted {} ({:.4}), expected {:?}, match={}",
            prediction.predicted_class,
            prediction.confidence,
            prediction.expected_label,
            prediction.is_match
        );

        Ok(prediction)
    }

    pub async fn classify(
        &self,
        image_data: Vec<u8>,
        expected_label: String,
    ) -> Result<Prediction, ClassifyError> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.classify_blocking(&image_data, &expected_label))
            .await
            .map_err(|e| ClassifyError::Task(e.to_string()))?
    }
}
