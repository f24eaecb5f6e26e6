use crate::{
    inference_service::{ClassifyError, InferenceService},
    model_service::ModelService,
    prediction::Prediction,
    state::State,
};
use axum::{
    body::Bytes,
    extract::{
        self,
        multipart::{Multipart, MultipartError, MultipartRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

const PHOTO_FIELD: &str = "photo";
const EXPECTED_LABEL_FIELD: &str = "expected_label";

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("No photo file provided")]
    MissingPhoto,
    #[error("Malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Classify(#[from] ClassifyError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let status = match &self {
            PredictError::MissingPhoto => StatusCode::BAD_REQUEST,
            PredictError::Multipart(err) => err.status(),
            PredictError::Classify(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("Prediction error: {}", self);
        } else {
            tracing::warn!("Rejected prediction request: {}", self);
        }

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// `POST /predict`: multipart upload with a `photo` file and an optional
/// `expected_label` text field. A `photo` part without a filename is not a file.
#[instrument(skip_all)]
pub async fn predict<M: ModelService, S: State>(
    extract::State(service): extract::State<InferenceService<M, S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Prediction>, PredictError> {
    let mut multipart = multipart.map_err(|rejection| {
        tracing::debug!("Not a multipart request: {}", rejection.body_text());
        PredictError::MissingPhoto
    })?;

    let mut photo: Option<Bytes> = None;
    let mut expected_label = String::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        let is_file = field.file_name().is_some();
        match name.as_deref() {
            Some(PHOTO_FIELD) if is_file => photo = Some(field.bytes().await?),
            Some(EXPECTED_LABEL_FIELD) => expected_label = field.text().await?.trim().to_string(),
            _ => {}
        }
    }

    let photo = photo.ok_or(PredictError::MissingPhoto)?;
    tracing::debug!(
        "Received photo of {} bytes, expected label {:?}",
        photo.len(),
        expected_label
    );

    let prediction = service.classify(photo.to_vec(), expected_label).await?;

    Ok(Json(prediction))
}
