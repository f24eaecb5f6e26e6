use crate::{inference_service::InferenceService, model_service::ModelService, state::State};
use axum::{extract, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct Status {
    status: String,
    classes: Vec<String>,
}

pub async fn healthcheck<M: ModelService, S: State>(
    extract::State(service): extract::State<InferenceService<M, S>>,
) -> Json<Status> {
    Json(Status {
        status: "ok".into(),
        classes: service.labels().to_vec(),
    })
}
