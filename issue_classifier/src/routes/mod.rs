mod health;
mod predict;

use crate::{inference_service::InferenceService, model_service::ModelService, state::State};
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes<M: ModelService, S: State>() -> Router<InferenceService<M, S>> {
    Router::new()
        .route("/health", get(health::healthcheck::<M, S>))
        .route("/predict", post(predict::predict::<M, S>))
}
