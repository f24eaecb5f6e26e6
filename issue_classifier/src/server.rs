use crate::{
    config::{Config, ServerConfig},
    inference_service::InferenceService,
    model_service::ModelService,
    ort_service::OrtModelService,
    preprocess::ImageTransform,
    routes::api_routes,
    state::{ServiceState, State},
};
use axum::{extract::DefaultBodyLimit, Router};
use tokio::{net::TcpListener, signal};

pub fn build_router<M: ModelService, S: State>(
    inference_service: InferenceService<M, S>,
    max_upload_bytes: usize,
) -> Router {
    api_routes::<M, S>()
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(inference_service)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new<M: ModelService, S: State>(
        inference_service: InferenceService<M, S>,
        config: &ServerConfig,
    ) -> anyhow::Result<Self> {
        let router = build_router(inference_service, config.max_upload_bytes);
        let listener = TcpListener::bind(config.get_address()).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!("Inference service listening on {}", self.listener.local_addr()?);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async {
                shutdown_signal().await;
                tracing::info!("Shutdown signal received, starting graceful shutdown")
            })
            .await?;

        Ok(())
    }
}

pub async fn start_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Loading model from {}", config.model.get_path().display());
    let ort_model_service = OrtModelService::new(&config.model)?;
    let service_state = ServiceState::new(&config.classifier)?;
    let transform = ImageTransform::new(config.model.image_size, config.model.layout);

    let inference_service = InferenceService::new(ort_model_service, service_state, transform);
    inference_service.verify_output_width()?;
    tracing::info!(
        "Model ready, input shape {:?}, classes {:?}, confidence threshold {}",
        transform.input_shape(),
        inference_service.labels(),
        config.classifier.confidence_threshold
    );

    let http_server = HttpServer::new(inference_service, &config.server).await?;
    http_server.run().await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
