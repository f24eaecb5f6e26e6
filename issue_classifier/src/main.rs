use issue_classifier::{config, start_server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::get_configuration();
    let log_level = match &config {
        Ok(config) => config.log_level.as_str(),
        Err(_) => "info",
    };
    let log_level = &format!("{},ort=warn", log_level);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().json().with_level(true))
        .init();

    let config = config
        .and_then(|config| config.validate().map(|_| config))
        .inspect_err(|e| tracing::error!("Configuration failed: {}", e))?;

    if let Err(e) = start_server(config).await {
        tracing::error!("Inference service failed: {}", e);
        return Err(e);
    }

    Ok(())
}
