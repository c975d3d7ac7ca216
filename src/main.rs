use std::sync::Arc;

use tokio::net::TcpListener;

use fruit_quality_service::{AppConfig, InferenceRuntime, build_router, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!(
        model_path = %config.model_path.display(),
        classes_path = %config.classes_path.display(),
        device = ?config.device,
        "loading model artifacts"
    );

    let runtime = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || InferenceRuntime::initialize(&config)).await?
    };
    tracing::info!(
        classes = ?runtime.classes(),
        model_loaded = runtime.is_loaded(),
        "inference runtime ready"
    );
    let router = build_router(config.clone(), Arc::new(runtime));

    let listener = TcpListener::bind(config.listen_addr).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "REST server ready");

    axum::serve(listener, router).await?;

    Ok(())
}
