use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imagegen_serving::{api, engine::ImageCompletionEngine};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imagegen_serving=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install metrics recorder");

    let engine = Arc::new(ImageCompletionEngine::new());

    let app = Router::new()
        .route("/v1/chat/completions", post(api::routes::chat_completions))
        .route("/v1/models", get(api::routes::models_list))
        .route("/metrics", get(move || std::future::ready(prometheus.render())))
        .with_state(engine);

    let listener = TcpListener::bind("0.0.0.0:3000").await.unwrap();
    tracing::debug!("listening on {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.unwrap();
}
