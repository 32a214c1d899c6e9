use fin_analyzer::{api, config, logging, service::AnalysisService};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    config::init_config();
    logging::init_tracing(logging::ConsoleTarget::Stdout);
    let config = config::get_config();

    let service =
        AnalysisService::from_config(config).expect("Failed to initialize analysis service");
    let app = api::create_router(Arc::new(service), config.max_upload_bytes);

    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.server_port))
        .await
        .expect("Failed to bind listener");
    tracing::info!("Listening on http://0.0.0.0:{}", config.server_port);
    axum::serve(listener, app).await.expect("Server error");
}
