use axum::Router;
use log::*;
use service::{config::Config, logging::Logger, AppState};
use std::net::SocketAddr;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to initialize logger: {e}");
    }

    info!("Starting up [{}] environment...", config.runtime_env());

    let app_state = match AppState::new(config) {
        Ok(app_state) => app_state,
        Err(e) => {
            error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_server(app_state).await {
        error!("Server exited with error: {e}");
        std::process::exit(1);
    }
}

async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let address = format!("{}:{}", app_state.config.interface(), app_state.config.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Listening for connections on {address}");

    let sse_manager = app_state.sse_manager.clone();
    let app: Router = web::router(app_state);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {e}");
        }
        info!(
            "Shutting down, closing {} event streams",
            sse_manager.connected_clients()
        );
        sse_manager.shutdown();
    })
    .await
}
