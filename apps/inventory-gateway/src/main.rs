use std::net::SocketAddr;

use anyhow::Result;
use axum::serve;
use inv_gateway::config::GatewayConfig;
use inv_gateway::http::build_router;
use inv_gateway::state::App;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    inv_telemetry::init_logging("inventory-gateway");

    let config = GatewayConfig::from_env()?;
    let addr = config.addr;
    let app = App::bootstrap(config).await?;
    let router = build_router(app.state.clone());

    let listener = TcpListener::bind(addr).await?;
    info!("inventory-gateway listening on {addr}");

    serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        tokio::signal::ctrl_c().await.ok();
    })
    .await?;

    app.shutdown();
    Ok(())
}
