//! `gatehook serve`

use std::net::IpAddr;

use anyhow::Result;

use gatehook_core::GatewayConfig;

/// Run the serve command.
pub async fn run(host: IpAddr, port: u16, gateway: GatewayConfig) -> Result<()> {
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let config = gatehook_server::ServerConfig {
        host,
        port,
        gateway,
    };

    tokio::select! {
        result = gatehook_server::start_server(config) => {
            result?;
        }
        _ = shutdown_signal => {
            tracing::info!("Shutting down");
        }
    }

    Ok(())
}
