use relay_server::config::{generate_config_template, RelayConfig};
use relay_server::logging;
use relay_server::server::RelayServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = RelayConfig::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    logging::init_tracing(config.json_logs, "relay_server=info");

    tracing::info!("relay server v{} starting", env!("CARGO_PKG_VERSION"));

    let server = RelayServer::bind(&config).await?;

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Ctrl-C received, shutting down");
                shutdown.cancel();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    server.run().await?;

    Ok(())
}
