use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use relay_server::client::RelayClient;
use relay_server::logging;

/// Connect to a relay, send one message, print one relayed message.
#[derive(Parser, Debug)]
#[command(name = "relay-client", version)]
struct Args {
    /// Relay base URI
    #[arg(long, env = "RELAY_URI", default_value = "ws://localhost:8765")]
    uri: String,

    /// Client id to connect as (prompted when omitted)
    #[arg(long)]
    client_id: Option<String>,

    /// Message to send (prompted when omitted)
    #[arg(long)]
    message: Option<String>,

    /// Enable structured JSON logging
    #[arg(long, env = "RELAY_JSON_LOGS")]
    json_logs: bool,
}

async fn prompt(
    lines: &mut tokio::io::Lines<BufReader<tokio::io::Stdin>>,
    label: &str,
) -> std::io::Result<String> {
    println!("{}", label);
    Ok(lines.next_line().await?.unwrap_or_default().trim().to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logging::init_tracing(args.json_logs, "relay_server=info,relay_client=info");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let client_id = match args.client_id {
        Some(id) => id,
        None => prompt(&mut lines, "Enter your client ID (e.g., client1 or client2):").await?,
    };

    let mut connection = RelayClient::new(args.uri, client_id).connect().await?;

    let message = match args.message {
        Some(m) => m,
        None => prompt(&mut lines, "Enter message:").await?,
    };
    connection.send(&message).await?;
    tracing::info!(message = %message, "Message sent");

    match connection.recv().await? {
        Some(text) => println!("{}", text),
        None => tracing::info!("Relay closed the connection"),
    }

    connection.close().await?;
    Ok(())
}
