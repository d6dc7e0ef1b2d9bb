//! # List Tools Demo
//!
//! Connects to a JSON-RPC server over streamable HTTP, sends a `tools/list`
//! request and prints every message the server sends back until Ctrl+C.
//!
//! ## Running
//!
//! ```sh
//! # Start a server exposing /mcp on localhost:8080, then:
//! cargo run --example list_tools
//!
//! # Override the server URL:
//! MCP_BASE_URL=http://my-server:9000 cargo run --example list_tools
//! ```

use streamable_http_transport::{
    JsonRpcMessage, StreamableHttpTransport, TransportConfig, TransportError,
};

/// Default server URL when `MCP_BASE_URL` is not set.
const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let base_url = std::env::var("MCP_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    let config = TransportConfig::new(base_url);
    tracing::info!(url = %config.url(), "connecting");

    let transport = StreamableHttpTransport::builder(config).build()?;

    // ── Connect ─────────────────────────────────────────────────────
    transport
        .connect(|message: JsonRpcMessage| async move {
            match serde_json::to_string_pretty(&message) {
                Ok(text) => println!("{text}"),
                Err(e) => tracing::warn!(error = %e, "could not render message"),
            }
            Ok::<(), TransportError>(())
        })
        .await?;

    // ── Request ─────────────────────────────────────────────────────
    transport
        .send_message(JsonRpcMessage::request(1, "tools/list", None))
        .await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!(state = %transport.state(), "shutting down");
    transport.close_gracefully().await?;
    Ok(())
}
