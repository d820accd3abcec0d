//! Minimal echo server: accepts one connection and echoes frames back.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --features cli -- send <printed path> --json '{"hello":"world"}' --wait

use linewire::frame::{CancellationToken, Endpoint, EndpointConfig};
use linewire::transport::UnixDomainSocket;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("linewire-echo-{}", std::process::id()));
    std::fs::create_dir_all(&sock_dir)?;
    let sock_path = sock_dir.join("echo.sock");

    let listener = UnixDomainSocket::bind(&sock_path)?;
    eprintln!("Listening on {}", sock_path.display());

    let stream = listener.accept().await?;
    let endpoint = Endpoint::from_stream(stream, EndpointConfig::line())?;
    let cancel = CancellationToken::new();
    eprintln!("Peer connected");

    while let Some(message) = endpoint.read::<serde_json::Value>(&cancel).await? {
        eprintln!("Received {message}");
        endpoint.write(&message, &cancel).await?;
    }

    eprintln!("Peer disconnected");
    endpoint.dispose().await;
    drop(listener);
    let _ = std::fs::remove_dir_all(&sock_dir);
    Ok(())
}
