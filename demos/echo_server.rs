//! WebSocket echo server built on a minimal HTTP head parser.
//!
//! Run with: cargo run --example echo_server
//! Then connect with any WebSocket client to ws://127.0.0.1:9001

use std::collections::HashMap;
use std::error::Error;
use std::time::Duration;

use hijack_ws::{Connection, OpCode, accept};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

const ADDR: &str = "127.0.0.1:9001";
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);
const PONG_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "echo_server=info,hijack_ws=debug".into()),
        )
        .init();

    let listener = TcpListener::bind(ADDR).await?;
    info!(addr = ADDR, "echo server listening");

    loop {
        let (stream, addr) = listener.accept().await?;
        info!(%addr, "new connection");

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream).await {
                warn!(%addr, error = %e, "connection error");
            }
        });
    }
}

async fn handle_connection(stream: TcpStream) -> Result<(), Box<dyn Error + Send + Sync>> {
    // Step 1: Read the HTTP request head
    let mut reader = BufReader::new(stream);
    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_string(), value.trim().to_string());
        }
    }

    // Step 2: Take over the stream and upgrade
    let conn = accept(&headers, reader).await?;

    // Step 3: Keep the peer honest
    tokio::spawn(keepalive(conn.clone()));

    // Step 4: Echo until the peer goes away
    let echo = conn.clone();
    conn.subscribe(|mut sub| async move {
        while let Some(packet) = sub.recv().await {
            let result = match packet.opcode {
                OpCode::Text => echo.send(&packet).await,
                OpCode::Binary => echo.send_binary(packet.data).await,
                _ => Ok(()),
            };
            if let Err(e) = result {
                warn!(error = %e, "echo failed");
                break;
            }
        }
    })
    .await;

    info!("connection finished");
    Ok(())
}

async fn keepalive(conn: Connection<TcpStream>) {
    loop {
        tokio::time::sleep(KEEPALIVE_INTERVAL).await;
        match conn.check_alive(PONG_TIMEOUT).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("peer did not answer ping, shutting down");
                let _ = conn.shutdown().await;
                return;
            }
            Err(_) => return,
        }
    }
}
