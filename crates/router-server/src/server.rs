//! TCP listeners and top-level server wiring.
//!
//! This module:
//! - Creates the `Router` (and with it the GLOBAL channel).
//! - Binds two TCP listeners (with simple port retry): one for
//!   authoritative server peers, one for client peers.
//! - Accepts connections, registers them, and spawns their I/O tasks.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;
use crate::connection::run_connection;
use crate::registry::Router;
use crate::types::ConnectionType;

/// Max number of times we'll try to bump a port if it's in use.
const MAX_PORT_RETRIES: u16 = 3;

/// Run the router with the given configuration. Never returns under
/// normal operation.
pub async fn run(config: Config) -> Result<()> {
    let router = Router::new(config.channel_settings.clone());

    let server_listener = bind_with_retry(&config.server_addr).await?;
    let client_listener = bind_with_retry(&config.client_addr).await?;

    info!(
        server_addr = %server_listener.local_addr()?,
        client_addr = %client_listener.local_addr()?,
        max_connections = config.max_connections,
        "channel router listening"
    );

    let server_accept = tokio::spawn(accept_loop(
        router.clone(),
        server_listener,
        ConnectionType::Server,
        config.max_connections,
    ));
    let client_accept = tokio::spawn(accept_loop(
        router.clone(),
        client_listener,
        ConnectionType::Client,
        config.max_connections,
    ));

    // Either accept loop failing is fatal.
    tokio::select! {
        res = server_accept => res.context("server accept loop ended")?,
        res = client_accept => res.context("client accept loop ended")?,
    }
}

async fn accept_loop(
    router: Arc<Router>,
    listener: TcpListener,
    conn_type: ConnectionType,
    max_connections: usize,
) -> Result<()> {
    loop {
        let (stream, peer_addr) = listener.accept().await?;

        if router.connection_count() >= max_connections {
            warn!(
                %peer_addr,
                max_connections, "rejecting connection: limit reached"
            );
            // Just drop the stream; the peer sees the connection close.
            continue;
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let conn = router.add_connection(conn_type, out_tx);
        info!(conn_id = conn.id().0, %peer_addr, ?conn_type, "accepted connection");

        let router = router.clone();
        tokio::spawn(async move {
            let conn_id = conn.id();
            if let Err(err) = run_connection(router, conn, stream, out_rx).await {
                warn!(conn_id = conn_id.0, %err, "connection task failed");
            }
        });
    }
}

/// Try to bind, bumping the port by +1 on `AddrInUse`, up to
/// `MAX_PORT_RETRIES` times.
async fn bind_with_retry(addr: &str) -> Result<TcpListener> {
    let parsed: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid listen address {addr:?}"))?;

    let mut attempts: u16 = 0;
    let mut candidate = parsed;
    loop {
        attempts += 1;
        match TcpListener::bind(candidate).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse && attempts < MAX_PORT_RETRIES => {
                warn!(
                    addr = %candidate,
                    attempt = attempts,
                    "port in use, trying the next one"
                );
                candidate.set_port(candidate.port() + 1);
            }
            Err(e) => {
                return Err(anyhow!("failed to bind {candidate}: {e}"));
            }
        }
    }
}
