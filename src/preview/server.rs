//! WebSocket endpoint for viewers.
//!
//! Two plain threads: one accepts and handshakes connections, one polls the
//! open sessions for inbound frames. Both stop once shutdown is requested.

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;

use super::{PreviewHub, WsTransport};
use crate::core::is_shutdown;

/// Maximum port retry attempts
const MAX_PORT_RETRIES: u16 = 10;

/// How often idle threads wake up.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Handshake must finish within this time.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Start the viewer WebSocket server. Returns the port actually bound.
pub fn start_ws_server(hub: Arc<PreviewHub>, interface: IpAddr, base_port: u16) -> Result<u16> {
    let (listener, actual_port) = try_bind_port(interface, base_port, MAX_PORT_RETRIES)?;
    listener.set_nonblocking(true)?;

    let acceptor_hub = Arc::clone(&hub);
    thread::spawn(move || accept_loop(&listener, &acceptor_hub));
    thread::spawn(move || {
        while !is_shutdown() {
            thread::sleep(POLL_INTERVAL);
            hub.poll_inbound();
        }
        hub.close_all();
    });

    Ok(actual_port)
}

fn accept_loop(listener: &TcpListener, hub: &PreviewHub) {
    while !is_shutdown() {
        match listener.accept() {
            Ok((stream, addr)) => {
                crate::debug!("preview"; "viewer connecting from {}", addr);
                if let Err(e) = handshake(stream, hub) {
                    crate::debug!("preview"; "handshake with {} failed: {}", addr, e);
                }
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                crate::log!("preview"; "accept error: {}", e);
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

fn handshake(stream: TcpStream, hub: &PreviewHub) -> Result<()> {
    // Blocking for the handshake, bounded so a silent peer can't stall us.
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
    let ws = tungstenite::accept(stream).map_err(|e| anyhow::anyhow!("{}", e))?;
    ws.get_ref().set_read_timeout(None)?;

    hub.connect(Box::new(WsTransport::new(ws)?))?;
    Ok(())
}

/// Try binding to port, retry with incremented port if in use
fn try_bind_port(interface: IpAddr, base_port: u16, max_retries: u16) -> Result<(TcpListener, u16)> {
    let mut last_error = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind(SocketAddr::new(interface, port)) {
            Ok(listener) => {
                let actual_port = listener.local_addr()?.port();
                if offset > 0 {
                    crate::log!("preview"; "port {} in use, using {} instead", base_port, actual_port);
                }
                return Ok((listener, actual_port));
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(anyhow::anyhow!(
        "failed to bind viewer socket after {} attempts: {}",
        max_retries,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}
