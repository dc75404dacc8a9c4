//! HTTP endpoint serving the latest output of each project.
//!
//! `GET /output/<percent-encoded root path>` returns the artifact of the most
//! recent usable build. Responses are never cached: a viewer reloads the same
//! URL after every `refresh`.

use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use percent_encoding::{NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

use super::PreviewHub;
use crate::log;

/// Maximum number of port binding attempts.
const MAX_PORT_RETRIES: u16 = 10;

const OUTPUT_PREFIX: &str = "/output/";

/// Bind to the specified interface and port, with automatic port retry.
pub fn bind_with_retry(interface: IpAddr, base_port: u16) -> Result<(Server, SocketAddr)> {
    let mut last_error = String::new();
    for offset in 0..MAX_PORT_RETRIES {
        let port = base_port.saturating_add(offset);
        match Server::http(SocketAddr::new(interface, port)) {
            Ok(server) => {
                let addr = server
                    .server_addr()
                    .to_ip()
                    .unwrap_or_else(|| SocketAddr::new(interface, port));
                if offset > 0 {
                    log!("preview"; "port {} in use, using {} instead", base_port, addr.port());
                }
                return Ok((server, addr));
            }
            Err(e) => last_error = e.to_string(),
        }
    }
    Err(anyhow::anyhow!(
        "failed to bind after {} attempts (ports {}-{}): {}",
        MAX_PORT_RETRIES,
        base_port,
        base_port.saturating_add(MAX_PORT_RETRIES - 1),
        last_error
    ))
}

/// URL under which the output of `root` is served.
pub fn output_url(addr: SocketAddr, root: &Path) -> String {
    let encoded = utf8_percent_encode(&root.to_string_lossy(), NON_ALPHANUMERIC).to_string();
    format!("http://{addr}{OUTPUT_PREFIX}{encoded}")
}

/// Start serving on a background thread.
///
/// The server is registered for shutdown, so Ctrl+C unblocks the request loop.
pub fn start_http_server(
    hub: Arc<PreviewHub>,
    interface: IpAddr,
    base_port: u16,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let (server, addr) = bind_with_retry(interface, base_port)?;
    let server = Arc::new(server);
    crate::core::register_server(Arc::clone(&server));

    let handle = thread::spawn(move || {
        for request in server.incoming_requests() {
            if let Err(e) = handle_request(request, &hub) {
                crate::debug!("preview"; "request error: {e}");
            }
        }
    });
    Ok((addr, handle))
}

fn handle_request(request: Request, hub: &PreviewHub) -> Result<()> {
    if !matches!(request.method(), Method::Get | Method::Head) {
        return respond_status(request, 405);
    }
    match artifact_for(request.url(), hub) {
        Some(path) if path.is_file() => respond_file(request, &path),
        _ => respond_status(request, 404),
    }
}

/// Map a request URL to the artifact it names.
fn artifact_for(url: &str, hub: &PreviewHub) -> Option<PathBuf> {
    let encoded = url.strip_prefix(OUTPUT_PREFIX)?;
    let encoded = encoded.split(['?', '#']).next().unwrap_or(encoded);
    let decoded = percent_decode_str(encoded).decode_utf8().ok()?;
    let root = crate::utils::normalize_path(Path::new(decoded.as_ref()));
    hub.artifact(&root)
}

fn respond_file(request: Request, path: &Path) -> Result<()> {
    let content_type = content_type(path);
    if request.method() == &Method::Head {
        let response = Response::empty(StatusCode(200))
            .with_header(header("Content-Type", content_type))
            .with_header(header("Cache-Control", "no-store"));
        request.respond(response)?;
        return Ok(());
    }

    let body = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let response = Response::from_data(body)
        .with_header(header("Content-Type", content_type))
        .with_header(header("Cache-Control", "no-store"));
    request.respond(response)?;
    Ok(())
}

fn respond_status(request: Request, code: u16) -> Result<()> {
    request.respond(Response::empty(StatusCode(code)))?;
    Ok(())
}

fn header(name: &str, value: &str) -> Header {
    // Both halves are ASCII literals or fixed MIME strings.
    Header::from_bytes(name.as_bytes(), value.as_bytes()).expect("valid header")
}

fn content_type(path: &Path) -> &'static str {
    match crate::utils::path::extension(path).as_deref() {
        Some("pdf") => "application/pdf",
        Some("svg") => "image/svg+xml",
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("dvi") => "application/x-dvi",
        Some("ps") => "application/postscript",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}
