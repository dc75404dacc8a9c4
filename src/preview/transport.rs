//! Connection to one viewer.

use std::io::ErrorKind;
use std::net::TcpStream;

use thiserror::Error;
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("viewer connection closed")]
    Closed,

    #[error("websocket error")]
    Socket(#[from] tungstenite::Error),

    #[error("failed to encode message")]
    Encode(#[from] serde_json::Error),
}

/// A bidirectional text channel to a viewer.
///
/// Implementations must never block: `send` buffers if the peer is slow and
/// `try_recv` returns `Ok(None)` when nothing is pending.
pub trait ViewerTransport: Send {
    fn send(&mut self, text: &str) -> Result<(), DeliveryError>;

    fn try_recv(&mut self) -> Result<Option<String>, DeliveryError>;

    fn close(&mut self);
}

/// WebSocket over a non-blocking TCP stream.
pub struct WsTransport {
    ws: WebSocket<TcpStream>,
}

impl WsTransport {
    /// Wrap an accepted socket, switching it to non-blocking mode.
    pub fn new(ws: WebSocket<TcpStream>) -> std::io::Result<Self> {
        ws.get_ref().set_nonblocking(true)?;
        Ok(Self { ws })
    }
}

fn would_block(err: &tungstenite::Error) -> bool {
    matches!(err, tungstenite::Error::Io(e) if e.kind() == ErrorKind::WouldBlock)
}

impl ViewerTransport for WsTransport {
    fn send(&mut self, text: &str) -> Result<(), DeliveryError> {
        match self.ws.send(Message::Text(text.to_owned().into())) {
            Ok(()) => Ok(()),
            // Queued in the write buffer; flushed by later reads/sends.
            Err(ref err) if would_block(err) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Err(DeliveryError::Closed)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn try_recv(&mut self) -> Result<Option<String>, DeliveryError> {
        loop {
            match self.ws.read() {
                Ok(Message::Text(text)) => return Ok(Some(text.to_string())),
                Ok(Message::Close(_)) => return Err(DeliveryError::Closed),
                // ping, pong, binary
                Ok(_) => {}
                Err(ref err) if would_block(err) => return Ok(None),
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return Err(DeliveryError::Closed);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn close(&mut self) {
        let _ = self.ws.close(None);
        let _ = self.ws.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_non_text_frames_are_skipped() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = thread::spawn(move || {
            let (mut ws, _) = tungstenite::connect(format!("ws://127.0.0.1:{port}")).unwrap();
            ws.send(Message::Ping(vec![1].into())).unwrap();
            ws.send(Message::Binary(vec![2, 3].into())).unwrap();
            ws.send(Message::Text("hello".into())).unwrap();
            ws
        });

        let (stream, _) = listener.accept().unwrap();
        let mut transport = WsTransport::new(tungstenite::accept(stream).unwrap()).unwrap();
        let _client = client.join().unwrap();
        thread::sleep(Duration::from_millis(200));

        assert_eq!(transport.try_recv().unwrap().as_deref(), Some("hello"));
        assert_eq!(transport.try_recv().unwrap(), None);
    }
}
