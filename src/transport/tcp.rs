//! TCP transport: one short-lived connection per request

use super::{Transport, TransportError};
use crate::protocol::Codec;
use bytes::Bytes;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// Default bound on a whole request, connect through last response byte
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens a fresh connection for every request
#[derive(Debug, Clone)]
pub struct TcpTransport {
    addr: String,
    timeout: Duration,
}

impl TcpTransport {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn exchange(&self, frame: &[u8], codec: &Codec) -> Result<Bytes, TransportError> {
        let mut stream =
            TcpStream::connect(&self.addr)
                .await
                .map_err(|source| TransportError::Connect {
                    addr: self.addr.clone(),
                    source,
                })?;
        trace!(addr = %self.addr, bytes = frame.len(), "Sending request frame");

        stream.write_all(frame).await?;
        stream.flush().await?;

        let body = codec.read_frame(&mut stream).await?;
        trace!(addr = %self.addr, bytes = body.len(), "Received response frame");

        // Peer may already have closed its side
        let _ = stream.shutdown().await;
        Ok(body)
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn round_trip(&self, frame: &[u8], codec: &Codec) -> Result<Bytes, TransportError> {
        match tokio::time::timeout(self.timeout, self.exchange(frame, codec)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(addr = %self.addr, timeout = ?self.timeout, "Request timed out");
                Err(TransportError::Timeout(self.timeout))
            }
        }
    }

    fn peer(&self) -> String {
        self.addr.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ProtocolGeneration, Response, StatusCode};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_round_trip_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let codec = Codec::new(ProtocolGeneration::Current);

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 4 + 64];
            socket.read_exact(&mut request).await.unwrap();
            let reply = codec
                .encode_response(&Response::new(StatusCode::Success, &b"ok"[..]))
                .unwrap();
            socket.write_all(&reply).await.unwrap();
            request
        });

        let transport = TcpTransport::new("127.0.0.1", port);
        let frame = vec![0u8; 4 + 64];
        let body = transport.round_trip(&frame, &codec).await.unwrap();

        assert_eq!(&body[..], b"\x00ok");
        assert_eq!(server.await.unwrap(), frame);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = TcpTransport::new("127.0.0.1", port);
        let codec = Codec::new(ProtocolGeneration::Current);
        let err = transport.round_trip(&[0u8; 4], &codec).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }

    #[tokio::test]
    async fn test_short_read_when_server_closes_early() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 4];
            socket.read_exact(&mut request).await.unwrap();
            // Announce 20 bytes, deliver 3
            socket.write_all(&20u32.to_be_bytes()).await.unwrap();
            socket.write_all(b"abc").await.unwrap();
        });

        let transport = TcpTransport::new("127.0.0.1", port);
        let codec = Codec::new(ProtocolGeneration::Current);
        let err = transport.round_trip(&[0u8; 4], &codec).await.unwrap_err();
        assert!(err.is_short_read(), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn test_timeout_when_server_stalls() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
            drop(socket);
        });

        let transport =
            TcpTransport::new("127.0.0.1", port).with_timeout(Duration::from_millis(50));
        let codec = Codec::new(ProtocolGeneration::Current);
        let err = transport.round_trip(&[0u8; 4], &codec).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
        server.abort();
    }
}
