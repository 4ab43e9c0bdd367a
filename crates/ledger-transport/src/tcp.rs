//! TCP transport implementation
//!
//! Each frame is written as-is (8-byte header + body). Readers take the
//! header first, validate it, then read exactly `body_len` bytes.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use ledger_core::{LedgerError, LedgerResult};
use ledger_wire::{Frame, FrameHeader, FRAME_HEADER_SIZE};

/// Default bound on a single request/response exchange
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

fn transport_error(e: io::Error) -> LedgerError {
    LedgerError::TransportError(e.to_string())
}

/// Read one frame; `None` on a clean end of stream
pub async fn read_frame<R>(reader: &mut R) -> LedgerResult<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_SIZE];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(transport_error(e)),
    }

    let header = FrameHeader::parse(&header)?;
    let mut body = vec![0u8; header.body_len as usize];
    reader.read_exact(&mut body).await.map_err(transport_error)?;

    Frame::from_parts(header, body).map(Some)
}

/// Write one frame and flush
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> LedgerResult<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = frame.serialize()?;
    writer.write_all(&bytes).await.map_err(transport_error)?;
    writer.flush().await.map_err(transport_error)?;
    Ok(())
}

/// Client side: one connection per request
#[derive(Clone, Debug)]
pub struct TcpTransport {
    request_timeout: Duration,
}

impl Default for TcpTransport {
    fn default() -> Self {
        TcpTransport::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

impl TcpTransport {
    pub fn new(request_timeout: Duration) -> Self {
        TcpTransport { request_timeout }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Send a frame and wait for the reply, bounded by the request timeout
    pub async fn request(&self, addr: &str, frame: &Frame) -> LedgerResult<Frame> {
        match tokio::time::timeout(self.request_timeout, Self::exchange(addr, frame)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(%addr, kind = ?frame.kind, "request timed out");
                Err(LedgerError::Timeout)
            }
        }
    }

    async fn exchange(addr: &str, frame: &Frame) -> LedgerResult<Frame> {
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|e| LedgerError::ConnectionFailed(format!("{}: {}", addr, e)))?;

        write_frame(&mut stream, frame).await?;

        read_frame(&mut stream).await?.ok_or_else(|| {
            LedgerError::TransportError(format!("{} closed the connection without replying", addr))
        })
    }
}

/// Server side of one accepted connection
pub struct FrameStream {
    stream: TcpStream,
    peer: SocketAddr,
}

impl FrameStream {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        FrameStream { stream, peer }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Receive the next frame; `None` once the peer hangs up
    pub async fn recv(&mut self) -> LedgerResult<Option<Frame>> {
        read_frame(&mut self.stream).await
    }

    pub async fn send(&mut self, frame: &Frame) -> LedgerResult<()> {
        write_frame(&mut self.stream, frame).await
    }
}

/// Bound TCP listener
pub struct TcpServerTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpServerTransport {
    /// Bind to a local address
    pub async fn bind(addr: &str) -> LedgerResult<Self> {
        let listener = TcpListener::bind(addr).await.map_err(transport_error)?;
        let local_addr = listener.local_addr().map_err(transport_error)?;

        Ok(TcpServerTransport {
            listener,
            local_addr,
        })
    }

    /// Get local address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept a single connection
    pub async fn accept(&self) -> LedgerResult<FrameStream> {
        let (stream, peer) = self.listener.accept().await.map_err(transport_error)?;
        Ok(FrameStream::new(stream, peer))
    }
}

/// Connection receiver channel
pub type ConnectionReceiver = mpsc::Receiver<FrameStream>;

/// Start a background accept loop
///
/// The loop ends, releasing the listener, once the receiver is dropped.
pub fn start_accept_loop(transport: TcpServerTransport, buffer_size: usize) -> ConnectionReceiver {
    let (tx, rx) = mpsc::channel(buffer_size);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                accepted = transport.accept() => match accepted {
                    Ok(conn) => {
                        if tx.send(conn).await.is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Err(e) => {
                        tracing::warn!("TCP accept error: {}", e);
                    }
                },
            }
        }
        tracing::debug!(addr = %transport.local_addr(), "accept loop stopped");
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_wire::MessageKind;

    fn ping() -> Frame {
        Frame::new(MessageKind::DumpLedgerState, Vec::new())
    }

    #[tokio::test]
    async fn test_tcp_transport_bind() {
        let transport = TcpServerTransport::bind("127.0.0.1:0").await.unwrap();
        assert_ne!(transport.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_frame_over_byte_stream() {
        let frame = Frame::new(MessageKind::Ack, vec![1u8, 2, 3]);
        let mut buf = Vec::new();
        write_frame(&mut buf, &frame).await.unwrap();

        let mut reader = &buf[..];
        assert_eq!(read_frame(&mut reader).await.unwrap(), Some(frame));
        assert_eq!(read_frame(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_bad_magic_rejected() {
        let mut bytes = ping().serialize().unwrap().to_vec();
        bytes[0] = b'X';
        let mut reader = &bytes[..];

        assert!(matches!(
            read_frame(&mut reader).await,
            Err(LedgerError::InvalidWireFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_truncated_body() {
        let bytes = Frame::new(MessageKind::Ack, vec![0u8; 16])
            .serialize()
            .unwrap();
        let mut reader = &bytes[..bytes.len() - 4];

        assert!(matches!(
            read_frame(&mut reader).await,
            Err(LedgerError::TransportError(_))
        ));
    }

    #[tokio::test]
    async fn test_request_reply() {
        let server = TcpServerTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().to_string();
        let mut incoming = start_accept_loop(server, 4);

        tokio::spawn(async move {
            while let Some(mut conn) = incoming.recv().await {
                while let Ok(Some(frame)) = conn.recv().await {
                    let reply = Frame::new(MessageKind::Ack, frame.body.clone());
                    let _ = conn.send(&reply).await;
                }
            }
        });

        let client = TcpTransport::default();
        let request = Frame::new(MessageKind::DumpLedgerState, vec![7u8; 3]);
        let reply = client.request(&addr, &request).await.unwrap();

        assert_eq!(reply.kind, MessageKind::Ack);
        assert_eq!(&reply.body[..], &[7, 7, 7]);
    }

    #[tokio::test]
    async fn test_request_times_out() {
        let server = TcpServerTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().to_string();

        // Accept and hold the connection without replying
        let holder = tokio::spawn(async move {
            let conn = server.accept().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(conn);
        });

        let client = TcpTransport::new(Duration::from_millis(100));
        assert_eq!(client.request(&addr, &ping()).await, Err(LedgerError::Timeout));
        holder.abort();
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let server = TcpServerTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().to_string();
        drop(server);

        let client = TcpTransport::new(Duration::from_secs(1));
        assert!(matches!(
            client.request(&addr, &ping()).await,
            Err(LedgerError::ConnectionFailed(_))
        ));
    }
}
