//! Length-prefixed JSON transport over TCP.
//!
//! Each message is a 4-byte big-endian length prefix followed by a UTF-8 JSON
//! document:
//!
//! ```text
//! [u32 BE: len][UTF-8 JSON bytes of len]
//! ```
//!
//! A reader task feeds every frame into the inbound queue and stops on EOF or
//! on the first read error, which closes the queue. Frames of type
//! `logMessage` are engine diagnostics and go to the diagnostics queue instead.

use super::{Diagnostics, Inbound, Transport};
use crate::admission::LogMessage;
use crate::config::{ClientConfig, DiagnosticsConfig, TransportConfig};
use crate::{Result, TdError};
use async_trait::async_trait;
use serde::Deserialize;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// TCP transport to an engine bridge.
#[derive(Debug)]
pub struct TcpTransport {
    writer: Mutex<OwnedWriteHalf>,
    addr: SocketAddr,
}

impl TcpTransport {
    /// Connect to an engine bridge and start the frame reader.
    ///
    /// Returns the transport, the inbound message queue and the diagnostics
    /// queue. Must be called inside a tokio runtime.
    pub async fn connect(addr: SocketAddr) -> Result<(Self, Inbound, Diagnostics)> {
        let stream = tokio::time::timeout(TransportConfig::CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                TdError::transport(format!(
                    "connect to {} timed out after {:?}",
                    addr,
                    TransportConfig::CONNECT_TIMEOUT
                ))
            })?
            .map_err(|e| TdError::Transport {
                message: format!("connect to {} failed: {}", addr, e),
                source: Some(e),
            })?;

        debug!("Engine transport connected to {}", addr);

        let (reader, writer) = stream.into_split();
        let (tx, inbound) = mpsc::channel(ClientConfig::INBOUND_QUEUE_SIZE);
        let (log_tx, diagnostics) = mpsc::channel(DiagnosticsConfig::QUEUE_SIZE);
        tokio::spawn(read_loop(reader, tx, log_tx, addr));

        Ok((
            Self {
                writer: Mutex::new(writer),
                addr,
            },
            inbound,
            diagnostics,
        ))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send_bytes(&self, payload: Vec<u8>) -> Result<()> {
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, &payload).await
    }
}

#[derive(Deserialize)]
struct FrameKind {
    #[serde(rename = "@type")]
    kind: Option<String>,
}

fn is_log_frame(frame: &[u8]) -> bool {
    serde_json::from_slice::<FrameKind>(frame)
        .map(|tag| tag.kind.as_deref() == Some(DiagnosticsConfig::LOG_MESSAGE_TYPE))
        .unwrap_or(false)
}

fn log_message(frame: &[u8]) -> Option<LogMessage> {
    match serde_json::from_slice(frame) {
        Ok(line) => Some(line),
        Err(e) => {
            warn!("Dropping malformed diagnostics frame: {}", e);
            None
        }
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    tx: mpsc::Sender<Vec<u8>>,
    diagnostics: mpsc::Sender<LogMessage>,
    addr: SocketAddr,
) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(frame)) if is_log_frame(&frame) => {
                // Never stall responses behind an unread diagnostics queue.
                if let Some(line) = log_message(&frame) {
                    if let Err(e) = diagnostics.try_send(line) {
                        debug!("Diagnostics line from {} not queued: {}", addr, e);
                    }
                }
            }
            Ok(Some(frame)) => {
                if tx.send(frame).await.is_err() {
                    debug!("Inbound queue for {} dropped, stopping reader", addr);
                    return;
                }
            }
            Ok(None) => {
                debug!("Engine at {} closed the connection", addr);
                return;
            }
            Err(e) => {
                warn!("Engine transport read from {} failed: {}", addr, e);
                return;
            }
        }
    }
}

/// Read a length-prefixed frame from an async reader.
///
/// Returns `None` on clean EOF (peer closed connection).
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;

    if len > TransportConfig::MAX_FRAME_SIZE {
        return Err(TdError::transport(format!(
            "frame size {} exceeds maximum {}",
            len,
            TransportConfig::MAX_FRAME_SIZE
        )));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(payload))
}

/// Write a length-prefixed frame to an async writer.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > TransportConfig::MAX_FRAME_SIZE {
        return Err(TdError::transport(format!(
            "frame size {} exceeds maximum {}",
            payload.len(),
            TransportConfig::MAX_FRAME_SIZE
        )));
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_frame_read_empty_stream_returns_none() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let result = read_frame(&mut cursor).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_frame_read_oversized_returns_error() {
        let huge_len: u32 = (TransportConfig::MAX_FRAME_SIZE + 1) as u32;
        let mut buf = Vec::new();
        buf.extend_from_slice(&huge_len.to_be_bytes());
        buf.extend_from_slice(&[0u8; 8]);

        let mut cursor = std::io::Cursor::new(buf);
        assert!(read_frame(&mut cursor).await.is_err());
    }

    #[tokio::test]
    async fn test_frame_prefix_is_big_endian_length() {
        let mut buf = Vec::new();
        write_frame(&mut buf, br#"{"@type":"ok"}"#).await.unwrap();
        assert_eq!(&buf[..4], &14u32.to_be_bytes());
        assert_eq!(&buf[4..], br#"{"@type":"ok"}"#);
    }

    #[tokio::test]
    async fn test_tcp_transport_exchanges_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Echo engine: answers every frame with the same bytes.
        let engine = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let (mut reader, mut writer) = socket.split();
            while let Some(frame) = read_frame(&mut reader).await.unwrap() {
                write_frame(&mut writer, &frame).await.unwrap();
            }
        });

        let (transport, mut inbound, _diagnostics) = TcpTransport::connect(addr).await.unwrap();
        assert_eq!(transport.addr(), addr);

        transport
            .send_bytes(br#"{"@type":"getOption","@extra":"1"}"#.to_vec())
            .await
            .unwrap();
        let echoed = inbound.recv().await.unwrap();
        assert_eq!(echoed, br#"{"@type":"getOption","@extra":"1"}"#.to_vec());

        drop(transport);
        engine.await.unwrap();
        assert!(inbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_log_frames_are_split_from_messages() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let engine = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let frames: [&[u8]; 4] = [
                br#"{"@type":"logMessage","verbosity_level":2,"text":"FLOOD_WAIT_3"}"#,
                br#"{"@type":"updateOption","name":"version","value":null}"#,
                br#"{"@type":"logMessage","verbosity_level":"loud"}"#,
                br#"{"@type":"ok","@extra":"7"}"#,
            ];
            for frame in frames {
                write_frame(&mut socket, frame).await.unwrap();
            }
        });

        let (_transport, mut inbound, mut diagnostics) = TcpTransport::connect(addr).await.unwrap();
        engine.await.unwrap();

        assert_eq!(
            inbound.recv().await.unwrap(),
            br#"{"@type":"updateOption","name":"version","value":null}"#.to_vec()
        );
        assert_eq!(inbound.recv().await.unwrap(), br#"{"@type":"ok","@extra":"7"}"#.to_vec());
        assert!(inbound.recv().await.is_none());

        assert_eq!(
            diagnostics.recv().await.unwrap(),
            LogMessage::new(2, "FLOOD_WAIT_3")
        );
        assert!(diagnostics.recv().await.is_none());
    }

    #[test]
    fn test_only_log_message_frames_are_diagnostics() {
        assert!(is_log_frame(br#"{"@type":"logMessage","verbosity_level":1,"text":""}"#));
        assert!(!is_log_frame(br#"{"@type":"ok"}"#));
        assert!(!is_log_frame(br#"{"text":"logMessage"}"#));
        assert!(!is_log_frame(b"not json"));
    }

    #[tokio::test]
    async fn test_connect_to_dead_port_returns_transport_error() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let result = TcpTransport::connect(addr).await;
        assert!(matches!(result, Err(TdError::Transport { .. })));
    }
}
