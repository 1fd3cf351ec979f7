//! Network Module
//!
//! Handles the TCP conversation with a ledger node. Every read and write is
//! bounded by a deadline; a stream is never buffered on the read side so a
//! response is consumed exactly and the next exchange starts in step.

mod client;
pub mod discovery;

pub use client::{NodeClient, Response};
pub use discovery::{discover_peers, HostSource, HttpHostSource, PeerOutcome, StaticHostSource};

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::protocol::Request;

/// Deadlines applied by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Establishing the TCP connection
    pub connect: Duration,
    /// Writing and flushing one request
    pub write: Duration,
    /// Reading each response field
    pub read: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            write: Duration::from_secs(5),
            read: Duration::from_secs(10),
        }
    }
}

/// Which half of the conversation an I/O call belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Send,
    Receive,
}

/// Run `fut` under `deadline`, mapping I/O failures onto the client taxonomy
pub(crate) async fn with_deadline<T, F>(
    operation: &'static str,
    direction: Direction,
    deadline: Duration,
    peer: &str,
    fut: F,
) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    match timeout(deadline, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(io_error(direction, peer, e)),
        Err(_) => Err(Error::Timeout {
            operation,
            after: deadline,
        }),
    }
}

/// Only a receive can observe the node closing the stream; a failed send is
/// a connection failure whatever the OS reports.
fn io_error(direction: Direction, peer: &str, e: std::io::Error) -> Error {
    use std::io::ErrorKind;

    match (direction, e.kind()) {
        (
            Direction::Receive,
            ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted,
        ) => Error::ConnectionClosed,
        _ => Error::ConnectionFailed {
            address: peer.to_string(),
            reason: e.to_string(),
        },
    }
}

/// Write a request as one buffer and flush it
pub async fn write_request<W: AsyncWrite + Unpin>(
    writer: &mut W,
    request: &Request,
    deadline: Duration,
    peer: &str,
) -> Result<()> {
    let bytes = request.encode()?;

    with_deadline("send request", Direction::Send, deadline, peer, async {
        writer.write_all(&bytes).await?;
        writer.flush().await
    })
    .await?;

    tracing::trace!("Sent {} ({} bytes) to {}", request.type_name(), bytes.len(), peer);
    Ok(())
}

/// Read exactly one byte
pub async fn read_byte<R: AsyncRead + Unpin>(
    reader: &mut R,
    operation: &'static str,
    deadline: Duration,
    peer: &str,
) -> Result<u8> {
    with_deadline(operation, Direction::Receive, deadline, peer, reader.read_u8()).await
}

/// Read a big-endian u64
pub async fn read_u64_be<R: AsyncRead + Unpin>(
    reader: &mut R,
    operation: &'static str,
    deadline: Duration,
    peer: &str,
) -> Result<u64> {
    with_deadline(operation, Direction::Receive, deadline, peer, reader.read_u64()).await
}

/// Read exactly `len` bytes
pub async fn read_bytes<R: AsyncRead + Unpin>(
    reader: &mut R,
    len: usize,
    operation: &'static str,
    deadline: Duration,
    peer: &str,
) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    with_deadline(
        operation,
        Direction::Receive,
        deadline,
        peer,
        reader.read_exact(&mut buf),
    )
    .await?;
    Ok(buf)
}
