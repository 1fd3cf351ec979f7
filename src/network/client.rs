//! Node Client
//!
//! Client for the native RPC interface of a single ledger node. One
//! connection, one outstanding request: every call takes `&mut self`, writes
//! its request, and reads exactly the bytes of the answer before returning.
//!
//! A request that fails partway (deadline, hang-up, bytes the protocol does
//! not allow) leaves the stream position unknown. The client then refuses
//! every later request with `Error::Poisoned` and has to be reconnected.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{
    read_byte, read_bytes, read_u64_be, with_deadline, write_request, Direction, Timeouts,
};
use crate::error::{Error, Result};
use crate::protocol::{self, PeerAddress, Request, RequestKind};
use crate::transaction::Transaction;

/// Decoded answer to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// AddPeer / AddTransaction accepted
    Ok,
    /// FetchValue result
    Value(Bytes),
}

/// Client bound to one node connection
pub struct NodeClient<S = TcpStream> {
    stream: S,
    /// Peer address, for logs and errors
    address: String,
    timeouts: Timeouts,
    /// Set once an exchange failed with the stream out of step
    poisoned: bool,
}

impl NodeClient<TcpStream> {
    /// Connect to a node at `address` (host:port)
    pub async fn connect(address: &str, timeouts: Timeouts) -> Result<Self> {
        let result = timeout(timeouts.connect, TcpStream::connect(address)).await;

        let stream = match result {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(Error::ConnectionFailed {
                    address: address.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(Error::Timeout {
                    operation: "connect",
                    after: timeouts.connect,
                })
            }
        };
        stream.set_nodelay(true)?;

        tracing::info!("Connected to node at {}", address);
        Ok(Self::from_stream(stream, address, timeouts))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> NodeClient<S> {
    /// Wrap an already established stream
    pub fn from_stream(stream: S, address: impl Into<String>, timeouts: Timeouts) -> Self {
        Self {
            stream,
            address: address.into(),
            timeouts,
            poisoned: false,
        }
    }

    pub fn peer_address(&self) -> &str {
        &self.address
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Whether an earlier failure left the connection unusable
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Ask the node to connect to `peer`
    pub async fn add_peer(&mut self, peer: PeerAddress) -> Result<()> {
        self.request(&Request::AddPeer { addr: peer }).await?;
        Ok(())
    }

    /// Submit a transaction
    pub async fn add_transaction(&mut self, tx: &Transaction) -> Result<()> {
        self.request(&Request::AddTransaction { tx: tx.clone() }).await?;
        Ok(())
    }

    /// Fetch the value stored under `key`
    pub async fn fetch_value(&mut self, key: impl Into<Bytes>) -> Result<Bytes> {
        match self.request(&Request::FetchValue { key: key.into() }).await? {
            Response::Value(value) => Ok(value),
            Response::Ok => Err(Error::Protocol("FetchValue answered without a value".into())),
        }
    }

    /// Send one request and read its complete response
    pub async fn request(&mut self, request: &Request) -> Result<Response> {
        if self.poisoned {
            return Err(Error::Poisoned {
                address: self.address.clone(),
            });
        }

        tracing::debug!("Sending {} to {}", request.type_name(), self.address);

        let result = self.exchange(request).await;

        if let Err(ref e) = result {
            // A rejection is a complete answer and a bad request never reached
            // the wire; anything else may leave bytes in flight
            if !matches!(e, Error::Rejected { .. } | Error::InvalidInput(_)) {
                self.poisoned = true;
            }
            tracing::warn!("{} to {} failed: {}", request.type_name(), self.address, e);
        }
        result
    }

    async fn exchange(&mut self, request: &Request) -> Result<Response> {
        write_request(&mut self.stream, request, self.timeouts.write, &self.address).await?;

        match request.kind() {
            kind @ (RequestKind::AddPeer | RequestKind::AddTransaction) => {
                self.read_status(kind).await.map(|_| Response::Ok)
            }
            RequestKind::FetchValue => self.read_value().await.map(Response::Value),
        }
    }

    /// One status byte, read once
    async fn read_status(&mut self, kind: RequestKind) -> Result<()> {
        let status = read_byte(
            &mut self.stream,
            "read status",
            self.timeouts.read,
            &self.address,
        )
        .await?;
        tracing::trace!("{} status 0x{:02x}", kind, status);

        protocol::check_status(kind, status)
    }

    /// Type byte, length prefix, then the value itself
    async fn read_value(&mut self) -> Result<Bytes> {
        let header = read_byte(
            &mut self.stream,
            "read value header",
            self.timeouts.read,
            &self.address,
        )
        .await?;
        protocol::check_value_header(header)?;

        let len = read_u64_be(
            &mut self.stream,
            "read value length",
            self.timeouts.read,
            &self.address,
        )
        .await?;
        let len = protocol::check_value_len(len)?;
        tracing::trace!("FetchValue announces {} bytes", len);

        let value = read_bytes(
            &mut self.stream,
            len,
            "read value",
            self.timeouts.read,
            &self.address,
        )
        .await?;
        Ok(Bytes::from(value))
    }

    /// Shut down the write side and release the connection
    pub async fn close(mut self) -> Result<()> {
        let deadline = self.timeouts.write;
        with_deadline(
            "close",
            Direction::Send,
            deadline,
            &self.address,
            self.stream.shutdown(),
        )
        .await?;
        tracing::debug!("Closed connection to {}", self.address);
        Ok(())
    }

    /// Give back the underlying stream
    pub fn into_inner(self) -> S {
        self.stream
    }
}
