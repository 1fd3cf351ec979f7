//! Native RPC Protocol
//!
//! Defines the request framing spoken to a ledger node.
//!
//! ```text
//! 0x00 AddPeer         ip(4) port(2, big-endian)
//! 0x01 AddTransaction  transaction encoding
//! 0x02 FetchValue      key bytes
//! ```
//!
//! Requests carry no outer length prefix; each connection handles one
//! exchange at a time, so boundaries follow from the request body itself.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::transaction::Transaction;

/// Status byte: request succeeded
pub const STATUS_OK: u8 = 0x00;

/// Status byte: node rejected the request
pub const STATUS_FAILED: u8 = 0x01;

/// Type byte leading a successful FetchValue response
pub const VALUE_FOLLOWS: u8 = RequestKind::FetchValue as u8;

/// Size of the FetchValue length prefix
pub const VALUE_LEN_SIZE: usize = 8;

/// Largest value a FetchValue response may announce
pub const MAX_VALUE_LEN: u64 = 64 * 1024 * 1024;

/// Request kind, sent as the first byte of every request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RequestKind {
    AddPeer = 0x00,
    AddTransaction = 0x01,
    FetchValue = 0x02,
}

impl RequestKind {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Name used in logs and error messages
    pub fn name(self) -> &'static str {
        match self {
            RequestKind::AddPeer => "AddPeer",
            RequestKind::AddTransaction => "AddTransaction",
            RequestKind::FetchValue => "FetchValue",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// IPv4 address and port of a peer to be added to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl PeerAddress {
    /// Wire size of an address
    pub const SIZE: usize = 6;

    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Four octets followed by the big-endian port
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.ip.octets());
        bytes[4..6].copy_from_slice(&self.port.to_be_bytes());
        bytes
    }
}

impl From<SocketAddrV4> for PeerAddress {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

impl From<PeerAddress> for SocketAddr {
    fn from(addr: PeerAddress) -> Self {
        SocketAddr::V4(SocketAddrV4::new(addr.ip, addr.port))
    }
}

impl FromStr for PeerAddress {
    type Err = Error;

    /// Parse `a.b.c.d:port`
    fn from_str(s: &str) -> Result<Self> {
        let (ip, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidInput(format!("expected ip:port, got '{}'", s)))?;

        let ip = parse_ipv4(ip)?;
        let port = port
            .parse::<u16>()
            .map_err(|e| Error::InvalidInput(format!("invalid port '{}': {}", port, e)))?;

        Ok(Self::new(ip, port))
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Parse dotted IPv4 text, requiring exactly four octets
pub fn parse_ipv4(s: &str) -> Result<Ipv4Addr> {
    let octets = s
        .split('.')
        .map(|part| part.trim().parse::<u8>())
        .collect::<std::result::Result<Vec<u8>, _>>()
        .map_err(|e| Error::InvalidInput(format!("invalid IPv4 address '{}': {}", s, e)))?;

    let octets: [u8; 4] = octets.try_into().map_err(|parts: Vec<u8>| {
        Error::InvalidInput(format!(
            "invalid IPv4 address '{}': expected 4 octets, got {}",
            s,
            parts.len()
        ))
    })?;

    Ok(Ipv4Addr::from(octets))
}

/// Requests understood by a ledger node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Ask the node to connect to a peer
    AddPeer { addr: PeerAddress },

    /// Submit a transaction
    AddTransaction { tx: Transaction },

    /// Look up a stored value
    FetchValue { key: Bytes },
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::AddPeer { .. } => RequestKind::AddPeer,
            Request::AddTransaction { .. } => RequestKind::AddTransaction,
            Request::FetchValue { .. } => RequestKind::FetchValue,
        }
    }

    /// Get the request type name (for logging)
    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    /// Size of the encoded request, including the kind byte
    pub fn encoded_len(&self) -> usize {
        1 + match self {
            Request::AddPeer { .. } => PeerAddress::SIZE,
            Request::AddTransaction { tx } => tx.encoded_len(),
            Request::FetchValue { key } => key.len(),
        }
    }

    /// Serialize the request into one contiguous buffer
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(self.kind().as_byte());

        match self {
            Request::AddPeer { addr } => buf.put_slice(&addr.to_bytes()),
            Request::AddTransaction { tx } => tx.encode_into(&mut buf)?,
            Request::FetchValue { key } => {
                if key.is_empty() {
                    return Err(Error::InvalidInput("fetch key is empty".into()));
                }
                buf.put_slice(key);
            }
        }

        Ok(buf.freeze())
    }
}

/// Interpret the single status byte answering AddPeer or AddTransaction
pub fn check_status(kind: RequestKind, status: u8) -> Result<()> {
    match status {
        STATUS_OK => Ok(()),
        STATUS_FAILED => Err(Error::Rejected { kind }),
        other => Err(Error::Protocol(format!(
            "unexpected status 0x{:02x} in {} response",
            other, kind
        ))),
    }
}

/// Interpret the leading byte of a FetchValue response.
///
/// Returns `Ok(())` when a length-prefixed value follows.
pub fn check_value_header(status: u8) -> Result<()> {
    match status {
        VALUE_FOLLOWS => Ok(()),
        STATUS_FAILED => Err(Error::Rejected {
            kind: RequestKind::FetchValue,
        }),
        other => Err(Error::Protocol(format!(
            "unexpected byte 0x{:02x} in FetchValue response",
            other
        ))),
    }
}

/// Validate a FetchValue length prefix before allocating for it
pub fn check_value_len(len: u64) -> Result<usize> {
    if len > MAX_VALUE_LEN {
        return Err(Error::Protocol(format!(
            "announced value length {} exceeds limit {}",
            len, MAX_VALUE_LEN
        )));
    }
    Ok(len as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_peer_framing() {
        let addr: PeerAddress = "10.0.0.1:8332".parse().unwrap();
        let bytes = Request::AddPeer { addr }.encode().unwrap();
        assert_eq!(&bytes[..], &[0x00, 0x0a, 0x00, 0x00, 0x01, 0x20, 0x8c]);
    }

    #[test]
    fn test_add_transaction_framing() {
        let tx = Transaction::with_timestamp(1, &b"a"[..], &b"bc"[..]).unwrap();
        let request = Request::AddTransaction { tx: tx.clone() };
        let bytes = request.encode().unwrap();

        assert_eq!(bytes[0], 0x01);
        assert_eq!(&bytes[1..], &tx.encode().unwrap()[..]);
        assert_eq!(bytes.len(), request.encoded_len());
    }

    #[test]
    fn test_fetch_value_framing() {
        let request = Request::FetchValue {
            key: Bytes::from_static(b"key"),
        };
        assert_eq!(&request.encode().unwrap()[..], b"\x02key");
        assert_eq!(request.type_name(), "FetchValue");

        let empty = Request::FetchValue { key: Bytes::new() };
        assert!(matches!(empty.encode(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_peer_address_parse() {
        let addr: PeerAddress = "192.168.1.20:65535".parse().unwrap();
        assert_eq!(addr.ip, Ipv4Addr::new(192, 168, 1, 20));
        assert_eq!(addr.port, 65535);
        assert_eq!(addr.to_string(), "192.168.1.20:65535");

        assert!("10.0.0.1".parse::<PeerAddress>().is_err());
        assert!("10.0.0:80".parse::<PeerAddress>().is_err());
        assert!("10.0.0.1.5:80".parse::<PeerAddress>().is_err());
        assert!("10.0.0.256:80".parse::<PeerAddress>().is_err());
        assert!("10.0.0.1:70000".parse::<PeerAddress>().is_err());
    }

    #[test]
    fn test_check_status() {
        assert!(check_status(RequestKind::AddPeer, STATUS_OK).is_ok());

        let err = check_status(RequestKind::AddPeer, STATUS_FAILED).unwrap_err();
        assert!(matches!(
            err,
            Error::Rejected {
                kind: RequestKind::AddPeer
            }
        ));

        let err = check_status(RequestKind::AddTransaction, 0x7f).unwrap_err();
        assert!(err.is_protocol());
        assert!(err.to_string().contains("0x7f"));
    }

    #[test]
    fn test_check_value_header() {
        assert!(check_value_header(VALUE_FOLLOWS).is_ok());
        assert!(matches!(check_value_header(STATUS_FAILED), Err(Error::Rejected { .. })));
        // A plain OK byte is not a valid FetchValue answer
        assert!(matches!(check_value_header(STATUS_OK), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_check_value_len() {
        assert_eq!(check_value_len(3).unwrap(), 3);
        assert!(check_value_len(MAX_VALUE_LEN + 1).is_err());
    }
}
