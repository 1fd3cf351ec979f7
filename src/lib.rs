//! Ledger RPC - Client for the ledger node native RPC interface
//!
//! A small client library for talking to a ledger node over its raw socket
//! protocol: introducing peers, submitting transactions, and fetching stored
//! values.
//!
//! # Protocol
//!
//! Requests are a kind byte followed by a kind-specific body. Integers inside
//! transactions use a bijective variable-length encoding (see [`varint`]).
//! Responses are a single status byte, or for value lookups a type byte and
//! an 8-byte big-endian length followed by the value.
//!
//! # Features
//!
//! - Exact, deadline-bounded reads: one request in flight per connection
//! - Transaction construction from memory or files
//! - Peer discovery through an HTTP host list

pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod transaction;
pub mod varint;

pub use config::ClientConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::ClientConfig;
    pub use crate::error::{Error, Result};
    pub use crate::network::{NodeClient, Response, Timeouts};
    pub use crate::protocol::{PeerAddress, Request, RequestKind};
    pub use crate::transaction::{Transaction, TransactionBuilder};
}
