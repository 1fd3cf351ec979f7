//! Transactions
//!
//! A transaction is a timestamp plus two opaque byte blobs: `aux`, caller
//! metadata, and `binary`, the payload. On the wire:
//!
//! ```text
//! varint(timestamp) varint(len aux) aux varint(len binary) binary
//! ```

use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, Bytes};

use crate::error::{Error, Result};
use crate::varint;

/// Milliseconds since the Unix epoch
pub type Timestamp = u64;

/// Current wall-clock time in milliseconds
pub fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis().max(0) as Timestamp
}

/// A client-side transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    timestamp: Timestamp,
    aux: Bytes,
    binary: Bytes,
}

impl Transaction {
    /// Create a transaction stamped with the current time
    pub fn new(aux: impl Into<Bytes>, binary: impl Into<Bytes>) -> Result<Self> {
        Self::with_timestamp(now_millis(), aux, binary)
    }

    /// Create a transaction with an explicit timestamp
    pub fn with_timestamp(
        timestamp: Timestamp,
        aux: impl Into<Bytes>,
        binary: impl Into<Bytes>,
    ) -> Result<Self> {
        let tx = Self {
            timestamp,
            aux: aux.into(),
            binary: binary.into(),
        };
        tx.validate()?;
        Ok(tx)
    }

    /// Load aux data and payload from files
    pub fn from_files(aux_path: impl AsRef<Path>, binary_path: impl AsRef<Path>) -> Result<Self> {
        TransactionBuilder::new()
            .aux_path(aux_path.as_ref())
            .binary_path(binary_path.as_ref())
            .build()
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn aux(&self) -> &[u8] {
        &self.aux
    }

    pub fn binary(&self) -> &[u8] {
        &self.binary
    }

    fn validate(&self) -> Result<()> {
        if self.aux.is_empty() {
            return Err(Error::InvalidInput("transaction aux data is empty".into()));
        }
        if self.binary.is_empty() {
            return Err(Error::InvalidInput("transaction binary is empty".into()));
        }
        if self.timestamp > varint::MAX_VALUE {
            return Err(Error::InvalidInput(format!(
                "transaction timestamp {} out of range",
                self.timestamp
            )));
        }
        Ok(())
    }

    /// Exact size of `encode()`'s output
    pub fn encoded_len(&self) -> usize {
        varint::encoded_len(self.timestamp)
            + varint::encoded_len(self.aux.len() as u64)
            + self.aux.len()
            + varint::encoded_len(self.binary.len() as u64)
            + self.binary.len()
    }

    /// Serialize using the stored timestamp
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Append the serialized transaction to `buf`
    pub fn encode_into<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        varint::put_varint(buf, self.timestamp)?;
        varint::put_varint(buf, self.aux.len() as u64)?;
        buf.put_slice(&self.aux);
        varint::put_varint(buf, self.binary.len() as u64)?;
        buf.put_slice(&self.binary);
        Ok(())
    }

    /// Parse a transaction from the front of `bytes`.
    ///
    /// Returns the transaction and the number of bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut cursor = bytes;
        let tx = Self::decode_buf(&mut cursor)?;
        Ok((tx, bytes.len() - cursor.len()))
    }

    /// Parse a transaction from `buf`, advancing past it
    pub fn decode_buf<B: Buf>(buf: &mut B) -> Result<Self> {
        let timestamp = varint::get_varint(buf)?;
        let aux = read_field(buf, "aux")?;
        let binary = read_field(buf, "binary")?;

        let tx = Self {
            timestamp,
            aux,
            binary,
        };
        tx.validate()?;
        Ok(tx)
    }
}

fn read_field<B: Buf>(buf: &mut B, name: &str) -> Result<Bytes> {
    let len = varint::get_varint(buf)?;
    if len > buf.remaining() as u64 {
        return Err(Error::InvalidInput(format!(
            "truncated transaction {}: need {} bytes, have {}",
            name,
            len,
            buf.remaining()
        )));
    }
    Ok(buf.copy_to_bytes(len as usize))
}

/// Where a transaction field comes from
#[derive(Debug, Clone)]
enum Source {
    Bytes(Bytes),
    File(PathBuf),
}

impl Source {
    fn load(self) -> Result<Bytes> {
        match self {
            Source::Bytes(bytes) => Ok(bytes),
            Source::File(path) => {
                let data = std::fs::read(&path)?;
                tracing::debug!("Loaded {} bytes from {}", data.len(), path.display());
                Ok(Bytes::from(data))
            }
        }
    }
}

/// Builds a transaction from in-memory data or files.
///
/// Aux and binary are both required; each may come from memory or from a
/// file. The timestamp defaults to the time `build()` is called.
#[derive(Debug, Clone, Default)]
pub struct TransactionBuilder {
    timestamp: Option<Timestamp>,
    aux: Option<Source>,
    binary: Option<Source>,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn aux(mut self, aux: impl Into<Bytes>) -> Self {
        self.aux = Some(Source::Bytes(aux.into()));
        self
    }

    pub fn aux_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.aux = Some(Source::File(path.into()));
        self
    }

    pub fn binary(mut self, binary: impl Into<Bytes>) -> Self {
        self.binary = Some(Source::Bytes(binary.into()));
        self
    }

    pub fn binary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary = Some(Source::File(path.into()));
        self
    }

    pub fn build(self) -> Result<Transaction> {
        let aux = self
            .aux
            .ok_or_else(|| Error::InvalidInput("specify aux data".into()))?
            .load()?;
        let binary = self
            .binary
            .ok_or_else(|| Error::InvalidInput("specify binary data".into()))?
            .load()?;

        Transaction::with_timestamp(self.timestamp.unwrap_or_else(now_millis), aux, binary)
    }
}
