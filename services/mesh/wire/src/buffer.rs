//! Fixed-capacity payload buffers for one mesh transmission.

use crate::WireError;
use bytes::{BufMut, BytesMut};

/// Outgoing payload capacity in bytes
pub const TX_SIZE: usize = 1460;

/// Incoming payload capacity in bytes
pub const RX_SIZE: usize = 1500;

/// Outgoing buffer; a write larger than the capacity is rejected, never truncated
#[derive(Debug)]
pub struct TxBuffer {
    buf: BytesMut,
    capacity: usize,
}

impl TxBuffer {
    /// Create a buffer with the default transmit capacity
    pub fn new() -> Self {
        Self::with_capacity(TX_SIZE)
    }

    /// Create a buffer with an explicit capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Replace the buffer contents with `data`
    pub fn fill(&mut self, data: &[u8]) -> Result<(), WireError> {
        if data.len() > self.capacity {
            return Err(WireError::Size {
                len: data.len(),
                capacity: self.capacity,
            });
        }
        self.buf.clear();
        self.buf.put_slice(data);
        Ok(())
    }

    /// Current contents
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Declared capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for TxBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Incoming buffer handed to the transport for one bounded receive
#[derive(Debug)]
pub struct RxBuffer {
    data: Vec<u8>,
    len: usize,
}

impl RxBuffer {
    /// Create a buffer with the default receive capacity
    pub fn new() -> Self {
        Self::with_capacity(RX_SIZE)
    }

    /// Create a buffer with an explicit capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            len: 0,
        }
    }

    /// Zero the storage and reset the received length
    pub fn clear(&mut self) {
        self.data.fill(0);
        self.len = 0;
    }

    /// Copy a received payload in; larger payloads are rejected
    pub fn fill(&mut self, payload: &[u8]) -> Result<(), WireError> {
        if payload.len() > self.data.len() {
            return Err(WireError::Size {
                len: payload.len(),
                capacity: self.data.len(),
            });
        }
        self.data[..payload.len()].copy_from_slice(payload);
        self.len = payload.len();
        Ok(())
    }

    /// Bytes received by the last fill
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Received length
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the last receive produced no data
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Declared capacity
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Received bytes as text
    pub fn as_str(&self) -> Result<&str, WireError> {
        Ok(std::str::from_utf8(self.filled())?)
    }
}

impl Default for RxBuffer {
    fn default() -> Self {
        Self::new()
    }
}
