//! Reading model, JSON fragment codec, collector HTTP framing and payload buffers.
//!
//! This crate holds everything that crosses a boundary as bytes: sensor readings
//! serialized for the collector, fragments exchanged between leaves and the root,
//! the response code sent back down the tree, and the HTTP request the root
//! posts upstream.
//!
//! ## Mesh payloads
//!
//! ```text
//! leaf -> root : {"type":"Gyro","body":"LeftShin","ticks":1200,"X":0.1,"Y":0.2,"Z":0.3}
//! root -> leaf : 0
//! root -> collector:
//!   POST /createReading HTTP/1.1
//!   Host: 10.0.0.2:8080
//!   ...
//!   {"things":[ ...local reading..., ...leaf fragments... ]}
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod document;
pub mod error;
pub mod http;
pub mod reading;
pub mod response;

// Re-export main types
pub use buffer::{RxBuffer, TxBuffer, RX_SIZE, TX_SIZE};
pub use document::{encode_fragment, parse_fragment, ThingsDocument};
pub use error::WireError;
pub use http::{build_post_request, extract_header_value, CollectorEndpoint, RESPONSE_HEADER};
pub use reading::{BodyLocation, Components, ReadingKind, SensorReading};
pub use response::ResponseCode;
