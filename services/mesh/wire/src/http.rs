//! Collector request framing.
//!
//! The root posts one HTTP/1.1 request per aggregation round and reads back a
//! single custom header carrying the numeric response code.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Header the collector uses to return the response code
pub const RESPONSE_HEADER: &str = "Response";

const REQUEST_LINE: &str = "POST /createReading HTTP/1.1\r\n";
const USER_AGENT: &str = "User-Agent: ESP32\r\n";
const CONTENT_TYPE: &str = "Content-Type: application/json\r\n";
const CONNECTION: &str = "Connection: Closed\r\n";

/// Address of the collector the root publishes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorEndpoint {
    /// Host name or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl CollectorEndpoint {
    /// Create a new endpoint
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for CollectorEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Build the full request: fixed headers, computed length, blank line, body
pub fn build_post_request(endpoint: &CollectorEndpoint, body: &[u8]) -> Bytes {
    let host = format!("Host: {}\r\n", endpoint);
    let length = format!("Content-Length: {}\r\n", body.len());

    let mut buf = BytesMut::with_capacity(
        REQUEST_LINE.len()
            + host.len()
            + USER_AGENT.len()
            + CONTENT_TYPE.len()
            + length.len()
            + CONNECTION.len()
            + 2
            + body.len(),
    );
    buf.put_slice(REQUEST_LINE.as_bytes());
    buf.put_slice(host.as_bytes());
    buf.put_slice(USER_AGENT.as_bytes());
    buf.put_slice(CONTENT_TYPE.as_bytes());
    buf.put_slice(length.as_bytes());
    buf.put_slice(CONNECTION.as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(body);
    buf.freeze()
}

/// Value of a header field in a raw response, if present.
///
/// Only the header block (up to the first blank line) is searched.
pub fn extract_header_value<'a>(field: &str, response: &'a str) -> Option<&'a str> {
    let headers = response.split("\r\n\r\n").next().unwrap_or_default();
    headers
        .split("\r\n")
        .skip(1) // status line
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case(field))
        .map(|(_, value)| value.trim())
}
