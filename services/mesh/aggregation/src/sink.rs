//! Collector publishing.

use crate::error::PublishError;
use async_trait::async_trait;
use mesh_wire::{build_post_request, extract_header_value, CollectorEndpoint, RESPONSE_HEADER};
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Bytes read back from the collector; the response header must fit
pub const RESPONSE_CAPACITY: usize = 500;

/// Accepts one serialized document and answers with a response code
#[async_trait]
pub trait PublishSink: Send + Sync {
    /// Publish `body`, returning the collector's numeric response code
    async fn publish(&self, body: &[u8]) -> Result<i32, PublishError>;
}

/// Posts documents to the collector over plain HTTP/1.1
#[derive(Debug, Clone)]
pub struct HttpPublishSink {
    endpoint: CollectorEndpoint,
}

impl HttpPublishSink {
    /// Create a sink for `endpoint`
    pub fn new(endpoint: CollectorEndpoint) -> Self {
        Self { endpoint }
    }

    /// Collector address
    pub fn endpoint(&self) -> &CollectorEndpoint {
        &self.endpoint
    }
}

#[async_trait]
impl PublishSink for HttpPublishSink {
    async fn publish(&self, body: &[u8]) -> Result<i32, PublishError> {
        let request = build_post_request(&self.endpoint, body);

        let mut stream = TcpStream::connect((self.endpoint.host.as_str(), self.endpoint.port))
            .await
            .map_err(PublishError::ConnectFailed)?;
        stream
            .write_all(&request)
            .await
            .map_err(PublishError::WriteFailed)?;

        let mut buf = [0u8; RESPONSE_CAPACITY];
        let n = stream
            .read(&mut buf[..RESPONSE_CAPACITY - 1])
            .await
            .map_err(PublishError::ReadFailed)?;
        if let Err(e) = stream.shutdown().await {
            debug!("Collector socket shutdown failed: {}", e);
        }

        let response = String::from_utf8_lossy(&buf[..n]);
        let value = extract_header_value(RESPONSE_HEADER, &response).ok_or_else(|| {
            PublishError::ReadFailed(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("no {} header in collector reply", RESPONSE_HEADER),
            ))
        })?;
        let code = value.parse::<i32>().map_err(|_| {
            PublishError::ReadFailed(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} header is not a number: {:?}", RESPONSE_HEADER, value),
            ))
        })?;

        debug!("Collector {} answered {}", self.endpoint, code);
        Ok(code)
    }
}

/// Sink for running without a collector: logs each document and accepts it
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSink {
    code: i32,
}

impl LoggingSink {
    /// Sink that answers every publish with `code`
    pub fn answering(code: i32) -> Self {
        Self { code }
    }
}

#[async_trait]
impl PublishSink for LoggingSink {
    async fn publish(&self, body: &[u8]) -> Result<i32, PublishError> {
        info!(
            "Document ({} bytes): {}",
            body.len(),
            String::from_utf8_lossy(body)
        );
        Ok(self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut request = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            request.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&request).to_string();
            if let Some((head, body)) = text.split_once("\r\n\r\n") {
                let length = extract_header_value("Content-Length", head)
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(0);
                if body.len() >= length {
                    return text;
                }
            }
            if n == 0 {
                return text;
            }
        }
    }

    async fn collector(reply: &'static str) -> (CollectorEndpoint, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            stream.write_all(reply.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
            request
        });
        (CollectorEndpoint::new("127.0.0.1", port), handle)
    }

    #[tokio::test]
    async fn test_http_publish_reads_response_header() {
        let (endpoint, server) = collector("HTTP/1.1 200 OK\r\nResponse: 5\r\n\r\n").await;
        let sink = HttpPublishSink::new(endpoint.clone());

        let code = sink.publish(br#"{"things":[]}"#).await.unwrap();
        assert_eq!(code, 5);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /createReading HTTP/1.1\r\n"));
        assert!(request.contains(&format!("Host: {}\r\n", endpoint)));
        assert!(request.contains("Content-Length: 13\r\n"));
        assert!(request.ends_with(r#"{"things":[]}"#));
    }

    #[tokio::test]
    async fn test_http_publish_missing_header() {
        let (endpoint, _server) = collector("HTTP/1.1 500 Internal Server Error\r\n\r\n").await;
        let sink = HttpPublishSink::new(endpoint);
        assert!(matches!(
            sink.publish(b"{}").await,
            Err(PublishError::ReadFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_http_publish_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let sink = HttpPublishSink::new(CollectorEndpoint::new("127.0.0.1", port));
        assert!(matches!(
            sink.publish(b"{}").await,
            Err(PublishError::ConnectFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_logging_sink() {
        assert_eq!(LoggingSink::default().publish(b"{}").await.unwrap(), 0);
        assert_eq!(LoggingSink::answering(4).publish(b"{}").await.unwrap(), 4);
    }
}
