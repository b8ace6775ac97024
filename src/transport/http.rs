//! reqwest-backed transport
//!
//! `exchange` copies each body into a pooled buffer from the ledger and
//! decodes the text from that buffer, handing the response over with the
//! buffer still holding its single claim.

use super::{Response, Transport, TransportError};
use crate::buffer::BufferLedger;
use reqwest::Url;
use std::time::Duration;

/// HTTP transport against a single base URL
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    ledger: BufferLedger,
}

impl HttpTransport {
    /// Build a transport for `base_url`
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidUrl`] if the URL does not parse or
    /// carries a path, and [`TransportError::Request`] if the client cannot
    /// be built.
    pub fn new(base_url: &str, timeout: Duration, ledger: BufferLedger) -> Result<Self, TransportError> {
        let base_url =
            Url::parse(base_url).map_err(|e| TransportError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        // Strategy paths are absolute; joining them would drop a prefix
        if base_url.path() != "/" {
            return Err(TransportError::InvalidUrl(format!("{}: base URL must not have a path", base_url)));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("buffer-leak-harness/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            ledger,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn ledger(&self) -> &BufferLedger {
        &self.ledger
    }

    fn url(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", path, e)))
    }

    async fn send(&self, path: &str) -> Result<reqwest::Response, TransportError> {
        let url = self.url(path)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::Status(response.status().as_u16()));
        }
        Ok(response)
    }
}

impl Transport for HttpTransport {
    async fn retrieve(&self, path: &str) -> Result<String, TransportError> {
        self.send(path)
            .await?
            .text()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))
    }

    async fn exchange(&self, path: &str) -> Result<Response, TransportError> {
        let response = self.send(path).await?;
        let status = response.status().as_u16();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        if bytes.is_empty() {
            return Ok(Response::new(status, None));
        }

        let buffer = self.ledger.allocate(&bytes);
        let body = buffer.decode_utf8();
        Ok(Response::new(status, body).with_raw_buffer(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_base_url() {
        let result = HttpTransport::new("not a url", Duration::from_secs(1), BufferLedger::default());
        assert!(matches!(result, Err(TransportError::InvalidUrl(_))));
    }

    #[test]
    fn test_rejects_base_url_with_path() {
        let result =
            HttpTransport::new("http://127.0.0.1:8080/api", Duration::from_secs(1), BufferLedger::default());
        assert!(matches!(result, Err(TransportError::InvalidUrl(_))));

        let trailing_slash =
            HttpTransport::new("http://127.0.0.1:8080/", Duration::from_secs(1), BufferLedger::default());
        assert!(trailing_slash.is_ok());
    }

    #[test]
    fn test_joins_paths() {
        let transport =
            HttpTransport::new("http://127.0.0.1:8080", Duration::from_secs(1), BufferLedger::default())
                .unwrap();
        let url = transport.url("/hello/exchange").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/hello/exchange");
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let ledger = BufferLedger::new(1, 16);
        let transport =
            HttpTransport::new(&format!("http://{}", addr), Duration::from_secs(2), ledger.clone()).unwrap();

        let result = transport.exchange("/hello/exchange").await;
        assert!(matches!(result, Err(TransportError::Request(_))));
        assert_eq!(ledger.snapshot().allocated, 0);
    }
}
