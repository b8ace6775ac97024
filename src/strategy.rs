//! Consumption strategies
//!
//! Each variant turns one request into one decoded payload and applies its
//! own policy to the raw buffer behind the response:
//! - `Retrieve`: body arrives decoded, no buffer is ever exposed
//! - `Exchange`: body is taken from the full response, the buffer is left
//!   retained (the leak reproduction)
//! - `ExchangeRelease`: the transport's claim on the buffer is released
//!   before the body is taken

use crate::transport::{Transport, TransportError};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Buffer-ownership policy selected once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumptionStrategy {
    #[default]
    #[serde(alias = "RETRIEVE")]
    Retrieve,
    #[serde(alias = "EXCHANGE")]
    Exchange,
    #[serde(alias = "EXCHANGE_RELEASE")]
    ExchangeRelease,
}

impl ConsumptionStrategy {
    pub const ALL: [ConsumptionStrategy; 3] = [
        ConsumptionStrategy::Retrieve,
        ConsumptionStrategy::Exchange,
        ConsumptionStrategy::ExchangeRelease,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ConsumptionStrategy::Retrieve => "retrieve",
            ConsumptionStrategy::Exchange => "exchange",
            ConsumptionStrategy::ExchangeRelease => "exchange_release",
        }
    }

    /// Endpoint this strategy requests
    pub fn path(&self) -> &'static str {
        match self {
            ConsumptionStrategy::Retrieve => "/hello/retrieve",
            ConsumptionStrategy::Exchange => "/hello/exchange",
            ConsumptionStrategy::ExchangeRelease => "/hello/exchange_release",
        }
    }

    /// Lazy sequence of payloads for one pass of this strategy
    ///
    /// Nothing is requested until the stream is polled. Each element costs
    /// exactly one request; a failure is yielded as an `Err` element and
    /// ends the sequence.
    pub fn get<C: Transport>(
        self,
        client: Arc<C>,
    ) -> impl Stream<Item = Result<String, TransportError>> + Send + 'static {
        stream::once(async move { self.consume(client.as_ref()).await })
    }

    /// Issue one request and apply the buffer policy to its response
    pub async fn consume<C: Transport>(self, client: &C) -> Result<String, TransportError> {
        match self {
            ConsumptionStrategy::Retrieve => client.retrieve(self.path()).await,
            ConsumptionStrategy::Exchange => {
                let response = client.exchange(self.path()).await?;
                // Raw buffer is intentionally not released
                response.into_body().ok_or(TransportError::MissingBody)
            }
            ConsumptionStrategy::ExchangeRelease => {
                let mut response = client.exchange(self.path()).await?;
                if let Some(buffer) = response.take_raw_buffer() {
                    if buffer.ref_count() > 0 {
                        tracing::debug!("Releasing {}", buffer);
                        if let Err(e) = buffer.release() {
                            tracing::warn!(error = %e, "Buffer release refused");
                        }
                    }
                }
                response.into_body().ok_or(TransportError::MissingBody)
            }
        }
    }
}

impl fmt::Display for ConsumptionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown strategy name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown consumption strategy '{0}' (expected retrieve, exchange or exchange_release)")]
pub struct UnknownStrategy(pub String);

impl FromStr for ConsumptionStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "retrieve" => Ok(ConsumptionStrategy::Retrieve),
            "exchange" => Ok(ConsumptionStrategy::Exchange),
            "exchange_release" => Ok(ConsumptionStrategy::ExchangeRelease),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferLedger;
    use crate::transport::MockTransport;
    use futures_util::StreamExt;

    fn mock() -> Arc<MockTransport> {
        Arc::new(MockTransport::new(BufferLedger::new(8, 256)))
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("retrieve".parse(), Ok(ConsumptionStrategy::Retrieve));
        assert_eq!("EXCHANGE".parse(), Ok(ConsumptionStrategy::Exchange));
        assert_eq!("exchange-release".parse(), Ok(ConsumptionStrategy::ExchangeRelease));
        assert!("release".parse::<ConsumptionStrategy>().is_err());
    }

    #[test]
    fn test_name_round_trips() {
        for strategy in ConsumptionStrategy::ALL {
            assert_eq!(strategy.name().parse(), Ok(strategy));
            assert!(strategy.path().ends_with(strategy.name()));
        }
    }

    #[test]
    fn test_sequence_is_lazy() {
        let client = mock();
        let mut sequence = Box::pin(ConsumptionStrategy::Exchange.get(Arc::clone(&client)));
        assert_eq!(client.request_count(), 0);

        let item = tokio_test::block_on(sequence.next());
        assert!(matches!(item, Some(Ok(_))));
        assert_eq!(client.request_count(), 1);

        assert!(tokio_test::block_on(sequence.next()).is_none());
        assert_eq!(client.request_count(), 1);
    }

    #[tokio::test]
    async fn test_retrieve_exposes_no_buffer() {
        let client = mock();
        for _ in 0..10 {
            let payload = ConsumptionStrategy::Retrieve.consume(client.as_ref()).await;
            assert!(payload.is_ok());
        }
        assert!(client.buffers().is_empty());
        assert_eq!(client.ledger().snapshot().allocated, 0);
    }

    #[tokio::test]
    async fn test_exchange_leaves_buffer_retained() {
        let client = mock();
        for _ in 0..10 {
            let payload = ConsumptionStrategy::Exchange.consume(client.as_ref()).await.unwrap();
            assert!(payload.starts_with("Hello mock; "));
        }

        let observers = client.buffers();
        assert_eq!(observers.len(), 10);
        assert!(observers.iter().all(|p| p.ref_count() == 1));
        assert_eq!(client.ledger().outstanding(), 10);
    }

    #[tokio::test]
    async fn test_exchange_release_returns_claim() {
        let client = Arc::new(
            MockTransport::new(BufferLedger::new(8, 256)).with_initial_ref_count(3),
        );
        for _ in 0..5 {
            ConsumptionStrategy::ExchangeRelease.consume(client.as_ref()).await.unwrap();
        }

        let observers = client.buffers();
        assert!(observers.iter().all(|p| p.ref_count() == 2));
    }

    #[tokio::test]
    async fn test_exchange_release_frees_single_claim() {
        let client = mock();
        ConsumptionStrategy::ExchangeRelease.consume(client.as_ref()).await.unwrap();

        let observer = &client.buffers()[0];
        assert_eq!(observer.ref_count(), 0);
        assert!(observer.is_freed());
        assert!(client.ledger().verify().is_ok());
    }

    #[tokio::test]
    async fn test_exchange_release_skips_zero_count() {
        let client = Arc::new(
            MockTransport::new(BufferLedger::new(8, 256)).with_initial_ref_count(0),
        );
        let payload = ConsumptionStrategy::ExchangeRelease.consume(client.as_ref()).await;

        assert!(payload.is_ok());
        assert_eq!(client.buffers()[0].ref_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_body_is_in_band_failure() {
        let client = Arc::new(MockTransport::new(BufferLedger::new(8, 256)).with_body(None));

        for strategy in ConsumptionStrategy::ALL {
            let result = strategy.consume(client.as_ref()).await;
            assert_eq!(result, Err(TransportError::MissingBody));
        }
    }

    #[tokio::test]
    async fn test_transport_failure_ends_sequence() {
        let client = mock();
        client.fail_next(TransportError::Status(502));

        let items: Vec<_> = ConsumptionStrategy::ExchangeRelease
            .get(Arc::clone(&client))
            .collect()
            .await;

        assert_eq!(items, vec![Err(TransportError::Status(502))]);
        assert!(client.buffers().is_empty());
    }

    #[test]
    fn test_deserialize_aliases() {
        #[derive(Deserialize)]
        struct Wrapper {
            method: ConsumptionStrategy,
        }

        let parsed: Wrapper = toml::from_str("method = \"EXCHANGE_RELEASE\"").unwrap();
        assert_eq!(parsed.method, ConsumptionStrategy::ExchangeRelease);

        let parsed: Wrapper = toml::from_str("method = \"exchange\"").unwrap();
        assert_eq!(parsed.method, ConsumptionStrategy::Exchange);
    }
}
