//! Trait abstraction for obtaining one reading per poll, to enable testing
//! and mock mode.

use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::{BridgeClient, DATA_PATH_PREFIX};
use crate::error::Result;
use crate::sensors::{Reading, Simulate};

/// Source of readings for one channel.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Record type produced by this fetcher
    type Reading;

    /// Performs one round-trip and returns the decoded reading.
    async fn fetch_one(&self) -> Result<Self::Reading>;
}

/// Fetches `R` from the bridge's `/data/<kind>` endpoint.
pub struct HttpFetcher<R> {
    client: BridgeClient,
    path: String,
    _reading: PhantomData<fn() -> R>,
}

impl<R: Reading> HttpFetcher<R> {
    pub fn new(client: BridgeClient) -> Self {
        Self {
            client,
            path: format!("{}{}", DATA_PATH_PREFIX, R::KIND),
            _reading: PhantomData,
        }
    }

    /// Bridge path polled by this fetcher
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl<R> fmt::Debug for HttpFetcher<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("base_url", &self.client.base_url())
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl<R> Fetcher for HttpFetcher<R>
where
    R: DeserializeOwned + Send + 'static,
{
    type Reading = R;

    async fn fetch_one(&self) -> Result<R> {
        self.client.get_json(&self.path).await
    }
}

/// Produces simulated readings; used when the gateway runs in mock mode.
pub struct SimulatedFetcher<R> {
    _reading: PhantomData<fn() -> R>,
}

impl<R> SimulatedFetcher<R> {
    pub fn new() -> Self {
        Self { _reading: PhantomData }
    }
}

impl<R> Default for SimulatedFetcher<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for SimulatedFetcher<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SimulatedFetcher")
    }
}

#[async_trait]
impl<R> Fetcher for SimulatedFetcher<R>
where
    R: Simulate + Send + 'static,
{
    type Reading = R;

    async fn fetch_one(&self) -> Result<R> {
        Ok(R::simulate(&mut rand::thread_rng()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::gps::GpsData;
    use crate::sensors::tacho::TachoData;
    use std::time::Duration;

    #[test]
    fn test_http_fetcher_path_uses_kind() {
        let client = BridgeClient::new("http://localhost:7878", Duration::from_secs(1)).unwrap();
        assert_eq!(HttpFetcher::<GpsData>::new(client.clone()).path(), "/data/gps");
        assert_eq!(HttpFetcher::<TachoData>::new(client).path(), "/data/tachometer");
    }

    #[tokio::test]
    async fn test_simulated_fetcher_produces_readings() {
        let fetcher = SimulatedFetcher::<TachoData>::new();
        let reading = fetcher.fetch_one().await.unwrap();
        assert!(reading.rps >= 1000.0 && reading.rps <= 1500.0);
    }
}
