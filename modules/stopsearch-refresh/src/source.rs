// StopSearchSource: the remote data API behind one trait so the fetcher can run
// against MockSource in tests without a network.

use anyhow::Result;
use async_trait::async_trait;

use police_client::{AvailableDate, PoliceClient, RawStopSearch};

#[async_trait]
pub trait StopSearchSource: Send + Sync {
    /// Published months and the forces covered by each.
    async fn available_dates(&self) -> Result<Vec<AvailableDate>>;

    /// Raw stop-and-search events for one force and month.
    async fn stops(&self, force: &str, date: &str) -> Result<Vec<RawStopSearch>>;
}

#[async_trait]
impl StopSearchSource for PoliceClient {
    async fn available_dates(&self) -> Result<Vec<AvailableDate>> {
        Ok(self.available_dates().await?)
    }

    async fn stops(&self, force: &str, date: &str) -> Result<Vec<RawStopSearch>> {
        Ok(self.stops_by_force(force, date).await?)
    }
}
