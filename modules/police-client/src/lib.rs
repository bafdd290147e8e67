pub mod error;
pub mod types;

pub use error::{PoliceApiError, Result};
pub use types::{AvailableDate, Location, OutcomeObject, RawStopSearch, Street};

use std::time::Duration;

use serde::de::DeserializeOwned;

/// Public police data API.
pub const DEFAULT_BASE_URL: &str = "https://data.police.uk/api";

pub struct PoliceClient {
    client: reqwest::Client,
    base_url: String,
}

impl PoliceClient {
    /// Build a client against `base_url` where every request is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Months for which street-level data has been published, with the forces
    /// covered by each month.
    pub async fn available_dates(&self) -> Result<Vec<AvailableDate>> {
        let url = format!("{}/crimes-street-dates", self.base_url);
        tracing::debug!(url, "Fetching available dates");
        self.get_json(&url, &[]).await
    }

    /// Stop-and-search events recorded by `force` during `date` (`YYYY-MM`).
    pub async fn stops_by_force(&self, force: &str, date: &str) -> Result<Vec<RawStopSearch>> {
        let url = format!("{}/stops-force", self.base_url);
        tracing::debug!(url, force, date, "Fetching stop and search records");
        let records: Vec<RawStopSearch> = self
            .get_json(&url, &[("force", force), ("date", date)])
            .await?;
        tracing::debug!(force, date, count = records.len(), "Fetched stop and search records");
        Ok(records)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        let resp = self.client.get(url).query(query).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PoliceApiError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}
