use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, instrument};

use super::{PredictionSource, endpoint};
use crate::error::FetchError;
use crate::fetch::{ApiKeyParam, BasicClient, fetch_text};
use crate::parser::{PredictionBatch, parse_bus_response};
use crate::registry::Mode;

/// Client for the Bus Tracker v2 `getpredictions` endpoint.
#[derive(Debug)]
pub struct BusTracker {
    http: ApiKeyParam<BasicClient>,
    url: Url,
}

impl BusTracker {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            http: ApiKeyParam::new(BasicClient::with_timeout(timeout)?, api_key),
            url: endpoint(base_url, "getpredictions")?,
        })
    }
}

#[async_trait]
impl PredictionSource for BusTracker {
    fn mode(&self) -> Mode {
        Mode::Bus
    }

    #[instrument(name = "bus_fetch", skip(self))]
    async fn try_fetch(
        &self,
        stop_id: &str,
        route: Option<&str>,
    ) -> Result<PredictionBatch, FetchError> {
        let mut url = self.url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("stpid", stop_id);
            if let Some(route) = route {
                query.append_pair("rt", route);
            }
        }

        let body = fetch_text(&self.http, url).await?;
        let batch = parse_bus_response(&body)?;
        debug!(predictions = batch.arrivals.len(), "Bus predictions parsed");
        Ok(batch)
    }
}
