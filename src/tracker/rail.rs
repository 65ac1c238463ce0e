use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, instrument};

use super::{PredictionSource, endpoint};
use crate::error::FetchError;
use crate::fetch::{ApiKeyParam, BasicClient, fetch_text};
use crate::parser::{PredictionBatch, parse_rail_response};
use crate::registry::Mode;

/// Client for the Train Tracker `ttarrivals.aspx` endpoint.
///
/// Platforms are queried by `stpid` only. A route on a rail stop names the
/// topic but does not filter the request.
#[derive(Debug)]
pub struct TrainTracker {
    http: ApiKeyParam<BasicClient>,
    url: Url,
}

impl TrainTracker {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            http: ApiKeyParam::new(BasicClient::with_timeout(timeout)?, api_key),
            url: endpoint(base_url, "ttarrivals.aspx")?,
        })
    }
}

#[async_trait]
impl PredictionSource for TrainTracker {
    fn mode(&self) -> Mode {
        Mode::Rail
    }

    #[instrument(name = "rail_fetch", skip(self, _route))]
    async fn try_fetch(
        &self,
        stop_id: &str,
        _route: Option<&str>,
    ) -> Result<PredictionBatch, FetchError> {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("stpid", stop_id);

        let body = fetch_text(&self.http, url).await?;
        let batch = parse_rail_response(&body)?;
        debug!(predictions = batch.arrivals.len(), "Rail predictions parsed");
        Ok(batch)
    }
}
