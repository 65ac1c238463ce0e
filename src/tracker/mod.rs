//! Prediction sources: one per transit mode.
//!
//! [`PredictionSource`] is the capability the update cycle depends on.
//! [`BusTracker`] queries the Bus Tracker `getpredictions` endpoint and
//! [`TrainTracker`] the Train Tracker `ttarrivals` endpoint. Neither retries;
//! a failed stop is simply tried again on the next cycle.

mod bus;
mod rail;

pub use bus::BusTracker;
pub use rail::TrainTracker;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Url;
use tracing::warn;

use crate::error::FetchError;
use crate::parser::PredictionBatch;
use crate::registry::Mode;

#[async_trait]
pub trait PredictionSource: Send + Sync {
    fn mode(&self) -> Mode;

    /// Fetches predictions for one stop, optionally filtered to one route.
    async fn try_fetch(
        &self,
        stop_id: &str,
        route: Option<&str>,
    ) -> Result<PredictionBatch, FetchError>;

    /// Like [`try_fetch`](Self::try_fetch), but a failure is logged and reads
    /// as an empty batch.
    async fn fetch(&self, stop_id: &str, route: Option<&str>) -> PredictionBatch {
        match self.try_fetch(stop_id, route).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(mode = %self.mode(), stop_id, route, error = %e, "Prediction fetch failed");
                PredictionBatch::empty(self.mode())
            }
        }
    }

    fn compute_etas(&self, batch: &PredictionBatch, now: NaiveDateTime) -> Vec<i64> {
        crate::eta::compute_etas(batch, now)
    }
}

/// Joins an API base URL and an endpoint name.
pub(crate) fn endpoint(base_url: &str, name: &str) -> Result<Url, FetchError> {
    let raw = format!("{}/{}", base_url.trim_end_matches('/'), name);
    Url::parse(&raw).map_err(|e| FetchError::InvalidUrl(format!("{raw}: {e}")))
}
