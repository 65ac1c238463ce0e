//! HTTP transport shared by both prediction APIs.

mod api_key;
mod basic;

pub use api_key::ApiKeyParam;
pub use basic::BasicClient;

use async_trait::async_trait;
use reqwest::{Method, Request, Response, Url};
use tracing::debug;

use crate::error::FetchError;

/// Executes a prepared request. Wrappers layer behaviour (such as API key
/// injection) around an inner client.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

/// GETs `url` and returns the body as text.
///
/// A non-2xx status is an error; the body of such a response is discarded.
pub async fn fetch_text<C: HttpClient + ?Sized>(client: &C, url: Url) -> Result<String, FetchError> {
    let req = Request::new(Method::GET, url);

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status(status));
    }

    let body = resp.text().await?;
    debug!(bytes = body.len(), "Response body received");
    Ok(body)
}
