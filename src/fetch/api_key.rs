use crate::fetch::HttpClient;
use async_trait::async_trait;

/// An [`HttpClient`] wrapper that appends the CTA developer key as the `key`
/// query parameter on every request.
///
/// Bus Tracker and Train Tracker issue separate keys, so each tracker holds
/// its own wrapper.
#[derive(Clone)]
pub struct ApiKeyParam<C> {
    inner: C,
    key: String,
}

impl<C> ApiKeyParam<C> {
    pub fn new(inner: C, key: impl Into<String>) -> Self {
        Self {
            inner,
            key: key.into(),
        }
    }
}

// Keeps the key out of logs.
impl<C> std::fmt::Debug for ApiKeyParam<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyParam").field("key", &"<redacted>").finish()
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for ApiKeyParam<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.url_mut().query_pairs_mut().append_pair("key", &self.key);
        self.inner.execute(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::BasicClient;
    use std::time::Duration;

    #[test]
    fn test_debug_hides_key() {
        let client = ApiKeyParam::new(
            BasicClient::with_timeout(Duration::from_secs(1)).unwrap(),
            "s3cret-key",
        );
        let shown = format!("{client:?}");
        assert!(!shown.contains("s3cret-key"));
        assert!(shown.contains("<redacted>"));
    }
}
