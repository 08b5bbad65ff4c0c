//! Client configuration.

use std::time::Duration;

use url::Url;

use crate::error::{ClientError, ClientResult};

/// Delay between a lost live channel and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Where the server lives and who we are.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server root, e.g. `http://localhost:3000/`. Always ends in `/`.
    pub base_url: Url,
    /// Access token issued at sign-up / sign-in.
    pub token: String,
    /// Fixed delay before every reconnect attempt.
    pub reconnect_delay: Duration,
}

impl ClientConfig {
    /// Build a configuration with the default reconnect delay.
    ///
    /// A base URL with a path, such as `https://host/alumni`, is treated as
    /// a directory so endpoints resolve beneath it.
    pub fn new(base_url: &str, token: impl Into<String>) -> ClientResult<Self> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidUrl(format!(
                "unsupported scheme: {}",
                base_url.scheme()
            )));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            token: token.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        })
    }

    /// Override the reconnect delay.
    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// URL of a REST endpoint, `path` relative to `/api/`.
    pub fn api_url(&self, path: &str) -> ClientResult<Url> {
        self.base_url
            .join(&format!("api/{}", path.trim_start_matches('/')))
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))
    }

    /// URL of the live channel with the token in the query string.
    pub fn streaming_url(&self) -> ClientResult<Url> {
        let mut url = self
            .base_url
            .join("streaming")
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;

        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| ClientError::InvalidUrl(format!("cannot use scheme {scheme}")))?;
        url.query_pairs_mut().append_pair("token", &self.token);

        Ok(url)
    }
}
