use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Connection settings for [`HttpRemoteStore`](crate::HttpRemoteStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteStoreConfig {
    /// Origin of the web API, without a trailing slash.
    pub base_url: String,
    /// Whole-request timeout in seconds. `None` leaves requests unbounded;
    /// the uploader applies its own per-chunk deadline.
    pub request_timeout_secs: Option<u64>,
    pub user_agent: String,
}

impl Default for RemoteStoreConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: None,
            user_agent: concat!("stashbox/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl RemoteStoreConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}
