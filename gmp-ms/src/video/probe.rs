//! Optional HEAD liveness check for resolved locators

use std::time::Duration;
use tracing::debug;

/// Issues a HEAD request against http(s) locators
///
/// Purely informational: the outcome never changes which asset resolves.
pub struct LivenessProbe {
    http_client: reqwest::Client,
}

impl LivenessProbe {
    pub fn new(timeout: Duration) -> Option<Self> {
        match reqwest::Client::builder().timeout(timeout).build() {
            Ok(http_client) => Some(Self { http_client }),
            Err(e) => {
                debug!("Liveness probe disabled: {}", e);
                None
            }
        }
    }

    /// `None` for locators that are not http(s) URLs
    pub async fn check(&self, locator: &str) -> Option<bool> {
        if !(locator.starts_with("http://") || locator.starts_with("https://")) {
            return None;
        }

        match self.http_client.head(locator).send().await {
            Ok(response) => Some(response.status().is_success()),
            Err(e) => {
                debug!(locator, "Liveness probe failed: {}", e);
                Some(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_non_http_locator_is_not_probed() {
        let probe = LivenessProbe::new(Duration::from_millis(100)).unwrap();
        assert_eq!(probe.check("/var/videos/clip.mp4").await, None);
    }
}
