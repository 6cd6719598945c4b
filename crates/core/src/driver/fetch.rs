//! HTTP page loading for [`StaticDriver`](super::StaticDriver).
//! Gated behind the "fetch" feature flag.

use crate::config::retry_delay_ms;
use crate::error::DriverError;
use reqwest::blocking::Client;
use reqwest::header::RETRY_AFTER;
use std::thread;
use std::time::Duration;
use url::Url;

/// Configuration for page fetching.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User-Agent header.
    pub user_agent: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Extra attempts after the first failed one.
    pub retry_attempts: usize,
    /// Base backoff delay, doubled per attempt.
    pub retry_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string(),
            timeout_secs: 30,
            retry_attempts: 2,
            retry_delay_ms: 500,
        }
    }
}

/// Blocking HTML fetcher with a cookie jar shared across requests.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self, DriverError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_store(true)
            .build()
            .map_err(|e| DriverError::Session(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// GET `url` and return the body, retrying throttled, server-side and
    /// network failures.
    pub fn get(&self, url: &str) -> Result<String, DriverError> {
        let parsed = Url::parse(url).map_err(|e| DriverError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let max_attempts = self.config.retry_attempts + 1;
        let mut last_reason = String::new();
        let mut retry_after: Option<u64> = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = retry_delay_ms(self.config.retry_delay_ms, attempt - 1, retry_after.take());
                thread::sleep(Duration::from_millis(delay));
            }

            let response = match self.client.get(parsed.as_str()).send() {
                Ok(r) => r,
                Err(e) => {
                    last_reason = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                retry_after = response.headers().get(RETRY_AFTER).and_then(parse_retry_after);
                last_reason = format!("HTTP {}", status.as_u16());
                continue;
            }
            if !status.is_success() {
                return Err(DriverError::Navigation {
                    url: url.to_string(),
                    reason: format!("HTTP {}", status.as_u16()),
                });
            }

            return response.text().map_err(|e| DriverError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            });
        }

        Err(DriverError::Navigation {
            url: url.to_string(),
            reason: format!("retry attempts exhausted ({last_reason})"),
        })
    }
}

fn parse_retry_after(value: &reqwest::header::HeaderValue) -> Option<u64> {
    let s = value.to_str().ok()?;
    s.trim().parse::<u64>().ok()
}
