//! Run configuration: a TOML file where every section is optional, plus
//! credentials that only ever come from the environment.

use crate::driver::Locator;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the sign-in address.
pub const EMAIL_ENV: &str = "FEEDSCOUT_AUTH_EMAIL";
/// Environment variable holding the sign-in secret.
pub const PASSWORD_ENV: &str = "FEEDSCOUT_AUTH_PASSWORD";

/// Upper bound for any single backoff delay.
const MAX_RETRY_DELAY_MS: u64 = 30_000;
const MIN_RETRY_DELAY_MS: u64 = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    pub listing: ListingConfig,
    pub timeouts: Timeouts,
    pub locators: Locators,
    pub fields: Vec<FieldSpec>,
    pub retry: RetryPolicy,
    pub output: OutputConfig,
    pub browser: BrowserConfig,
    pub harvest: HarvestConfig,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            listing: ListingConfig::default(),
            timeouts: Timeouts::default(),
            locators: Locators::default(),
            fields: FieldSpec::defaults(),
            retry: RetryPolicy::default(),
            output: OutputConfig::default(),
            browser: BrowserConfig::default(),
            harvest: HarvestConfig::default(),
        }
    }
}

impl ScoutConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: ScoutConfig = toml::from_str(text)?;
        if config.fields.is_empty() {
            config.fields = FieldSpec::defaults();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.listing.url {
            url::Url::parse(url)
                .map_err(|e| ConfigError::Invalid(format!("listing.url `{url}`: {e}")))?;
        }
        if self.listing.max_scrolls == 0 {
            return Err(ConfigError::Invalid("listing.max_scrolls must be at least 1".into()));
        }
        if self.harvest.workers == 0 {
            return Err(ConfigError::Invalid("harvest.workers must be at least 1".into()));
        }
        if self.browser.window_width == 0 || self.browser.window_height == 0 {
            return Err(ConfigError::Invalid("browser window size must be non-zero".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(ConfigError::Invalid("field names must not be empty".into()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate field `{}`", field.name)));
            }
        }
        Ok(())
    }

    /// Column names for the record file: entity, one per field, then the
    /// label over the first related-item column.
    pub fn header(&self) -> Vec<String> {
        let mut header = Vec::with_capacity(self.fields.len() + 2);
        header.push(self.output.entity_column.clone());
        header.extend(self.fields.iter().map(|f| f.name.clone()));
        header.push(self.output.related_column.clone());
        header
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    /// Search-results page to collect from.
    pub url: Option<String>,
    pub max_scrolls: usize,
    #[serde(with = "secs")]
    pub max_scroll_time: Duration,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_scrolls: 200,
            max_scroll_time: Duration::from_secs(600),
        }
    }
}

/// Wait bounds, written in milliseconds in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Consent, sign-in and credential affordances.
    #[serde(with = "millis")]
    pub gate: Duration,
    /// Description panel, which renders late.
    #[serde(with = "millis")]
    pub panel: Duration,
    #[serde(with = "millis")]
    pub field: Duration,
    #[serde(with = "millis")]
    pub contact: Duration,
    /// Pause after each scroll before counting links.
    #[serde(with = "millis")]
    pub scroll_settle: Duration,
    /// Wait for the first entity links after the listing consent click.
    #[serde(with = "millis")]
    pub listing_ready: Duration,
    /// Pause after navigating to an entity page.
    #[serde(with = "millis")]
    pub page_settle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            gate: Duration::from_secs(5),
            panel: Duration::from_secs(15),
            field: Duration::from_secs(5),
            contact: Duration::from_secs(10),
            scroll_settle: Duration::from_secs(2),
            listing_ready: Duration::from_secs(10),
            page_settle: Duration::from_secs(1),
        }
    }
}

impl Timeouts {
    /// All waits and pauses set to zero, for in-process pages.
    pub fn immediate() -> Self {
        Self {
            gate: Duration::ZERO,
            panel: Duration::ZERO,
            field: Duration::ZERO,
            contact: Duration::ZERO,
            scroll_settle: Duration::ZERO,
            listing_ready: Duration::ZERO,
            page_settle: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Locators {
    pub listing_consent: Locator,
    pub entity_link: Locator,
    pub secondary_link: Locator,
    pub detail_consent: Locator,
    pub sign_in: Locator,
    pub identifier: Locator,
    pub identifier_next: Locator,
    pub password: Locator,
    pub password_next: Locator,
    pub expand_panel: Locator,
    pub reveal_contact: Locator,
}

impl Default for Locators {
    fn default() -> Self {
        Self {
            listing_consent: Locator::builtin(
                "#content > div:nth-of-type(2) > div:nth-of-type(6) > div:nth-of-type(1) > ytd-button-renderer:nth-of-type(2) > yt-button-shape > button",
            ),
            entity_link: Locator::builtin("a#video-title"),
            secondary_link: Locator::builtin("a.yt-simple-endpoint.yt-formatted-string"),
            detail_consent: Locator::builtin(
                "#yDmH0d > c-wiz > div > div > div > div:nth-of-type(2) > div:nth-of-type(1) > div:nth-of-type(3) > div:nth-of-type(1) > form:nth-of-type(2) > div > div > button",
            ),
            sign_in: Locator::builtin("#buttons > ytd-button-renderer > yt-button-shape > a"),
            identifier: Locator::builtin("#identifierId"),
            identifier_next: Locator::builtin("#identifierNext > div > button"),
            password: Locator::builtin(
                "#password > div:nth-of-type(1) > div > div:nth-of-type(1) > input",
            ),
            password_next: Locator::builtin("#passwordNext > div > button"),
            expand_panel: Locator::builtin(
                "#page-header > yt-page-header-renderer > yt-page-header-view-model > div > div:nth-of-type(1) > div > yt-description-preview-view-model > truncated-text > button",
            ),
            reveal_contact: Locator::builtin(
                "#view-email-button-container > yt-button-view-model > button-view-model > button",
            ),
        }
    }
}

/// One extracted column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub locator: Locator,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, locator: Locator) -> Self {
        Self {
            name: name.into(),
            locator,
        }
    }

    /// The five rows of the channel "about" table, keyed by their icon.
    pub fn defaults() -> Vec<FieldSpec> {
        [
            ("country", r#"tr.description-item:has(yt-icon[icon="privacy_public"]) td:nth-of-type(2)"#),
            ("joined youtube since", r#"tr.description-item:has(yt-icon[icon="info_outline"]) td:nth-of-type(2)"#),
            ("subscribers", r#"tr.description-item:has(yt-icon[icon="person_radar"]) td:nth-of-type(2)"#),
            ("number_of_videos", r#"tr.description-item:has(yt-icon[icon="my_videos"]) td:nth-of-type(2)"#),
            ("views", r#"tr.description-item:has(yt-icon[icon="trending_up"]) td:nth-of-type(2)"#),
        ]
        .into_iter()
        .map(|(name, css)| FieldSpec::new(name, Locator::builtin(css)))
        .collect()
    }
}

/// Extra passes for an entity whose harvest hit a driver-level failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub attempts: usize,
    /// Base backoff, doubled per attempt.
    #[serde(with = "millis")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 0,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let base = u64::try_from(self.delay.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(retry_delay_ms(base, attempt, None))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub csv_path: PathBuf,
    pub snapshot_dir: PathBuf,
    pub entity_column: String,
    pub related_column: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("channels.csv"),
            snapshot_dir: PathBuf::from("screenshots"),
            entity_column: "channel_url".to_string(),
            related_column: "video_urls".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// Extra Chromium command-line flags.
    pub args: Vec<String>,
    #[serde(with = "millis")]
    pub page_load_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            args: Vec::new(),
            page_load_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Independent browser sessions visiting entities.
    pub workers: usize,
    /// Idle time after the reveal-contact step, left for an external
    /// challenge solver.
    #[serde(with = "secs")]
    pub challenge_pause: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            challenge_pause: Duration::ZERO,
        }
    }
}

/// Sign-in identity. Never part of the config file.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Both variables must be set and non-empty.
    pub fn from_env() -> Option<Self> {
        let read = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Some(Self::new(read(EMAIL_ENV)?, read(PASSWORD_ENV)?))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Exponential backoff in milliseconds for retry `attempt` (0-based).
/// A server-supplied Retry-After wins over the computed delay.
pub(crate) fn retry_delay_ms(base_ms: u64, attempt: usize, retry_after_secs: Option<u64>) -> u64 {
    if let Some(secs) = retry_after_secs {
        return secs.saturating_mul(1000).min(MAX_RETRY_DELAY_MS);
    }
    let factor = 1u64.checked_shl(attempt.min(32) as u32).unwrap_or(u64::MAX);
    base_ms
        .saturating_mul(factor)
        .clamp(MIN_RETRY_DELAY_MS, MAX_RETRY_DELAY_MS)
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
