//! Shared fixtures: a three-frame search feed and two channel pages.

#![allow(dead_code)]

use feedscout_core::config::{ScoutConfig, Timeouts};
use feedscout_core::driver::{Driver, ElementSnapshot, Locator, StaticDriver};
use feedscout_core::error::DriverError;

pub const LISTING_URL: &str = "https://www.youtube.com/results?search_query=azure&sp=EgQIARgC";
pub const ALPHA: &str = "https://www.youtube.com/@alpha";
pub const BETA: &str = "https://www.youtube.com/@beta";
pub const SIGN_IN: &str = "https://accounts.google.test/signin";

pub const VIDEO_1: &str = "https://www.youtube.com/watch?v=aaa111";
pub const VIDEO_2: &str = "https://www.youtube.com/watch?v=bbb222";
pub const VIDEO_3: &str = "https://www.youtube.com/watch?v=ccc333";

pub fn listing_frames() -> [&'static str; 3] {
    [
        include_str!("../fixtures/listing_0.html"),
        include_str!("../fixtures/listing_1.html"),
        include_str!("../fixtures/listing_2.html"),
    ]
}

/// Fixture config with every wait set to zero.
pub fn config() -> ScoutConfig {
    let mut config = ScoutConfig::from_toml_str(include_str!("../fixtures/scout.toml")).unwrap();
    config.timeouts = Timeouts::immediate();
    config
}

/// A session that knows the listing, both channels and the sign-in page.
pub fn site() -> StaticDriver {
    StaticDriver::new()
        .with_frames(LISTING_URL, listing_frames())
        .with_page(ALPHA, include_str!("../fixtures/channel_alpha.html"))
        .with_page(BETA, include_str!("../fixtures/channel_beta.html"))
        .with_page(SIGN_IN, include_str!("../fixtures/signin.html"))
}

/// Wraps a driver and makes element reads fail on one entity page, the way a
/// crashed tab does. `failures` bounds how many reads fail.
pub struct CrashingDriver<D> {
    pub inner: D,
    entity: String,
    failures: usize,
}

impl<D: Driver> CrashingDriver<D> {
    pub fn new(inner: D, entity: &str, failures: usize) -> Self {
        Self {
            inner,
            entity: entity.to_string(),
            failures,
        }
    }

    fn should_fail(&mut self, locator: &Locator) -> bool {
        let on_entity = self.inner.current_url().as_deref() == Some(self.entity.as_str());
        if on_entity && locator.as_str().contains("description-item") && self.failures > 0 {
            self.failures -= 1;
            return true;
        }
        false
    }
}

impl<D: Driver> Driver for CrashingDriver<D> {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.inner.navigate(url)
    }

    fn current_url(&self) -> Option<String> {
        self.inner.current_url()
    }

    fn execute(&mut self, script: &str) -> Result<(), DriverError> {
        self.inner.execute(script)
    }

    fn scroll_to_bottom(&mut self) -> Result<(), DriverError> {
        self.inner.scroll_to_bottom()
    }

    fn find_all(&mut self, locator: &Locator) -> Result<Vec<ElementSnapshot>, DriverError> {
        if self.should_fail(locator) {
            return Err(DriverError::Session("tab crashed".to_string()));
        }
        self.inner.find_all(locator)
    }

    fn click(&mut self, locator: &Locator) -> Result<(), DriverError> {
        self.inner.click(locator)
    }

    fn type_text(&mut self, locator: &Locator, text: &str) -> Result<(), DriverError> {
        self.inner.type_text(locator, text)
    }

    fn screenshot(&mut self) -> Result<Vec<u8>, DriverError> {
        self.inner.screenshot()
    }
}

/// Wraps a driver so that following a link takes effect only on the next
/// element read, the way a real browser returns from a click before the new
/// page has loaded. Until then `current_url` still reports the old page.
pub struct DeferredNavDriver<D> {
    pub inner: D,
    pending: Option<String>,
}

impl<D: Driver> DeferredNavDriver<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            pending: None,
        }
    }

    fn settle(&mut self) -> Result<(), DriverError> {
        match self.pending.take() {
            Some(url) => self.inner.navigate(&url),
            None => Ok(()),
        }
    }
}

impl<D: Driver> Driver for DeferredNavDriver<D> {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.pending = None;
        self.inner.navigate(url)
    }

    fn current_url(&self) -> Option<String> {
        self.inner.current_url()
    }

    fn execute(&mut self, script: &str) -> Result<(), DriverError> {
        self.settle()?;
        self.inner.execute(script)
    }

    fn scroll_to_bottom(&mut self) -> Result<(), DriverError> {
        self.settle()?;
        self.inner.scroll_to_bottom()
    }

    fn find_all(&mut self, locator: &Locator) -> Result<Vec<ElementSnapshot>, DriverError> {
        self.settle()?;
        self.inner.find_all(locator)
    }

    fn click(&mut self, locator: &Locator) -> Result<(), DriverError> {
        self.settle()?;
        let first = self.inner.find_all(locator)?.into_iter().next();
        match first {
            Some(el) if el.tag == "a" && el.href.is_some() => {
                self.pending = el.href;
                Ok(())
            }
            _ => self.inner.click(locator),
        }
    }

    fn type_text(&mut self, locator: &Locator, text: &str) -> Result<(), DriverError> {
        self.settle()?;
        self.inner.type_text(locator, text)
    }

    fn screenshot(&mut self) -> Result<Vec<u8>, DriverError> {
        self.settle()?;
        self.inner.screenshot()
    }
}

/// Parse CSV output into rows, keeping ragged lengths.
pub fn read_rows(bytes: &[u8]) -> Vec<Vec<String>> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes)
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}
