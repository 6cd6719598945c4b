//! Real browser sessions over the Chrome DevTools protocol.
//! Gated behind the "chrome" feature flag.

use super::{Driver, ElementSnapshot, Locator};
use crate::config::BrowserConfig;
use crate::error::DriverError;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// How long a followed link may take before the tab reports a new URL.
const NAVIGATION_START: Duration = Duration::from_secs(3);
const NAVIGATION_POLL: Duration = Duration::from_millis(100);

/// Reads every match of a selector in one round trip. `__SELECTOR__` is
/// replaced by a JSON string literal.
const SNAPSHOT_SCRIPT: &str = r#"(() => {
  const nodes = Array.from(document.querySelectorAll(__SELECTOR__));
  return JSON.stringify(nodes.map((el) => {
    const style = window.getComputedStyle(el);
    const rect = el.getBoundingClientRect();
    const attributes = {};
    for (const a of el.attributes) { attributes[a.name] = a.value; }
    return {
      tag: el.tagName.toLowerCase(),
      text: (el.innerText || '').replace(/\s+/g, ' ').trim(),
      href: (typeof el.href === 'string' && el.href) ? el.href : null,
      attributes,
      visible: rect.width > 0 && rect.height > 0
        && style.visibility !== 'hidden' && style.display !== 'none',
      enabled: !el.disabled,
    };
  }));
})()"#;

pub struct ChromeDriver {
    // Dropping the browser closes the session, so it must outlive the tab.
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeDriver {
    /// Launch a fresh browser process with its own profile.
    pub fn launch(config: &BrowserConfig) -> Result<Self, DriverError> {
        let mut args: Vec<&OsStr> = vec![
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--start-maximized"),
        ];
        args.extend(config.args.iter().map(OsStr::new));

        let browser = Browser::new(LaunchOptions {
            headless: config.headless,
            window_size: Some((config.window_width, config.window_height)),
            args,
            ..Default::default()
        })
        .map_err(session_error)?;

        let tab = browser.new_tab().map_err(session_error)?;
        tab.set_default_timeout(config.page_load_timeout);

        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    /// CDP clicks dispatch the event and return before navigation starts.
    /// Wait for the URL to move off `from`, then for the load to finish. A
    /// link that never leaves the page (a fragment, a script handler) is not
    /// an error.
    fn await_navigation(&self, from: &str) -> Result<(), DriverError> {
        let started = Instant::now();
        while self.tab.get_url() == from {
            if started.elapsed() >= NAVIGATION_START {
                return Ok(());
            }
            thread::sleep(NAVIGATION_POLL);
        }
        self.tab
            .wait_until_navigated()
            .map_err(|e| navigation_error(&self.tab.get_url(), e))?;
        Ok(())
    }
}

fn session_error(e: impl std::fmt::Display) -> DriverError {
    DriverError::Session(e.to_string())
}

fn navigation_error(url: &str, e: impl std::fmt::Display) -> DriverError {
    DriverError::Navigation {
        url: url.to_string(),
        reason: e.to_string(),
    }
}

impl Driver for ChromeDriver {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.tab
            .navigate_to(url)
            .map_err(|e| navigation_error(url, e))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| navigation_error(url, e))?;
        Ok(())
    }

    fn current_url(&self) -> Option<String> {
        Some(self.tab.get_url())
    }

    fn execute(&mut self, script: &str) -> Result<(), DriverError> {
        self.tab
            .evaluate(script, false)
            .map_err(|e| DriverError::Script(e.to_string()))?;
        Ok(())
    }

    fn find_all(&mut self, locator: &Locator) -> Result<Vec<ElementSnapshot>, DriverError> {
        let selector = serde_json::to_string(locator.as_str())
            .map_err(|e| DriverError::Script(e.to_string()))?;
        let script = SNAPSHOT_SCRIPT.replace("__SELECTOR__", &selector);
        let result = self
            .tab
            .evaluate(&script, false)
            .map_err(|e| DriverError::Script(e.to_string()))?;

        match result.value {
            Some(serde_json::Value::String(json)) => serde_json::from_str(&json)
                .map_err(|e| DriverError::Script(format!("unreadable element snapshot: {e}"))),
            other => Err(DriverError::Script(format!(
                "selector `{locator}` returned {other:?}"
            ))),
        }
    }

    /// Clicking a link returns once the linked page has loaded, so callers
    /// see the same URL the tab ends up on.
    fn click(&mut self, locator: &Locator) -> Result<(), DriverError> {
        let follows_link = self
            .find_all(locator)?
            .first()
            .is_some_and(|el| el.tag == "a" && el.href.is_some());
        let before = self.tab.get_url();

        let element = self
            .tab
            .find_element(locator.as_str())
            .map_err(|_| DriverError::NoSuchElement(locator.to_string()))?;
        element.click().map_err(session_error)?;

        if follows_link {
            self.await_navigation(&before)?;
        }
        Ok(())
    }

    fn type_text(&mut self, locator: &Locator, text: &str) -> Result<(), DriverError> {
        let element = self
            .tab
            .find_element(locator.as_str())
            .map_err(|_| DriverError::NoSuchElement(locator.to_string()))?;
        element.type_into(text).map_err(session_error)?;
        Ok(())
    }

    fn screenshot(&mut self) -> Result<Vec<u8>, DriverError> {
        self.tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(session_error)
    }
}
