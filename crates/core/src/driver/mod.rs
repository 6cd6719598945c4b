//! Browser automation boundary.
//!
//! Everything above this module talks to a page through [`Driver`]. Two
//! implementations ship: [`StaticDriver`] works on parsed HTML in-process,
//! and `ChromeDriver` (feature `chrome`) drives a real Chromium session.

#[cfg(feature = "chrome")]
pub mod chrome;
#[cfg(feature = "fetch")]
pub mod fetch;
pub mod static_page;
pub mod wait;

use crate::dom::SelectorList;
use crate::error::DriverError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[cfg(feature = "chrome")]
pub use chrome::ChromeDriver;
pub use static_page::StaticDriver;
pub use wait::{wait_for, wait_for_all, Condition};

pub const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.documentElement.scrollHeight);";

/// A CSS locator, validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locator(String);

impl Locator {
    pub fn css(selector: &str) -> Result<Self, DriverError> {
        SelectorList::parse(selector)?;
        Ok(Self(selector.trim().to_string()))
    }

    /// For selectors compiled into the crate; a test checks each one parses.
    pub(crate) fn builtin(selector: &'static str) -> Self {
        Self(selector.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Locator {
    type Error = DriverError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Locator::css(&value)
    }
}

impl From<Locator> for String {
    fn from(value: Locator) -> Self {
        value.0
    }
}

/// Point-in-time read of one matched element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    pub tag: String,
    /// Rendered text, whitespace-collapsed and trimmed.
    pub text: String,
    /// `href` resolved to an absolute URL, when the element has one.
    pub href: Option<String>,
    pub attributes: HashMap<String, String>,
    pub visible: bool,
    pub enabled: bool,
}

impl ElementSnapshot {
    pub fn is_clickable(&self) -> bool {
        self.visible && self.enabled
    }
}

/// A single blocking browser session.
pub trait Driver {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    fn current_url(&self) -> Option<String>;

    /// Run a script in the page for its side effects.
    fn execute(&mut self, script: &str) -> Result<(), DriverError>;

    fn scroll_to_bottom(&mut self) -> Result<(), DriverError> {
        self.execute(SCROLL_TO_BOTTOM)
    }

    /// Every element currently matching `locator`, in document order.
    fn find_all(&mut self, locator: &Locator) -> Result<Vec<ElementSnapshot>, DriverError>;

    /// Click the first element matching `locator`.
    fn click(&mut self, locator: &Locator) -> Result<(), DriverError>;

    /// Type into the first element matching `locator`.
    fn type_text(&mut self, locator: &Locator, text: &str) -> Result<(), DriverError>;

    /// Full-page PNG capture.
    fn screenshot(&mut self) -> Result<Vec<u8>, DriverError>;
}

impl<D: Driver + ?Sized> Driver for &mut D {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        (**self).navigate(url)
    }

    fn current_url(&self) -> Option<String> {
        (**self).current_url()
    }

    fn execute(&mut self, script: &str) -> Result<(), DriverError> {
        (**self).execute(script)
    }

    fn scroll_to_bottom(&mut self) -> Result<(), DriverError> {
        (**self).scroll_to_bottom()
    }

    fn find_all(&mut self, locator: &Locator) -> Result<Vec<ElementSnapshot>, DriverError> {
        (**self).find_all(locator)
    }

    fn click(&mut self, locator: &Locator) -> Result<(), DriverError> {
        (**self).click(locator)
    }

    fn type_text(&mut self, locator: &Locator, text: &str) -> Result<(), DriverError> {
        (**self).type_text(locator, text)
    }

    fn screenshot(&mut self) -> Result<Vec<u8>, DriverError> {
        (**self).screenshot()
    }
}

impl<D: Driver + ?Sized> Driver for Box<D> {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        (**self).navigate(url)
    }

    fn current_url(&self) -> Option<String> {
        (**self).current_url()
    }

    fn execute(&mut self, script: &str) -> Result<(), DriverError> {
        (**self).execute(script)
    }

    fn scroll_to_bottom(&mut self) -> Result<(), DriverError> {
        (**self).scroll_to_bottom()
    }

    fn find_all(&mut self, locator: &Locator) -> Result<Vec<ElementSnapshot>, DriverError> {
        (**self).find_all(locator)
    }

    fn click(&mut self, locator: &Locator) -> Result<(), DriverError> {
        (**self).click(locator)
    }

    fn type_text(&mut self, locator: &Locator, text: &str) -> Result<(), DriverError> {
        (**self).type_text(locator, text)
    }

    fn screenshot(&mut self) -> Result<Vec<u8>, DriverError> {
        (**self).screenshot()
    }
}

/// Opens fresh, independent sessions. Each call must return a new browser
/// session that shares no page state with the others.
pub trait DriverFactory: Sync {
    type Driver: Driver;

    fn open(&self) -> Result<Self::Driver, DriverError>;
}

impl<F, D> DriverFactory for F
where
    F: Fn() -> Result<D, DriverError> + Sync,
    D: Driver,
{
    type Driver = D;

    fn open(&self) -> Result<D, DriverError> {
        self()
    }
}
