//! Bounded waits built on [`Driver::find_all`] polling.

use super::{Driver, ElementSnapshot, Locator};
use crate::error::DriverError;
use std::thread;
use std::time::{Duration, Instant};

/// How often a wait re-reads the page.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What the first element matching a locator must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Present,
    Visible,
    Clickable,
}

impl Condition {
    pub fn holds(self, element: &ElementSnapshot) -> bool {
        match self {
            Condition::Present => true,
            Condition::Visible => element.visible,
            Condition::Clickable => element.is_clickable(),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Condition::Present => "present",
            Condition::Visible => "visible",
            Condition::Clickable => "clickable",
        }
    }
}

/// Wait until the first element matching `locator` satisfies `condition`.
///
/// The page is checked at least once even with a zero timeout.
pub fn wait_for<D: Driver + ?Sized>(
    driver: &mut D,
    locator: &Locator,
    condition: Condition,
    timeout: Duration,
) -> Result<ElementSnapshot, DriverError> {
    poll(locator, condition.describe(), timeout, || {
        let found = driver.find_all(locator)?;
        Ok(found.into_iter().next().filter(|first| condition.holds(first)))
    })
}

/// Wait until at least one element matches, then return all of them.
pub fn wait_for_all<D: Driver + ?Sized>(
    driver: &mut D,
    locator: &Locator,
    timeout: Duration,
) -> Result<Vec<ElementSnapshot>, DriverError> {
    poll(locator, "present", timeout, || {
        let found = driver.find_all(locator)?;
        Ok((!found.is_empty()).then_some(found))
    })
}

fn poll<T>(
    locator: &Locator,
    condition: &'static str,
    timeout: Duration,
    mut attempt: impl FnMut() -> Result<Option<T>, DriverError>,
) -> Result<T, DriverError> {
    let started = Instant::now();
    loop {
        if let Some(found) = attempt()? {
            return Ok(found);
        }
        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Err(DriverError::Timeout {
                locator: locator.to_string(),
                condition,
                waited: timeout,
            });
        }
        thread::sleep(POLL_INTERVAL.min(timeout - elapsed));
    }
}
