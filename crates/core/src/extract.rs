//! Field extraction with a uniform "not available" fallback.

use crate::config::FieldSpec;
use crate::driver::{wait_for, Condition, Driver, Locator};
use crate::error::DriverError;
use crate::events::{Event, EventSink};
use std::time::Duration;

/// Stands in for any field that did not render within its wait.
pub const NOT_AVAILABLE: &str = "N/A";

/// Read the trimmed text of the first element matching `locator` once it is
/// visible. A timeout is not an error: it is logged against `entity` and the
/// field becomes [`NOT_AVAILABLE`]. Driver-level failures are returned.
pub fn extract<D: Driver + ?Sized>(
    driver: &mut D,
    locator: &Locator,
    field: &str,
    entity: &str,
    timeout: Duration,
    events: &dyn EventSink,
) -> Result<String, DriverError> {
    match wait_for(driver, locator, Condition::Visible, timeout) {
        Ok(element) => Ok(element.text.trim().to_string()),
        Err(e) if e.is_timeout() => {
            events.emit(Event::FieldMissing {
                field: field.to_string(),
                entity: entity.to_string(),
            });
            Ok(NOT_AVAILABLE.to_string())
        }
        Err(e) => Err(e),
    }
}

/// Extract every field in order. A missing field never stops the others.
pub fn extract_all<D: Driver + ?Sized>(
    driver: &mut D,
    fields: &[FieldSpec],
    entity: &str,
    timeout: Duration,
    events: &dyn EventSink,
) -> Result<Vec<String>, DriverError> {
    fields
        .iter()
        .map(|spec| extract(driver, &spec.locator, &spec.name, entity, timeout, events))
        .collect()
}
