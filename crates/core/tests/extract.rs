//! Tests for field extraction and the events it reports.

use feedscout_core::config::FieldSpec;
use feedscout_core::driver::{Driver, Locator, StaticDriver};
use feedscout_core::error::DriverError;
use feedscout_core::events::{Event, EventSink, Gate, MemorySink};
use feedscout_core::extract::{extract, extract_all};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tracing::Level;

const ENTITY: &str = "https://example.test/@channel";

fn page(html: &str) -> StaticDriver {
    let mut driver = StaticDriver::new().with_page(ENTITY, html.to_string());
    driver.navigate(ENTITY).unwrap();
    driver
}

#[test]
fn test_visible_text_is_trimmed() {
    let mut driver = page("<table><tr><td>Country</td><td>\n  Croatia  </td></tr></table>");
    let sink = MemorySink::new();
    let value = extract(
        &mut driver,
        &Locator::css("td:nth-of-type(2)").unwrap(),
        "country",
        ENTITY,
        Duration::ZERO,
        &sink,
    )
    .unwrap();
    assert_eq!(value, "Croatia");
    assert!(sink.events().is_empty());
}

#[test]
fn test_hidden_or_missing_fields_are_sentinel() {
    let mut driver = page(r#"<p id="a" hidden>secret</p><p id="b">shown</p>"#);
    let sink = MemorySink::new();
    let fields = vec![
        FieldSpec::new("a", Locator::css("#a").unwrap()),
        FieldSpec::new("missing", Locator::css("#nope").unwrap()),
        FieldSpec::new("b", Locator::css("#b").unwrap()),
    ];
    let values = extract_all(&mut driver, &fields, ENTITY, Duration::ZERO, &sink).unwrap();
    assert_eq!(values, vec!["N/A", "N/A", "shown"]);
    assert_eq!(sink.count(|e| matches!(e, Event::FieldMissing { .. })), 2);
}

#[test]
fn test_driver_failures_propagate() {
    let mut driver = StaticDriver::new();
    let sink = MemorySink::new();
    let result = extract(
        &mut driver,
        &Locator::css("p").unwrap(),
        "views",
        ENTITY,
        Duration::ZERO,
        &sink,
    );
    assert!(matches!(result, Err(DriverError::Session(_))));
}

#[test]
fn test_event_levels_follow_severity() {
    let missing = Event::FieldMissing {
        field: "country".into(),
        entity: ENTITY.into(),
    };
    assert_eq!(missing.level(), Level::WARN);
    assert_eq!(missing.to_string(), format!("country not found for {ENTITY}"));

    let skipped = Event::GateSkipped {
        gate: Gate::Consent,
        entity: None,
    };
    assert_eq!(skipped.level(), Level::INFO);
    assert_eq!(skipped.to_string(), "No consent found");
}

#[test]
fn test_memory_sink_records_in_order() {
    let sink = MemorySink::new();
    sink.emit(Event::HarvestFinished {
        succeeded: 1,
        failed: 0,
    });
    (&sink).emit(Event::SnapshotSaved {
        path: "x.png".into(),
    });
    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert!(matches!(events[1], Event::SnapshotSaved { .. }));
    assert_eq!(sink.count(|e| e.level() == Level::INFO), 2);
}
