//! Tests for the entity detail harvester: gates, extraction, failure
//! isolation and the two end-to-end runs.

mod common;

use common::*;
use feedscout_core::collect::{group_by_entity, EntityGroup, LinkCollector};
use feedscout_core::config::Credentials;
use feedscout_core::driver::{Driver, StaticDriver};
use feedscout_core::error::DriverError;
use feedscout_core::events::{Event, Gate, MemorySink};
use feedscout_core::harvest::{harvest, harvest_parallel, DetailRecord, HarvestContext, HarvestReport, Harvester};
use feedscout_core::sink::{write_records, write_records_file, SnapshotDir};
use feedscout_core::NOT_AVAILABLE;
use pretty_assertions::assert_eq;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};

fn alpha_fields() -> Vec<String> {
    ["Croatia", "Joined Mar 3, 2014", "12.4K subscribers", "318 videos", "1,204,551 views"]
        .map(String::from)
        .to_vec()
}

fn beta_fields() -> Vec<String> {
    [NOT_AVAILABLE, "Joined Nov 20, 2019", "870 subscribers", "42 videos", "51,002 views"]
        .map(String::from)
        .to_vec()
}

fn group(entity: &str, related: &[&str]) -> EntityGroup {
    EntityGroup {
        entity_url: entity.to_string(),
        related: related.iter().map(|s| s.to_string()).collect(),
    }
}

#[test]
fn test_end_to_end_two_channels() {
    let config = config();
    let sink = MemorySink::new();
    let dir = tempfile::tempdir().unwrap();
    let snapshots = SnapshotDir::new(dir.path().join("screenshots"));

    let collector = LinkCollector::new(&config.listing, &config.locators, &config.timeouts, &sink);
    let pairs = collector.collect(&mut site(), LISTING_URL).unwrap();
    let groups = group_by_entity(&pairs);

    let ctx = HarvestContext::new(&config, None, &sink, &snapshots);
    let report = harvest(site(), &groups, ctx);
    assert!(report.failed.is_empty());

    let csv_path = dir.path().join("channels.csv");
    let rows = write_records_file(&csv_path, &config.header(), &report.records).unwrap();
    assert_eq!(rows, 2);

    let table = read_rows(&fs::read(&csv_path).unwrap());
    assert_eq!(table.len(), 3);
    assert_eq!(
        table[0],
        vec![
            "channel_url",
            "country",
            "joined youtube since",
            "subscribers",
            "number_of_videos",
            "views",
            "video_urls"
        ]
    );

    let mut alpha = vec![ALPHA.to_string()];
    alpha.extend(alpha_fields());
    alpha.extend([VIDEO_1.to_string(), VIDEO_3.to_string()]);
    assert_eq!(table[1], alpha);
    assert_eq!(table[1].len(), 1 + 5 + 2);

    let mut beta = vec![BETA.to_string()];
    beta.extend(beta_fields());
    beta.push(VIDEO_2.to_string());
    assert_eq!(table[2], beta);
    assert_eq!(table[2].len(), 1 + 5 + 1);

    assert!(!dir.path().join("screenshots").exists());
    assert_eq!(
        sink.count(|e| matches!(e, Event::FieldMissing { field, entity } if field == "country" && entity == BETA)),
        1
    );
}

#[test]
fn test_driver_failure_abandons_only_that_entity() {
    let config = config();
    let sink = MemorySink::new();
    let dir = tempfile::tempdir().unwrap();
    let snapshots = SnapshotDir::new(dir.path().join("screenshots"));
    let groups = vec![group(ALPHA, &[VIDEO_1, VIDEO_3]), group(BETA, &[VIDEO_2])];

    let ctx = HarvestContext::new(&config, None, &sink, &snapshots);
    let driver = CrashingDriver::new(site(), ALPHA, usize::MAX);
    let mut harvester = Harvester::new(driver, ctx);
    let report = harvester.harvest(&groups);

    // consent was handled on the failing entity and stays handled
    assert!(harvester.consent_done());
    assert_eq!(report.failed, vec![ALPHA.to_string()]);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].entity_url, BETA);
    assert_eq!(report.records[0].fields, beta_fields());

    let shots: Vec<_> = fs::read_dir(dir.path().join("screenshots"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(shots.len(), 1);
    assert!(shots[0].starts_with("channel_error_") && shots[0].ends_with(".png"));

    let failed = sink.count(|e| matches!(e, Event::EntityFailed { entity, .. } if entity == ALPHA));
    assert_eq!(failed, 1);
    assert_eq!(
        sink.events().last(),
        Some(&Event::HarvestFinished {
            succeeded: 1,
            failed: 1
        })
    );

    let mut out = Vec::new();
    write_records(&mut out, &config.header(), &report.records).unwrap();
    let table = read_rows(&out);
    assert_eq!(table.len(), 2);
    assert_eq!(table[1][0], BETA);
}

#[test]
fn test_unreachable_entity_is_isolated() {
    let config = config();
    let sink = MemorySink::new();
    let dir = tempfile::tempdir().unwrap();
    let snapshots = SnapshotDir::new(dir.path());
    let groups = vec![
        group("https://www.youtube.com/@gone", &[VIDEO_1]),
        group(BETA, &[VIDEO_2]),
    ];

    let ctx = HarvestContext::new(&config, None, &sink, &snapshots);
    let report = harvest(site(), &groups, ctx);

    assert_eq!(report.failed, vec!["https://www.youtube.com/@gone".to_string()]);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].related, vec![VIDEO_2]);
}

#[test]
fn test_consent_is_dismissed_once_per_session() {
    let config = config();
    let sink = MemorySink::new();
    let dir = tempfile::tempdir().unwrap();
    let snapshots = SnapshotDir::new(dir.path());
    let groups = vec![group(ALPHA, &[VIDEO_1]), group(BETA, &[VIDEO_2])];

    let ctx = HarvestContext::new(&config, None, &sink, &snapshots);
    harvest(site(), &groups, ctx);

    let consent_clicks = sink.count(|e| {
        matches!(
            e,
            Event::GateActed {
                gate: Gate::Consent,
                ..
            }
        )
    });
    assert_eq!(consent_clicks, 1);
}

#[test]
fn test_sign_in_flow_uses_injected_credentials() {
    let config = config();
    let sink = MemorySink::new();
    let dir = tempfile::tempdir().unwrap();
    let snapshots = SnapshotDir::new(dir.path());
    let creds = Credentials::new("scout@example.test", "correct horse");

    let ctx = HarvestContext::new(&config, Some(&creds), &sink, &snapshots);
    let mut harvester = Harvester::new(site(), ctx);
    let record = harvester.harvest_group(&group(ALPHA, &[VIDEO_1])).unwrap();

    assert_eq!(record.fields, alpha_fields());
    assert_eq!(
        sink.count(|e| matches!(
            e,
            Event::GateActed {
                gate: Gate::Credentials,
                ..
            }
        )),
        1
    );

    // the session went back to the channel after signing in
    let driver = harvester.into_driver();
    assert_eq!(driver.current_url().as_deref(), Some(ALPHA));
}

#[test]
fn test_without_credentials_sign_in_is_skipped() {
    let config = config();
    let sink = MemorySink::new();
    let dir = tempfile::tempdir().unwrap();
    let snapshots = SnapshotDir::new(dir.path());

    let ctx = HarvestContext::new(&config, None, &sink, &snapshots);
    let mut harvester = Harvester::new(site(), ctx);
    let record = harvester.harvest_group(&group(ALPHA, &[VIDEO_1])).unwrap();

    assert_eq!(record.fields, alpha_fields());
    assert_eq!(sink.count(|e| matches!(e, Event::FieldMissing { .. })), 0);
    assert_eq!(
        sink.count(|e| matches!(
            e,
            Event::GateActed {
                gate: Gate::SignIn,
                ..
            }
        )),
        0
    );
    assert_eq!(harvester.into_driver().current_url().as_deref(), Some(ALPHA));
}

#[test]
fn test_late_navigation_does_not_strand_session_without_credentials() {
    let config = config();
    let sink = MemorySink::new();
    let dir = tempfile::tempdir().unwrap();
    let snapshots = SnapshotDir::new(dir.path());

    let ctx = HarvestContext::new(&config, None, &sink, &snapshots);
    let mut harvester = Harvester::new(DeferredNavDriver::new(site()), ctx);
    let record = harvester.harvest_group(&group(ALPHA, &[VIDEO_1])).unwrap();

    assert_eq!(record.fields, alpha_fields());
    assert_eq!(sink.count(|e| matches!(e, Event::FieldMissing { .. })), 0);
    let mut driver = harvester.into_driver();
    // reading forces any click-started navigation to land
    driver.find_all(&config.locators.entity_link).unwrap();
    assert_eq!(driver.current_url().as_deref(), Some(ALPHA));
}

#[test]
fn test_late_navigation_to_sign_in_returns_to_channel() {
    let config = config();
    let sink = MemorySink::new();
    let dir = tempfile::tempdir().unwrap();
    let snapshots = SnapshotDir::new(dir.path());
    let creds = Credentials::new("scout@example.test", "correct horse");

    let ctx = HarvestContext::new(&config, Some(&creds), &sink, &snapshots);
    let mut harvester = Harvester::new(DeferredNavDriver::new(site()), ctx);
    let record = harvester.harvest_group(&group(ALPHA, &[VIDEO_1])).unwrap();

    assert_eq!(record.fields, alpha_fields());
    assert_eq!(sink.count(|e| matches!(e, Event::FieldMissing { .. })), 0);
    assert_eq!(
        sink.count(|e| matches!(
            e,
            Event::GateActed {
                gate: Gate::Credentials,
                ..
            }
        )),
        1
    );
    let mut driver = harvester.into_driver();
    driver.find_all(&config.locators.entity_link).unwrap();
    assert_eq!(driver.current_url().as_deref(), Some(ALPHA));
}

#[test]
fn test_retry_recovers_transient_failure() {
    let mut config = config();
    config.retry.attempts = 2;
    config.retry.delay = std::time::Duration::from_millis(1);
    let sink = MemorySink::new();
    let dir = tempfile::tempdir().unwrap();
    let snapshots = SnapshotDir::new(dir.path().join("screenshots"));

    let ctx = HarvestContext::new(&config, None, &sink, &snapshots);
    let driver = CrashingDriver::new(site(), BETA, 1);
    let report = harvest(driver, &[group(BETA, &[VIDEO_2])], ctx);

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].fields, beta_fields());
    assert_eq!(
        sink.count(|e| matches!(e, Event::EntityRetry { attempt: 1, .. })),
        1
    );
    assert!(!dir.path().join("screenshots").exists());
}

#[test]
fn test_retries_exhausted_snapshot_once() {
    let mut config = config();
    config.retry.attempts = 2;
    config.retry.delay = std::time::Duration::from_millis(1);
    let sink = MemorySink::new();
    let dir = tempfile::tempdir().unwrap();
    let snapshots = SnapshotDir::new(dir.path());

    let ctx = HarvestContext::new(&config, None, &sink, &snapshots);
    let driver = CrashingDriver::new(site(), BETA, usize::MAX);
    let report = harvest(driver, &[group(BETA, &[VIDEO_2])], ctx);

    assert!(report.records.is_empty());
    assert_eq!(sink.count(|e| matches!(e, Event::EntityRetry { .. })), 2);
    assert_eq!(sink.count(|e| matches!(e, Event::SnapshotSaved { .. })), 1);
}

#[test]
fn test_parallel_harvest_keeps_group_order() {
    let config = config();
    let sink = MemorySink::new();
    let dir = tempfile::tempdir().unwrap();
    let snapshots = SnapshotDir::new(dir.path());
    let groups = vec![
        group(BETA, &[VIDEO_2]),
        group(ALPHA, &[VIDEO_1]),
        group("https://www.youtube.com/@gone", &[VIDEO_3]),
        group(ALPHA, &[VIDEO_3]),
    ];

    let ctx = HarvestContext::new(&config, None, &sink, &snapshots);
    let factory = || Ok::<_, DriverError>(site());
    let report = harvest_parallel(&factory, &groups, 2, ctx);

    let urls: Vec<&str> = report.records.iter().map(|r| r.entity_url.as_str()).collect();
    assert_eq!(urls, vec![BETA, ALPHA, ALPHA]);
    assert_eq!(report.records[2].related, vec![VIDEO_3]);
    assert_eq!(report.failed, vec!["https://www.youtube.com/@gone".to_string()]);

    // each worker session dismisses consent on its own
    let consent_clicks = sink.count(|e| {
        matches!(
            e,
            Event::GateActed {
                gate: Gate::Consent,
                ..
            }
        )
    });
    assert_eq!(consent_clicks, 2);
}

#[test]
fn test_worker_without_session_fails_its_entities() {
    let config = config();
    let sink = MemorySink::new();
    let dir = tempfile::tempdir().unwrap();
    let snapshots = SnapshotDir::new(dir.path());
    let groups = vec![group(ALPHA, &[VIDEO_1]), group(BETA, &[VIDEO_2])];

    let ctx = HarvestContext::new(&config, None, &sink, &snapshots);
    let factory = || -> Result<StaticDriver, DriverError> {
        Err(DriverError::Session("chrome not found".to_string()))
    };
    let report = harvest_parallel(&factory, &groups, 2, ctx);

    assert!(report.records.is_empty());
    assert_eq!(report.failed.len(), 2);
    assert_eq!(sink.count(|e| matches!(e, Event::WorkerFailed { .. })), 2);
}

#[test]
fn test_empty_group_list_opens_no_session() {
    let config = config();
    let sink = MemorySink::new();
    let dir = tempfile::tempdir().unwrap();
    let snapshots = SnapshotDir::new(dir.path());
    let opened = AtomicUsize::new(0);

    let ctx = HarvestContext::new(&config, None, &sink, &snapshots);
    let factory = || {
        opened.fetch_add(1, Ordering::SeqCst);
        Ok::<_, DriverError>(site())
    };
    let report = harvest_parallel(&factory, &[], 4, ctx);

    assert_eq!(report, HarvestReport::default());
    assert_eq!(opened.load(Ordering::SeqCst), 0);
    assert_eq!(
        sink.events(),
        vec![Event::HarvestFinished {
            succeeded: 0,
            failed: 0
        }]
    );
}

#[test]
fn test_row_is_entity_fields_then_related() {
    let record = DetailRecord {
        entity_url: "c/a".into(),
        fields: vec!["Croatia".into(), NOT_AVAILABLE.into()],
        related: vec!["v/1".into(), "v/2".into()],
    };
    assert_eq!(record.row(), vec!["c/a", "Croatia", "N/A", "v/1", "v/2"]);
}
