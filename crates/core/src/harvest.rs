//! Per-entity detail harvesting.
//!
//! Each entity goes through
//! `navigate -> consent (once per session) -> sign-in -> expand -> fields ->
//! reveal contact`. Timeouts inside a step are absorbed by the gates and the
//! extractor. Anything else aborts that entity only: it is logged, a snapshot
//! is taken, no record is produced, and the next entity starts.

use crate::collect::EntityGroup;
use crate::config::{Credentials, ScoutConfig};
use crate::driver::{Driver, DriverFactory};
use crate::error::DriverError;
use crate::events::{Event, EventSink};
use crate::extract::extract_all;
use crate::gates::Gates;
use crate::sink::SnapshotWriter;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

/// Snapshot name prefix for abandoned entities.
pub const FAILURE_SNAPSHOT: &str = "channel_error";

/// One harvested entity. `fields` follows the configured field order and
/// holds either extracted text or [`NOT_AVAILABLE`](crate::NOT_AVAILABLE).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailRecord {
    pub entity_url: String,
    pub fields: Vec<String>,
    pub related: Vec<String>,
}

impl DetailRecord {
    /// Flat output row: entity, fields, related items.
    pub fn row(&self) -> Vec<&str> {
        std::iter::once(self.entity_url.as_str())
            .chain(self.fields.iter().map(String::as_str))
            .chain(self.related.iter().map(String::as_str))
            .collect()
    }
}

/// Result of a harvest: records in group order plus the entities that were
/// abandoned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestReport {
    pub records: Vec<DetailRecord>,
    pub failed: Vec<String>,
}

/// What every session of a run shares.
#[derive(Clone, Copy)]
pub struct HarvestContext<'a> {
    pub config: &'a ScoutConfig,
    pub credentials: Option<&'a Credentials>,
    pub events: &'a dyn EventSink,
    pub snapshots: &'a dyn SnapshotWriter,
}

impl<'a> HarvestContext<'a> {
    pub fn new(
        config: &'a ScoutConfig,
        credentials: Option<&'a Credentials>,
        events: &'a dyn EventSink,
        snapshots: &'a dyn SnapshotWriter,
    ) -> Self {
        Self {
            config,
            credentials,
            events,
            snapshots,
        }
    }

    fn gates(&self) -> Gates<'a> {
        Gates::new(
            &self.config.locators,
            &self.config.timeouts,
            self.credentials,
            self.events,
        )
    }
}

/// One browser session working through entities. Consent is dismissed at
/// most once per session; the flag lives and dies with the session.
pub struct Harvester<'a, D: Driver> {
    driver: D,
    ctx: HarvestContext<'a>,
    consent_done: bool,
}

impl<'a, D: Driver> Harvester<'a, D> {
    pub fn new(driver: D, ctx: HarvestContext<'a>) -> Self {
        Self {
            driver,
            ctx,
            consent_done: false,
        }
    }

    pub fn consent_done(&self) -> bool {
        self.consent_done
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Visit every group once, in order.
    pub fn harvest(&mut self, groups: &[EntityGroup]) -> HarvestReport {
        let mut report = HarvestReport::default();
        for group in groups {
            match self.harvest_group(group) {
                Some(record) => report.records.push(record),
                None => report.failed.push(group.entity_url.clone()),
            }
        }
        self.ctx.events.emit(Event::HarvestFinished {
            succeeded: report.records.len(),
            failed: report.failed.len(),
        });
        report
    }

    /// Harvest one entity with the configured retries. `None` means the
    /// entity was abandoned after its last attempt.
    pub fn harvest_group(&mut self, group: &EntityGroup) -> Option<DetailRecord> {
        let config = self.ctx.config;
        let retry = &config.retry;
        let mut attempt = 0;
        loop {
            match self.visit(group) {
                Ok(record) => {
                    self.ctx.events.emit(Event::EntityHarvested {
                        entity: record.entity_url.clone(),
                        fields: config
                            .fields
                            .iter()
                            .map(|f| f.name.clone())
                            .zip(record.fields.iter().cloned())
                            .collect(),
                        related: record.related.len(),
                    });
                    return Some(record);
                }
                Err(e) if attempt < retry.attempts => {
                    attempt += 1;
                    self.ctx.events.emit(Event::EntityRetry {
                        entity: group.entity_url.clone(),
                        attempt,
                        error: e.to_string(),
                    });
                    thread::sleep(retry.delay_for(attempt - 1));
                }
                Err(e) => {
                    self.ctx.events.emit(Event::EntityFailed {
                        entity: group.entity_url.clone(),
                        error: e.to_string(),
                    });
                    self.snapshot(&group.entity_url);
                    return None;
                }
            }
        }
    }

    /// One pass over an entity page.
    fn visit(&mut self, group: &EntityGroup) -> Result<DetailRecord, DriverError> {
        let config = self.ctx.config;
        let gates = self.ctx.gates();
        let entity = group.entity_url.as_str();

        self.open(entity)?;

        if !self.consent_done && gates.dismiss_consent(&mut self.driver, entity)? {
            self.consent_done = true;
        }

        let clicked = gates.click_sign_in(&mut self.driver, entity)?;
        let entered = gates.enter_credentials(&mut self.driver, entity, clicked)?;
        // the sign-in flow leaves the entity page
        if (clicked || entered) && self.driver.current_url().as_deref() != Some(entity) {
            self.open(entity)?;
        }

        gates.expand_panel(&mut self.driver, entity)?;

        let fields = extract_all(
            &mut self.driver,
            &config.fields,
            entity,
            config.timeouts.field,
            self.ctx.events,
        )?;

        gates.reveal_contact(&mut self.driver, entity)?;
        pause(config.harvest.challenge_pause);

        Ok(DetailRecord {
            entity_url: group.entity_url.clone(),
            fields,
            related: group.related.clone(),
        })
    }

    fn open(&mut self, url: &str) -> Result<(), DriverError> {
        self.driver.navigate(url)?;
        pause(self.ctx.config.timeouts.page_settle);
        Ok(())
    }

    fn snapshot(&mut self, entity: &str) {
        let saved = self
            .driver
            .screenshot()
            .map_err(|e| e.to_string())
            .and_then(|png| {
                self.ctx
                    .snapshots
                    .save(FAILURE_SNAPSHOT, &png)
                    .map_err(|e| e.to_string())
            });
        match saved {
            Ok(path) => self.ctx.events.emit(Event::SnapshotSaved {
                path: path.display().to_string(),
            }),
            Err(error) => self.ctx.events.emit(Event::SnapshotFailed {
                entity: entity.to_string(),
                error,
            }),
        }
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

/// Harvest on a single session.
pub fn harvest<D: Driver>(driver: D, groups: &[EntityGroup], ctx: HarvestContext<'_>) -> HarvestReport {
    Harvester::new(driver, ctx).harvest(groups)
}

/// Spread groups round-robin over `workers` independent sessions.
///
/// Each worker owns its session and its consent flag. Records come back in
/// group order whatever the timing. A worker whose session cannot be opened
/// fails all of its entities. No session is opened for an empty list.
pub fn harvest_parallel<F: DriverFactory>(
    factory: &F,
    groups: &[EntityGroup],
    workers: usize,
    ctx: HarvestContext<'_>,
) -> HarvestReport {
    if groups.is_empty() {
        ctx.events.emit(Event::HarvestFinished {
            succeeded: 0,
            failed: 0,
        });
        return HarvestReport::default();
    }
    let workers = workers.clamp(1, groups.len());
    let mut slots: Vec<Option<DetailRecord>> = vec![None; groups.len()];

    thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let assigned: Vec<usize> = (worker..groups.len()).step_by(workers).collect();
                let handle = scope.spawn(move || run_worker(factory, groups, &assigned, worker, ctx));
                (worker, handle)
            })
            .collect();

        for (worker, handle) in handles {
            match handle.join() {
                Ok(results) => {
                    for (index, record) in results {
                        slots[index] = record;
                    }
                }
                Err(_) => ctx.events.emit(Event::WorkerFailed {
                    worker,
                    entities: (worker..groups.len()).step_by(workers).count(),
                    error: "worker panicked".to_string(),
                }),
            }
        }
    });

    let mut report = HarvestReport::default();
    for (group, slot) in groups.iter().zip(slots) {
        match slot {
            Some(record) => report.records.push(record),
            None => report.failed.push(group.entity_url.clone()),
        }
    }
    ctx.events.emit(Event::HarvestFinished {
        succeeded: report.records.len(),
        failed: report.failed.len(),
    });
    report
}

fn run_worker<F: DriverFactory>(
    factory: &F,
    groups: &[EntityGroup],
    assigned: &[usize],
    worker: usize,
    ctx: HarvestContext<'_>,
) -> Vec<(usize, Option<DetailRecord>)> {
    let driver = match factory.open() {
        Ok(driver) => driver,
        Err(e) => {
            ctx.events.emit(Event::WorkerFailed {
                worker,
                entities: assigned.len(),
                error: e.to_string(),
            });
            return assigned.iter().map(|&i| (i, None)).collect();
        }
    };

    let mut harvester = Harvester::new(driver, ctx);
    assigned
        .iter()
        .map(|&i| (i, harvester.harvest_group(&groups[i])))
        .collect()
}
