//! Structured events emitted by the collector, gates, extractor and harvester.
//!
//! Components never log directly; they hand an [`Event`] to whatever
//! [`EventSink`] the caller injected. The binary uses [`TracingSink`], tests
//! use [`MemorySink`] and assert on what was recorded.

use std::fmt;
use std::sync::Mutex;
use tracing::Level;

/// The best-effort UI steps, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    ListingConsent,
    ListingReady,
    Consent,
    SignIn,
    Credentials,
    ExpandPanel,
    RevealContact,
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Gate::ListingConsent => "listing consent",
            Gate::ListingReady => "listing links",
            Gate::Consent => "consent",
            Gate::SignIn => "sign-in button",
            Gate::Credentials => "credential entry",
            Gate::ExpandPanel => "description panel",
            Gate::RevealContact => "reveal-contact button",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    GateActed {
        gate: Gate,
        entity: Option<String>,
    },
    GateSkipped {
        gate: Gate,
        entity: Option<String>,
    },
    /// A step of credential entry did not appear; the rest was skipped.
    CredentialsIncomplete {
        entity: String,
        step: String,
    },
    FieldMissing {
        field: String,
        entity: String,
    },
    ScrollCapReached {
        iterations: usize,
        links: usize,
        elapsed_ms: u64,
    },
    LinksCollected {
        primary: usize,
        secondary: usize,
        pairs: usize,
    },
    PairingMismatch {
        primary: usize,
        secondary: usize,
    },
    PairDropped {
        primary: String,
    },
    EntityHarvested {
        entity: String,
        fields: Vec<(String, String)>,
        related: usize,
    },
    EntityRetry {
        entity: String,
        attempt: usize,
        error: String,
    },
    EntityFailed {
        entity: String,
        error: String,
    },
    SnapshotSaved {
        path: String,
    },
    SnapshotFailed {
        entity: String,
        error: String,
    },
    WorkerFailed {
        worker: usize,
        entities: usize,
        error: String,
    },
    HarvestFinished {
        succeeded: usize,
        failed: usize,
    },
    RecordsWritten {
        path: String,
        rows: usize,
    },
}

impl Event {
    pub fn level(&self) -> Level {
        match self {
            Event::GateActed { .. }
            | Event::GateSkipped { .. }
            | Event::LinksCollected { .. }
            | Event::EntityHarvested { .. }
            | Event::SnapshotSaved { .. }
            | Event::HarvestFinished { .. }
            | Event::RecordsWritten { .. } => Level::INFO,
            Event::CredentialsIncomplete { .. }
            | Event::FieldMissing { .. }
            | Event::ScrollCapReached { .. }
            | Event::PairingMismatch { .. }
            | Event::PairDropped { .. }
            | Event::EntityRetry { .. } => Level::WARN,
            Event::EntityFailed { .. }
            | Event::SnapshotFailed { .. }
            | Event::WorkerFailed { .. } => Level::ERROR,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::GateActed { gate, entity: None } => write!(f, "Clicked {gate}"),
            Event::GateActed {
                gate,
                entity: Some(e),
            } => write!(f, "Clicked {gate} for {e}"),
            Event::GateSkipped { gate, entity: None } => write!(f, "No {gate} found"),
            Event::GateSkipped {
                gate,
                entity: Some(e),
            } => write!(f, "No {gate} found for {e}"),
            Event::CredentialsIncomplete { entity, step } => {
                write!(f, "Credential entry stopped at {step} for {entity}")
            }
            Event::FieldMissing { field, entity } => write!(f, "{field} not found for {entity}"),
            Event::ScrollCapReached {
                iterations,
                links,
                elapsed_ms,
            } => write!(
                f,
                "Scroll cap reached after {iterations} scrolls ({elapsed_ms} ms) with {links} links loaded"
            ),
            Event::LinksCollected {
                primary,
                secondary,
                pairs,
            } => write!(
                f,
                "Total video results: {primary}, channel results: {secondary}, pairs: {pairs}"
            ),
            Event::PairingMismatch { primary, secondary } => write!(
                f,
                "Link lists differ in length ({primary} videos, {secondary} channels); pairing by position"
            ),
            Event::PairDropped { primary } => {
                write!(f, "Dropped {primary}: no channel link at its position")
            }
            Event::EntityHarvested {
                entity,
                fields,
                related,
            } => {
                write!(f, "Scraped {entity}")?;
                for (_, value) in fields {
                    write!(f, " -> {value}")?;
                }
                write!(f, ", {related} videos")
            }
            Event::EntityRetry {
                entity,
                attempt,
                error,
            } => write!(f, "Retrying {entity} (attempt {attempt}) after: {error}"),
            Event::EntityFailed { entity, error } => write!(f, "Error scraping {entity}: {error}"),
            Event::SnapshotSaved { path } => write!(f, "Screenshot saved: {path}"),
            Event::SnapshotFailed { entity, error } => {
                write!(f, "Could not save screenshot for {entity}: {error}")
            }
            Event::WorkerFailed {
                worker,
                entities,
                error,
            } => write!(
                f,
                "Worker {worker} could not open a session, {entities} entities skipped: {error}"
            ),
            Event::HarvestFinished { succeeded, failed } => {
                write!(f, "Harvest finished: {succeeded} succeeded, {failed} failed")
            }
            Event::RecordsWritten { path, rows } => write!(f, "Saved {rows} rows to {path}"),
        }
    }
}

/// Receives events from every component of a run.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

impl<S: EventSink + ?Sized> EventSink for &S {
    fn emit(&self, event: Event) {
        (**self).emit(event)
    }
}

/// Forwards events to `tracing` at their own level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: Event) {
        match event.level() {
            Level::ERROR => tracing::error!("{event}"),
            Level::WARN => tracing::warn!("{event}"),
            Level::INFO => tracing::info!("{event}"),
            Level::DEBUG => tracing::debug!("{event}"),
            _ => tracing::trace!("{event}"),
        }
    }
}

/// Records events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
