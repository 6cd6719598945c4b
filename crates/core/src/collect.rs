//! Link discovery on an infinite-scroll listing.
//!
//! The feed is scrolled until the number of entity links stops changing
//! between two reads (or a cap is hit), then primary and secondary links are
//! paired by position.

use crate::config::{ListingConfig, Locators, Timeouts};
use crate::driver::{Driver, ElementSnapshot};
use crate::error::DriverError;
use crate::events::{Event, EventSink};
use crate::gates::Gates;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::thread;
use std::time::Instant;

/// One related item and the entity it belongs to, as found on the listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkPair {
    pub secondary_url: String,
    pub primary_url: String,
}

/// All related items of one entity, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityGroup {
    pub entity_url: String,
    pub related: Vec<String>,
}

/// How a scroll loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollReport {
    pub scrolls: usize,
    pub links: usize,
    /// Stopped by `max_scrolls` or `max_scroll_time` rather than a stable count.
    pub capped: bool,
}

pub struct LinkCollector<'a> {
    listing: &'a ListingConfig,
    locators: &'a Locators,
    timeouts: &'a Timeouts,
    events: &'a dyn EventSink,
}

impl<'a> LinkCollector<'a> {
    pub fn new(
        listing: &'a ListingConfig,
        locators: &'a Locators,
        timeouts: &'a Timeouts,
        events: &'a dyn EventSink,
    ) -> Self {
        Self {
            listing,
            locators,
            timeouts,
            events,
        }
    }

    /// Open the listing, load it completely and pair up its links.
    pub fn collect<D: Driver + ?Sized>(
        &self,
        driver: &mut D,
        start_url: &str,
    ) -> Result<Vec<LinkPair>, DriverError> {
        driver.navigate(start_url)?;

        // the listing never needs credentials
        Gates::new(self.locators, self.timeouts, None, self.events).dismiss_listing_consent(driver)?;

        self.scroll_until_stable(driver)?;

        let primary = driver.find_all(&self.locators.entity_link)?;
        let secondary = driver.find_all(&self.locators.secondary_link)?;
        let pairs = pair_links(&primary, &secondary, self.events);
        self.events.emit(Event::LinksCollected {
            primary: primary.len(),
            secondary: secondary.len(),
            pairs: pairs.len(),
        });
        Ok(pairs)
    }

    /// Scroll, settle, count; stop once a count repeats the previous one.
    /// The count before the first scroll is taken as zero.
    pub fn scroll_until_stable<D: Driver + ?Sized>(
        &self,
        driver: &mut D,
    ) -> Result<ScrollReport, DriverError> {
        let started = Instant::now();
        let mut last_count = 0;
        let mut scrolls = 0;

        loop {
            driver.scroll_to_bottom()?;
            if !self.timeouts.scroll_settle.is_zero() {
                thread::sleep(self.timeouts.scroll_settle);
            }
            scrolls += 1;

            let count = driver.find_all(&self.locators.entity_link)?.len();
            if count == last_count {
                return Ok(ScrollReport {
                    scrolls,
                    links: count,
                    capped: false,
                });
            }
            last_count = count;

            let elapsed = started.elapsed();
            if scrolls >= self.listing.max_scrolls || elapsed >= self.listing.max_scroll_time {
                self.events.emit(Event::ScrollCapReached {
                    iterations: scrolls,
                    links: count,
                    elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                });
                return Ok(ScrollReport {
                    scrolls,
                    links: count,
                    capped: true,
                });
            }
        }
    }
}

/// Pair the i-th primary link with the i-th secondary link.
///
/// Primary elements without a target are dropped together with their
/// partner. Extra elements on the longer side have no partner and are
/// ignored. Positional pairing assumes both lists come back in matching order;
/// a length mismatch is reported but not corrected.
pub fn pair_links(
    primary: &[ElementSnapshot],
    secondary: &[ElementSnapshot],
    events: &dyn EventSink,
) -> Vec<LinkPair> {
    if primary.len() != secondary.len() {
        events.emit(Event::PairingMismatch {
            primary: primary.len(),
            secondary: secondary.len(),
        });
    }

    primary
        .iter()
        .zip(secondary)
        .filter_map(|(p, s)| {
            let primary_url = target_of(p)?;
            match target_of(s) {
                Some(secondary_url) => Some(LinkPair {
                    secondary_url,
                    primary_url,
                }),
                None => {
                    events.emit(Event::PairDropped { primary: primary_url });
                    None
                }
            }
        })
        .collect()
}

fn target_of(link: &ElementSnapshot) -> Option<String> {
    link.href
        .as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
}

/// Group pairs by entity. Entities keep first-seen order; each entity's
/// related items keep discovery order, duplicates included.
pub fn group_by_entity(pairs: &[LinkPair]) -> Vec<EntityGroup> {
    let mut groups: Vec<EntityGroup> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for pair in pairs {
        match index.get(pair.secondary_url.as_str()) {
            Some(&i) => groups[i].related.push(pair.primary_url.clone()),
            None => {
                index.insert(&pair.secondary_url, groups.len());
                groups.push(EntityGroup {
                    entity_url: pair.secondary_url.clone(),
                    related: vec![pair.primary_url.clone()],
                });
            }
        }
    }

    groups
}
