//! Best-effort UI steps: consent banners, sign-in, panel expansion.
//!
//! Every step waits a bounded time for its affordance. Not finding it is a
//! normal outcome (`Ok(false)`); only driver-level failures are returned as
//! errors, so the caller decides how far they propagate.

use crate::config::{Credentials, Locators, Timeouts};
use crate::driver::{wait_for, wait_for_all, Condition, Driver, Locator};
use crate::error::DriverError;
use crate::events::{Event, EventSink, Gate};
use std::time::Duration;

pub struct Gates<'a> {
    locators: &'a Locators,
    timeouts: &'a Timeouts,
    credentials: Option<&'a Credentials>,
    events: &'a dyn EventSink,
}

impl<'a> Gates<'a> {
    pub fn new(
        locators: &'a Locators,
        timeouts: &'a Timeouts,
        credentials: Option<&'a Credentials>,
        events: &'a dyn EventSink,
    ) -> Self {
        Self {
            locators,
            timeouts,
            credentials,
            events,
        }
    }

    /// Cookie banner on the listing page. After a click, wait for the feed's
    /// first links so scrolling starts on a rendered page.
    pub fn dismiss_listing_consent<D: Driver + ?Sized>(
        &self,
        driver: &mut D,
    ) -> Result<bool, DriverError> {
        let acted = self.click_if_present(
            driver,
            Gate::ListingConsent,
            &self.locators.listing_consent,
            self.timeouts.gate,
            None,
        )?;
        if acted {
            match wait_for_all(driver, &self.locators.entity_link, self.timeouts.listing_ready) {
                Ok(_) => {}
                Err(e) if e.is_timeout() => self.events.emit(Event::GateSkipped {
                    gate: Gate::ListingReady,
                    entity: None,
                }),
                Err(e) => return Err(e),
            }
        }
        Ok(acted)
    }

    /// Cookie banner on an entity page.
    pub fn dismiss_consent<D: Driver + ?Sized>(
        &self,
        driver: &mut D,
        entity: &str,
    ) -> Result<bool, DriverError> {
        self.click_if_present(
            driver,
            Gate::Consent,
            &self.locators.detail_consent,
            self.timeouts.gate,
            Some(entity),
        )
    }

    /// Only clicked when credentials are configured: without them the flow
    /// would just strand the session on the sign-in page.
    pub fn click_sign_in<D: Driver + ?Sized>(
        &self,
        driver: &mut D,
        entity: &str,
    ) -> Result<bool, DriverError> {
        if self.credentials.is_none() {
            return Ok(false);
        }
        self.click_if_present(
            driver,
            Gate::SignIn,
            &self.locators.sign_in,
            self.timeouts.gate,
            Some(entity),
        )
    }

    /// Type the identity into the two-page sign-in form. Runs only when
    /// credentials are configured and the flow is engaged: either the sign-in
    /// button was just clicked or the identifier field is already on screen.
    /// Returns true only if all four steps completed.
    pub fn enter_credentials<D: Driver + ?Sized>(
        &self,
        driver: &mut D,
        entity: &str,
        signed_in_clicked: bool,
    ) -> Result<bool, DriverError> {
        let Some(credentials) = self.credentials else {
            return Ok(false);
        };
        if !signed_in_clicked && !self.identifier_shown(driver)? {
            return Ok(false);
        }

        let steps: [(&str, &Locator, Option<&str>); 4] = [
            ("identifier", &self.locators.identifier, Some(credentials.email.as_str())),
            ("identifier next", &self.locators.identifier_next, None),
            ("password", &self.locators.password, Some(credentials.password())),
            ("password next", &self.locators.password_next, None),
        ];
        for (step, locator, text) in steps {
            match wait_for(driver, locator, Condition::Clickable, self.timeouts.gate) {
                Ok(_) => {}
                Err(e) if e.is_timeout() => {
                    self.events.emit(Event::CredentialsIncomplete {
                        entity: entity.to_string(),
                        step: step.to_string(),
                    });
                    return Ok(false);
                }
                Err(e) => return Err(e),
            }
            driver.click(locator)?;
            if let Some(text) = text {
                driver.type_text(locator, text)?;
            }
        }

        self.events.emit(Event::GateActed {
            gate: Gate::Credentials,
            entity: Some(entity.to_string()),
        });
        Ok(true)
    }

    pub fn expand_panel<D: Driver + ?Sized>(
        &self,
        driver: &mut D,
        entity: &str,
    ) -> Result<bool, DriverError> {
        self.click_if_present(
            driver,
            Gate::ExpandPanel,
            &self.locators.expand_panel,
            self.timeouts.panel,
            Some(entity),
        )
    }

    pub fn reveal_contact<D: Driver + ?Sized>(
        &self,
        driver: &mut D,
        entity: &str,
    ) -> Result<bool, DriverError> {
        self.click_if_present(
            driver,
            Gate::RevealContact,
            &self.locators.reveal_contact,
            self.timeouts.contact,
            Some(entity),
        )
    }

    fn identifier_shown<D: Driver + ?Sized>(&self, driver: &mut D) -> Result<bool, DriverError> {
        Ok(driver
            .find_all(&self.locators.identifier)?
            .first()
            .is_some_and(|el| el.visible))
    }

    fn click_if_present<D: Driver + ?Sized>(
        &self,
        driver: &mut D,
        gate: Gate,
        locator: &Locator,
        timeout: Duration,
        entity: Option<&str>,
    ) -> Result<bool, DriverError> {
        let entity = entity.map(str::to_string);
        match wait_for(driver, locator, Condition::Clickable, timeout) {
            Ok(_) => {
                driver.click(locator)?;
                self.events.emit(Event::GateActed { gate, entity });
                Ok(true)
            }
            Err(e) if e.is_timeout() => {
                self.events.emit(Event::GateSkipped { gate, entity });
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
