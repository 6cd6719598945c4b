//! A driver over parsed HTML, with no rendering and no script engine.
//!
//! Pages are registered up front (or fetched over HTTP with the `fetch`
//! feature). A page may carry several frames: each scroll to the bottom
//! swaps in the next frame, which is how an infinite-scroll feed looks from
//! the outside. Clicks are simulated with [`crate::dom::behavior`].

#[cfg(feature = "fetch")]
use super::fetch::Fetcher;
use super::{Driver, ElementSnapshot, Locator};
use crate::dom::behavior::{self, ClickAction};
use crate::dom::{Document, NodeId, SelectorList};
use crate::error::DriverError;
use image::{ImageFormat, Rgba, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use url::Url;

struct LoadedPage {
    url: Url,
    frame: usize,
    doc: Document,
}

pub struct StaticDriver {
    pages: HashMap<String, Vec<String>>,
    current: Option<LoadedPage>,
    viewport: (u32, u32),
    #[cfg(feature = "fetch")]
    fetcher: Option<Fetcher>,
}

impl Default for StaticDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticDriver {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            current: None,
            viewport: (1920, 1080),
            #[cfg(feature = "fetch")]
            fetcher: None,
        }
    }

    /// Register a single-frame page.
    pub fn with_page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.add_page(url, html);
        self
    }

    /// Register a page whose content grows with every scroll.
    pub fn with_frames<I, S>(mut self, url: &str, frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let frames: Vec<String> = frames.into_iter().map(Into::into).collect();
        if !frames.is_empty() {
            self.pages.insert(page_key(url), frames);
        }
        self
    }

    pub fn add_page(&mut self, url: &str, html: impl Into<String>) {
        self.pages.insert(page_key(url), vec![html.into()]);
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = (width.max(1), height.max(1));
        self
    }

    /// Fetch unregistered URLs over HTTP instead of failing navigation.
    #[cfg(feature = "fetch")]
    pub fn with_fetcher(mut self, fetcher: Fetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Index of the frame currently shown, if a page is loaded.
    pub fn frame(&self) -> Option<usize> {
        self.current.as_ref().map(|p| p.frame)
    }

    fn page(&self) -> Result<&LoadedPage, DriverError> {
        self.current
            .as_ref()
            .ok_or_else(|| DriverError::Session("no page loaded".to_string()))
    }

    fn first_match(&self, locator: &Locator) -> Result<NodeId, DriverError> {
        let page = self.page()?;
        let selectors = SelectorList::parse(locator.as_str())?;
        page.doc
            .select(&selectors)
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::NoSuchElement(locator.to_string()))
    }

    fn frames_for(&mut self, url: &Url) -> Result<&Vec<String>, DriverError> {
        let key = url.to_string();
        if !self.pages.contains_key(&key) {
            self.fetch_missing(&key)?;
        }
        self.pages.get(&key).ok_or_else(|| DriverError::Navigation {
            url: key.clone(),
            reason: "no page registered for this URL".to_string(),
        })
    }

    #[cfg(feature = "fetch")]
    fn fetch_missing(&mut self, key: &str) -> Result<(), DriverError> {
        if let Some(fetcher) = &self.fetcher {
            let html = fetcher.get(key)?;
            self.pages.insert(key.to_string(), vec![html]);
        }
        Ok(())
    }

    #[cfg(not(feature = "fetch"))]
    fn fetch_missing(&mut self, _key: &str) -> Result<(), DriverError> {
        Ok(())
    }

    fn snapshot(&self, page: &LoadedPage, id: NodeId) -> ElementSnapshot {
        let node = page.doc.node(id);
        let href = node
            .get_attr("href")
            .and_then(|h| page.url.join(h.trim()).ok())
            .map(|u| u.to_string());
        ElementSnapshot {
            tag: node.tag.clone(),
            text: page.doc.text_of(id),
            href,
            attributes: node.attributes.clone(),
            visible: page.doc.is_visible(id),
            enabled: page.doc.is_enabled(id),
        }
    }
}

fn page_key(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

impl Driver for StaticDriver {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        let parsed = Url::parse(url).map_err(|e| DriverError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let doc = Document::parse(&self.frames_for(&parsed)?[0]);
        self.current = Some(LoadedPage {
            url: parsed,
            frame: 0,
            doc,
        });
        Ok(())
    }

    fn current_url(&self) -> Option<String> {
        self.current.as_ref().map(|p| p.url.to_string())
    }

    fn execute(&mut self, _script: &str) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("script execution"))
    }

    fn scroll_to_bottom(&mut self) -> Result<(), DriverError> {
        let page = self
            .current
            .as_ref()
            .ok_or_else(|| DriverError::Session("no page loaded".to_string()))?;
        let next = page.frame + 1;
        let next_html = self
            .pages
            .get(&page.url.to_string())
            .and_then(|frames| frames.get(next))
            .cloned();
        // Past the last frame the feed has nothing more to load
        if let Some(html) = next_html {
            if let Some(page) = self.current.as_mut() {
                page.frame = next;
                page.doc = Document::parse(&html);
            }
        }
        Ok(())
    }

    fn find_all(&mut self, locator: &Locator) -> Result<Vec<ElementSnapshot>, DriverError> {
        let page = self.page()?;
        let selectors = SelectorList::parse(locator.as_str())?;
        Ok(page
            .doc
            .select(&selectors)
            .into_iter()
            .map(|id| self.snapshot(page, id))
            .collect())
    }

    fn click(&mut self, locator: &Locator) -> Result<(), DriverError> {
        let id = self.first_match(locator)?;
        let page = self.page()?;
        if !page.doc.is_visible(id) || !page.doc.is_enabled(id) {
            return Err(DriverError::InvalidInput(format!(
                "`{locator}` is not interactable"
            )));
        }

        let action = behavior::detect_click(&page.doc, id);
        match action {
            ClickAction::Navigate { url } => {
                let target = page
                    .url
                    .join(&url)
                    .map_err(|e| DriverError::Navigation {
                        url: url.clone(),
                        reason: e.to_string(),
                    })?
                    .to_string();
                self.navigate(&target)
            }
            action => {
                if let Some(page) = self.current.as_mut() {
                    behavior::apply(&mut page.doc, id, &action);
                }
                Ok(())
            }
        }
    }

    fn type_text(&mut self, locator: &Locator, text: &str) -> Result<(), DriverError> {
        let id = self.first_match(locator)?;
        let page = self
            .current
            .as_mut()
            .ok_or_else(|| DriverError::Session("no page loaded".to_string()))?;
        let tag = page.doc.node(id).tag.clone();
        if tag != "input" && tag != "textarea" {
            return Err(DriverError::InvalidInput(format!(
                "`{locator}` ({tag}) is not a text input"
            )));
        }
        let mut value = page.doc.get_attr(id, "value").unwrap_or_default().to_string();
        value.push_str(text);
        page.doc.set_attr(id, "value", &value);
        Ok(())
    }

    /// A blank viewport-sized image: there is no renderer behind this driver.
    fn screenshot(&mut self) -> Result<Vec<u8>, DriverError> {
        let (width, height) = self.viewport;
        let canvas = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
        let mut bytes = Cursor::new(Vec::new());
        canvas
            .write_to(&mut bytes, ImageFormat::Png)
            .map_err(|e| DriverError::Session(format!("screenshot encoding failed: {e}")))?;
        Ok(bytes.into_inner())
    }
}
