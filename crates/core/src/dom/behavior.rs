//! Pattern-based click inference.
//!
//! Pages loaded without a JS engine still carry enough markup to tell what a
//! click would do: links navigate, disclosure buttons reveal a panel, dismiss
//! buttons close a dialog. We detect those patterns and apply their effect to
//! the [`Document`] directly.

use super::{Document, NodeId, SelectorList};

/// What clicking an element does.
#[derive(Debug, Clone, PartialEq)]
pub enum ClickAction {
    /// Load another page. The URL is as written in the markup.
    Navigate { url: String },
    /// Show the targets.
    Reveal { targets: Vec<NodeId> },
    /// Flip the visibility of the targets.
    Toggle { targets: Vec<NodeId> },
    /// Hide the targets.
    Dismiss { targets: Vec<NodeId> },
    /// Nothing observable.
    None,
}

/// Infer the effect of clicking `id`.
pub fn detect_click(doc: &Document, id: NodeId) -> ClickAction {
    let node = doc.node(id);

    if node.tag == "a" {
        if let Some(href) = node.get_attr("href").map(str::trim) {
            if is_navigable(href) {
                return ClickAction::Navigate { url: href.to_string() };
            }
        }
    }
    if let Some(href) = node.get_attr("data-href").map(str::trim) {
        if is_navigable(href) {
            return ClickAction::Navigate { url: href.to_string() };
        }
    }

    // aria disclosure pattern: aria-controls names the panel by id
    if let Some(controls) = node.get_attr("aria-controls") {
        if node.get_attr("aria-expanded").is_some() {
            let targets: Vec<NodeId> = controls
                .split_whitespace()
                .filter_map(|t| doc.find_by_id(t))
                .collect();
            if !targets.is_empty() {
                return ClickAction::Reveal { targets };
            }
        }
    }

    // Bootstrap-style data-toggle / data-target
    if node.get_attr("data-toggle").is_some() {
        if let Some(target) = node.get_attr("data-target") {
            return ClickAction::Toggle {
                targets: resolve_targets(doc, target),
            };
        }
    }

    if let Some(target) = node.get_attr("data-dismiss") {
        let targets = if target.trim().is_empty() {
            doc.closest(id, |n| n.get_attr("role") == Some("dialog"))
                .into_iter()
                .collect()
        } else {
            resolve_targets(doc, target)
        };
        return ClickAction::Dismiss { targets };
    }

    let is_submit = (node.tag == "button" && node.get_attr("type").map_or(true, |t| t == "submit"))
        || (node.tag == "input" && node.get_attr("type") == Some("submit"));
    if is_submit {
        let action = doc
            .closest(id, |n| n.tag == "form")
            .and_then(|form| doc.get_attr(form, "action"))
            .map(str::trim)
            .filter(|a| is_navigable(a));
        if let Some(action) = action {
            return ClickAction::Navigate { url: action.to_string() };
        }
    }

    ClickAction::None
}

/// Apply a non-navigating action in place. Navigation is the caller's job.
pub fn apply(doc: &mut Document, trigger: NodeId, action: &ClickAction) {
    match action {
        ClickAction::Reveal { targets } => {
            for &t in targets {
                doc.set_hidden(t, false);
            }
            doc.set_attr(trigger, "aria-expanded", "true");
        }
        ClickAction::Toggle { targets } => {
            for &t in targets {
                let visible = doc.is_visible(t);
                doc.set_hidden(t, visible);
            }
        }
        ClickAction::Dismiss { targets } => {
            for &t in targets {
                doc.set_hidden(t, true);
            }
        }
        ClickAction::Navigate { .. } | ClickAction::None => {}
    }
}

fn is_navigable(href: &str) -> bool {
    let lower = href.to_lowercase();
    !(href.is_empty()
        || lower.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:"))
}

/// `data-target` values are selectors; a bare word is taken as an id.
fn resolve_targets(doc: &Document, target: &str) -> Vec<NodeId> {
    let target = target.trim();
    match SelectorList::parse(target) {
        Ok(list) => doc.select(&list),
        Err(_) => doc.find_by_id(target).into_iter().collect(),
    }
}
