//! CSS selector parsing and matching against a [`Document`].
//! Supports: tag, `*`, .class, #id, attribute selectors, descendant and child
//! combinators, comma-separated lists, `:nth-of-type`, `:nth-child`,
//! `:first-of-type`, `:first-child` and `:has()`.

use super::{Document, NodeId};
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid selector `{selector}`: {reason}")]
pub struct SelectorError {
    pub selector: String,
    pub reason: String,
}

impl SelectorError {
    fn new(selector: &str, reason: impl Into<String>) -> Self {
        Self {
            selector: selector.to_string(),
            reason: reason.into(),
        }
    }
}

/// A comma-separated list of selectors; matches if any member matches.
#[derive(Debug, Clone)]
pub struct SelectorList {
    source: String,
    selectors: Vec<Selector>,
}

/// One complex selector: compounds joined by combinators, left to right.
#[derive(Debug, Clone)]
struct Selector {
    steps: Vec<Step>,
}

#[derive(Debug, Clone)]
struct Step {
    /// Relation to the previous step (or to the `:has` anchor for the first step).
    combinator: Combinator,
    compound: Vec<SelectorPart>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone)]
enum SelectorPart {
    Tag(String),
    Universal,
    Class(String),
    Id(String),
    Attribute(String, AttrOp),
    NthOfType(usize),
    NthChild(usize),
    Has(SelectorList),
}

#[derive(Debug, Clone)]
enum AttrOp {
    Exists,
    Equals(String),
    Contains(String),
    Prefix(String),
    Suffix(String),
    Word(String),
}

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        Self::parse_inner(input, false)
    }

    fn parse_inner(input: &str, relative: bool) -> Result<Self, SelectorError> {
        let mut selectors = Vec::new();
        for part in split_top_level(input, ',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(SelectorError::new(input, "empty selector in list"));
            }
            selectors.push(parse_complex(part, relative, input)?);
        }
        if selectors.is_empty() {
            return Err(SelectorError::new(input, "empty selector"));
        }
        Ok(Self {
            source: input.trim().to_string(),
            selectors,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, doc: &Document, id: NodeId) -> bool {
        self.selectors
            .iter()
            .any(|s| match_step(doc, &s.steps, s.steps.len() - 1, id, None))
    }

    /// Relative match used by `:has()`: some descendant of `anchor` matches.
    fn matches_relative(&self, doc: &Document, anchor: NodeId) -> bool {
        let candidates = doc.descendants(anchor);
        self.selectors.iter().any(|s| {
            candidates
                .iter()
                .any(|&c| match_step(doc, &s.steps, s.steps.len() - 1, c, Some(anchor)))
        })
    }
}

impl fmt::Display for SelectorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Split on `sep` outside of brackets, parentheses and quotes.
fn split_top_level(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' | '[' => depth += 1,
                ')' | ']' => depth -= 1,
                c if c == sep && depth == 0 => {
                    parts.push(&input[start..i]);
                    start = i + c.len_utf8();
                }
                _ => {}
            },
        }
    }
    parts.push(&input[start..]);
    parts
}

fn parse_complex(input: &str, relative: bool, full: &str) -> Result<Selector, SelectorError> {
    let mut steps: Vec<Step> = Vec::new();
    let mut compound: Vec<SelectorPart> = Vec::new();
    let mut combinator = Combinator::Descendant;
    let mut dangling = false;
    let mut chars = input.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            ' ' | '\t' | '\n' | '\r' => {
                skip_whitespace(&mut chars);
                flush(&mut steps, &mut compound, &mut combinator);
            }
            '>' => {
                chars.next();
                flush(&mut steps, &mut compound, &mut combinator);
                if steps.is_empty() && !relative {
                    return Err(SelectorError::new(full, "selector starts with a combinator"));
                }
                if dangling {
                    return Err(SelectorError::new(full, "two combinators in a row"));
                }
                combinator = Combinator::Child;
                dangling = true;
                skip_whitespace(&mut chars);
            }
            '+' | '~' => {
                return Err(SelectorError::new(full, format!("combinator `{ch}` is not supported")));
            }
            '.' => {
                chars.next();
                let class_name = read_ident(&mut chars);
                if class_name.is_empty() {
                    return Err(SelectorError::new(full, "empty class name"));
                }
                compound.push(SelectorPart::Class(class_name));
                dangling = false;
            }
            '#' => {
                chars.next();
                let id_name = read_ident(&mut chars);
                if id_name.is_empty() {
                    return Err(SelectorError::new(full, "empty id"));
                }
                compound.push(SelectorPart::Id(id_name));
                dangling = false;
            }
            '[' => {
                chars.next();
                compound.push(parse_attribute(&mut chars, full)?);
                dangling = false;
            }
            '*' => {
                chars.next();
                compound.push(SelectorPart::Universal);
                dangling = false;
            }
            ':' => {
                chars.next();
                compound.push(parse_pseudo(&mut chars, full)?);
                dangling = false;
            }
            c if c.is_alphanumeric() || c == '-' || c == '_' => {
                let tag = read_ident(&mut chars);
                if !compound.is_empty() {
                    return Err(SelectorError::new(full, format!("type selector `{tag}` must come first")));
                }
                compound.push(SelectorPart::Tag(tag.to_lowercase()));
                dangling = false;
            }
            other => {
                return Err(SelectorError::new(full, format!("unexpected character `{other}`")));
            }
        }
    }

    flush(&mut steps, &mut compound, &mut combinator);
    if dangling || steps.is_empty() {
        return Err(SelectorError::new(full, "selector ends without a compound"));
    }
    Ok(Selector { steps })
}

fn flush(steps: &mut Vec<Step>, compound: &mut Vec<SelectorPart>, combinator: &mut Combinator) {
    if compound.is_empty() {
        return;
    }
    steps.push(Step {
        combinator: *combinator,
        compound: std::mem::take(compound),
    });
    *combinator = Combinator::Descendant;
}

fn parse_attribute(chars: &mut Peekable<Chars>, full: &str) -> Result<SelectorPart, SelectorError> {
    let mut name = String::new();
    let mut op: Option<char> = None;
    let mut value: Option<String> = None;

    while let Some(&c) = chars.peek() {
        match c {
            ']' => {
                chars.next();
                let name = name.trim().to_lowercase();
                if name.is_empty() {
                    return Err(SelectorError::new(full, "empty attribute name"));
                }
                let op = match (op, value) {
                    (_, None) => AttrOp::Exists,
                    (None, Some(v)) => AttrOp::Equals(v),
                    (Some('*'), Some(v)) => AttrOp::Contains(v),
                    (Some('^'), Some(v)) => AttrOp::Prefix(v),
                    (Some('$'), Some(v)) => AttrOp::Suffix(v),
                    (Some('~'), Some(v)) => AttrOp::Word(v),
                    (Some(other), Some(_)) => {
                        return Err(SelectorError::new(full, format!("attribute operator `{other}=` is not supported")));
                    }
                };
                return Ok(SelectorPart::Attribute(name, op));
            }
            '*' | '^' | '$' | '~' | '|' => {
                chars.next();
                op = Some(c);
            }
            '=' => {
                chars.next();
                value = Some(read_attr_value(chars));
            }
            _ => {
                name.push(c);
                chars.next();
            }
        }
    }
    Err(SelectorError::new(full, "unterminated attribute selector"))
}

fn read_attr_value(chars: &mut Peekable<Chars>) -> String {
    let mut val = String::new();
    skip_whitespace(chars);
    match chars.peek().copied() {
        Some(quote @ ('"' | '\'')) => {
            chars.next();
            for vc in chars.by_ref() {
                if vc == quote {
                    break;
                }
                val.push(vc);
            }
            skip_whitespace(chars);
        }
        _ => {
            while let Some(&vc) = chars.peek() {
                if vc == ']' {
                    break;
                }
                val.push(vc);
                chars.next();
            }
            val = val.trim().to_string();
        }
    }
    val
}

fn parse_pseudo(chars: &mut Peekable<Chars>, full: &str) -> Result<SelectorPart, SelectorError> {
    if chars.peek() == Some(&':') {
        return Err(SelectorError::new(full, "pseudo-elements never match elements"));
    }
    let name = read_ident(chars).to_lowercase();
    let argument = if chars.peek() == Some(&'(') {
        chars.next();
        let mut depth = 1;
        let mut arg = String::new();
        loop {
            match chars.next() {
                Some('(') => {
                    depth += 1;
                    arg.push('(');
                }
                Some(')') => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    arg.push(')');
                }
                Some(c) => arg.push(c),
                None => return Err(SelectorError::new(full, format!("unterminated `:{name}(`"))),
            }
        }
        Some(arg)
    } else {
        None
    };

    let index = |arg: Option<String>| -> Result<usize, SelectorError> {
        arg.as_deref()
            .map(str::trim)
            .and_then(|a| a.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .ok_or_else(|| SelectorError::new(full, format!("`:{name}` needs a positive integer")))
    };

    match name.as_str() {
        "nth-of-type" => Ok(SelectorPart::NthOfType(index(argument)?)),
        "nth-child" => Ok(SelectorPart::NthChild(index(argument)?)),
        "first-of-type" => Ok(SelectorPart::NthOfType(1)),
        "first-child" => Ok(SelectorPart::NthChild(1)),
        "has" => {
            let inner = argument.ok_or_else(|| SelectorError::new(full, "`:has` needs an argument"))?;
            Ok(SelectorPart::Has(SelectorList::parse_inner(&inner, true)?))
        }
        other => Err(SelectorError::new(full, format!("pseudo-class `:{other}` is not supported"))),
    }
}

fn read_ident(chars: &mut Peekable<Chars>) -> String {
    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_alphanumeric() || c == '-' || c == '_' {
            name.push(c);
            chars.next();
        } else {
            break;
        }
    }
    name
}

fn skip_whitespace(chars: &mut Peekable<Chars>) {
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else {
            break;
        }
    }
}

/// Match `steps[..=idx]` right to left with `id` as the subject of `steps[idx]`.
fn match_step(doc: &Document, steps: &[Step], idx: usize, id: NodeId, anchor: Option<NodeId>) -> bool {
    let step = &steps[idx];
    if !compound_matches(doc, &step.compound, id) {
        return false;
    }
    if idx == 0 {
        return match anchor {
            None => true,
            Some(a) => match step.combinator {
                Combinator::Child => doc.parent_element(id) == Some(a),
                Combinator::Descendant => doc.is_ancestor(a, id),
            },
        };
    }
    match step.combinator {
        Combinator::Child => doc
            .parent_element(id)
            .map(|p| match_step(doc, steps, idx - 1, p, anchor))
            .unwrap_or(false),
        Combinator::Descendant => doc
            .ancestors(id)
            .any(|a| match_step(doc, steps, idx - 1, a, anchor)),
    }
}

fn compound_matches(doc: &Document, compound: &[SelectorPart], id: NodeId) -> bool {
    let node = doc.node(id);
    compound.iter().all(|part| match part {
        SelectorPart::Tag(t) => node.tag.eq_ignore_ascii_case(t),
        SelectorPart::Universal => true,
        SelectorPart::Class(c) => node
            .get_attr("class")
            .map(|classes| classes.split_whitespace().any(|cl| cl == c))
            .unwrap_or(false),
        SelectorPart::Id(i) => node.get_attr("id") == Some(i.as_str()),
        SelectorPart::Attribute(name, op) => match (node.get_attr(name), op) {
            (None, _) => false,
            (Some(_), AttrOp::Exists) => true,
            (Some(v), AttrOp::Equals(want)) => v == want,
            (Some(v), AttrOp::Contains(want)) => !want.is_empty() && v.contains(want.as_str()),
            (Some(v), AttrOp::Prefix(want)) => !want.is_empty() && v.starts_with(want.as_str()),
            (Some(v), AttrOp::Suffix(want)) => !want.is_empty() && v.ends_with(want.as_str()),
            (Some(v), AttrOp::Word(want)) => v.split_whitespace().any(|w| w == want),
        },
        SelectorPart::NthOfType(n) => doc.position_of_type(id) == *n,
        SelectorPart::NthChild(n) => doc.position_in_parent(id) == *n,
        SelectorPart::Has(inner) => inner.matches_relative(doc, id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_lists_outside_parentheses() {
        let parts = split_top_level("a:has(b, c), d[x=\"1,2\"]", ',');
        assert_eq!(parts, vec!["a:has(b, c)", " d[x=\"1,2\"]"]);
    }
}
