//! Markup event streams consumed by the query compiler.
//!
//! The compiler never reads template files itself. It pulls
//! [`MarkupEvent`]s from a [`MarkupSource`], and a [`TemplateSource`] hands
//! out a fresh source for every compilation so lookups can restart from the
//! top of the document.
//!
//! [`TemplateDocument`] is the bundled source: it tokenizes XML-style
//! template text once and replays the events on every [`open`].
//!
//! # Example
//!
//! ```
//! use sqlstencil_core::{MarkupEvent, TemplateDocument, TemplateSource};
//!
//! let doc = TemplateDocument::parse(r#"<select id="all">SELECT * FROM t</select>"#).unwrap();
//! let mut source = doc.open().unwrap();
//!
//! assert!(matches!(source.next_event().unwrap(), MarkupEvent::Start { .. }));
//! assert_eq!(source.next_event().unwrap(), MarkupEvent::Text("SELECT * FROM t".into()));
//! ```
//!
//! [`open`]: TemplateSource::open

use std::collections::VecDeque;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::MarkupError;

/// One event of a markup stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupEvent {
    /// An element opened, with its attributes in document order.
    Start {
        name: String,
        attributes: Vec<(String, String)>,
    },
    /// Character data, already entity-decoded.
    Text(String),
    /// An element closed.
    End { name: String },
    /// No more events. Repeats on every further read.
    EndOfStream,
}

impl MarkupEvent {
    /// Shorthand for a start event.
    pub fn start(name: &str, attributes: &[(&str, &str)]) -> Self {
        MarkupEvent::Start {
            name: name.to_string(),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Shorthand for a text event.
    pub fn text(text: &str) -> Self {
        MarkupEvent::Text(text.to_string())
    }

    /// Shorthand for an end event.
    pub fn end(name: &str) -> Self {
        MarkupEvent::End {
            name: name.to_string(),
        }
    }
}

/// A pull-style producer of markup events.
pub trait MarkupSource {
    /// Returns the next event, or [`MarkupEvent::EndOfStream`] once exhausted.
    fn next_event(&mut self) -> Result<MarkupEvent, MarkupError>;

    /// Releases the source. Further reads fail with [`MarkupError::Closed`].
    fn close(&mut self) {}
}

/// Opens a fresh [`MarkupSource`] positioned at the start of a template.
pub trait TemplateSource {
    fn open(&self) -> Result<Box<dyn MarkupSource + '_>, MarkupError>;
}

impl<T: TemplateSource + ?Sized> TemplateSource for &T {
    fn open(&self) -> Result<Box<dyn MarkupSource + '_>, MarkupError> {
        (**self).open()
    }
}

/// An owned, single-use event stream.
///
/// Handy for feeding hand-built event sequences to the compiler.
#[derive(Debug, Clone, Default)]
pub struct EventStream {
    events: VecDeque<MarkupEvent>,
    closed: bool,
}

impl EventStream {
    pub fn new(events: impl IntoIterator<Item = MarkupEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
            closed: false,
        }
    }
}

impl MarkupSource for EventStream {
    fn next_event(&mut self) -> Result<MarkupEvent, MarkupError> {
        if self.closed {
            return Err(MarkupError::Closed);
        }
        Ok(self.events.pop_front().unwrap_or(MarkupEvent::EndOfStream))
    }

    fn close(&mut self) {
        self.closed = true;
        self.events.clear();
    }
}

/// Replays a borrowed event slice.
struct EventCursor<'a> {
    events: &'a [MarkupEvent],
    pos: usize,
    closed: bool,
}

impl MarkupSource for EventCursor<'_> {
    fn next_event(&mut self) -> Result<MarkupEvent, MarkupError> {
        if self.closed {
            return Err(MarkupError::Closed);
        }
        match self.events.get(self.pos) {
            Some(event) => {
                self.pos += 1;
                Ok(event.clone())
            }
            None => Ok(MarkupEvent::EndOfStream),
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<!--.*?-->|<!\[CDATA\[(?P<cdata>.*?)\]\]>|<\?.*?\?>|<!DOCTYPE[^>]*>|<(?P<close>/?)(?P<name>[A-Za-z_:][-A-Za-z0-9_:.]*)(?P<attrs>(?:\s+[A-Za-z_:][-A-Za-z0-9_:.]*\s*=\s*(?:"[^"]*"|'[^']*'))*)\s*(?P<empty>/?)>"#,
    )
    .expect("static regex must compile")
});

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("static regex must compile")
});

static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(lt|gt|amp|quot|apos|#[0-9]+|#x[0-9A-Fa-f]+);").expect("static regex must compile")
});

/// A parsed template document that can be opened any number of times.
///
/// Whitespace-only character data between elements is dropped, so
/// indentation never leaks into rendered SQL buffers.
///
/// # Examples
///
/// ```
/// use sqlstencil_core::TemplateDocument;
///
/// let doc = TemplateDocument::parse(
///     r#"<?xml version="1.0"?>
///     <sqlMap>
///         <select id="byId">SELECT * FROM users WHERE id = #(id)#</select>
///     </sqlMap>"#,
/// )
/// .unwrap();
/// assert_eq!(doc.events().len(), 5);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateDocument {
    events: Vec<MarkupEvent>,
}

impl TemplateDocument {
    /// Tokenizes XML-style template text.
    ///
    /// # Errors
    ///
    /// Returns [`MarkupError::Malformed`] for stray `<` characters,
    /// mismatched end tags, and elements left open at the end of input.
    pub fn parse(text: &str) -> Result<Self, MarkupError> {
        let mut events = Vec::new();
        let mut open: Vec<(String, usize)> = Vec::new();
        let mut cursor = 0;

        for caps in TOKEN_RE.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            push_text(&mut events, &text[cursor..whole.start()], cursor)?;
            cursor = whole.end();

            if let Some(cdata) = caps.name("cdata") {
                if !cdata.as_str().is_empty() {
                    events.push(MarkupEvent::Text(cdata.as_str().to_string()));
                }
                continue;
            }
            let Some(name) = caps.name("name") else {
                // comment, processing instruction or doctype
                continue;
            };
            let name = name.as_str().to_string();

            if caps.name("close").is_some_and(|m| !m.as_str().is_empty()) {
                match open.pop() {
                    Some((expected, _)) if expected == name => {
                        events.push(MarkupEvent::End { name });
                    }
                    Some((expected, _)) => {
                        return Err(MarkupError::Malformed {
                            offset: whole.start(),
                            message: format!("expected </{expected}>, found </{name}>"),
                        });
                    }
                    None => {
                        return Err(MarkupError::Malformed {
                            offset: whole.start(),
                            message: format!("unexpected </{name}>"),
                        });
                    }
                }
                continue;
            }

            let attributes = parse_attributes(caps.name("attrs").map_or("", |m| m.as_str()));
            events.push(MarkupEvent::Start {
                name: name.clone(),
                attributes,
            });
            if caps.name("empty").is_some_and(|m| !m.as_str().is_empty()) {
                events.push(MarkupEvent::End { name });
            } else {
                open.push((name, whole.start()));
            }
        }
        push_text(&mut events, &text[cursor..], cursor)?;

        if let Some((name, offset)) = open.pop() {
            return Err(MarkupError::Malformed {
                offset,
                message: format!("element <{name}> is never closed"),
            });
        }
        Ok(Self { events })
    }

    /// Returns the tokenized events.
    pub fn events(&self) -> &[MarkupEvent] {
        &self.events
    }
}

impl From<Vec<MarkupEvent>> for TemplateDocument {
    fn from(events: Vec<MarkupEvent>) -> Self {
        Self { events }
    }
}

impl TemplateSource for TemplateDocument {
    fn open(&self) -> Result<Box<dyn MarkupSource + '_>, MarkupError> {
        Ok(Box::new(EventCursor {
            events: &self.events,
            pos: 0,
            closed: false,
        }))
    }
}

fn push_text(events: &mut Vec<MarkupEvent>, raw: &str, offset: usize) -> Result<(), MarkupError> {
    if raw.trim().is_empty() {
        return Ok(());
    }
    if let Some(pos) = raw.find('<') {
        return Err(MarkupError::Malformed {
            offset: offset + pos,
            message: "unrecognized markup".to_string(),
        });
    }
    events.push(MarkupEvent::Text(decode_entities(raw)));
    Ok(())
}

fn parse_attributes(raw: &str) -> Vec<(String, String)> {
    ATTR_RE
        .captures_iter(raw)
        .map(|caps| {
            let name = caps[1].to_string();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map_or("", |m| m.as_str());
            (name, decode_entities(value))
        })
        .collect()
}

fn decode_entities(raw: &str) -> String {
    ENTITY_RE
        .replace_all(raw, |caps: &Captures<'_>| {
            let entity = &caps[1];
            let decoded = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => {
                    let code = if let Some(hex) = entity.strip_prefix("#x") {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        entity[1..].parse::<u32>().ok()
                    };
                    code.and_then(char::from_u32)
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}
