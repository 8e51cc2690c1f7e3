//! Atom document parsing.
//!
//! Elements are matched by local name *and* by the namespace of the root
//! element, so `<x:updated>` from an extension namespace never stands in for
//! the Atom `<updated>`.

use crate::types::Entry;
use crate::util::parse_timestamp;
use chrono::{DateTime, Utc};
use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use thiserror::Error;

/// Maximum element nesting accepted in a feed document.
const MAX_DEPTH: usize = 64;

/// Errors raised while turning a feed document into entries.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The document is not well-formed XML.
    #[error("XML parse error: {0}")]
    Xml(String),

    /// The document has no root element.
    #[error("Document has no root element")]
    NoRoot,

    /// SEC-003: The document nests deeper than [`MAX_DEPTH`].
    #[error("Nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    /// A required element is absent.
    #[error("Missing <{element}> element{}", entry_suffix(.entry))]
    MissingElement {
        element: &'static str,
        entry: Option<usize>,
    },

    /// An entry's `<link>` has no `href` attribute.
    #[error("Missing href on <link> in entry {0}")]
    MissingHref(usize),

    /// An `<updated>` value is not an RFC 3339 timestamp.
    #[error("Invalid timestamp '{value}': {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    /// An element uses a namespace prefix that was never declared.
    #[error("Unbound namespace prefix '{0}'")]
    UnboundPrefix(String),
}

fn entry_suffix(entry: &Option<usize>) -> String {
    entry
        .map(|index| format!(" in entry {}", index))
        .unwrap_or_default()
}

/// A fully parsed feed document.
///
/// `updated` is `None` when the feed has no feed-level `<updated>` element;
/// in that case `entries` is always empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeed {
    pub title: String,
    pub updated: Option<DateTime<Utc>>,
    pub entries: Vec<Entry>,
}

/// Parses an Atom document.
///
/// The feed `<title>` is required. A feed without `<updated>` has never
/// produced results and parses to an empty feed. Otherwise every `<entry>`
/// must carry `<title>`, `<updated>` and a `<link href>`; entries keep
/// document order. Only the first `<link>` of an entry is considered.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, ParseError> {
    let raw = read_document(bytes)?;

    let title = raw.title.ok_or(ParseError::MissingElement {
        element: "title",
        entry: None,
    })?;

    let Some(updated) = raw.updated else {
        return Ok(ParsedFeed {
            title,
            updated: None,
            entries: Vec::new(),
        });
    };
    let updated = timestamp(&updated)?;

    let entries = raw
        .entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| entry.validate(index))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ParsedFeed {
        title,
        updated: Some(updated),
        entries,
    })
}

fn timestamp(value: &str) -> Result<DateTime<Utc>, ParseError> {
    parse_timestamp(value).map_err(|source| ParseError::InvalidTimestamp {
        value: value.to_string(),
        source,
    })
}

#[derive(Debug, Default)]
struct RawFeed {
    title: Option<String>,
    updated: Option<String>,
    entries: Vec<RawEntry>,
}

#[derive(Debug, Default)]
struct RawEntry {
    title: Option<String>,
    updated: Option<String>,
    link_seen: bool,
    link: Option<String>,
}

impl RawEntry {
    fn validate(self, index: usize) -> Result<Entry, ParseError> {
        let missing = |element| ParseError::MissingElement {
            element,
            entry: Some(index),
        };

        let updated = self.updated.ok_or_else(|| missing("updated"))?;
        let title = self.title.ok_or_else(|| missing("title"))?;
        if !self.link_seen {
            return Err(missing("link"));
        }
        let link = self.link.ok_or(ParseError::MissingHref(index))?;

        Ok(Entry {
            title,
            link,
            timestamp: timestamp(&updated)?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    FeedTitle,
    FeedUpdated,
    EntryTitle,
    EntryUpdated,
}

/// Event-driven walk over the document, collecting the children of the root
/// element (depth 2) and of each `<entry>` (depth 3).
#[derive(Default)]
struct AtomWalker {
    root_ns: Option<Option<Vec<u8>>>,
    depth: usize,
    feed: RawFeed,
    entry: Option<RawEntry>,
    capture: Option<(Slot, usize)>,
    text: String,
}

impl AtomWalker {
    fn open(
        &mut self,
        ns: Option<Vec<u8>>,
        e: &BytesStart<'_>,
        decoder: Decoder,
    ) -> Result<(), ParseError> {
        self.depth += 1;
        // SEC-003: Reject excessively nested documents
        if self.depth > MAX_DEPTH {
            return Err(ParseError::MaxDepthExceeded(MAX_DEPTH));
        }

        if self.depth == 1 {
            if self.root_ns.is_some() {
                return Err(ParseError::Xml("multiple root elements".to_string()));
            }
            self.root_ns = Some(ns);
            return Ok(());
        }

        // Markup nested inside a captured element only contributes text
        if self.capture.is_some() || self.root_ns.as_ref() != Some(&ns) {
            return Ok(());
        }

        let in_entry = self.entry.is_some();
        match (self.depth, in_entry, e.local_name().as_ref()) {
            (2, _, b"title") if self.feed.title.is_none() => self.start(Slot::FeedTitle),
            (2, _, b"updated") if self.feed.updated.is_none() => self.start(Slot::FeedUpdated),
            (2, _, b"entry") => self.entry = Some(RawEntry::default()),
            (3, true, b"title") => self.start(Slot::EntryTitle),
            (3, true, b"updated") => self.start(Slot::EntryUpdated),
            (3, true, b"link") => {
                if let Some(entry) = self.entry.as_mut().filter(|entry| !entry.link_seen) {
                    entry.link_seen = true;
                    entry.link = match e
                        .try_get_attribute("href")
                        .map_err(|err| ParseError::Xml(err.to_string()))?
                    {
                        Some(attr) => Some(
                            attr.decode_and_unescape_value(decoder)
                                .map_err(|err| ParseError::Xml(err.to_string()))?
                                .trim()
                                .to_string(),
                        ),
                        None => None,
                    };
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn start(&mut self, slot: Slot) {
        self.capture = Some((slot, self.depth));
        self.text.clear();
    }

    fn text(&mut self, chunk: &str) {
        if self.capture.is_some() {
            self.text.push_str(chunk);
        }
    }

    fn close(&mut self) {
        if let Some((slot, at)) = self.capture {
            if at == self.depth {
                self.capture = None;
                let value = self.text.trim().to_string();
                let target = match slot {
                    Slot::FeedTitle => Some(&mut self.feed.title),
                    Slot::FeedUpdated => Some(&mut self.feed.updated),
                    Slot::EntryTitle => self.entry.as_mut().map(|e| &mut e.title),
                    Slot::EntryUpdated => self.entry.as_mut().map(|e| &mut e.updated),
                };
                if let Some(target) = target {
                    target.get_or_insert(value);
                }
            }
        }

        if self.depth == 2 {
            if let Some(entry) = self.entry.take() {
                self.feed.entries.push(entry);
            }
        }
        self.depth = self.depth.saturating_sub(1);
    }
}

fn namespace_of(resolved: ResolveResult<'_>) -> Result<Option<Vec<u8>>, ParseError> {
    match resolved {
        ResolveResult::Bound(ns) => Ok(Some(ns.into_inner().to_vec())),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(ParseError::UnboundPrefix(
            String::from_utf8_lossy(&prefix).into_owned(),
        )),
    }
}

fn read_document(bytes: &[u8]) -> Result<RawFeed, ParseError> {
    // SEC-002: quick-xml (0.37) never expands <!ENTITY> declarations, so a
    // feed cannot smuggle external entities into titles or links.
    let mut reader = NsReader::from_reader(bytes);
    let decoder = reader.decoder();

    let mut walker = AtomWalker::default();
    let mut buf = Vec::new();

    loop {
        let (resolved, event) = reader
            .read_resolved_event_into(&mut buf)
            .map_err(|e| ParseError::Xml(e.to_string()))?;
        let ns = namespace_of(resolved)?;

        match event {
            Event::Start(e) => walker.open(ns, &e, decoder)?,
            Event::Empty(e) => {
                walker.open(ns, &e, decoder)?;
                walker.close();
            }
            Event::End(_) => walker.close(),
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| ParseError::Xml(e.to_string()))?;
                walker.text(&text);
            }
            Event::CData(c) => {
                let text = c.decode().map_err(|e| ParseError::Xml(e.to_string()))?;
                walker.text(&text);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if walker.depth != 0 {
        return Err(ParseError::Xml("unexpected end of document".to_string()));
    }
    if walker.root_ns.is_none() {
        return Err(ParseError::NoRoot);
    }

    Ok(walker.feed)
}
