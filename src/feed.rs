//! Namespace-aware feed document model
//!
//! Feeds are parsed into a small owned element tree. Element and attribute
//! names in a namespace are stored in `{uri}local` form so lookups do not
//! depend on the prefix a publisher picked.

use crate::chapters::aggregator::remote_chapters_url;
use crate::error::{ChapterError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{LocalName, Namespace, ResolveResult};
use quick_xml::NsReader;
use std::path::Path;
use tracing::debug;

/// Podcast namespace hosting `podcast:chapters`
pub const PODCAST_NS: &str = "https://podcastindex.org/namespace/1.0";
/// Older URI some publishers still declare for the podcast namespace
pub const PODCAST_NS_LEGACY: &str =
    "https://github.com/Podcastindex-org/podcast-namespace/blob/main/docs/1.0.md";
/// Podlove Simple Chapters
pub const PSC_NS: &str = "http://podlove.org/simple-chapters";

/// Characters removed from titles before they are used as file names
const PATH_UNSAFE: &[char] = &[':', '/', '\\', '#', '-', '?', '%', '*', '|', '"', '<', '>'];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    /// Parse a document and return its root element
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = NsReader::from_str(xml);
        let mut stack: Vec<XmlElement> = Vec::new();

        loop {
            let event = reader
                .read_event()
                .map_err(|e| xml_error(&reader, e))?;

            match event {
                Event::Start(e) => {
                    let element = open_element(&reader, &e)?;
                    stack.push(element);
                }
                Event::Empty(e) => {
                    let element = open_element(&reader, &e)?;
                    if let Some(root) = close_element(&mut stack, element) {
                        return Ok(root);
                    }
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| ChapterError::Xml("unexpected closing tag".to_string()))?;
                    if let Some(root) = close_element(&mut stack, element) {
                        return Ok(root);
                    }
                }
                Event::Text(e) => {
                    if let Some(current) = stack.last_mut() {
                        match e.unescape() {
                            Ok(text) => current.text.push_str(&text),
                            Err(_) => current.text.push_str(&String::from_utf8_lossy(&e)),
                        }
                    }
                }
                Event::CData(e) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                    }
                }
                Event::Eof => {
                    return Err(ChapterError::Xml(if stack.is_empty() {
                        "document has no root element".to_string()
                    } else {
                        "unexpected end of document".to_string()
                    }));
                }
                _ => {}
            }
        }
    }

    /// Read and parse a feed file
    pub fn parse_file(path: &Path) -> Result<Self> {
        let xml = std::fs::read_to_string(path)?;
        debug!("Parsing feed file {}", path.display());
        Self::parse(&xml)
    }

    /// Qualified name, `{uri}local` for namespaced elements
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Character content with surrounding whitespace removed
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    pub fn children(&self) -> &[XmlElement] {
        &self.children
    }

    /// First direct child with the given qualified name
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn find_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First direct child in namespace `ns` with local name `local`
    pub fn find_ns(&self, ns: &str, local: &str) -> Option<&XmlElement> {
        self.find(&qualified(ns, local))
    }

    /// Non-empty text of the first direct child with the given name
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.find(name).map(XmlElement::text).filter(|t| !t.is_empty())
    }
}

/// `{uri}local` name as stored in the element tree
pub fn qualified(ns: &str, local: &str) -> String {
    format!("{{{}}}{}", ns, local)
}

fn xml_error(reader: &NsReader<&[u8]>, e: quick_xml::Error) -> ChapterError {
    ChapterError::Xml(format!("{} at byte {}", e, reader.buffer_position()))
}

fn open_element(reader: &NsReader<&[u8]>, start: &BytesStart) -> Result<XmlElement> {
    let (ns, local) = reader.resolve_element(start.name());
    let mut element = XmlElement::new(qualify(ns, local));

    for attr in start.attributes() {
        let attr = attr.map_err(|e| ChapterError::Xml(e.to_string()))?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let (ns, local) = reader.resolve_attribute(attr.key);
        let value = attr
            .unescape_value()
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
        element.attributes.push((qualify(ns, local), value));
    }

    Ok(element)
}

/// Attach a finished element to its parent, or hand it back as the root
fn close_element(stack: &mut Vec<XmlElement>, element: XmlElement) -> Option<XmlElement> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            None
        }
        None => Some(element),
    }
}

fn qualify(ns: ResolveResult, local: LocalName) -> String {
    let local = String::from_utf8_lossy(local.as_ref());
    match ns {
        ResolveResult::Bound(Namespace(uri)) => {
            format!("{{{}}}{}", String::from_utf8_lossy(uri), local)
        }
        ResolveResult::Unknown(prefix) => format!("{}:{}", String::from_utf8_lossy(&prefix), local),
        ResolveResult::Unbound => local.into_owned(),
    }
}

/// `<channel>` of an RSS document
pub fn channel(root: &XmlElement) -> Option<&XmlElement> {
    if root.name() == "channel" {
        Some(root)
    } else {
        root.find("channel")
    }
}

pub fn items(root: &XmlElement) -> impl Iterator<Item = &XmlElement> {
    channel(root)
        .into_iter()
        .flat_map(|channel| channel.find_all("item"))
}

pub fn feed_title(root: &XmlElement) -> Option<&str> {
    channel(root).and_then(|c| c.child_text("title"))
}

/// Item whose `<guid>` text equals `guid`
pub fn find_item_by_guid<'a>(root: &'a XmlElement, guid: &str) -> Option<&'a XmlElement> {
    items(root).find(|item| item.child_text("guid") == Some(guid))
}

/// `podcast:chapters` element under either namespace URI
pub fn podcast_chapters_element(item: &XmlElement) -> Option<&XmlElement> {
    item.find_ns(PODCAST_NS, "chapters")
        .or_else(|| item.find_ns(PODCAST_NS_LEGACY, "chapters"))
}

pub fn psc_chapters_element(item: &XmlElement) -> Option<&XmlElement> {
    item.find_ns(PSC_NS, "chapters")
}

/// Episode fields needed for chapter extraction and storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub enclosure_url: String,
    pub guid: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub chapters_url: Option<String>,
    pub inline_chapters_version: Option<String>,
}

impl FeedItem {
    /// Returns `None` for items without an enclosure
    pub fn from_element(item: &XmlElement) -> Option<Self> {
        let enclosure_url = item
            .find("enclosure")
            .and_then(|e| e.attr("url"))
            .map(strip_query)
            .filter(|u| !u.is_empty())?;

        let psc = psc_chapters_element(item);

        Some(Self {
            enclosure_url,
            guid: item.child_text("guid").map(str::to_string),
            title: item.child_text("title").map(str::to_string),
            description: item.child_text("description").map(str::to_string),
            chapters_url: remote_chapters_url(item).map(str::to_string),
            // Presence of the element is what matters, an empty version still counts
            inline_chapters_version: psc.map(|e| e.attr("version").unwrap_or_default().to_string()),
        })
    }
}

/// Enclosure URLs identify episodes without their tracking query string
pub fn strip_query(url: &str) -> String {
    url.split('?').next().unwrap_or_default().to_string()
}

/// Remove characters that are unsafe in file names
pub fn sanitize_for_path(s: &str) -> String {
    s.chars()
        .filter(|c| !PATH_UNSAFE.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}
