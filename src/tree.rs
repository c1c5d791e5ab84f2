//! Owned XML tree built on `quick-xml` events.
//!
//! Backup exports are small enough to hold in memory, so a document is read
//! into a tree of [`Element`]s, mutated in place and written back out.
//! Element order, attribute order, text, comments, CDATA and the prolog
//! (XML declaration, doctype, processing instructions) survive a round trip.

use anyhow::{anyhow, bail, Context, Result};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use std::borrow::Cow;
use std::io::Write;

/// A child of an element.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    /// Processing instruction or doctype found inside an element, kept as read.
    Markup(Event<'static>),
}

/// An XML element with ordered attributes and children.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

/// One step of a [`ParentChildIter`] walk.
pub struct Visit<'a> {
    /// The element that structurally contains `element`; `None` for the root.
    pub parent: Option<&'a Element>,
    /// Child indices from the root down to `element` (empty for the root).
    pub path: Vec<usize>,
    pub element: &'a Element,
}

/// Pre-order walk that carries each element's true parent on an explicit
/// stack instead of inferring it from visitation order.
pub struct ParentChildIter<'a> {
    tag: Option<&'a str>,
    stack: Vec<(Option<&'a Element>, Vec<usize>, &'a Element)>,
}

impl<'a> Iterator for ParentChildIter<'a> {
    type Item = Visit<'a>;

    fn next(&mut self) -> Option<Visit<'a>> {
        while let Some((parent, path, element)) = self.stack.pop() {
            // Reverse push so children pop in document order
            for (index, child) in element.children.iter().enumerate().rev() {
                if let Node::Element(child) = child {
                    let mut child_path = path.clone();
                    child_path.push(index);
                    self.stack.push((Some(element), child_path, child));
                }
            }
            if self.tag.map_or(true, |tag| element.name == tag) {
                return Some(Visit {
                    parent,
                    path,
                    element,
                });
            }
        }
        None
    }
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Builder-style child element append.
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, keeping its position if it already exists.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|c| match c {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|c| match c {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    /// All elements reached by following `path` tag names from this element,
    /// like an ElementPath `./a/b` query.
    pub fn find_all_mut(&mut self, path: &[&str]) -> Vec<&mut Element> {
        match path.split_first() {
            None => vec![self],
            Some((head, rest)) => self
                .child_elements_mut()
                .filter(|child| child.name == *head)
                .flat_map(|child| child.find_all_mut(rest))
                .collect(),
        }
    }

    /// Call `f` on this element and every descendant named `tag`, pre-order.
    pub fn for_each_tagged_mut<F>(&mut self, tag: &str, f: &mut F)
    where
        F: FnMut(&mut Element),
    {
        if self.name == tag {
            f(self);
        }
        for child in self.child_elements_mut() {
            child.for_each_tagged_mut(tag, f);
        }
    }

    /// Walk this element and its descendants together with their parents,
    /// optionally keeping only elements named `tag`.
    pub fn iter_with_parent<'a>(&'a self, tag: Option<&'a str>) -> ParentChildIter<'a> {
        ParentChildIter {
            tag,
            stack: vec![(None, Vec::new(), self)],
        }
    }

    /// Resolve a child-index path as produced by [`ParentChildIter`].
    pub fn element_at_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        match path.split_first() {
            None => Some(self),
            Some((index, rest)) => match self.children.get_mut(*index)? {
                Node::Element(child) => child.element_at_mut(rest),
                _ => None,
            },
        }
    }

    /// Remove the child element at `index` along with the whitespace-only
    /// text directly after it (its formatting tail).
    pub fn remove_child(&mut self, index: usize) -> Option<Element> {
        if !matches!(self.children.get(index), Some(Node::Element(_))) {
            return None;
        }
        let tail_is_blank = matches!(
            self.children.get(index + 1),
            Some(Node::Text(t)) if t.trim().is_empty()
        );
        if tail_is_blank {
            self.children.remove(index + 1);
        }
        match self.children.remove(index) {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }
}

/// A parsed XML document.
#[derive(Debug, Clone)]
pub struct Document {
    prolog: Vec<Event<'static>>,
    pub root: Element,
    epilog: Vec<Event<'static>>,
}

impl Document {
    pub fn new(root: Element) -> Self {
        Self {
            prolog: Vec::new(),
            root,
            epilog: Vec::new(),
        }
    }

    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        let mut prolog = Vec::new();
        let mut epilog = Vec::new();

        loop {
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(e) => bail!(
                    "XML parse error at position {}: {}",
                    reader.buffer_position(),
                    e
                ),
            };
            match event {
                Event::Start(ref e) => stack.push(element_from_start(e)?),
                Event::Empty(ref e) => {
                    let element = element_from_start(e)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or_else(|| anyhow!("unexpected closing tag"))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(ref e) if !stack.is_empty() => {
                    let text = e.unescape().context("invalid text content")?.into_owned();
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Text(text));
                    }
                }
                Event::CData(e) if !stack.is_empty() => {
                    let text = String::from_utf8(e.into_inner().into_owned())
                        .context("CDATA section is not valid UTF-8")?;
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::CData(text));
                    }
                }
                Event::Comment(e) if !stack.is_empty() => {
                    let text = String::from_utf8(e.into_inner().into_owned())
                        .context("comment is not valid UTF-8")?;
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Comment(text));
                    }
                }
                Event::Eof => {
                    if !stack.is_empty() {
                        let unclosed: Vec<&str> = stack.iter().map(|el| el.name.as_str()).collect();
                        bail!("unclosed element(s): <{}>", unclosed.join(">, <"));
                    }
                    break;
                }
                // Declaration, doctype, PIs and whitespace around the root
                other => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Markup(other.into_owned()));
                    } else if root.is_none() {
                        prolog.push(other.into_owned());
                    } else {
                        epilog.push(other.into_owned());
                    }
                }
            }
        }

        let root = root.context("empty XML document: no root element found")?;
        Ok(Self {
            prolog,
            root,
            epilog,
        })
    }

    pub fn write_to<W: Write>(&self, out: W) -> Result<()> {
        let mut writer = Writer::new(out);
        for event in &self.prolog {
            writer
                .write_event(event.clone())
                .context("failed to write XML prolog")?;
        }
        write_element(&mut writer, &self.root)?;
        for event in &self.epilog {
            writer
                .write_event(event.clone())
                .context("failed to write XML epilog")?;
        }
        Ok(())
    }

    pub fn to_xml_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        String::from_utf8(buf).context("serialized XML is not valid UTF-8")
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => bail!("multiple root elements (second is <{}>)", element.name),
    }
    Ok(())
}

fn element_from_start(start: &BytesStart) -> Result<Element> {
    let name = std::str::from_utf8(start.name().as_ref())
        .context("invalid element name")?
        .to_string();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.with_context(|| format!("malformed attribute on <{}>", name))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .context("invalid attribute name")?
            .to_string();
        let value = attr
            .unescape_value()
            .with_context(|| format!("invalid value for attribute {}", key))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
    })
}

fn write_element<W: Write>(writer: &mut Writer<W>, element: &Element) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute(Attribute {
            key: QName(key.as_bytes()),
            value: Cow::Owned(escape_attribute(value).into_bytes()),
        });
    }

    if element.children.is_empty() {
        writer
            .write_event(Event::Empty(start))
            .context("failed to write element")?;
        return Ok(());
    }

    writer
        .write_event(Event::Start(start))
        .context("failed to write element")?;
    for child in &element.children {
        match child {
            Node::Element(el) => write_element(writer, el)?,
            Node::Text(text) => writer
                .write_event(Event::Text(BytesText::new(text)))
                .context("failed to write text")?,
            Node::CData(text) => writer
                .write_event(Event::CData(BytesCData::new(text.as_str())))
                .context("failed to write CDATA")?,
            Node::Comment(text) => writer
                .write_event(Event::Comment(BytesText::from_escaped(text.as_str())))
                .context("failed to write comment")?,
            Node::Markup(event) => writer
                .write_event(event.clone())
                .context("failed to write markup")?,
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .context("failed to write element")?;
    Ok(())
}

/// Escape an attribute value. Line breaks and tabs become character
/// references; a literal newline would be normalized to a space on reload.
fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            _ => out.push(c),
        }
    }
    out
}
