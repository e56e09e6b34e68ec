//! Lossless XML tree for WordprocessingML parts.
//!
//! Only the pieces the renderer touches are interpreted; everything else is
//! carried through untouched so that a parse → serialize round trip keeps
//! attributes, comments and unknown elements in their original order.

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Malformed(String),

    #[error("unexpected closing tag </{found}> (expected </{expected}>)")]
    MismatchedEnd { expected: String, found: String },

    #[error("document has no root element")]
    NoRoot,
}

impl From<quick_xml::Error> for XmlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for XmlError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::Malformed(err.to_string())
    }
}

impl From<XmlError> for crate::error::Error {
    fn from(err: XmlError) -> Self {
        Self::corrupt(err.to_string()).with_cause(err)
    }
}

pub type Result<T> = std::result::Result<T, XmlError>;

/// Escape text content (`&`, `<`, `>`)
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape the five predefined XML entities
pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Reverse of [`escape_xml`] for the predefined entities and numeric references.
/// Unknown entities are left as they are.
pub fn unescape_xml(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
            }
            _ if entity.starts_with('#') => entity[1..].parse::<u32>().ok().and_then(char::from_u32),
            _ => None,
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    /// Unescaped character data
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    /// Qualified name as written, e.g. `w:t`
    pub name: String,
    /// Attributes in source order with unescaped values
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    pub fn first_child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.is(name))
    }

    pub fn first_child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children
            .iter_mut()
            .filter_map(Node::as_element_mut)
            .find(|e| e.is(name))
    }

    /// Concatenated direct text children
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                Node::Text(t) | Node::CData(t) => out.push_str(t),
                _ => {}
            }
        }
        out
    }

    /// Replace all text children with a single text node
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children
            .retain(|c| !matches!(c, Node::Text(_) | Node::CData(_)));
        let text = text.into();
        if !text.is_empty() {
            self.children.insert(0, Node::Text(text));
        }
    }

    /// Element at an index path relative to `self`
    pub fn at_path(&self, path: &[usize]) -> Option<&Element> {
        let mut current = self;
        for &idx in path {
            current = current.children.get(idx)?.as_element()?;
        }
        Some(current)
    }

    pub fn at_path_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        let mut current = self;
        for &idx in path {
            current = current.children.get_mut(idx)?.as_element_mut()?;
        }
        Some(current)
    }

    /// Index paths of every descendant element named `name`, in document order.
    /// The search does not descend into matches, nor into elements for which
    /// `stop` returns true.
    pub fn find_paths(&self, name: &str, stop: &dyn Fn(&Element) -> bool) -> Vec<Vec<usize>> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        self.collect_paths(name, stop, &mut prefix, &mut out);
        out
    }

    fn collect_paths(
        &self,
        name: &str,
        stop: &dyn Fn(&Element) -> bool,
        prefix: &mut Vec<usize>,
        out: &mut Vec<Vec<usize>>,
    ) {
        for (idx, child) in self.children.iter().enumerate() {
            let Node::Element(el) = child else { continue };
            prefix.push(idx);
            if el.is(name) {
                out.push(prefix.clone());
            } else if !stop(el) {
                el.collect_paths(name, stop, prefix, out);
            }
            prefix.pop();
        }
    }

    /// Every descendant element in document order (depth first)
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        let mut stack: Vec<&Element> = self.child_elements().collect();
        stack.reverse();
        while let Some(el) = stack.pop() {
            out.push(el);
            let mut kids: Vec<&Element> = el.child_elements().collect();
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    pub fn visit_mut(&mut self, f: &mut dyn FnMut(&mut Element)) {
        f(self);
        for child in &mut self.children {
            if let Node::Element(el) = child {
                el.visit_mut(f);
            }
        }
    }

    pub fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape_xml(value));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                Node::Element(el) => el.write_to(out),
                Node::Text(t) => out.push_str(&escape_text(t)),
                Node::CData(t) => {
                    out.push_str("<![CDATA[");
                    out.push_str(t);
                    out.push_str("]]>");
                }
                Node::Comment(t) => {
                    out.push_str("<!--");
                    out.push_str(t);
                    out.push_str("-->");
                }
                Node::ProcessingInstruction(t) => {
                    out.push_str("<?");
                    out.push_str(t);
                    out.push_str("?>");
                }
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    /// Parse a single element (no declaration required)
    pub fn parse(xml: &str) -> Result<Element> {
        XmlDocument::parse(xml).map(|doc| doc.root)
    }
}

/// A parsed XML part
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    pub has_declaration: bool,
    /// Comments and processing instructions before the root element
    pub prolog: Vec<Node>,
    pub root: Element,
}

impl XmlDocument {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut has_declaration = false;
        let mut prolog = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = reader.read_event()?;
            let node = match event {
                Event::Decl(_) => {
                    has_declaration = true;
                    continue;
                }
                Event::Start(start) => {
                    stack.push(element_from_start(&start)?);
                    continue;
                }
                Event::End(end) => {
                    let found = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                    let Some(el) = stack.pop() else {
                        return Err(XmlError::MismatchedEnd {
                            expected: String::new(),
                            found,
                        });
                    };
                    if el.name != found {
                        return Err(XmlError::MismatchedEnd {
                            expected: el.name,
                            found,
                        });
                    }
                    Node::Element(el)
                }
                Event::Empty(start) => Node::Element(element_from_start(&start)?),
                Event::Text(text) => Node::Text(text.unescape()?.into_owned()),
                Event::CData(data) => {
                    Node::CData(String::from_utf8_lossy(&data.into_inner()).into_owned())
                }
                Event::Comment(text) => {
                    Node::Comment(String::from_utf8_lossy(&text).into_owned())
                }
                Event::PI(pi) => {
                    Node::ProcessingInstruction(String::from_utf8_lossy(&pi).into_owned())
                }
                Event::DocType(_) => continue,
                Event::Eof => break,
            };

            match stack.last_mut() {
                Some(parent) => parent.children.push(node),
                None => match node {
                    Node::Element(el) => {
                        if root.is_some() {
                            return Err(XmlError::Malformed(
                                "more than one root element".to_string(),
                            ));
                        }
                        root = Some(el);
                    }
                    // whitespace between declaration and root is not preserved
                    Node::Text(t) if t.trim().is_empty() => {}
                    Node::Text(t) => {
                        return Err(XmlError::Malformed(format!(
                            "text outside of root element: {:?}",
                            t
                        )))
                    }
                    other => prolog.push(other),
                },
            }
        }

        if let Some(open) = stack.pop() {
            return Err(XmlError::Malformed(format!("unclosed element <{}>", open.name)));
        }

        Ok(Self {
            has_declaration,
            prolog,
            root: root.ok_or(XmlError::NoRoot)?,
        })
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        if self.has_declaration {
            out.push_str(XML_DECLARATION);
            out.push_str("\r\n");
        }
        for node in &self.prolog {
            match node {
                Node::Comment(t) => {
                    out.push_str("<!--");
                    out.push_str(t);
                    out.push_str("-->");
                }
                Node::ProcessingInstruction(t) => {
                    out.push_str("<?");
                    out.push_str(t);
                    out.push_str("?>");
                }
                _ => {}
            }
        }
        self.root.write_to(&mut out);
        out
    }
}

fn element_from_start(start: &quick_xml::events::BytesStart<'_>) -> Result<Element> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
    })
}
