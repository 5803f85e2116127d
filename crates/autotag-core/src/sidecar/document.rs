//! Lossless XMP document tree.
//!
//! Start tags, text, comments, CDATA sections and processing instructions are
//! kept as raw source text, so any part of a sidecar the merger does not touch
//! is written back byte for byte. Whitespace outside the root element is not
//! preserved; every prolog and epilog node is written on its own line.

use std::borrow::Cow;

use quick_xml::escape::{escape, unescape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use super::schema::{Namespace, XmpNode};

/// Declaration written at the top of every sidecar.
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// The bytes could not be read as an XML document.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct MalformedXmp(String);

/// One node of the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    /// Raw (still escaped) character data
    Text(String),
    Comment(String),
    CData(String),
    /// Target and content, e.g. `xpacket begin="" id="..."`
    ProcessingInstruction(String),
    DocType(String),
}

impl Node {
    pub fn is_whitespace(&self) -> bool {
        matches!(self, Node::Text(text) if text.trim().is_empty())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    fn write(&self, out: &mut String) {
        match self {
            Node::Element(element) => element.write(out),
            Node::Text(text) => out.push_str(text),
            Node::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            Node::CData(text) => {
                out.push_str("<![CDATA[");
                out.push_str(text);
                out.push_str("]]>");
            }
            Node::ProcessingInstruction(text) => {
                out.push_str("<?");
                out.push_str(text);
                out.push_str("?>");
            }
            Node::DocType(text) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(text.trim_start());
                out.push('>');
            }
        }
    }
}

/// An element with its namespace resolved at parse time.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Everything between `<` and `>` (or `/>`) in the source
    raw_start: String,
    name: String,
    namespace: Option<String>,
    local_name: String,
    /// `xmlns` bindings made on this element; the default namespace has prefix ""
    declarations: Vec<(String, String)>,
    pub children: Vec<Node>,
    self_closing: bool,
}

impl Element {
    /// Create an empty element. `xmlns`/`xmlns:*` attributes become declarations.
    pub fn new(name: impl Into<String>, namespace: &str, attributes: &[(String, String)]) -> Self {
        let name = name.into();
        let mut raw_start = name.clone();
        let mut declarations = Vec::new();

        for (key, value) in attributes {
            raw_start.push(' ');
            raw_start.push_str(key);
            raw_start.push_str("=\"");
            raw_start.push_str(&escape(value.as_str()));
            raw_start.push('"');

            if let Some(prefix) = declared_prefix(key) {
                declarations.push((prefix.to_string(), value.clone()));
            }
        }

        let local_name = split_name(&name).1.to_string();
        Self {
            raw_start,
            name,
            namespace: Some(namespace.to_string()),
            local_name,
            declarations,
            children: Vec::new(),
            self_closing: true,
        }
    }

    /// Create an element holding escaped `text`.
    pub fn with_text(name: impl Into<String>, namespace: &str, text: &str) -> Self {
        let mut element = Self::new(name, namespace, &[]);
        element.set_children(vec![Node::Text(escape(text).into_owned())]);
        element
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn declarations(&self) -> &[(String, String)] {
        &self.declarations
    }

    pub fn is(&self, node: XmpNode) -> bool {
        node.matches(self.namespace(), &self.local_name)
    }

    /// Index into `children` of the first child element that is `node`.
    pub fn child_position(&self, node: XmpNode) -> Option<usize> {
        self.children
            .iter()
            .position(|child| child.as_element().is_some_and(|e| e.is(node)))
    }

    pub fn child(&self, node: XmpNode) -> Option<&Element> {
        self.elements().find(|e| e.is(node))
    }

    pub fn element_at_mut(&mut self, index: usize) -> Option<&mut Element> {
        match self.children.get_mut(index) {
            Some(Node::Element(element)) => Some(element),
            _ => None,
        }
    }

    /// Child elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// Unescaped direct character data (text and CDATA), trimmed.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for child in &self.children {
            match child {
                Node::Text(raw) => match unescape(raw) {
                    Ok(value) => text.push_str(&value),
                    Err(_) => text.push_str(raw),
                },
                Node::CData(raw) => text.push_str(raw),
                _ => {}
            }
        }
        text.trim().to_string()
    }

    /// Replace all children; an element left without children is written as `<name/>`.
    pub fn set_children(&mut self, children: Vec<Node>) {
        self.self_closing = children.is_empty();
        self.children = children;
    }

    /// Add a namespace declaration to the start tag.
    pub fn declare(&mut self, prefix: &str, uri: &str) {
        let key: Cow<'_, str> = if prefix.is_empty() {
            Cow::Borrowed("xmlns")
        } else {
            Cow::Owned(format!("xmlns:{prefix}"))
        };
        let trailing = self.raw_start.len() - self.raw_start.trim_end().len();
        self.raw_start.truncate(self.raw_start.len() - trailing);
        self.raw_start
            .push_str(&format!(" {}=\"{}\"", key, escape(uri)));
        self.declarations.push((prefix.to_string(), uri.to_string()));
    }

    fn write(&self, out: &mut String) {
        out.push('<');
        if self.self_closing && self.children.is_empty() {
            out.push_str(&self.raw_start);
            out.push_str("/>");
            return;
        }

        if self.self_closing {
            out.push_str(self.raw_start.trim_end());
        } else {
            out.push_str(&self.raw_start);
        }
        out.push('>');
        for child in &self.children {
            child.write(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

/// A parsed sidecar: root element plus the nodes around it.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    prolog: Vec<Node>,
    pub root: Element,
    epilog: Vec<Node>,
}

impl Document {
    /// Parse a sidecar.
    ///
    /// Fails on anything that is not a single well-formed UTF-8 XML element
    /// tree. A leading byte-order mark is ignored.
    pub fn parse(bytes: &[u8]) -> Result<Self, MalformedXmp> {
        let text = utf8(bytes).map_err(|e| MalformedXmp(format!("not UTF-8: {e}")))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(false);

        let mut builder = TreeBuilder::default();
        loop {
            let event = reader.read_event().map_err(|e| {
                MalformedXmp(format!("at byte {}: {}", reader.buffer_position(), e))
            })?;

            match event {
                Event::Start(start) => {
                    let element = builder.open(&start, false)?;
                    builder.stack.push(element);
                }
                Event::Empty(start) => {
                    let element = builder.open(&start, true)?;
                    builder.scope.pop();
                    builder.attach(Node::Element(element))?;
                }
                Event::End(_) => {
                    let element = builder
                        .stack
                        .pop()
                        .ok_or_else(|| MalformedXmp("unexpected closing tag".to_string()))?;
                    builder.scope.pop();
                    builder.attach(Node::Element(element))?;
                }
                Event::Text(text) => builder.attach(Node::Text(owned_utf8(&text)?))?,
                Event::CData(text) => builder.attach(Node::CData(owned_utf8(&text)?))?,
                Event::Comment(text) => builder.attach(Node::Comment(owned_utf8(&text)?))?,
                Event::PI(pi) => builder.attach(Node::ProcessingInstruction(owned_utf8(&pi)?))?,
                Event::DocType(text) => builder.attach(Node::DocType(owned_utf8(&text)?))?,
                // Replaced by XML_DECLARATION on write.
                Event::Decl(_) => {}
                Event::Eof => break,
            }
        }

        builder.finish()
    }

    /// The minimal document holding an empty keyword bag.
    pub fn skeleton() -> Self {
        let rdf_uri = Namespace::Rdf.uri();
        let indent = |depth: usize| Node::Text(format!("\n{}", " ".repeat(depth)));
        let nest = |mut parent: Element, child: Element, depth: usize| {
            parent.set_children(vec![indent(depth + 1), Node::Element(child), indent(depth)]);
            parent
        };

        let bag = Element::new("rdf:Bag", rdf_uri, &[]);
        let subject = nest(
            Element::new("dc:subject", Namespace::DublinCore.uri(), &[]),
            bag,
            3,
        );
        let description = nest(
            Element::new(
                "rdf:Description",
                rdf_uri,
                &[
                    ("rdf:about".to_string(), String::new()),
                    ("xmlns:dc".to_string(), Namespace::DublinCore.uri().to_string()),
                ],
            ),
            subject,
            2,
        );
        let rdf = nest(
            Element::new(
                "rdf:RDF",
                rdf_uri,
                &[("xmlns:rdf".to_string(), rdf_uri.to_string())],
            ),
            description,
            1,
        );
        let root = nest(
            Element::new(
                "x:xmpmeta",
                Namespace::AdobeMeta.uri(),
                &[("xmlns:x".to_string(), Namespace::AdobeMeta.uri().to_string())],
            ),
            rdf,
            0,
        );

        Self {
            prolog: Vec::new(),
            root,
            epilog: Vec::new(),
        }
    }

    /// Serialize with a UTF-8 XML declaration.
    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(1024);
        out.push_str(XML_DECLARATION);
        out.push('\n');
        for node in &self.prolog {
            node.write(&mut out);
            out.push('\n');
        }
        self.root.write(&mut out);
        out.push('\n');
        for node in &self.epilog {
            node.write(&mut out);
            out.push('\n');
        }
        out
    }
}

/// In-scope namespace bindings, innermost last.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    bindings: Vec<(String, String)>,
    frames: Vec<usize>,
}

impl Scope {
    pub fn push(&mut self, declarations: &[(String, String)]) {
        self.frames.push(self.bindings.len());
        self.bindings.extend_from_slice(declarations);
    }

    pub fn pop(&mut self) {
        if let Some(len) = self.frames.pop() {
            self.bindings.truncate(len);
        }
    }

    /// URI bound to `prefix` ("" for the default namespace).
    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NAMESPACE);
        }
        self.bindings
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
            .filter(|uri| !uri.is_empty())
    }

    /// A prefix currently bound to `uri`, preferring `preferred`.
    pub fn prefix_for(&self, uri: &str, preferred: &str) -> Option<String> {
        if self.resolve(preferred) == Some(uri) {
            return Some(preferred.to_string());
        }
        self.bindings
            .iter()
            .rev()
            .map(|(prefix, _)| prefix)
            .find(|prefix| self.resolve(prefix) == Some(uri))
            .cloned()
    }
}

#[derive(Default)]
struct TreeBuilder {
    prolog: Vec<Node>,
    root: Option<Element>,
    epilog: Vec<Node>,
    stack: Vec<Element>,
    scope: Scope,
}

impl TreeBuilder {
    /// Build an element from a start tag and push its namespace frame.
    fn open(
        &mut self,
        start: &BytesStart<'_>,
        self_closing: bool,
    ) -> Result<Element, MalformedXmp> {
        let raw_start = owned_utf8(start)?;
        let name = owned_utf8(start.name().as_ref())?;

        let mut declarations = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute
                .map_err(|e| MalformedXmp(format!("bad attribute in <{name}>: {e}")))?;
            let key = utf8(attribute.key.as_ref())
                .map_err(|e| MalformedXmp(format!("bad attribute in <{name}>: {e}")))?;
            if let Some(prefix) = declared_prefix(key) {
                let uri = attribute
                    .unescape_value()
                    .map_err(|e| MalformedXmp(format!("bad namespace in <{name}>: {e}")))?;
                declarations.push((prefix.to_string(), uri.into_owned()));
            }
        }
        self.scope.push(&declarations);

        let (prefix, local_name) = split_name(&name);
        let namespace = self.scope.resolve(prefix.unwrap_or("")).map(str::to_string);
        if prefix.is_some() && namespace.is_none() {
            return Err(MalformedXmp(format!("undeclared prefix in <{name}>")));
        }

        Ok(Element {
            raw_start,
            local_name: local_name.to_string(),
            name,
            namespace,
            declarations,
            children: Vec::new(),
            self_closing,
        })
    }

    fn attach(&mut self, node: Node) -> Result<(), MalformedXmp> {
        if let Some(parent) = self.stack.last_mut() {
            parent.children.push(node);
            return Ok(());
        }

        match node {
            Node::Text(text) if text.trim().is_empty() => Ok(()),
            Node::Text(text) => Err(MalformedXmp(format!(
                "text outside the root element: {:?}",
                text.trim()
            ))),
            Node::Element(element) => {
                if self.root.is_some() {
                    return Err(MalformedXmp(format!(
                        "second root element <{}>",
                        element.name
                    )));
                }
                self.root = Some(element);
                Ok(())
            }
            other => {
                if self.root.is_some() {
                    self.epilog.push(other);
                } else {
                    self.prolog.push(other);
                }
                Ok(())
            }
        }
    }

    fn finish(self) -> Result<Document, MalformedXmp> {
        if let Some(open) = self.stack.last() {
            return Err(MalformedXmp(format!("unclosed element <{}>", open.name)));
        }
        let root = self
            .root
            .ok_or_else(|| MalformedXmp("no root element".to_string()))?;
        Ok(Document {
            prolog: self.prolog,
            root,
            epilog: self.epilog,
        })
    }
}

/// `xmlns` → "", `xmlns:dc` → "dc", anything else → None.
fn declared_prefix(key: &str) -> Option<&str> {
    if key == "xmlns" {
        Some("")
    } else {
        key.strip_prefix("xmlns:")
    }
}

fn split_name(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

fn utf8(bytes: &[u8]) -> Result<&str, std::str::Utf8Error> {
    std::str::from_utf8(bytes)
}

fn owned_utf8(bytes: &[u8]) -> Result<String, MalformedXmp> {
    utf8(bytes)
        .map(str::to_string)
        .map_err(|e| MalformedXmp(format!("not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xpacket begin="" id="W5M0MpCehiHzreSzNTczkc9d"?>
<x:xmpmeta xmlns:x="adobe:ns:meta/" x:xmptk="Adobe XMP Core 7.0">
 <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
  <!-- camera settings -->
  <rdf:Description rdf:about=""
    xmlns:tiff="http://ns.adobe.com/tiff/1.0/"
    tiff:Make="NIKON &amp; CO">
   <tiff:Notes><![CDATA[a < b]]></tiff:Notes>
  </rdf:Description>
 </rdf:RDF>
</x:xmpmeta>
<?xpacket end="w"?>"#;

    #[test]
    fn test_round_trip_preserves_content() {
        let doc = Document::parse(SAMPLE.as_bytes()).unwrap();
        let xml = doc.to_xml();
        assert!(xml.starts_with(XML_DECLARATION));
        assert!(xml.contains(r#"<?xpacket begin="" id="W5M0MpCehiHzreSzNTczkc9d"?>"#));
        assert!(xml.contains(r#"tiff:Make="NIKON &amp; CO""#));
        assert!(xml.contains("<![CDATA[a < b]]>"));
        assert!(xml.contains("<!-- camera settings -->"));
        assert!(xml.trim_end().ends_with(r#"<?xpacket end="w"?>"#));
    }

    #[test]
    fn test_serialization_is_stable() {
        let once = Document::parse(SAMPLE.as_bytes()).unwrap().to_xml();
        let twice = Document::parse(once.as_bytes()).unwrap().to_xml();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_namespaces_resolved() {
        let doc = Document::parse(SAMPLE.as_bytes()).unwrap();
        assert!(doc.root.is(XmpNode::Meta));
        let rdf = doc.root.child(XmpNode::Rdf).unwrap();
        assert!(rdf.child(XmpNode::Description).is_some());
    }

    #[test]
    fn test_foreign_prefix_resolves() {
        let xml = r#"<m:xmpmeta xmlns:m="adobe:ns:meta/"><r:RDF xmlns:r="http://www.w3.org/1999/02/22-rdf-syntax-ns#"/></m:xmpmeta>"#;
        let doc = Document::parse(xml.as_bytes()).unwrap();
        assert!(doc.root.is(XmpNode::Meta));
        assert!(doc.root.child(XmpNode::Rdf).is_some());
    }

    #[test]
    fn test_lookalike_prefix_does_not_match() {
        let xml = r#"<x:xmpmeta xmlns:x="urn:not-adobe"/>"#;
        let doc = Document::parse(xml.as_bytes()).unwrap();
        assert!(!doc.root.is(XmpNode::Meta));
    }

    #[test]
    fn test_bom_is_ignored() {
        let xml = "\u{feff}<root/>";
        let doc = Document::parse(xml.as_bytes()).unwrap();
        assert_eq!(doc.root.name(), "root");
    }

    #[test]
    fn test_malformed_inputs() {
        let cases: &[&[u8]] = &[
            b"",
            b"not xml at all",
            b"<a><b></a>",
            b"<a>",
            b"<a/><b/>",
            b"<a/>trailing",
            b"<p:a/>",
            &[0x3c, 0x61, 0xff, 0x2f, 0x3e],
        ];
        for case in cases {
            assert!(
                Document::parse(case).is_err(),
                "accepted {:?}",
                String::from_utf8_lossy(case)
            );
        }
    }

    #[test]
    fn test_text_unescapes_and_trims() {
        let xml = "<li>\n  rock &amp; roll \n</li>";
        let doc = Document::parse(xml.as_bytes()).unwrap();
        assert_eq!(doc.root.text(), "rock & roll");
    }

    #[test]
    fn test_skeleton_shape() {
        let xml = Document::skeleton().to_xml();
        let doc = Document::parse(xml.as_bytes()).unwrap();
        let bag = doc
            .root
            .child(XmpNode::Rdf)
            .and_then(|e| e.child(XmpNode::Description))
            .and_then(|e| e.child(XmpNode::Subject))
            .and_then(|e| e.child(XmpNode::Bag));
        assert!(bag.is_some());
        assert_eq!(doc, Document::skeleton());
    }

    #[test]
    fn test_declare_adds_binding() {
        let mut element = Element::new("rdf:Bag", Namespace::Rdf.uri(), &[]);
        element.declare("rdf", Namespace::Rdf.uri());
        assert_eq!(element.declarations().len(), 1);

        let mut out = String::new();
        element.write(&mut out);
        assert_eq!(
            out,
            r#"<rdf:Bag xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"/>"#
        );
    }
}
