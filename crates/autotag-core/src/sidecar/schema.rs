//! The handful of XMP names the merger owns.
//!
//! Elements are identified by namespace URI and local name, never by the
//! prefix a particular file happens to use.

/// XML namespaces involved in the keyword path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    AdobeMeta,
    Rdf,
    DublinCore,
}

impl Namespace {
    pub fn uri(self) -> &'static str {
        match self {
            Namespace::AdobeMeta => "adobe:ns:meta/",
            Namespace::Rdf => "http://www.w3.org/1999/02/22-rdf-syntax-ns#",
            Namespace::DublinCore => "http://purl.org/dc/elements/1.1/",
        }
    }

    /// Prefix used when the namespace has to be declared.
    pub fn preferred_prefix(self) -> &'static str {
        match self {
            Namespace::AdobeMeta => "x",
            Namespace::Rdf => "rdf",
            Namespace::DublinCore => "dc",
        }
    }
}

/// Elements on the `x:xmpmeta/rdf:RDF/rdf:Description/dc:subject/rdf:Bag/rdf:li` path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmpNode {
    Meta,
    Rdf,
    Description,
    Subject,
    Bag,
    Seq,
    Alt,
    Item,
}

impl XmpNode {
    pub fn namespace(self) -> Namespace {
        match self {
            XmpNode::Meta => Namespace::AdobeMeta,
            XmpNode::Subject => Namespace::DublinCore,
            XmpNode::Rdf
            | XmpNode::Description
            | XmpNode::Bag
            | XmpNode::Seq
            | XmpNode::Alt
            | XmpNode::Item => Namespace::Rdf,
        }
    }

    pub fn local_name(self) -> &'static str {
        match self {
            XmpNode::Meta => "xmpmeta",
            XmpNode::Rdf => "RDF",
            XmpNode::Description => "Description",
            XmpNode::Subject => "subject",
            XmpNode::Bag => "Bag",
            XmpNode::Seq => "Seq",
            XmpNode::Alt => "Alt",
            XmpNode::Item => "li",
        }
    }

    /// RDF containers that can hold `dc:subject` items, in lookup order.
    pub const CONTAINERS: [XmpNode; 3] = [XmpNode::Bag, XmpNode::Seq, XmpNode::Alt];

    /// Whether a resolved element name denotes this node.
    pub fn matches(self, namespace: Option<&str>, local_name: &str) -> bool {
        namespace == Some(self.namespace().uri()) && local_name == self.local_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_by_uri_not_prefix() {
        let rdf = Namespace::Rdf.uri();
        assert!(XmpNode::Bag.matches(Some(rdf), "Bag"));
        assert!(!XmpNode::Bag.matches(Some("urn:other"), "Bag"));
        assert!(!XmpNode::Bag.matches(None, "Bag"));
        assert!(!XmpNode::Bag.matches(Some(rdf), "Seq"));
        assert!(XmpNode::Seq.matches(Some(rdf), "Seq"));
    }

    #[test]
    fn test_subject_is_dublin_core() {
        assert_eq!(XmpNode::Subject.namespace(), Namespace::DublinCore);
        assert_eq!(Namespace::DublinCore.preferred_prefix(), "dc");
    }
}
