//! Keyword merging into an XMP document.
//!
//! Only the children of the `dc:subject/rdf:Bag` are rewritten. A subject
//! written as an `rdf:Seq` or `rdf:Alt` is updated in place. Containers
//! missing on the way to the bag are created, declaring namespaces that are
//! not in scope.

use std::collections::BTreeSet;

use super::document::{Document, Element, Node, Scope};
use super::schema::{Namespace, XmpNode};

/// Result of merging keywords into a sidecar.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Serialized sidecar
    pub bytes: Vec<u8>,

    /// Keywords present after the merge but not before
    pub added: usize,

    /// Keywords present after the merge
    pub total: usize,

    /// Final keyword set, sorted
    pub keywords: Vec<String>,

    /// Why the existing sidecar was unreadable and replaced by a fresh document
    pub rebuilt: Option<String>,
}

/// Merge `candidates` into an existing sidecar (or a fresh one).
///
/// With `overwrite` the bag ends up holding exactly the candidates; otherwise
/// it holds the union of existing keywords and candidates. Merging the same
/// candidates into the output again yields identical bytes.
pub fn merge<I, S>(existing: Option<&[u8]>, candidates: I, overwrite: bool) -> MergeOutcome
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let (mut document, rebuilt) = match existing.map(Document::parse) {
        Some(Ok(document)) => (document, None),
        Some(Err(e)) => (Document::skeleton(), Some(e.to_string())),
        None => (Document::skeleton(), None),
    };

    let before = keyword_bag(&document)
        .map(bag_keywords)
        .unwrap_or_default();

    let candidates: BTreeSet<String> = candidates
        .into_iter()
        .map(|c| c.as_ref().trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();

    let after: BTreeSet<String> = if overwrite {
        candidates
    } else {
        before.union(&candidates).cloned().collect()
    };

    if let Some(target) = keyword_bag_mut(&mut document) {
        rebuild_bag(target, &after);
    }

    MergeOutcome {
        bytes: document.to_xml().into_bytes(),
        added: after.difference(&before).count(),
        total: after.len(),
        keywords: after.into_iter().collect(),
        rebuilt,
    }
}

/// Keywords in a sidecar's bag, sorted. Unreadable input has none.
pub fn read_keywords(xmp: &[u8]) -> Vec<String> {
    Document::parse(xmp)
        .ok()
        .as_ref()
        .and_then(keyword_bag)
        .map(bag_keywords)
        .map(|set| set.into_iter().collect())
        .unwrap_or_default()
}

fn bag_keywords(bag: &Element) -> BTreeSet<String> {
    bag.elements()
        .filter(|e| e.is(XmpNode::Item))
        .map(Element::text)
        .filter(|text| !text.is_empty())
        .collect()
}

fn keyword_bag(document: &Document) -> Option<&Element> {
    let root = &document.root;
    let rdf = if root.is(XmpNode::Rdf) {
        root
    } else {
        root.child(XmpNode::Rdf)?
    };
    let description = rdf
        .children
        .get(select(rdf, XmpNode::Description)?)?
        .as_element()?;
    let subject = description.child(XmpNode::Subject)?;
    XmpNode::CONTAINERS
        .iter()
        .find_map(|&container| subject.child(container))
}

/// The bag plus the rdf:li layout, creating whatever is missing.
fn keyword_bag_mut(document: &mut Document) -> Option<BagTarget<'_>> {
    let mut scope = Scope::default();
    let root = &mut document.root;
    scope.push(root.declarations());

    let rdf = if root.is(XmpNode::Rdf) {
        root
    } else {
        ensure_child(root, XmpNode::Rdf, &mut scope)?
    };
    let description = ensure_child(rdf, XmpNode::Description, &mut scope)?;
    let subject = ensure_child(description, XmpNode::Subject, &mut scope)?;

    let existing = XmpNode::CONTAINERS
        .iter()
        .find_map(|&container| subject.child_position(container));
    let index = match existing {
        Some(index) => index,
        None => find_or_create(subject, XmpNode::Bag, &scope),
    };
    let indent = index
        .checked_sub(1)
        .and_then(|i| subject.children.get(i))
        .and_then(|node| match node {
            Node::Text(text) if node.is_whitespace() => {
                text.rsplit_once('\n').map(|(_, tail)| tail.to_string())
            }
            _ => None,
        });

    let bag = subject.element_at_mut(index)?;
    scope.push(bag.declarations());
    let item_name = qualified_name(&scope, XmpNode::Item).0;

    Some(BagTarget {
        bag,
        item_name,
        indent,
    })
}

struct BagTarget<'a> {
    bag: &'a mut Element,
    item_name: String,
    /// Indentation of the bag's own line; `None` keeps the bag on one line
    indent: Option<String>,
}

/// Replace the bag's items with `keywords`, keeping any other children.
fn rebuild_bag(target: BagTarget<'_>, keywords: &BTreeSet<String>) {
    let BagTarget {
        bag,
        item_name,
        indent,
    } = target;

    let kept = std::mem::take(&mut bag.children)
        .into_iter()
        .filter(|node| !node.is_whitespace())
        .filter(|node| !node.as_element().is_some_and(|e| e.is(XmpNode::Item)));
    let items = keywords.iter().map(|keyword| {
        Node::Element(Element::with_text(
            item_name.as_str(),
            Namespace::Rdf.uri(),
            keyword,
        ))
    });

    let mut children = Vec::new();
    for node in kept.chain(items) {
        if let Some(indent) = &indent {
            children.push(Node::Text(format!("\n{indent} ")));
        }
        children.push(node);
    }
    if let Some(indent) = indent.filter(|_| !children.is_empty()) {
        children.push(Node::Text(format!("\n{indent}")));
    }
    bag.set_children(children);
}

fn ensure_child<'a>(
    parent: &'a mut Element,
    node: XmpNode,
    scope: &mut Scope,
) -> Option<&'a mut Element> {
    let index = find_or_create(parent, node, scope);
    let child = parent.element_at_mut(index)?;
    scope.push(child.declarations());
    Some(child)
}

/// Index of the child that is `node`, appending a new one if there is none.
fn find_or_create(parent: &mut Element, node: XmpNode, scope: &Scope) -> usize {
    if let Some(index) = select(parent, node) {
        return index;
    }

    tracing::debug!("Creating missing <{}> in <{}>", node.local_name(), parent.name());
    parent.children.push(Node::Element(create(node, scope)));
    parent.children.len() - 1
}

/// A description that already holds keywords wins over the first one.
fn select(parent: &Element, node: XmpNode) -> Option<usize> {
    if node == XmpNode::Description {
        let with_subject = parent.children.iter().position(|child| {
            child
                .as_element()
                .is_some_and(|e| e.is(node) && e.child(XmpNode::Subject).is_some())
        });
        if with_subject.is_some() {
            return with_subject;
        }
    }
    parent.child_position(node)
}

fn create(node: XmpNode, scope: &Scope) -> Element {
    let namespace = node.namespace();
    let (name, prefix, declared) = qualified_name(scope, node);

    let mut attributes = Vec::new();
    if node == XmpNode::Description && !prefix.is_empty() {
        attributes.push((format!("{prefix}:about"), String::new()));
    }

    let mut element = Element::new(name, namespace.uri(), &attributes);
    if !declared {
        element.declare(&prefix, namespace.uri());
    }
    element
}

/// Name for `node` under `scope`: `(qualified name, prefix, already in scope)`.
fn qualified_name(scope: &Scope, node: XmpNode) -> (String, String, bool) {
    let namespace = node.namespace();
    let (prefix, declared) = match scope.prefix_for(namespace.uri(), namespace.preferred_prefix()) {
        Some(prefix) => (prefix, true),
        None => (free_prefix(scope, namespace.preferred_prefix()), false),
    };

    let name = if prefix.is_empty() {
        node.local_name().to_string()
    } else {
        format!("{}:{}", prefix, node.local_name())
    };
    (name, prefix, declared)
}

fn free_prefix(scope: &Scope, preferred: &str) -> String {
    if scope.resolve(preferred).is_none() {
        return preferred.to_string();
    }
    (1..)
        .map(|n| format!("{preferred}{n}"))
        .find(|candidate| scope.resolve(candidate).is_none())
        .unwrap_or_else(|| preferred.to_string())
}
