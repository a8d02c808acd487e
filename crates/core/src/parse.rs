//! HTML parsing into [`DomTree`].
//!
//! Parsing itself is delegated to scraper (html5ever), which tolerates the
//! usual real-world markup problems. The resulting read-only tree is copied
//! into an owned [`DomTree`] that the rest of the pipeline mutates.
//!
//! # Example
//!
//! ```rust
//! use quire_core::parse::{parse_document, parse_fragment};
//!
//! let doc = parse_document("<html><head><title>T</title></head><body></body></html>");
//! assert!(doc.elements_by_tag(doc.root(), "title").len() == 1);
//!
//! let content = parse_fragment("<p>Hello <a href=\"https://example.com\">there</a></p>");
//! assert_eq!(content.to_html(), "<p>Hello <a href=\"https://example.com\">there</a></p>");
//! ```

use scraper::{Html, Node};

use crate::dom_tree::{DomTree, NodeData};

/// Parses a complete HTML document (templates).
///
/// html5ever fills in missing `<html>`, `<head>` and `<body>` elements.
pub fn parse_document(html: &str) -> DomTree {
    convert(&Html::parse_document(html), DomTree::new_document(), false)
}

/// Parses a content fragment (article bodies, small HTML snippets).
///
/// The fragment is parsed in a `<body>` context; the synthetic wrapper
/// element html5ever adds is not part of the result.
pub fn parse_fragment(html: &str) -> DomTree {
    convert(&Html::parse_fragment(html), DomTree::new_fragment(), true)
}

fn convert(parsed: &Html, mut tree: DomTree, fragment: bool) -> DomTree {
    let start = if fragment { *parsed.root_element() } else { parsed.tree.root() };
    let mut stack = vec![(tree.root(), start)];
    while let Some((parent, node)) = stack.pop() {
        for child in node.children() {
            let data = match child.value() {
                Node::Element(el) => NodeData::Element {
                    name: el.name().to_ascii_lowercase(),
                    attrs: el.attrs().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                },
                Node::Text(text) => NodeData::Text(String::from(&**text)),
                Node::Comment(comment) => NodeData::Comment(String::from(&**comment)),
                Node::Doctype(doctype) => NodeData::Doctype(doctype.name().to_string()),
                _ => continue,
            };
            let id = tree.create_node(data);
            tree.append(parent, id);
            stack.push((id, child));
        }
    }
    tree
}
