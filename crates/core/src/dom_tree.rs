//! Owned, mutable HTML tree.
//!
//! scraper's parse tree is read-only, so documents and content fragments are
//! copied into a [`DomTree`]: an arena of nodes addressed by [`NodeId`]. All
//! rewriting (footnote markers, image sources, template slots) happens here,
//! and [`DomTree::to_html`] serializes the result.
//!
//! Detached nodes stay in the arena until the tree is dropped. Cloning a tree
//! copies the arena, so clones share nothing with the original.

/// Index of a node inside its [`DomTree`].
pub type NodeId = usize;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Payload of a single node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    /// Root of a full document.
    Document,
    /// Root of a content fragment.
    Fragment,
    /// `<!DOCTYPE name>`
    Doctype(String),
    /// An element with its attributes in source order.
    Element { name: String, attrs: Vec<(String, String)> },
    /// Unescaped text.
    Text(String),
    /// Comment body.
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An arena-backed HTML tree.
#[derive(Debug, Clone)]
pub struct DomTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl DomTree {
    /// Create an empty document tree.
    pub fn new_document() -> Self {
        Self { nodes: vec![Node { data: NodeData::Document, parent: None, children: Vec::new() }], root: 0 }
    }

    /// Create an empty fragment tree.
    pub fn new_fragment() -> Self {
        Self { nodes: vec![Node { data: NodeData::Fragment, parent: None, children: Vec::new() }], root: 0 }
    }

    /// Id of the root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id].data
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    /// Lowercase tag name for element nodes.
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].data {
            NodeData::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId, tag: &str) -> bool {
        self.tag_name(id).is_some_and(|name| name.eq_ignore_ascii_case(tag))
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[id].data {
            NodeData::Element { attrs, .. } => attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// Set an attribute, replacing any existing value. No-op on non-elements.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeData::Element { attrs, .. } = &mut self.nodes[id].data {
            match attrs.iter_mut().find(|(k, _)| k == name) {
                Some(slot) => slot.1 = value.to_string(),
                None => attrs.push((name.to_string(), value.to_string())),
            }
        }
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }

    /// All nodes below `id` in depth-first document order, `id` excluded.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id].children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.nodes[next].children.iter().rev().copied());
        }
        out
    }

    /// Elements with the given tag below `id`, in document order.
    pub fn elements_by_tag(&self, id: NodeId, tag: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&n| self.is_element(n, tag))
            .collect()
    }

    /// Elements carrying `class` anywhere in the tree, in document order.
    pub fn elements_by_class(&self, class: &str) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|&n| self.has_class(n, class))
            .collect()
    }

    /// First attached element whose `id` attribute equals `element_id`.
    pub fn element_by_id(&self, element_id: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|&n| self.attr(n, "id") == Some(element_id))
    }

    /// Concatenated text of all text nodes below `id`.
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let NodeData::Text(t) = &self.nodes[id].data {
            out.push_str(t);
        }
        for n in self.descendants(id) {
            if let NodeData::Text(t) = &self.nodes[n].data {
                out.push_str(t);
            }
        }
        out
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        self.nodes.push(Node { data, parent: None, children: Vec::new() });
        self.nodes.len() - 1
    }

    /// Create a detached element.
    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.push(NodeData::Element { name: name.to_ascii_lowercase(), attrs: Vec::new() })
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    pub(crate) fn create_node(&mut self, data: NodeData) -> NodeId {
        self.push(data)
    }

    /// Remove `id` from its parent. The node and its subtree stay usable.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent.take() {
            self.nodes[parent].children.retain(|&c| c != id);
        }
    }

    /// Append `child` as the last child of `parent`, detaching it first.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    /// Insert `node` as the next sibling of `sibling`.
    ///
    /// Does nothing when `sibling` has no parent.
    pub fn insert_after(&mut self, sibling: NodeId, node: NodeId) {
        let Some(parent) = self.nodes[sibling].parent else {
            return;
        };
        self.detach(node);
        let pos = self.nodes[parent]
            .children
            .iter()
            .position(|&c| c == sibling)
            .map_or(self.nodes[parent].children.len(), |p| p + 1);
        self.nodes[node].parent = Some(parent);
        self.nodes[parent].children.insert(pos, node);
    }

    /// Detach every child of `id`.
    pub fn clear_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.nodes[id].children);
        for c in children {
            self.nodes[c].parent = None;
        }
    }

    /// Replace the children of `id` with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        self.clear_children(id);
        let t = self.create_text(text);
        self.append(id, t);
    }

    /// Append a text node to `id`.
    pub fn append_text(&mut self, id: NodeId, text: &str) {
        let t = self.create_text(text);
        self.append(id, t);
    }

    /// Create `<tag>` and append it to `parent`.
    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let el = self.create_element(tag);
        self.append(parent, el);
        el
    }

    /// Deep-copy the subtree rooted at `id` in `other` into this arena.
    ///
    /// Returns the id of the (detached) copy.
    pub fn import(&mut self, other: &DomTree, id: NodeId) -> NodeId {
        let copy = self.push(other.nodes[id].data.clone());
        let mut stack = vec![(id, copy)];
        while let Some((src, dst)) = stack.pop() {
            for &child in &other.nodes[src].children {
                let c = self.push(other.nodes[child].data.clone());
                self.nodes[c].parent = Some(dst);
                self.nodes[dst].children.push(c);
                stack.push((child, c));
            }
        }
        copy
    }

    /// Copy the children of `other`'s root onto the end of `parent`.
    pub fn append_tree(&mut self, parent: NodeId, other: &DomTree) {
        for &child in other.children(other.root()) {
            let copy = self.import(other, child);
            self.append(parent, copy);
        }
    }

    /// Replace the children of `id` with a parsed HTML fragment.
    pub fn set_inner_html(&mut self, id: NodeId, html: &str) {
        self.clear_children(id);
        let fragment = crate::parse::parse_fragment(html);
        self.append_tree(id, &fragment);
    }

    /// Serialize the whole tree.
    pub fn to_html(&self) -> String {
        self.inner_html(self.root)
    }

    /// Serialize the children of `id`.
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for &c in &self.nodes[id].children {
            self.write_node(c, &mut out);
        }
        out
    }

    /// Serialize `id` including its own tags.
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id].data {
            NodeData::Document | NodeData::Fragment => {
                for &c in &self.nodes[id].children {
                    self.write_node(c, out);
                }
            }
            NodeData::Doctype(name) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(name);
                out.push('>');
            }
            NodeData::Comment(body) => {
                out.push_str("<!--");
                out.push_str(body);
                out.push_str("-->");
            }
            NodeData::Text(text) => {
                let raw = self.nodes[id]
                    .parent
                    .and_then(|p| self.tag_name(p))
                    .is_some_and(|p| RAW_TEXT_ELEMENTS.contains(&p));
                if raw {
                    out.push_str(text);
                } else {
                    out.push_str(&html_escape::encode_text(text));
                }
            }
            NodeData::Element { name, attrs } => {
                out.push('<');
                out.push_str(name);
                for (k, v) in attrs {
                    out.push(' ');
                    out.push_str(k);
                    out.push_str("=\"");
                    out.push_str(&html_escape::encode_double_quoted_attribute(v));
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&name.as_str()) {
                    return;
                }
                for &c in &self.nodes[id].children {
                    self.write_node(c, out);
                }
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
        }
    }
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new_fragment()
    }
}
