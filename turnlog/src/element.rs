use crate::selector::Selector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tag used for text nodes.
pub const TEXT_TAG: &str = "#text";

/// Elements that start and end a line when rendered as `innerText`.
const BLOCK_TAGS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "dd",
    "div",
    "dl",
    "dt",
    "fieldset",
    "figure",
    "footer",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "li",
    "main",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "table",
    "tr",
    "ul",
];

/// A node in the page tree: either an element or a text node (`tag == "#text"`).
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub tag: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Node {
    pub fn element(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            tag: TEXT_TAG.to_string(),
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Set an attribute, replacing any previous value.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Append a class to the `class` attribute.
    pub fn class(mut self, class: &str) -> Self {
        let entry = self.attributes.entry("class".to_string()).or_default();
        if !entry.is_empty() {
            entry.push(' ');
        }
        entry.push_str(class);
        self
    }

    pub fn child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    /// Append a text child.
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.child(Node::text(text))
    }

    pub fn is_text(&self) -> bool {
        self.tag == TEXT_TAG
    }

    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.get_attr("class")
            .unwrap_or_default()
            .split_ascii_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    /// Replace all children with a single text node.
    pub fn set_text_content(&mut self, text: impl Into<String>) {
        self.children = vec![Node::text(text)];
    }

    fn debug_with_depth(
        &self,
        f: &mut fmt::Formatter<'_>,
        current_depth: usize,
        max_depth: usize,
    ) -> fmt::Result {
        if self.is_text() {
            return write!(f, "{:?}", self.text.as_deref().unwrap_or_default());
        }

        let mut debug_struct = f.debug_struct("Node");
        debug_struct.field("tag", &self.tag);
        if !self.attributes.is_empty() {
            debug_struct.field("attributes", &self.attributes);
        }

        if !self.children.is_empty() {
            if current_depth < max_depth {
                debug_struct.field(
                    "children",
                    &DebugChildrenWithDepth {
                        children: &self.children,
                        current_depth,
                        max_depth,
                    },
                );
            } else {
                debug_struct.field(
                    "children",
                    &format!("[{} children (depth limit reached)]", self.children.len()),
                );
            }
        }

        debug_struct.finish()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.debug_with_depth(f, 0, 32)
    }
}

struct DebugChildrenWithDepth<'a> {
    children: &'a [Node],
    current_depth: usize,
    max_depth: usize,
}

impl fmt::Debug for DebugChildrenWithDepth<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for child in self.children {
            list.entry(&DebugNodeWithDepth {
                node: child,
                current_depth: self.current_depth + 1,
                max_depth: self.max_depth,
            });
        }
        list.finish()
    }
}

struct DebugNodeWithDepth<'a> {
    node: &'a Node,
    current_depth: usize,
    max_depth: usize,
}

impl fmt::Debug for DebugNodeWithDepth<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.node
            .debug_with_depth(f, self.current_depth, self.max_depth)
    }
}

/// Child-index path from the document root to a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.0.split_last()?;
        Some(Self(rest.to_vec()))
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// True when `self` is a strict prefix of `other`.
    pub fn is_ancestor_of(&self, other: &NodePath) -> bool {
        self.0.len() < other.0.len() && other.0.starts_with(&self.0)
    }
}

impl From<Vec<usize>> for NodePath {
    fn from(indices: Vec<usize>) -> Self {
        Self(indices)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|i| i.to_string()).collect();
        write!(f, "/{}", parts.join("/"))
    }
}

/// A snapshot of the page's element tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    root: Node,
}

impl Default for Document {
    fn default() -> Self {
        Self::new(Node::element("html").child(Node::element("body")))
    }
}

impl Document {
    pub fn new(root: Node) -> Self {
        Self { root }
    }

    pub fn root(&self) -> ElementRef<'_> {
        ElementRef {
            root: &self.root,
            node: &self.root,
            path: NodePath::root(),
        }
    }

    pub fn root_node(&self) -> &Node {
        &self.root
    }

    pub fn node(&self, path: &NodePath) -> Option<&Node> {
        resolve(&self.root, path)
    }

    pub fn node_mut(&mut self, path: &NodePath) -> Option<&mut Node> {
        let mut node = &mut self.root;
        for &index in path.indices() {
            node = node.children.get_mut(index)?;
        }
        Some(node)
    }

    pub fn element(&self, path: &NodePath) -> Option<ElementRef<'_>> {
        let node = self.node(path)?;
        Some(ElementRef {
            root: &self.root,
            node,
            path: path.clone(),
        })
    }

    /// First element in document order matching `selector`, the root included.
    pub fn query_selector(&self, selector: impl Into<Selector>) -> Option<ElementRef<'_>> {
        let selector = selector.into();
        let root = self.root();
        if selector.matches(&root) {
            return Some(root);
        }
        root.query_selector(selector)
    }

    /// All elements in document order matching `selector`, the root included.
    pub fn query_selector_all(&self, selector: impl Into<Selector>) -> Vec<ElementRef<'_>> {
        let selector = selector.into();
        let root = self.root();
        let mut matches = Vec::new();
        if selector.matches(&root) {
            matches.push(root.clone());
        }
        matches.extend(root.query_selector_all(selector));
        matches
    }
}

fn resolve<'a>(root: &'a Node, path: &NodePath) -> Option<&'a Node> {
    let mut node = root;
    for &index in path.indices() {
        node = node.children.get(index)?;
    }
    Some(node)
}

/// Borrowed handle to an element inside a [`Document`].
#[derive(Clone)]
pub struct ElementRef<'a> {
    root: &'a Node,
    node: &'a Node,
    path: NodePath,
}

impl fmt::Debug for ElementRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementRef")
            .field("path", &self.path.to_string())
            .field("tag", &self.node.tag)
            .field("attributes", &self.node.attributes)
            .finish()
    }
}

impl<'a> ElementRef<'a> {
    pub fn node(&self) -> &'a Node {
        self.node
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    pub fn tag(&self) -> &'a str {
        &self.node.tag
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.node.get_attr(name)
    }

    pub fn id(&self) -> Option<&'a str> {
        self.attr("id")
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.node.has_class(class)
    }

    /// `disabled` attribute present or `aria-disabled="true"`.
    pub fn is_disabled(&self) -> bool {
        self.attr("disabled").is_some()
            || self
                .attr("aria-disabled")
                .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    pub fn parent(&self) -> Option<ElementRef<'a>> {
        let path = self.path.parent()?;
        let node = resolve(self.root, &path)?;
        Some(ElementRef {
            root: self.root,
            node,
            path,
        })
    }

    /// Ancestors from the direct parent up to the root.
    pub fn ancestors(&self) -> impl Iterator<Item = ElementRef<'a>> {
        std::iter::successors(self.parent(), |el| el.parent())
    }

    /// Element children (text nodes skipped).
    pub fn children(&self) -> Vec<ElementRef<'a>> {
        self.node
            .children
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_text())
            .map(|(i, c)| ElementRef {
                root: self.root,
                node: c,
                path: self.path.child(i),
            })
            .collect()
    }

    /// Element descendants in document order, excluding `self`.
    pub fn descendants(&self) -> Vec<ElementRef<'a>> {
        let mut out = Vec::new();
        self.collect_descendants(&mut out);
        out
    }

    fn collect_descendants(&self, out: &mut Vec<ElementRef<'a>>) {
        for child in self.children() {
            out.push(child.clone());
            child.collect_descendants(out);
        }
    }

    pub fn matches(&self, selector: &Selector) -> bool {
        selector.matches(self)
    }

    /// Nearest inclusive ancestor matching `selector`.
    pub fn closest(&self, selector: impl Into<Selector>) -> Option<ElementRef<'a>> {
        let selector = selector.into();
        if selector.matches(self) {
            return Some(self.clone());
        }
        self.ancestors().find(|el| selector.matches(el))
    }

    pub fn query_selector(&self, selector: impl Into<Selector>) -> Option<ElementRef<'a>> {
        let selector = selector.into();
        self.descendants()
            .into_iter()
            .find(|el| selector.matches(el))
    }

    pub fn query_selector_all(&self, selector: impl Into<Selector>) -> Vec<ElementRef<'a>> {
        let selector = selector.into();
        self.descendants()
            .into_iter()
            .filter(|el| selector.matches(el))
            .collect()
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        push_text_content(self.node, &mut out);
        out
    }

    /// Rendered text: block elements sit on their own lines and `<br>` breaks a line.
    pub fn inner_text(&self) -> String {
        let mut out = String::new();
        push_inner_text(self.node, &mut out);
        out.trim_end_matches('\n').to_string()
    }
}

fn push_text_content(node: &Node, out: &mut String) {
    if node.is_text() {
        out.push_str(node.text.as_deref().unwrap_or_default());
        return;
    }
    for child in &node.children {
        push_text_content(child, out);
    }
}

fn push_inner_text(node: &Node, out: &mut String) {
    if node.is_text() {
        out.push_str(node.text.as_deref().unwrap_or_default());
        return;
    }
    if node.tag == "br" {
        out.push('\n');
        return;
    }

    let block = BLOCK_TAGS.contains(&node.tag.as_str());
    if block && !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    for child in &node.children {
        push_inner_text(child, out);
    }
    if block && !out.ends_with('\n') {
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor() -> Document {
        Document::new(
            Node::element("html").child(
                Node::element("body").child(
                    Node::element("div")
                        .class("ql-editor")
                        .attr("contenteditable", "true")
                        .child(Node::element("p").with_text("first line"))
                        .child(Node::element("p").child(Node::element("br")))
                        .child(
                            Node::element("p")
                                .with_text("second ")
                                .child(Node::element("strong").with_text("bold")),
                        ),
                ),
            ),
        )
    }

    #[test]
    fn test_inner_text_breaks_blocks() {
        let doc = editor();
        let el = doc.query_selector(".ql-editor").expect("editor");
        assert_eq!(el.inner_text(), "first line\n\nsecond bold");
        assert_eq!(el.text_content(), "first linesecond bold");
    }

    #[test]
    fn test_parent_and_closest() {
        let doc = editor();
        let strong = doc.query_selector("strong").expect("strong");
        assert_eq!(strong.parent().map(|p| p.tag()), Some("p"));
        let editor = strong.closest(".ql-editor").expect("closest editor");
        assert_eq!(editor.attr("contenteditable"), Some("true"));
        assert!(strong.closest("button").is_none());
    }

    #[test]
    fn test_node_path_navigation() {
        let doc = editor();
        let strong = doc.query_selector("strong").expect("strong");
        let path = strong.path().clone();
        assert_eq!(path.to_string(), "/0/0/2/1");
        assert_eq!(doc.element(&path).map(|e| e.tag()), Some("strong"));
        assert!(NodePath::from(vec![0, 0]).is_ancestor_of(&path));
        assert!(!path.is_ancestor_of(&path));
        assert!(doc.element(&NodePath::from(vec![9])).is_none());
    }

    #[test]
    fn test_disabled_detection() {
        let doc = Document::new(
            Node::element("div")
                .child(Node::element("button").attr("aria-disabled", "true"))
                .child(Node::element("button").attr("disabled", ""))
                .child(Node::element("button")),
        );
        let buttons = doc.query_selector_all("button");
        assert_eq!(buttons.len(), 3);
        assert!(buttons[0].is_disabled());
        assert!(buttons[1].is_disabled());
        assert!(!buttons[2].is_disabled());
    }

    #[test]
    fn test_node_serialization_shape() {
        let node = Node::element("a")
            .attr("href", "https://example.com")
            .with_text("link");
        let json = serde_json::to_value(&node).expect("serialize");
        assert_eq!(json["tag"], "a");
        assert_eq!(json["attributes"]["href"], "https://example.com");
        assert_eq!(json["children"][0]["tag"], "#text");
        let back: Node = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, node);
    }
}
