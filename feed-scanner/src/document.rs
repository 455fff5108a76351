//! The host page as the scanner sees it: a tree of elements that can be
//! queried by a handful of attribute selectors and hidden one by one.

use feedguard_core::{CoreError, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// `[data-testid="value"]`, optionally restricted to one tag.
    TestId { tag: Option<String>, value: String },
    /// `a[href*="fragment"]`
    AnchorHrefContains(String),
}

impl Selector {
    pub fn test_id(value: impl Into<String>) -> Self {
        Selector::TestId {
            tag: None,
            value: value.into(),
        }
    }

    pub fn tag_test_id(tag: impl Into<String>, value: impl Into<String>) -> Self {
        Selector::TestId {
            tag: Some(tag.into()),
            value: value.into(),
        }
    }

    pub fn anchor_href_contains(fragment: impl Into<String>) -> Self {
        Selector::AnchorHrefContains(fragment.into())
    }

    pub fn matches(&self, tag: &str, attrs: &HashMap<String, String>) -> bool {
        match self {
            Selector::TestId { tag: wanted, value } => {
                wanted
                    .as_deref()
                    .map_or(true, |wanted| wanted.eq_ignore_ascii_case(tag))
                    && attrs.get("data-testid").map(String::as_str) == Some(value.as_str())
            }
            Selector::AnchorHrefContains(fragment) => {
                tag.eq_ignore_ascii_case("a")
                    && attrs
                        .get("href")
                        .map_or(false, |href| href.contains(fragment.as_str()))
            }
        }
    }
}

/// Queryable, mutable view of the host page.
///
/// `query_all` with a scope searches the scope's descendants only, in
/// document order.
pub trait HostDocument: Send + Sync {
    fn hostname(&self) -> String;

    fn query_all(&self, scope: Option<NodeId>, selector: &Selector) -> Vec<NodeId>;

    fn query(&self, scope: Option<NodeId>, selector: &Selector) -> Option<NodeId> {
        self.query_all(scope, selector).into_iter().next()
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    fn inner_text(&self, node: NodeId) -> String;

    fn is_hidden(&self, node: NodeId) -> bool;

    fn set_hidden(&self, node: NodeId);

    /// Asks the host to reload the page.
    fn reload(&self);
}

/// Serialized element, as stored in a feed snapshot file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub tag: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attrs: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SnapshotNode>,
}

impl SnapshotNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn child(mut self, child: SnapshotNode) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub hostname: String,
    pub body: Vec<SnapshotNode>,
}

#[derive(Debug)]
struct Node {
    tag: String,
    attrs: HashMap<String, String>,
    text: String,
    children: Vec<NodeId>,
}

/// A rendered feed captured as JSON. Hidden nodes and reload requests are
/// recorded instead of acted on.
#[derive(Debug)]
pub struct SnapshotDocument {
    hostname: String,
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    hidden: Mutex<BTreeSet<NodeId>>,
    reloads: AtomicUsize,
}

impl SnapshotDocument {
    pub fn from_snapshot(snapshot: FeedSnapshot) -> Self {
        let mut document = Self {
            hostname: snapshot.hostname,
            nodes: Vec::new(),
            roots: Vec::new(),
            hidden: Mutex::new(BTreeSet::new()),
            reloads: AtomicUsize::new(0),
        };
        for node in snapshot.body {
            let id = document.insert(node);
            document.roots.push(id);
        }
        document
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CoreError> {
        let snapshot: FeedSnapshot = serde_json::from_str(raw)?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn hidden_nodes(&self) -> Vec<NodeId> {
        self.lock_hidden().iter().copied().collect()
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn insert(&mut self, node: SnapshotNode) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            tag: node.tag,
            attrs: node.attrs,
            text: node.text,
            children: Vec::new(),
        });
        let children: Vec<NodeId> = node
            .children
            .into_iter()
            .map(|child| self.insert(child))
            .collect();
        self.nodes[id].children = children;
        id
    }

    fn collect_matches(&self, from: &[NodeId], selector: &Selector, out: &mut Vec<NodeId>) {
        for &id in from {
            let node = &self.nodes[id];
            if selector.matches(&node.tag, &node.attrs) {
                out.push(id);
            }
            self.collect_matches(&node.children, selector, out);
        }
    }

    fn collect_text(&self, id: NodeId, parts: &mut Vec<String>) {
        let node = &self.nodes[id];
        let own = node.text.trim();
        if !own.is_empty() {
            parts.push(own.to_string());
        }
        for &child in &node.children {
            self.collect_text(child, parts);
        }
    }

    fn lock_hidden(&self) -> MutexGuard<'_, BTreeSet<NodeId>> {
        self.hidden.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HostDocument for SnapshotDocument {
    fn hostname(&self) -> String {
        self.hostname.clone()
    }

    fn query_all(&self, scope: Option<NodeId>, selector: &Selector) -> Vec<NodeId> {
        let mut found = Vec::new();
        match scope {
            Some(id) => match self.nodes.get(id) {
                Some(node) => self.collect_matches(&node.children, selector, &mut found),
                None => {}
            },
            None => self.collect_matches(&self.roots, selector, &mut found),
        }
        found
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.nodes.get(node)?.attrs.get(name).cloned()
    }

    fn inner_text(&self, node: NodeId) -> String {
        if node >= self.nodes.len() {
            return String::new();
        }
        let mut parts = Vec::new();
        self.collect_text(node, &mut parts);
        parts.join("\n")
    }

    fn is_hidden(&self, node: NodeId) -> bool {
        self.lock_hidden().contains(&node)
    }

    fn set_hidden(&self, node: NodeId) {
        if node < self.nodes.len() {
            self.lock_hidden().insert(node);
        }
    }

    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SnapshotDocument {
        SnapshotDocument::from_snapshot(FeedSnapshot {
            hostname: "x.com".to_string(),
            body: vec![SnapshotNode::new("div")
                .attr("data-testid", "cellInnerDiv")
                .child(
                    SnapshotNode::new("article")
                        .attr("data-testid", "tweet")
                        .child(SnapshotNode::new("a").attr("href", "/jack/status/20"))
                        .child(
                            SnapshotNode::new("div")
                                .attr("data-testid", "tweetText")
                                .text("just setting up")
                                .child(SnapshotNode::new("span").text("my twttr")),
                        ),
                )],
        })
    }

    #[test]
    fn test_query_in_document_order() {
        let doc = sample();
        let containers = doc.query_all(None, &Selector::test_id("cellInnerDiv"));
        assert_eq!(containers, vec![0]);

        let article = doc
            .query(Some(0), &Selector::tag_test_id("article", "tweet"))
            .unwrap();
        assert_eq!(article, 1);
        assert!(doc
            .query(Some(0), &Selector::tag_test_id("section", "tweet"))
            .is_none());
    }

    #[test]
    fn test_scoped_query_excludes_scope_itself() {
        let doc = sample();
        assert!(doc.query(Some(0), &Selector::test_id("cellInnerDiv")).is_none());
    }

    #[test]
    fn test_anchor_selector() {
        let doc = sample();
        let anchors = doc.query_all(Some(1), &Selector::anchor_href_contains("/status/"));
        assert_eq!(anchors.len(), 1);
        assert_eq!(
            doc.attribute(anchors[0], "href").as_deref(),
            Some("/jack/status/20")
        );
    }

    #[test]
    fn test_inner_text_joins_descendants() {
        let doc = sample();
        let text_node = doc.query(None, &Selector::test_id("tweetText")).unwrap();
        assert_eq!(doc.inner_text(text_node), "just setting up\nmy twttr");
        assert_eq!(doc.inner_text(999), "");
    }

    #[test]
    fn test_hiding_is_recorded() {
        let doc = sample();
        assert!(!doc.is_hidden(0));
        doc.set_hidden(0);
        doc.set_hidden(0);
        assert!(doc.is_hidden(0));
        assert_eq!(doc.hidden_nodes(), vec![0]);
    }

    #[test]
    fn test_snapshot_json_round_trip_layout() {
        let raw = r#"{
            "hostname": "twitter.com",
            "body": [
                {"tag": "div", "attrs": {"data-testid": "cellInnerDiv"}, "children": [
                    {"tag": "span", "text": "Who to follow"}
                ]}
            ]
        }"#;
        let doc = SnapshotDocument::from_json_str(raw).unwrap();
        assert_eq!(doc.hostname(), "twitter.com");
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.inner_text(0), "Who to follow");
    }

    #[test]
    fn test_reload_requests_are_counted() {
        let doc = sample();
        doc.reload();
        assert_eq!(doc.reload_count(), 1);
    }
}
