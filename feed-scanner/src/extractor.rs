use feedguard_core::{NodeId, PostRecord};
use tracing::debug;
use url::Url;

use crate::document::{HostDocument, Selector};

/// Base used to resolve relative permalinks.
pub const PERMALINK_BASE: &str = "https://x.com/";

/// Structural markers of the feed layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMarkers {
    pub container_test_id: String,
    pub article_tag: String,
    pub article_test_id: String,
    pub text_test_id: String,
    pub permalink_segment: String,
}

impl Default for FeedMarkers {
    fn default() -> Self {
        Self {
            container_test_id: "cellInnerDiv".to_string(),
            article_tag: "article".to_string(),
            article_test_id: "tweet".to_string(),
            text_test_id: "tweetText".to_string(),
            permalink_segment: "status".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PostExtractor {
    markers: FeedMarkers,
}

impl PostExtractor {
    pub fn new(markers: FeedMarkers) -> Self {
        Self { markers }
    }

    pub fn markers(&self) -> &FeedMarkers {
        &self.markers
    }

    fn container_selector(&self) -> Selector {
        Selector::test_id(self.markers.container_test_id.as_str())
    }

    fn permalink_selector(&self) -> Selector {
        Selector::anchor_href_contains(format!("/{}/", self.markers.permalink_segment))
    }

    /// Every post currently rendered, in document order.
    ///
    /// Containers without an article or a usable permalink are skipped. A
    /// missing text region yields empty text. Identifiers may repeat when the
    /// host renders a post twice.
    pub fn extract_visible_posts(&self, document: &dyn HostDocument) -> Vec<PostRecord> {
        let article = Selector::tag_test_id(
            self.markers.article_tag.as_str(),
            self.markers.article_test_id.as_str(),
        );
        let permalink = self.permalink_selector();

        let mut posts = Vec::new();
        for container in document.query_all(None, &self.container_selector()) {
            let Some(article) = document.query(Some(container), &article) else {
                continue;
            };
            let Some(id) = document
                .query(Some(article), &permalink)
                .and_then(|anchor| document.attribute(anchor, "href"))
                .and_then(|href| post_id_from_href(&href, &self.markers.permalink_segment))
            else {
                continue;
            };
            let text = self.post_text(document, article).unwrap_or_default();
            posts.push(PostRecord {
                id,
                text,
                node: container,
            });
        }
        debug!("Extracted {} post(s)", posts.len());
        posts
    }

    /// Trimmed text of the first text region under `scope`.
    pub fn post_text(&self, document: &dyn HostDocument, scope: NodeId) -> Option<String> {
        document
            .query(Some(scope), &Selector::test_id(self.markers.text_test_id.as_str()))
            .map(|node| document.inner_text(node).trim().to_string())
    }

    /// Re-locates the container of `post_id` in the current page.
    pub fn find_post_element(&self, document: &dyn HostDocument, post_id: &str) -> Option<NodeId> {
        let permalink = self.permalink_selector();
        document
            .query_all(None, &self.container_selector())
            .into_iter()
            .find(|&container| {
                document
                    .query_all(Some(container), &permalink)
                    .into_iter()
                    .filter_map(|anchor| document.attribute(anchor, "href"))
                    .any(|href| {
                        post_id_from_href(&href, &self.markers.permalink_segment).as_deref()
                            == Some(post_id)
                    })
            })
    }
}

/// The path segment right after `marker`, e.g. `20` for `/jack/status/20`.
pub fn post_id_from_href(href: &str, marker: &str) -> Option<String> {
    let url = Url::parse(href)
        .or_else(|_| Url::parse(PERMALINK_BASE).and_then(|base| base.join(href)))
        .ok()?;
    let mut segments = url.path_segments()?;
    segments.find(|segment| *segment == marker)?;
    segments
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

pub fn permalink(post_id: &str) -> String {
    format!("{}user/status/{}", PERMALINK_BASE, post_id)
}
