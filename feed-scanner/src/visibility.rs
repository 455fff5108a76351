use feedguard_core::{ClassificationResult, TopicRule};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::document::HostDocument;
use crate::extractor::{permalink, PostExtractor};

/// A rule whose score crossed its threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggeredRule {
    pub topic: String,
    pub score: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Hide(Vec<TriggeredRule>),
    Show,
    /// The stored value is not a score object.
    Skip(String),
}

/// Hide iff any rule's topic is scored strictly above its threshold.
///
/// Scores are not clamped; a non-numeric score never triggers a rule.
pub fn decide(value: &Value, rules: &[TopicRule]) -> Decision {
    let Some(result) = ClassificationResult::from_value(value.clone()) else {
        return Decision::Skip(format!("expected a JSON object, found {}", kind_of(value)));
    };

    let triggered: Vec<TriggeredRule> = rules
        .iter()
        .filter(|rule| rule.is_exceeded_by(&result))
        .filter_map(|rule| {
            Some(TriggeredRule {
                topic: rule.name.clone(),
                score: result.score(&rule.name)?,
                threshold: rule.threshold,
            })
        })
        .collect();

    if triggered.is_empty() {
        Decision::Show
    } else {
        Decision::Hide(triggered)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Diagnostic record emitted for every newly hidden post.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HideReport {
    pub post_id: String,
    pub permalink: String,
    pub text: String,
    pub triggered: Vec<TriggeredRule>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VisibilityOutcome {
    Hidden(HideReport),
    AlreadyHidden,
    /// The post left the page before it could be hidden.
    ElementMissing,
    Shown,
    Skipped(String),
}

impl VisibilityOutcome {
    pub fn is_hidden(&self) -> bool {
        matches!(self, VisibilityOutcome::Hidden(_) | VisibilityOutcome::AlreadyHidden)
    }
}

#[derive(Debug, Clone, Default)]
pub struct VisibilityEngine {
    extractor: PostExtractor,
}

impl VisibilityEngine {
    pub fn new(extractor: PostExtractor) -> Self {
        Self { extractor }
    }

    /// Carries out `decision` for `post_id` against the live document.
    pub fn apply(
        &self,
        document: &dyn HostDocument,
        post_id: &str,
        decision: &Decision,
    ) -> VisibilityOutcome {
        let triggered = match decision {
            Decision::Show => return VisibilityOutcome::Shown,
            Decision::Skip(reason) => {
                warn!("Skipping post {} due to invalid analysis result: {}", post_id, reason);
                return VisibilityOutcome::Skipped(reason.clone());
            }
            Decision::Hide(triggered) => triggered,
        };

        let Some(node) = self.extractor.find_post_element(document, post_id) else {
            debug!("Post {} is no longer on the page", post_id);
            return VisibilityOutcome::ElementMissing;
        };
        if document.is_hidden(node) {
            return VisibilityOutcome::AlreadyHidden;
        }
        document.set_hidden(node);

        let report = HideReport {
            post_id: post_id.to_string(),
            permalink: permalink(post_id),
            text: self
                .extractor
                .post_text(document, node)
                .unwrap_or_else(|| "Text not found".to_string()),
            triggered: triggered.clone(),
        };
        info!(
            post_id = %report.post_id,
            permalink = %report.permalink,
            "Post hidden due to high scores"
        );
        for rule in &report.triggered {
            info!("  {}: {} (threshold {})", rule.topic, rule.score, rule.threshold);
        }
        debug!("Hidden post text: {}", report.text);
        VisibilityOutcome::Hidden(report)
    }
}
