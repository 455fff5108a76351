use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConfigError, CoreError};

/// Handle to a node of the host document.
pub type NodeId = usize;

/// A named scoring criterion. The settings surface persists the name under
/// the `topic` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRule {
    #[serde(rename = "topic", alias = "name")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub threshold: f64,
}

impl TopicRule {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        threshold: f64,
    ) -> Result<Self, CoreError> {
        let rule = Self {
            name: name.into(),
            description: description.into(),
            threshold,
        };
        rule.validate()?;
        Ok(rule)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::InvalidInput {
                message: "topic name must not be empty".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(CoreError::Config(ConfigError::InvalidValue {
                field: format!("{}.threshold", self.name),
                value: self.threshold.to_string(),
            }));
        }
        Ok(())
    }

    /// Whether `result` carries a score for this topic strictly above the threshold.
    pub fn is_exceeded_by(&self, result: &ClassificationResult) -> bool {
        result
            .score(&self.name)
            .map(|score| score > self.threshold)
            .unwrap_or(false)
    }

    /// The topics offered before the user has configured any.
    pub fn defaults() -> Vec<TopicRule> {
        vec![
            TopicRule {
                name: "politics".to_string(),
                description: "posts about political subjects".to_string(),
                threshold: 0.8,
            },
            TopicRule {
                name: "negativity".to_string(),
                description: "posts with overly negative sentiment".to_string(),
                threshold: 0.9,
            },
        ]
    }
}

/// One rendered post, recomputed on every scan.
#[derive(Debug, Clone, PartialEq)]
pub struct PostRecord {
    pub id: String,
    pub text: String,
    pub node: NodeId,
}

/// Per-topic scores returned by the classifier. Values are kept as raw JSON
/// so that whatever the model produced is cached verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassificationResult(Map<String, Value>);

impl ClassificationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_scores<I, K>(scores: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let map = scores
            .into_iter()
            .map(|(topic, score)| (topic.into(), Value::from(score)))
            .collect();
        Self(map)
    }

    /// Accepts only JSON objects; anything else is not a classification result.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn score(&self, topic: &str) -> Option<f64> {
        self.0.get(topic).and_then(Value::as_f64)
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.0.contains_key(topic)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}
