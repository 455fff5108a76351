use feedguard_core::{CoreError, ErrorExt, TopicRule};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::{ConfigStore, TOPIC_RULES_KEY};

/// In-memory mirror of the persisted topic rules.
///
/// The snapshot is replaced wholesale on every [`refresh`](Self::refresh) so
/// edits made in the settings surface apply to the next scan.
pub struct TopicRuleSet {
    store: Arc<dyn ConfigStore>,
    snapshot: RwLock<Arc<Vec<TopicRule>>>,
}

impl TopicRuleSet {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            snapshot: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Reloads the rules. Never fails: an unavailable store, a missing key or
    /// a non-list value all produce an empty set.
    pub async fn refresh(&self) -> Arc<Vec<TopicRule>> {
        let rules = match self.store.get_one(TOPIC_RULES_KEY).await {
            Ok(Some(value)) => parse_rules(value),
            Ok(None) => Vec::new(),
            Err(e) => {
                e.log_warn();
                Vec::new()
            }
        };
        debug!("Loaded {} topic rule(s)", rules.len());

        let rules = Arc::new(rules);
        match self.snapshot.write() {
            Ok(mut snapshot) => *snapshot = rules.clone(),
            Err(poisoned) => *poisoned.into_inner() = rules.clone(),
        }
        rules
    }

    pub fn snapshot(&self) -> Arc<Vec<TopicRule>> {
        match self.snapshot.read() {
            Ok(snapshot) => snapshot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Reads one stored rule entry, rejecting it if it fails validation.
pub fn read_rule(entry: &Value) -> Result<TopicRule, CoreError> {
    let rule: TopicRule = serde_json::from_value(entry.clone())?;
    rule.validate()?;
    Ok(rule)
}

/// Keeps the well-formed entries of a stored rule list, in order.
pub fn parse_rules(value: Value) -> Vec<TopicRule> {
    let Value::Array(entries) = value else {
        warn!("Stored topic rules are not a list, ignoring them");
        return Vec::new();
    };

    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| match read_rule(entry) {
            Ok(rule) => Some(rule),
            Err(e) => {
                warn!("Skipping topic rule #{}: {}", index, e);
                None
            }
        })
        .collect()
}
