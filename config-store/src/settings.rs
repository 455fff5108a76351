use feedguard_core::{CoreError, ErrorExt, TopicRule};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::{rules::parse_rules, ConfigStore, CREDENTIAL_KEY, TOPIC_RULES_KEY};

/// The operations behind the settings surface: credential and topic CRUD.
#[derive(Clone)]
pub struct Settings {
    store: Arc<dyn ConfigStore>,
}

impl Settings {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// The stored bearer token. Blank values and store failures read as absent.
    pub async fn credential(&self) -> Option<String> {
        match self.store.get_one(CREDENTIAL_KEY).await {
            Ok(Some(Value::String(token))) if !token.trim().is_empty() => Some(token),
            Ok(_) => None,
            Err(e) => {
                e.log_warn();
                None
            }
        }
    }

    pub async fn set_credential(&self, token: &str) -> Result<(), CoreError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(CoreError::InvalidInput {
                message: "API key must not be empty".to_string(),
            });
        }
        self.store
            .set_one(CREDENTIAL_KEY, Value::String(token.to_string()))
            .await?;
        info!("API key saved");
        Ok(())
    }

    pub async fn clear_credential(&self) -> Result<(), CoreError> {
        self.store.remove(&[CREDENTIAL_KEY.to_string()]).await?;
        info!("API key cleared");
        Ok(())
    }

    /// The readable stored rules; unlike the scan-time rule set, store errors
    /// surface.
    pub async fn topic_rules(&self) -> Result<Vec<TopicRule>, CoreError> {
        Ok(self
            .store
            .get_one(TOPIC_RULES_KEY)
            .await?
            .map(parse_rules)
            .unwrap_or_default())
    }

    /// Every stored rule entry as written, unreadable ones included. Positions
    /// in this list are the indices the edit operations take.
    pub async fn topic_entries(&self) -> Result<Vec<Value>, CoreError> {
        match self.store.get_one(TOPIC_RULES_KEY).await? {
            None => Ok(Vec::new()),
            Some(Value::Array(entries)) => Ok(entries),
            Some(_) => Err(CoreError::InvalidInput {
                message: "stored topic rules are not a list; save a full list to replace them"
                    .to_string(),
            }),
        }
    }

    pub async fn save_topic_rules(&self, rules: &[TopicRule]) -> Result<(), CoreError> {
        for rule in rules {
            rule.validate()?;
        }
        let value = serde_json::to_value(rules)?;
        self.store.set_one(TOPIC_RULES_KEY, value).await?;
        info!("Configuration saved successfully ({} topics)", rules.len());
        Ok(())
    }

    async fn save_topic_entries(&self, entries: Vec<Value>) -> Result<(), CoreError> {
        let count = entries.len();
        self.store
            .set_one(TOPIC_RULES_KEY, Value::Array(entries))
            .await?;
        info!("Configuration saved successfully ({} topics)", count);
        Ok(())
    }

    // The edit operations below only touch the addressed entry; the others
    // are written back as stored, even if unreadable.

    pub async fn add_topic(&self, rule: TopicRule) -> Result<usize, CoreError> {
        rule.validate()?;
        let mut entries = self.topic_entries().await?;
        entries.push(serde_json::to_value(&rule)?);
        let index = entries.len() - 1;
        self.save_topic_entries(entries).await?;
        Ok(index)
    }

    pub async fn update_topic(&self, index: usize, rule: TopicRule) -> Result<(), CoreError> {
        rule.validate()?;
        let mut entries = self.topic_entries().await?;
        let slot = entries
            .get_mut(index)
            .ok_or_else(|| Self::no_such_topic(index))?;
        *slot = serde_json::to_value(&rule)?;
        self.save_topic_entries(entries).await
    }

    /// Removes the entry at `index` and returns it as it was stored.
    pub async fn remove_topic(&self, index: usize) -> Result<Value, CoreError> {
        let mut entries = self.topic_entries().await?;
        if index >= entries.len() {
            return Err(Self::no_such_topic(index));
        }
        let removed = entries.remove(index);
        self.save_topic_entries(entries).await?;
        Ok(removed)
    }

    /// Writes the default topics when none are stored yet. Returns whether
    /// anything was written.
    pub async fn seed_defaults(&self) -> Result<bool, CoreError> {
        if self.store.get_one(TOPIC_RULES_KEY).await?.is_some() {
            return Ok(false);
        }
        self.save_topic_rules(&TopicRule::defaults()).await?;
        Ok(true)
    }

    fn no_such_topic(index: usize) -> CoreError {
        CoreError::InvalidInput {
            message: format!("no topic at position {}", index),
        }
    }
}
