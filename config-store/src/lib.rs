//! Persistence for everything the filter keeps between page loads: the API
//! credential, the ordered topic rules and one classification result per post.
//!
//! All of it sits behind the [`ConfigStore`] key-value contract so the same
//! code runs against SQLite, memory, or any other async mapping.

pub mod cache;
pub mod memory;
pub mod rules;
pub mod settings;
pub mod sqlite;


use async_trait::async_trait;
use feedguard_core::StoreError;
use serde_json::{Map, Value};

pub use cache::{CacheWrite, ClassificationCache};
pub use memory::MemoryStore;
pub use rules::{read_rule, TopicRuleSet};
pub use settings::Settings;
pub use sqlite::SqliteStore;

/// Key holding the classifier bearer token.
pub const CREDENTIAL_KEY: &str = "GROQ_API_KEY";
/// Key holding the ordered list of topic rules.
pub const TOPIC_RULES_KEY: &str = "topicsConfig";
/// Prefix of every classification cache key.
pub const ANALYSIS_PREFIX: &str = "analysis_";

pub type StoreMap = Map<String, Value>;

pub fn analysis_key(post_id: &str) -> String {
    format!("{}{}", ANALYSIS_PREFIX, post_id)
}

/// Async string-keyed mapping of JSON values.
///
/// `get` only returns the keys that exist; absent keys are simply missing
/// from the returned map.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, keys: &[&str]) -> Result<StoreMap, StoreError>;

    async fn set(&self, items: StoreMap) -> Result<(), StoreError>;

    async fn remove(&self, keys: &[String]) -> Result<(), StoreError>;

    async fn get_all(&self) -> Result<StoreMap, StoreError>;

    async fn get_one(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let mut found = self.get(&[key]).await?;
        Ok(found.remove(key))
    }

    async fn set_one(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut items = StoreMap::new();
        items.insert(key.to_string(), value);
        self.set(items).await
    }
}
