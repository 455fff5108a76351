use feedguard_core::{ClassificationResult, CoreError, ErrorExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{analysis_key, ConfigStore, ANALYSIS_PREFIX};

/// Outcome of [`ClassificationCache::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheWrite {
    Stored,
    /// An entry already existed; it was left untouched.
    AlreadyPresent,
}

/// Write-once classification results keyed by post identifier.
///
/// Entries never expire and are not invalidated when topic rules change;
/// only [`ClassificationCache::reset`] removes them.
#[derive(Clone)]
pub struct ClassificationCache {
    store: Arc<dyn ConfigStore>,
}

impl ClassificationCache {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Returns the cached value as stored. Store errors count as misses.
    pub async fn get(&self, post_id: &str) -> Option<Value> {
        let key = analysis_key(post_id);
        match self.store.get_one(&key).await {
            Ok(Some(Value::Null)) | Ok(None) => None,
            Ok(Some(value)) => {
                debug!("Cache hit for post {}", post_id);
                Some(value)
            }
            Err(e) => {
                e.log_warn();
                warn!("Treating store failure as a cache miss for post {}", post_id);
                None
            }
        }
    }

    /// Stores `result` unless an entry for `post_id` already exists.
    ///
    /// Two pipelines racing on the same post may both observe a miss; the
    /// later write then lands last. Both values came from the same rules, so
    /// this is tolerated.
    pub async fn put(
        &self,
        post_id: &str,
        result: &ClassificationResult,
    ) -> Result<CacheWrite, CoreError> {
        let key = analysis_key(post_id);
        if let Ok(Some(existing)) = self.store.get_one(&key).await {
            if !existing.is_null() {
                debug!("Post {} already cached, keeping the first result", post_id);
                return Ok(CacheWrite::AlreadyPresent);
            }
        }

        self.store
            .set_one(&key, result.clone().into_value())
            .await?;
        debug!("Cached {} score(s) for post {}", result.len(), post_id);
        Ok(CacheWrite::Stored)
    }

    /// Removes every classification entry. Returns how many were removed.
    pub async fn reset(&self) -> Result<usize, CoreError> {
        let all = self.store.get_all().await?;
        let keys: Vec<String> = all
            .keys()
            .filter(|key| key.starts_with(ANALYSIS_PREFIX))
            .cloned()
            .collect();

        self.store.remove(&keys).await?;
        info!("Cache (analysis results) has been reset: {} entries removed", keys.len());
        Ok(keys.len())
    }
}
