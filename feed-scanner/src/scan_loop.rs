use chrono::Utc;
use classifier_client::TopicClassifier;
use config_store::{ClassificationCache, ConfigStore, Settings, TopicRuleSet};
use feedguard_core::{ErrorExt, PostRecord, ScanConfig, TopicRule};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::document::HostDocument;
use crate::extractor::PostExtractor;
use crate::liveness::{schedule_reload, AlwaysAlive, LivenessProbe};
use crate::rate_limiter::{IntervalGuard, Throttle};
use crate::visibility::{decide, VisibilityEngine, VisibilityOutcome};

/// Where a post's scores came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreSource {
    Cache,
    Classifier,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostOutcome {
    pub post_id: String,
    pub source: ScoreSource,
    pub visibility: VisibilityOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub outcomes: Vec<PostOutcome>,
    /// Post tasks that panicked or were aborted.
    pub failed: usize,
}

impl CycleReport {
    pub fn classified(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.source == ScoreSource::Classifier)
            .count()
    }

    pub fn cached(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.source == ScoreSource::Cache)
            .count()
    }

    /// Identifiers hidden by this cycle, sorted.
    pub fn hidden_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .outcomes
            .iter()
            .filter(|o| matches!(o.visibility, VisibilityOutcome::Hidden(_)))
            .map(|o| o.post_id.clone())
            .collect();
        ids.sort();
        ids
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The host invalidated us; a reload has been scheduled, once per page
    /// load.
    HostInvalidated,
    RateLimited,
    NoRules,
    MissingCredential,
    Completed(CycleReport),
}

/// Everything one page load's scan loop needs. Built once, then frozen
/// behind [`ScanLoop`].
pub struct ScanContext {
    document: Arc<dyn HostDocument>,
    settings: Settings,
    rules: TopicRuleSet,
    cache: ClassificationCache,
    classifier: Arc<dyn TopicClassifier>,
    liveness: Arc<dyn LivenessProbe>,
    extractor: PostExtractor,
    visibility: VisibilityEngine,
    throttle: Throttle,
    interval_guard: IntervalGuard,
    pending_reload: OnceLock<JoinHandle<()>>,
    config: ScanConfig,
}

impl ScanContext {
    pub fn new(
        document: Arc<dyn HostDocument>,
        store: Arc<dyn ConfigStore>,
        classifier: Arc<dyn TopicClassifier>,
        config: ScanConfig,
    ) -> Self {
        let extractor = PostExtractor::default();
        Self {
            document,
            settings: Settings::new(store.clone()),
            rules: TopicRuleSet::new(store.clone()),
            cache: ClassificationCache::new(store),
            classifier,
            liveness: Arc::new(AlwaysAlive),
            visibility: VisibilityEngine::new(extractor.clone()),
            extractor,
            throttle: Throttle::new(config.interval()),
            interval_guard: IntervalGuard::new(config.interval()),
            pending_reload: OnceLock::new(),
            config,
        }
    }

    pub fn with_liveness(mut self, probe: Arc<dyn LivenessProbe>) -> Self {
        self.liveness = probe;
        self
    }

    pub fn with_extractor(mut self, extractor: PostExtractor) -> Self {
        self.visibility = VisibilityEngine::new(extractor.clone());
        self.extractor = extractor;
        self
    }
}

#[derive(Clone)]
pub struct ScanLoop {
    context: Arc<ScanContext>,
}

impl From<ScanContext> for ScanLoop {
    fn from(context: ScanContext) -> Self {
        Self {
            context: Arc::new(context),
        }
    }
}

impl ScanLoop {
    pub fn new(context: ScanContext) -> Self {
        Self::from(context)
    }

    pub fn is_target_host(&self) -> bool {
        let host = self.context.document.hostname();
        self.context
            .config
            .target_hosts
            .iter()
            .any(|target| target.eq_ignore_ascii_case(&host))
    }

    /// Whether an invalidated cycle has already asked for a reload.
    pub fn reload_pending(&self) -> bool {
        self.context.pending_reload.get().is_some()
    }

    /// The rules used by the most recent cycle.
    pub fn rules_snapshot(&self) -> Arc<Vec<TopicRule>> {
        self.context.rules.snapshot()
    }

    /// Scroll entry point. Returns `None` when the host is not targeted or
    /// the throttle dropped the call.
    pub async fn on_scroll(&self) -> Option<CycleOutcome> {
        if !self.is_target_host() {
            return None;
        }
        match self.context.throttle.attempt(|| self.run_cycle()) {
            Some(cycle) => Some(cycle.await),
            None => None,
        }
    }

    /// Runs one scan cycle and waits for every post task it started.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let ctx = &self.context;

        if !ctx.liveness.is_alive() {
            ctx.pending_reload.get_or_init(|| {
                error!("Extension context is invalid. Reloading page...");
                schedule_reload(ctx.document.clone(), ctx.config.reload_delay())
            });
            return CycleOutcome::HostInvalidated;
        }

        let started_at = Utc::now();
        if !ctx.interval_guard.is_open(started_at) {
            info!("Skipping API call due to rate limiting");
            return CycleOutcome::RateLimited;
        }

        let rules = ctx.rules.refresh().await;
        if rules.is_empty() {
            info!("No topics configured. Skipping analysis.");
            return CycleOutcome::NoRules;
        }

        let Some(credential) = ctx.settings.credential().await else {
            warn!("API key not found. Please set it in the extension options.");
            return CycleOutcome::MissingCredential;
        };

        let posts = ctx.extractor.extract_visible_posts(ctx.document.as_ref());
        info!("Scanning {} post(s) against {} topic(s)", posts.len(), rules.len());

        let mut tasks = JoinSet::new();
        for post in posts {
            let this = self.clone();
            let rules = rules.clone();
            let credential = credential.clone();
            tasks.spawn(async move { this.process_post(post, &credential, &rules).await });
        }
        ctx.interval_guard.record(started_at);

        let mut report = CycleReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => {
                    error!("Post task failed: {}", e);
                    report.failed += 1;
                }
            }
        }
        info!(
            "Scan finished: {} classified, {} cached, {} hidden",
            report.classified(),
            report.cached(),
            report.hidden_ids().len()
        );
        CycleOutcome::Completed(report)
    }

    async fn process_post(&self, post: PostRecord, credential: &str, rules: &[TopicRule]) -> PostOutcome {
        let ctx = &self.context;

        let (scores, source) = match ctx.cache.get(&post.id).await {
            Some(cached) => (cached, ScoreSource::Cache),
            None => {
                debug!("Classifying post {}", post.id);
                let result = ctx.classifier.classify(&post.text, credential, rules).await;
                if let Err(e) = ctx.cache.put(&post.id, &result).await {
                    e.log_warn();
                }
                (result.into_value(), ScoreSource::Classifier)
            }
        };

        let decision = decide(&scores, rules);
        let visibility = ctx
            .visibility
            .apply(ctx.document.as_ref(), &post.id, &decision);
        PostOutcome {
            post_id: post.id,
            source,
            visibility,
        }
    }

    /// Runs a first scan immediately, then one per accepted scroll event.
    ///
    /// Cycles are spawned, not awaited, so a new cycle may start while
    /// stragglers of the previous one are still finishing. Returns the
    /// number of cycles started once `events` closes.
    pub fn spawn_scroll_driver(self, mut events: mpsc::Receiver<()>) -> JoinHandle<usize> {
        tokio::spawn(async move {
            if !self.is_target_host() {
                info!("Host is not targeted, scanner stays idle");
                return 0;
            }

            let mut in_flight: Vec<JoinHandle<CycleOutcome>> = Vec::new();
            let mut started = 0;
            let mut accept = |in_flight: &mut Vec<JoinHandle<CycleOutcome>>| {
                if self.context.throttle.try_acquire() {
                    let this = self.clone();
                    in_flight.push(tokio::spawn(async move { this.run_cycle().await }));
                    started += 1;
                }
                in_flight.retain(|cycle| !cycle.is_finished());
            };

            accept(&mut in_flight);
            while events.recv().await.is_some() {
                accept(&mut in_flight);
            }
            for cycle in in_flight {
                if let Err(e) = cycle.await {
                    error!("Scan cycle failed: {}", e);
                }
            }
            started
        })
    }
}
