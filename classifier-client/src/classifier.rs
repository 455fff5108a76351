use async_trait::async_trait;
use feedguard_core::{
    ClassificationResult, ClassifierConfig, ClassifierError, CoreError, ErrorExt, TopicRule,
};
use tracing::{debug, error};

use crate::prompt::{build_request, parse_scores, RequestOptions};
use crate::retry::{RetryConfig, RetryExecutor, RetryMetrics};
use crate::transport::{ChatTransport, HttpTransport};

/// Scores a post's text against the topic rules.
///
/// Never fails: when every attempt is exhausted the result is empty, which
/// matches no rule and leaves the post visible.
#[async_trait]
pub trait TopicClassifier: Send + Sync {
    async fn classify(
        &self,
        text: &str,
        credential: &str,
        rules: &[TopicRule],
    ) -> ClassificationResult;
}

pub struct GroqClassifier<T: ChatTransport> {
    transport: T,
    options: RequestOptions,
    executor: RetryExecutor,
}

impl GroqClassifier<HttpTransport> {
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, CoreError> {
        Ok(Self::with_transport(HttpTransport::new(config)?, config))
    }
}

impl<T: ChatTransport> GroqClassifier<T> {
    pub fn with_transport(transport: T, config: &ClassifierConfig) -> Self {
        Self {
            transport,
            options: RequestOptions::from(config),
            executor: RetryExecutor::new(RetryConfig::from_classifier_config(config)),
        }
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.executor = RetryExecutor::new(config);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn retry_metrics(&self) -> RetryMetrics {
        self.executor.get_metrics()
    }

    /// Like [`TopicClassifier::classify`] but surfaces the final error.
    pub async fn try_classify(
        &self,
        text: &str,
        credential: &str,
        rules: &[TopicRule],
    ) -> Result<ClassificationResult, CoreError> {
        let provider = self.transport.provider();
        if credential.trim().is_empty() {
            return Err(ClassifierError::MissingCredential {
                provider: provider.to_string(),
            }
            .into());
        }
        let request = build_request(text, rules, &self.options);

        self.executor
            .execute("classify_post", || async {
                let response = self.transport.send(credential, &request).await?;
                parse_scores(&response, provider)
            })
            .await
    }
}

#[async_trait]
impl<T: ChatTransport> TopicClassifier for GroqClassifier<T> {
    async fn classify(
        &self,
        text: &str,
        credential: &str,
        rules: &[TopicRule],
    ) -> ClassificationResult {
        match self.try_classify(text, credential, rules).await {
            Ok(result) => {
                debug!("Classified post into {} score(s)", result.len());
                result
            }
            Err(e) if !e.is_retryable() => {
                e.log_warn();
                ClassificationResult::new()
            }
            Err(e) => {
                e.log_warn();
                error!("Max retries reached. Returning empty object.");
                ClassificationResult::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{ChatRequest, ChatResponse};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed sequence of outcomes and records every request sent.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<String, CoreError>>>,
        sent: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<String, CoreError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        fn provider(&self) -> &str {
            "scripted"
        }

        async fn send(
            &self,
            _credential: &str,
            request: &ChatRequest,
        ) -> Result<ChatResponse, CoreError> {
            self.sent.lock().unwrap().push(request.clone());
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(content)) => Ok(serde_json::from_value(json!({
                    "choices": [{"message": {"content": content}}]
                }))?),
                Some(Err(e)) => Err(e),
                None => Err(CoreError::Internal {
                    message: "script exhausted".to_string(),
                }),
            }
        }
    }

    fn bad_request() -> CoreError {
        CoreError::Classifier(ClassifierError::BadRequest {
            provider: "scripted".to_string(),
        })
    }

    fn classifier(script: Vec<Result<String, CoreError>>) -> GroqClassifier<ScriptedTransport> {
        let config = ClassifierConfig {
            retry_base_delay_ms: 1,
            ..Default::default()
        };
        GroqClassifier::with_transport(ScriptedTransport::new(script), &config)
    }

    fn rules() -> Vec<TopicRule> {
        vec![TopicRule::new("politics", "elections", 0.8).unwrap()]
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let classifier = classifier(vec![Ok(r#"{"politics": 0.95}"#.to_string())]);

        let result = classifier.classify("vote", "gsk_test", &rules()).await;
        assert_eq!(result.score("politics"), Some(0.95));
        assert_eq!(classifier.transport().calls(), 1);
    }

    #[tokio::test]
    async fn test_bad_requests_are_retried() {
        let classifier = classifier(vec![
            Err(bad_request()),
            Err(bad_request()),
            Ok(r#"{"politics": 0.2}"#.to_string()),
        ]);

        let result = classifier.classify("vote", "gsk_test", &rules()).await;
        assert_eq!(result.score("politics"), Some(0.2));
        assert_eq!(classifier.transport().calls(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_empty_after_three_attempts() {
        let classifier = classifier(vec![
            Err(bad_request()),
            Err(CoreError::Classifier(ClassifierError::HttpStatus {
                provider: "scripted".to_string(),
                status_code: 500,
            })),
            Ok("not json at all".to_string()),
            Ok(r#"{"politics": 0.99}"#.to_string()),
        ]);

        let result = classifier.classify("vote", "gsk_test", &rules()).await;
        assert!(result.is_empty());
        assert_eq!(classifier.transport().calls(), 3);
        assert_eq!(classifier.retry_metrics().exhausted, 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_retried() {
        let classifier = classifier(vec![
            Ok("[1, 2, 3]".to_string()),
            Ok(r#"{"politics": 0.4}"#.to_string()),
        ]);

        let result = classifier.classify("vote", "gsk_test", &rules()).await;
        assert_eq!(result.score("politics"), Some(0.4));
        assert_eq!(classifier.transport().calls(), 2);
    }

    #[tokio::test]
    async fn test_blank_credential_dispatches_nothing() {
        let classifier = classifier(vec![Ok(r#"{"politics": 0.95}"#.to_string())]);

        let result = classifier.classify("vote", "  ", &rules()).await;
        assert!(result.is_empty());
        assert_eq!(classifier.transport().calls(), 0);

        assert!(matches!(
            classifier.try_classify("vote", "", &rules()).await,
            Err(CoreError::Classifier(ClassifierError::MissingCredential { .. }))
        ));
    }

    #[tokio::test]
    async fn test_request_carries_text_and_rules() {
        let classifier = classifier(vec![Ok("{}".to_string())]);
        classifier.classify("", "gsk_test", &rules()).await;

        let sent = classifier.transport().sent.lock().unwrap();
        assert_eq!(sent[0].messages[1].content, "");
        assert!(sent[0].messages[0].content.contains("politics: elections"));
    }

    #[tokio::test]
    async fn test_try_classify_surfaces_last_error() {
        let classifier = classifier(vec![Err(bad_request()), Err(bad_request()), Err(bad_request())]);
        let result = classifier.try_classify("vote", "gsk_test", &rules()).await;
        assert!(matches!(
            result,
            Err(CoreError::Classifier(ClassifierError::BadRequest { .. }))
        ));
    }
}
