use async_trait::async_trait;
use feedguard_core::{ClassifierConfig, ClassifierError, CoreError};
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use crate::prompt::{ChatRequest, ChatResponse};

/// One round-trip to a chat-completions endpoint.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    fn provider(&self) -> &str;

    async fn send(&self, credential: &str, request: &ChatRequest) -> Result<ChatResponse, CoreError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: Client,
    endpoint: String,
    provider: String,
}

impl HttpTransport {
    pub fn new(config: &ClassifierConfig) -> Result<Self, CoreError> {
        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if config.request_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.request_timeout_secs));
        }

        Ok(Self {
            http_client: builder.build()?,
            endpoint: config.endpoint.clone(),
            provider: provider_name(&config.endpoint),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn send(&self, credential: &str, request: &ChatRequest) -> Result<ChatResponse, CoreError> {
        debug!("Sending classification request to {}", self.endpoint);
        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(credential)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            warn!("{} rejected the request as malformed", self.provider);
            return Err(ClassifierError::BadRequest {
                provider: self.provider.clone(),
            }
            .into());
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            warn!("{} rate limited the request, retry after {:?}", self.provider, retry_after);
            return Err(CoreError::RateLimited {
                message: format!("{} returned 429", self.provider),
                retry_after,
            });
        }

        if !status.is_success() {
            warn!("{} answered with status {}", self.provider, status);
            return Err(ClassifierError::HttpStatus {
                provider: self.provider.clone(),
                status_code: status.as_u16(),
            }
            .into());
        }

        let body = response.text().await?;
        serde_json::from_str::<ChatResponse>(&body).map_err(|e| {
            ClassifierError::InvalidResponseFormat {
                provider: self.provider.clone(),
                details: e.to_string(),
            }
            .into()
        })
    }
}

/// Host name of the endpoint, used to label log lines and errors.
fn provider_name(endpoint: &str) -> String {
    url::Url::parse(endpoint)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| endpoint.to_string())
}
