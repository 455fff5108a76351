pub mod classifier;
pub mod prompt;
pub mod retry;
pub mod transport;

pub use classifier::{GroqClassifier, TopicClassifier};
pub use prompt::{build_request, build_system_prompt, ChatRequest, ChatResponse, RequestOptions};
pub use retry::{RetryConfig, RetryExecutor, RetryMetrics};
pub use transport::{ChatTransport, HttpTransport};
