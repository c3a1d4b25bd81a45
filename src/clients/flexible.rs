use crate::clients::{MockClient, OpenAIClient, OpenAIConfig};
use crate::config::KeyFromEnv;
use crate::core::LowLevelClient;
use crate::error::AIError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};

/// Model provider chosen at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientType {
    OpenAI,
    Mock,
}

impl Default for ClientType {
    /// OpenAI when a key is available, otherwise the sample mock
    fn default() -> Self {
        if OpenAIClient::find_key().is_some() {
            Self::OpenAI
        } else {
            Self::Mock
        }
    }
}

impl ClientType {
    /// Parse client type from string (case insensitive)
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "mock" => Ok(Self::Mock),
            _ => Err(format!("Unknown client type: '{}'. Supported: openai, mock", s)),
        }
    }

    /// Build the client. Fails for OpenAI without an API key.
    pub fn build(self) -> Result<Box<dyn LowLevelClient>, AIError> {
        match self {
            ClientType::OpenAI => Ok(Box::new(OpenAIClient::from_env()?)),
            ClientType::Mock => Ok(Box::new(MockClient::sample())),
        }
    }
}

impl std::fmt::Display for ClientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientType::OpenAI => write!(f, "OpenAI"),
            ClientType::Mock => write!(f, "Mock"),
        }
    }
}

#[derive(Debug)]
/// Flexible client that wraps any LowLevelClient and provides factory functions
pub struct FlexibleClient {
    inner: Arc<Mutex<Box<dyn LowLevelClient>>>,
}

impl FlexibleClient {
    /// Create a new FlexibleClient wrapping the given client
    pub fn new(client: Box<dyn LowLevelClient>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(client)),
        }
    }

    pub fn from_type(client_type: ClientType) -> Result<Self, AIError> {
        Ok(Self::new(client_type.build()?))
    }

    pub fn openai(config: OpenAIConfig) -> Self {
        Self::new(Box::new(OpenAIClient::new(config)))
    }

    /// Create a FlexibleClient with a mock and return the handle for configuration
    pub fn mock() -> (Self, Arc<super::mock::MockHandle>) {
        let (mock_client, handle) = MockClient::new();
        (Self::new(Box::new(mock_client)), handle)
    }

    /// Swap the wrapped client; clones of this FlexibleClient see the change
    pub fn replace(&self, client: Box<dyn LowLevelClient>) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = client;
    }

    /// Clone out the inner boxed client
    pub fn into_inner(self) -> Box<dyn LowLevelClient> {
        self.snapshot()
    }

    fn snapshot(&self) -> Box<dyn LowLevelClient> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.as_ref().clone_box()
    }
}

impl Clone for FlexibleClient {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

#[async_trait]
impl LowLevelClient for FlexibleClient {
    async fn ask_raw(&self, prompt: String) -> Result<String, AIError> {
        // Clone the client to avoid holding the mutex across await
        let client = self.snapshot();
        client.ask_raw(prompt).await
    }

    fn clone_box(&self) -> Box<dyn LowLevelClient> {
        Box::new(self.clone())
    }
}
