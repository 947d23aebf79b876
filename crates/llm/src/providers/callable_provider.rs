use super::{ChatRequest, ChatResponse, LlmClient};
use async_trait::async_trait;
use common::LlmResult;
use futures::future::BoxFuture;
use std::sync::Arc;

type AsyncHandler = dyn Fn(ChatRequest) -> BoxFuture<'static, LlmResult<ChatResponse>> + Send + Sync;

/// Adapter around an arbitrary function. Used for test doubles and for
/// embedding callers that bring their own model access.
#[derive(Clone)]
pub struct CallableProvider {
    name: String,
    handler: Arc<AsyncHandler>,
}

impl CallableProvider {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(ChatRequest) -> LlmResult<ChatResponse> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        Self {
            name: "callable".to_string(),
            handler: Arc::new(move |request| {
                let handler = Arc::clone(&handler);
                Box::pin(async move { handler(request) })
            }),
        }
    }

    pub fn from_async<F, Fut>(handler: F) -> Self
    where
        F: Fn(ChatRequest) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = LlmResult<ChatResponse>> + Send + 'static,
    {
        Self {
            name: "callable".to_string(),
            handler: Arc::new(move |request| Box::pin(handler(request))),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl std::fmt::Debug for CallableProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallableProvider")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LlmClient for CallableProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, request: ChatRequest) -> LlmResult<ChatResponse> {
        (self.handler)(request).await
    }
}
