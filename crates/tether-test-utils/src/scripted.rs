//! A scripted [`LlmProvider`] for driving the loop without a network.
//!
//! Replies are routed by the first registered marker found in the request
//! text. Each route holds a queue of replies; the last reply repeats once the
//! queue is drained.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tether_llm::{LlmError, LlmProvider, LlmRequest, LlmResponse};

type Responder = Arc<dyn Fn(&LlmRequest) -> Reply + Send + Sync>;

/// One scripted outcome.
#[derive(Clone)]
pub enum Reply {
    /// Successful completion with this text.
    Text(String),
    /// Completion cut off by the token limit.
    Truncated(String),
    /// HTTP 429.
    RateLimited,
    /// HTTP 5xx.
    ServerError,
    /// Never answers within `Duration`; exercises timeouts.
    Hang(Duration),
    /// Computed from the request.
    Dynamic(Responder),
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn dynamic(f: impl Fn(&LlmRequest) -> Reply + Send + Sync + 'static) -> Self {
        Self::Dynamic(Arc::new(f))
    }
}

struct Route {
    marker: String,
    replies: VecDeque<Reply>,
}

/// Records calls and answers them from scripted routes.
pub struct ScriptedProvider {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<LlmRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answer requests containing `marker` with `text`.
    pub fn on(self, marker: &str, text: impl Into<String>) -> Self {
        self.on_replies(marker, vec![Reply::Text(text.into())])
    }

    /// Answer requests containing `marker` with `replies` in order.
    pub fn on_replies(self, marker: &str, replies: Vec<Reply>) -> Self {
        self.routes.lock().push(Route {
            marker: marker.to_string(),
            replies: replies.into(),
        });
        self
    }

    /// Answer requests containing `marker` by calling `f`.
    pub fn on_fn(
        self,
        marker: &str,
        f: impl Fn(&LlmRequest) -> Reply + Send + Sync + 'static,
    ) -> Self {
        self.on_replies(marker, vec![Reply::dynamic(f)])
    }

    /// Every request received so far.
    pub fn calls(&self) -> Vec<LlmRequest> {
        self.calls.lock().clone()
    }

    /// Number of requests whose text contains `marker`.
    pub fn call_count(&self, marker: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|request| request.full_text().contains(marker))
            .count()
    }

    fn next_reply(&self, text: &str) -> Option<Reply> {
        let mut routes = self.routes.lock();
        let route = routes.iter_mut().find(|route| text.contains(&route.marker))?;
        if route.replies.len() > 1 {
            route.replies.pop_front()
        } else {
            route.replies.front().cloned()
        }
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let text = request.full_text();
        self.calls.lock().push(request.clone());

        let mut reply = self.next_reply(&text).ok_or_else(|| LlmError::ApiError {
            status: 404,
            body: "no scripted reply for request".to_string(),
        })?;

        while let Reply::Dynamic(f) = reply {
            reply = f(&request);
        }

        match reply {
            Reply::Text(content) => Ok(LlmResponse::text(content)),
            Reply::Truncated(content) => {
                let mut response = LlmResponse::text(content);
                response.finish_reason = Some("max_tokens".to_string());
                Ok(response)
            }
            Reply::RateLimited => Err(LlmError::RateLimited),
            Reply::ServerError => Err(LlmError::ApiError {
                status: 503,
                body: "scripted outage".to_string(),
            }),
            Reply::Hang(duration) => {
                tokio::time::sleep(duration).await;
                Ok(LlmResponse::text(""))
            }
            Reply::Dynamic(_) => unreachable!("dynamic replies are resolved above"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_routes_by_marker_and_repeats_last() {
        let provider = ScriptedProvider::new()
            .on_replies("EXTRACT", vec![Reply::RateLimited, Reply::text("[]")])
            .on("LOCATE", "{}");

        assert!(matches!(
            provider.complete(LlmRequest::prompt("EXTRACT now")).await,
            Err(LlmError::RateLimited)
        ));
        let expectations = [("EXTRACT now", "[]"), ("EXTRACT again", "[]"), ("LOCATE", "{}")];
        for (prompt, expected) in expectations {
            let response = provider.complete(LlmRequest::prompt(prompt)).await.unwrap();
            assert_eq!(response.content, expected);
        }

        assert_eq!(provider.call_count("EXTRACT"), 3);
    }

    #[tokio::test]
    async fn test_unrouted_request_fails() {
        let provider = ScriptedProvider::new();
        let err = provider.complete(LlmRequest::prompt("anything")).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_dynamic_reply_sees_request() {
        let provider = ScriptedProvider::new()
            .on_fn("ECHO", |request| Reply::text(request.full_text().len().to_string()));
        let response = provider.complete(LlmRequest::prompt("ECHO")).await.unwrap();
        assert_eq!(response.content, "4");
    }

    #[tokio::test]
    async fn test_truncated_reply() {
        let provider =
            ScriptedProvider::new().on_replies("X", vec![Reply::Truncated("[{\"te".into())]);
        let response = provider.complete(LlmRequest::prompt("X")).await.unwrap();
        assert!(response.is_truncated());
    }
}
