//! Calls to the generative service with retry, parsing and cancellation.

use crate::error::{LoopError, Result};
use crate::prompts::SYSTEM_PROMPT;
use std::future::Future;
use tether_common_async::{retry_with_backoff_when, CancelHandle, RetryExhausted, RetryPolicy};
use tether_llm::{LlmError, LlmProvider, LlmRequest, LlmResponse};
use thiserror::Error;

/// Failure of a single call attempt.
#[derive(Debug, Error)]
pub(crate) enum CallError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("unusable output: {0}")]
    Output(String),
}

impl CallError {
    fn is_retryable(&self) -> bool {
        match self {
            CallError::Llm(e) => e.is_retryable(),
            CallError::Output(_) => true,
        }
    }
}

pub(crate) fn request(prompt: String) -> LlmRequest {
    LlmRequest::prompt(prompt).with_system(SYSTEM_PROMPT)
}

/// Complete `request`, retrying transient failures per `policy`.
pub(crate) async fn complete(
    provider: &dyn LlmProvider,
    policy: &RetryPolicy,
    request: LlmRequest,
) -> std::result::Result<LlmResponse, RetryExhausted<LlmError>> {
    retry_with_backoff_when(policy, LlmError::is_retryable, |_| {
        provider.complete(request.clone())
    })
    .await
}

/// Complete `request` and parse the output; unusable output counts as a failed attempt.
pub(crate) async fn complete_parsed<T, P>(
    provider: &dyn LlmProvider,
    policy: &RetryPolicy,
    request: LlmRequest,
    parse: P,
) -> std::result::Result<T, RetryExhausted<CallError>>
where
    P: Fn(&LlmResponse) -> std::result::Result<T, String>,
{
    let parse = &parse;
    retry_with_backoff_when(policy, CallError::is_retryable, |_| {
        let request = request.clone();
        async move {
            let response = provider.complete(request).await?;
            parse(&response).map_err(CallError::Output)
        }
    })
    .await
}

/// Run `future` unless `cancel` fires first.
pub(crate) async fn until_cancelled<F: Future>(
    cancel: &CancelHandle,
    future: F,
) -> Result<F::Output> {
    if cancel.is_cancelled() {
        return Err(LoopError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LoopError::Cancelled),
        output = future => Ok(output),
    }
}
