use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use scribe_core::errors::LlmError;
use scribe_core::provider::{Completion, CompletionRequest, LlmClient};

/// Scripted reply for one `complete` call.
#[derive(Clone, Debug)]
pub enum MockReply {
    Text(String),
    Error(LlmError),
    Delay { delay: Duration, text: String },
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// Test double that replays a scripted queue of replies and records every
/// request it receives, so tests can assert on the prompts each workflow
/// step actually sent.
pub struct MockLlm {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<CompletionRequest>>,
    call_count: AtomicUsize,
}

impl MockLlm {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Append a reply to the end of the queue.
    pub fn push(&self, reply: MockReply) {
        self.replies.lock().push_back(reply);
    }

    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every request received so far, in call order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        let reply = self.replies.lock().pop_front();
        match reply {
            Some(MockReply::Text(text)) => Ok(Completion::from_text(text)),
            Some(MockReply::Error(e)) => Err(e),
            Some(MockReply::Delay { delay, text }) => {
                tokio::time::sleep(delay).await;
                Ok(Completion::from_text(text))
            }
            None => Err(LlmError::InvalidRequest(format!(
                "MockLlm: no reply configured for call {idx}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_replies_in_order() {
        let mock = MockLlm::new(vec![MockReply::text("first"), MockReply::text("second")]);
        let req = CompletionRequest::new("s", "p");

        assert_eq!(mock.complete(&req).await.unwrap().text, "first");
        assert_eq!(mock.complete(&req).await.unwrap().text, "second");
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn exhausted_queue_errors() {
        let mock = MockLlm::new(vec![MockReply::text("only")]);
        let req = CompletionRequest::new("s", "p");

        mock.complete(&req).await.unwrap();
        let err = mock.complete(&req).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidRequest(_)));
        assert!(err.to_string().contains("invalid request"));
    }

    #[tokio::test]
    async fn records_requests() {
        let mock = MockLlm::new(vec![MockReply::text("a"), MockReply::text("b")]);

        mock.complete(&CompletionRequest::new("sys1", "prompt1")).await.unwrap();
        mock.complete(&CompletionRequest::new("sys2", "prompt2")).await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].prompt, "prompt1");
        assert_eq!(requests[1].system, "sys2");
    }

    #[tokio::test]
    async fn scripted_error_then_push() {
        let mock = MockLlm::new(vec![MockReply::Error(LlmError::ProviderOverloaded)]);
        let req = CompletionRequest::new("s", "p");

        assert!(mock.complete(&req).await.is_err());

        mock.push(MockReply::text("after push"));
        assert_eq!(mock.complete(&req).await.unwrap().text, "after push");
    }

    #[tokio::test]
    async fn delayed_reply_sleeps_before_answering() {
        let mock = MockLlm::new(vec![MockReply::Delay {
            delay: Duration::from_millis(20),
            text: "slow".into(),
        }]);
        let req = CompletionRequest::new("s", "p");

        let start = std::time::Instant::now();
        let completion = mock.complete(&req).await.unwrap();
        assert_eq!(completion.text, "slow");
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
