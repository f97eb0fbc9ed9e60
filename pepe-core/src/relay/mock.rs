//! Scripted transport for testing.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{RelayRequest, RelayResponse, Transport};
use crate::error::{PepeError, Result};

/// Replays queued outcomes in order and records every request it sees.
///
/// Once the queue is empty every call fails with a network error.
#[derive(Default)]
pub struct MockTransport {
    outcomes: Mutex<VecDeque<Result<RelayResponse>>>,
    requests: Mutex<Vec<RelayRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: RelayResponse) {
        self.push(Ok(response));
    }

    pub fn push_error(&self, error: PepeError) {
        self.push(Err(error));
    }

    fn push(&self, outcome: Result<RelayResponse>) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push_back(outcome);
        }
    }

    /// Requests sent so far, oldest first.
    pub fn requests(&self) -> Vec<RelayRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: RelayRequest) -> Result<RelayResponse> {
        let url = request.url.clone();
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        self.outcomes
            .lock()
            .ok()
            .and_then(|mut outcomes| outcomes.pop_front())
            .unwrap_or_else(|| {
                Err(PepeError::Network(format!(
                    "no scripted response for {url}"
                )))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_replays_in_order() {
        let mock = MockTransport::new();
        mock.push_response(RelayResponse::new(401));
        mock.push_response(RelayResponse::new(200));

        let first = mock.send(RelayRequest::get("http://a/")).await.unwrap();
        let second = mock.send(RelayRequest::get("http://b/")).await.unwrap();
        assert_eq!((first.status, second.status), (401, 200));

        let urls: Vec<_> = mock.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["http://a/", "http://b/"]);
    }

    #[tokio::test]
    async fn test_mock_exhausted_is_network_error() {
        let mock = MockTransport::new();
        let err = mock.send(RelayRequest::get("http://a/")).await.unwrap_err();
        assert!(matches!(err, PepeError::Network(_)));
    }
}
