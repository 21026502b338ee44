//! Test doubles for notifier tests.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use wiremock::{Request, Respond, ResponseTemplate};

struct SequentialResponderState {
    responses: Vec<ResponseTemplate>,
    call_count: AtomicUsize,
}

/// A wiremock responder that returns different responses on successive calls.
/// After exhausting the list, it repeats the last response.
#[derive(Clone)]
pub struct SequentialResponder {
    state: Arc<SequentialResponderState>,
}

impl SequentialResponder {
    pub fn new(responses: Vec<ResponseTemplate>) -> Self {
        assert!(
            !responses.is_empty(),
            "SequentialResponder requires at least one response"
        );
        Self {
            state: Arc::new(SequentialResponderState {
                responses,
                call_count: AtomicUsize::new(0),
            }),
        }
    }

    pub fn call_count(&self) -> usize {
        self.state.call_count.load(Ordering::SeqCst)
    }
}

impl Respond for SequentialResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let count = self.state.call_count.fetch_add(1, Ordering::SeqCst);
        let idx = count.min(self.state.responses.len() - 1);
        self.state.responses[idx].clone()
    }
}
