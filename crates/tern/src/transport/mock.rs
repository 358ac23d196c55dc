use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::errors::TransportError;
use crate::models::message::Message;
use crate::models::tool::Tool;

use super::ChatTransport;

/// A scripted transport for testing. Returns pre-configured responses in
/// order and records the transcript passed to every call, so tests can
/// assert how many completions a turn issued and what each one saw.
pub struct MockTransport {
    responses: Arc<Mutex<Vec<Message>>>,
    calls: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockTransport {
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Transcript snapshots, one per send issued.
    pub fn recorded_calls(&self) -> Arc<Mutex<Vec<Vec<Message>>>> {
        Arc::clone(&self.calls)
    }

    fn next_response(&self, messages: &[Message]) -> Message {
        self.calls.lock().unwrap().push(messages.to_vec());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Message::assistant().with_text("")
        } else {
            responses.remove(0)
        }
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn send(
        &self,
        messages: &[Message],
        _tools: &[Tool],
    ) -> Result<Message, TransportError> {
        Ok(self.next_response(messages))
    }

    async fn send_stream(
        &self,
        messages: &[Message],
        _tools: &[Tool],
    ) -> Result<BoxStream<'static, Result<Message, TransportError>>, TransportError> {
        let response = self.next_response(messages);
        Ok(Box::pin(futures::stream::iter(vec![Ok(response)])))
    }
}
