pub mod gemini;
pub mod mock;
pub mod stream;
pub mod wire;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::errors::TransportError;
use crate::models::message::Message;
use crate::models::tool::Tool;

/// The single seam between the conversation loop and the model endpoint.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send one request and parse exactly one structured message out of it.
    async fn send(&self, messages: &[Message], tools: &[Tool])
        -> Result<Message, TransportError>;

    /// Streaming sibling of `send`: a finite, non-restartable sequence of
    /// cumulative messages. Consumption may be abandoned by dropping the
    /// stream; a wall-clock timeout bounds its total lifetime either way.
    async fn send_stream(
        &self,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<BoxStream<'static, Result<Message, TransportError>>, TransportError>;
}
