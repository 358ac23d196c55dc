use anyhow::Result;
use async_stream::try_stream;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::conversation::Conversation;
use crate::errors::{ToolError, TransportError};
use crate::models::message::Message;
use crate::models::tool::ToolResult;
use crate::toolkit::ToolRegistry;
use crate::transport::ChatTransport;

/// Total attempts per tool call, including the first.
const MAX_TOOL_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct AgentConfig {
    /// Fetch completions through the streaming endpoint, consuming the
    /// cumulative messages and acting on the final one.
    pub streaming: bool,
    pub verbose: bool,
}

/// Drives the tool-calling conversation: sends the transcript, executes
/// whatever tool calls come back, feeds the results in, and repeats until
/// a response carries no tool calls.
pub struct Agent {
    transport: Box<dyn ChatTransport>,
    registry: ToolRegistry,
    conversation: Conversation,
    config: AgentConfig,
}

impl Agent {
    pub fn new(transport: Box<dyn ChatTransport>, registry: ToolRegistry, config: AgentConfig) -> Self {
        let conversation = Conversation::new(system_instructions(&registry));
        Self {
            transport,
            registry,
            conversation,
            config,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Run one full turn for a user input, yielding every message appended
    /// to the transcript plus the operator-visible self-correction replies.
    /// In streaming mode the interim cumulative snapshots are yielded too,
    /// so the consumer can render the response as it grows.
    ///
    /// An error anywhere ends the stream but leaves the transcript in
    /// whatever state the turn reached; the agent accepts the next turn.
    pub fn reply(&mut self, input: &str) -> BoxStream<'_, Result<Message>> {
        let input = input.to_string();
        Box::pin(try_stream! {
            self.conversation.push(Message::user().with_text(input));

            loop {
                let window = self.conversation.bounded_window();
                let response = if self.config.streaming {
                    let mut stream = self
                        .transport
                        .send_stream(&window, self.registry.tools())
                        .await?;
                    // Every snapshot is yielded for display; only the final
                    // one enters the transcript.
                    let mut last: Option<Message> = None;
                    while let Some(message) = stream.next().await {
                        let message = message?;
                        yield message.clone();
                        last = Some(message);
                    }
                    last.ok_or_else(|| {
                        TransportError::Malformed("stream produced no message".into())
                    })?
                } else {
                    let response = self
                        .transport
                        .send(&window, self.registry.tools())
                        .await?;
                    yield response.clone();
                    response
                };
                self.conversation.push(response.clone());

                if !response.has_tool_calls() {
                    break;
                }

                let mut results = Vec::with_capacity(response.tool_calls.len());
                for call in &response.tool_calls {
                    let mut attempts = 0;
                    let result = loop {
                        attempts += 1;
                        let error = match self.registry.invoke(call).await {
                            Ok(output) => break ToolResult::success(&call.id, output),
                            Err(error) => error,
                        };

                        if !error.is_retryable() || attempts >= MAX_TOOL_ATTEMPTS {
                            break ToolResult::error(
                                &call.id,
                                format!(
                                    "Tool '{}' failed after {} attempt(s): {}",
                                    call.name, attempts, error
                                ),
                            );
                        }

                        for message in self.correction_round(call.name.as_str(), &error).await? {
                            yield message;
                        }
                    };
                    results.push(result);
                }

                let mut outcome = Message::assistant();
                for result in results {
                    outcome = outcome.with_tool_result(result);
                }
                self.conversation.push(outcome.clone());
                yield outcome;
            }
        })
    }

    /// Between failed attempts: append a failure notice with a heuristic
    /// hint, then ask the model once for a correction. The correction is
    /// surfaced to the operator only; the original call is retried as-is,
    /// its arguments untouched.
    async fn correction_round(
        &mut self,
        tool_name: &str,
        error: &ToolError,
    ) -> Result<Vec<Message>, TransportError> {
        let notice = Message::assistant().with_text(format!(
            "Tool '{}' failed: {}\nHint: {}",
            tool_name,
            error,
            hint_for(tool_name, &error.to_string())
        ));
        self.conversation.push(notice.clone());

        let correction = self
            .transport
            .send(&self.conversation.bounded_window(), self.registry.tools())
            .await?;
        if self.config.verbose && correction.has_tool_calls() {
            eprintln!(
                "model proposed a corrected call to '{}' (not substituted)",
                correction.tool_calls[0].name
            );
        }

        Ok(vec![notice, correction])
    }
}

/// The system instructions are always transcript[0] and enumerate the
/// registered tool names in their stable registry order.
fn system_instructions(registry: &ToolRegistry) -> String {
    let names: Vec<&str> = registry
        .tools()
        .iter()
        .map(|tool| tool.name.as_str())
        .collect();
    format!(
        "You are tern, a coding assistant that works on the user's machine. \
         You can call the following tools: {}. \
         Call tools whenever they help answer the request; read before you \
         write, and prefer small, verifiable steps. When no more tool calls \
         are needed, answer the user directly.",
        names.join(", ")
    )
}

/// Pick a recovery hint by matching substrings of the error text. Specific
/// phrases first, since e.g. "not found in file" also contains "not found".
fn hint_for(tool_name: &str, error: &str) -> &'static str {
    let error = error.to_lowercase();
    if error.contains("not found in file") || error.contains("not unique") {
        "re-read the file and copy the target text exactly, including whitespace"
    } else if tool_name == "search_files" && error.contains("no matches") {
        "broaden the pattern or search a higher-level directory"
    } else if error.contains("not a directory") {
        "the path points at a file; re-check the path type before retrying"
    } else if error.contains("permission denied") {
        "check the file permissions and ownership of the target path"
    } else if error.contains("not found") {
        "list the directory first to confirm the path exists"
    } else {
        "double-check the arguments against the tool's schema and try again"
    }
}
