use crate::models::message::Message;

/// Messages beyond this count are truncated down to the system message
/// plus the most recent `WINDOW_MESSAGES` before each endpoint call.
const MAX_MESSAGES: usize = 11;
const WINDOW_MESSAGES: usize = 10;

/// The full ordered message history for a session.
///
/// The conversation is the exclusive owner of the transcript: it is created
/// with one system message at index 0 and only ever grows by appending. It
/// lives in memory for the lifetime of the process and is never persisted.
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new<S: Into<String>>(system_instructions: S) -> Self {
        Conversation {
            messages: vec![Message::system().with_text(system_instructions)],
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Never zero: the system message is always present.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// The transcript subset actually sent to the endpoint.
    pub fn bounded_window(&self) -> Vec<Message> {
        bounded_window(&self.messages)
    }
}

/// Cap a transcript to the system message plus the most recent ten messages.
///
/// This is a hard truncation: once the transcript outgrows the window, older
/// context is permanently invisible to the model. Pure function of the
/// transcript, so calling it twice yields the same result.
pub fn bounded_window(messages: &[Message]) -> Vec<Message> {
    if messages.len() <= MAX_MESSAGES {
        return messages.to_vec();
    }
    let mut window = Vec::with_capacity(MAX_MESSAGES);
    window.push(messages[0].clone());
    window.extend_from_slice(&messages[messages.len() - WINDOW_MESSAGES..]);
    window
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::Role;

    fn conversation_with(n: usize) -> Conversation {
        let mut conversation = Conversation::new("instructions");
        for i in 0..n {
            conversation.push(Message::user().with_text(format!("message {}", i)));
        }
        conversation
    }

    #[test]
    fn test_append_is_monotonic() {
        let mut conversation = Conversation::new("instructions");
        let mut previous = conversation.len();
        for i in 0..5 {
            conversation.push(Message::user().with_text(format!("m{}", i)));
            assert!(conversation.len() > previous);
            previous = conversation.len();
        }
    }

    #[test]
    fn test_window_passes_through_short_transcripts() {
        let conversation = conversation_with(10);
        assert_eq!(conversation.bounded_window().len(), 11);
        assert_eq!(conversation.bounded_window(), conversation.messages());
    }

    #[test]
    fn test_window_keeps_system_plus_last_ten() {
        // 1 system + 12 user messages
        let conversation = conversation_with(12);
        let window = conversation.bounded_window();

        assert_eq!(window.len(), 11);
        assert_eq!(window[0].role, Role::System);
        assert_eq!(window[1].content, "message 2");
        assert_eq!(window[10].content, "message 11");
    }

    #[test]
    fn test_window_is_idempotent() {
        let conversation = conversation_with(25);
        let once = bounded_window(conversation.messages());
        let twice = bounded_window(&once);
        assert_eq!(once, twice);
    }
}
