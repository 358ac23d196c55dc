//! Incremental decoding of the chunked wire format.
//!
//! The endpoint streams JSON objects with no guaranteed object boundaries
//! per network chunk, so the scanner keeps a persistent buffer and slices
//! out each top-level object by brace counting. Braces inside string
//! literals don't count, which rules out regex-based extraction.

use serde_json::Value;

use crate::models::message::Message;
use crate::models::tool::ToolCall;

use super::wire::generate_call_id;

/// Extracts complete top-level JSON objects from an unstructured byte
/// stream, one `feed` per network chunk.
pub struct JsonObjectScanner {
    buffer: String,
    pending: Vec<u8>,
    brace_count: i32,
    in_string: bool,
    escape_next: bool,
    start_index: Option<usize>,
    scan_pos: usize,
    verbose: bool,
}

impl JsonObjectScanner {
    pub fn new(verbose: bool) -> Self {
        Self {
            buffer: String::new(),
            pending: Vec::new(),
            brace_count: 0,
            in_string: false,
            escape_next: false,
            start_index: None,
            scan_pos: 0,
            verbose,
        }
    }

    /// Append a chunk and return every object it completes, in order.
    /// Chunks are raw bytes: the network slices the stream with no regard
    /// for character boundaries, so a multi-byte character split across
    /// chunks is held back until its remaining bytes arrive. Objects that
    /// close but fail to parse are skipped.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.pending.extend_from_slice(chunk);
        self.decode_pending();
        let mut objects = Vec::new();

        while let Some(end) = self.scan_to_object_end() {
            let start = self.start_index.take().expect("object end without start");
            let raw = &self.buffer[start..end];
            match serde_json::from_str::<Value>(raw) {
                Ok(value) => objects.push(value),
                Err(e) => {
                    if self.verbose {
                        eprintln!("skipping malformed stream object: {}", e);
                    }
                }
            }

            // Drop the consumed prefix and rescan the remainder from the top.
            self.buffer.drain(..end);
            self.scan_pos = 0;
            self.brace_count = 0;
            self.in_string = false;
            self.escape_next = false;
        }

        objects
    }

    /// Move every complete UTF-8 character from `pending` into the text
    /// buffer, leaving a truncated trailing character behind for the next
    /// chunk. Genuinely invalid bytes become U+FFFD so the scan can't stall.
    fn decode_pending(&mut self) {
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.pending.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        None => {
                            self.pending.drain(..valid);
                            return;
                        }
                        Some(len) => {
                            self.buffer.push('\u{FFFD}');
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }

    /// Advance the scan until a top-level object closes, returning the byte
    /// index one past its closing brace. Scanner state persists across
    /// calls, so a later chunk picks up exactly where this one stopped.
    fn scan_to_object_end(&mut self) -> Option<usize> {
        let tail = self.buffer[self.scan_pos..].to_string();
        for (offset, ch) in tail.char_indices() {
            let i = self.scan_pos + offset;

            if self.escape_next {
                self.escape_next = false;
                continue;
            }

            match ch {
                '\\' if self.in_string => self.escape_next = true,
                '"' => self.in_string = !self.in_string,
                '{' if !self.in_string => {
                    if self.brace_count == 0 {
                        self.start_index = Some(i);
                    }
                    self.brace_count += 1;
                }
                '}' if !self.in_string => {
                    self.brace_count -= 1;
                    if self.brace_count == 0 {
                        self.scan_pos = i + ch.len_utf8();
                        return Some(self.scan_pos);
                    }
                }
                _ => {}
            }
        }

        self.scan_pos = self.buffer.len();
        None
    }
}

/// One function call still being assembled from fragments.
#[derive(Debug, Clone)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Folds decoded stream objects into one cumulative assistant message.
///
/// Two wire shapes are understood: whole `candidates[].content.parts`
/// objects carrying complete text and function-call parts, and delta
/// objects that split a single call across fragments keyed by `index`,
/// where `arguments` accumulate by string concatenation and `name`/`id`
/// are replaced only by non-empty values.
pub struct MessageAccumulator {
    content: String,
    partials: Vec<PartialToolCall>,
}

impl MessageAccumulator {
    pub fn new() -> Self {
        Self {
            content: String::new(),
            partials: Vec::new(),
        }
    }

    /// Fold one decoded object in; returns true if the cumulative state
    /// changed and a snapshot should be yielded.
    pub fn absorb(&mut self, value: &Value) -> bool {
        let mut changed = false;

        if let Some(parts) = value
            .pointer("/candidates/0/content/parts")
            .and_then(|p| p.as_array())
        {
            for part in parts {
                if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                    self.content.push_str(text);
                    changed = true;
                }
                if let Some(call) = part.get("functionCall") {
                    let name = call
                        .get("name")
                        .and_then(|n| n.as_str())
                        .unwrap_or_default();
                    let args = call.get("args").cloned().unwrap_or(Value::Null);
                    self.partials.push(PartialToolCall {
                        id: generate_call_id(),
                        name: name.to_string(),
                        arguments: args.to_string(),
                    });
                    changed = true;
                }
            }
        }

        // Delta-style fragments: one call split across objects, keyed by index.
        if let Some(fragments) = value
            .pointer("/choices/0/delta/tool_calls")
            .and_then(|c| c.as_array())
        {
            for fragment in fragments {
                let index = fragment.get("index").and_then(|i| i.as_u64()).unwrap_or(0) as usize;
                while self.partials.len() <= index {
                    self.partials.push(PartialToolCall {
                        id: generate_call_id(),
                        name: String::new(),
                        arguments: String::new(),
                    });
                }
                let partial = &mut self.partials[index];

                if let Some(id) = fragment.get("id").and_then(|i| i.as_str()) {
                    if !id.is_empty() {
                        partial.id = id.to_string();
                    }
                }
                if let Some(name) = fragment.pointer("/function/name").and_then(|n| n.as_str()) {
                    if !name.is_empty() {
                        partial.name = name.to_string();
                    }
                }
                if let Some(args) = fragment
                    .pointer("/function/arguments")
                    .and_then(|a| a.as_str())
                {
                    partial.arguments.push_str(args);
                }
                changed = true;
            }
        }
        if let Some(text) = value
            .pointer("/choices/0/delta/content")
            .and_then(|t| t.as_str())
        {
            self.content.push_str(text);
            changed = true;
        }

        changed
    }

    /// The cumulative message at this point in the stream. Calls whose
    /// arguments don't parse yet (mid-fragment) are carried with whatever
    /// has accumulated so far, as a raw string under "_partial".
    pub fn snapshot(&self) -> Message {
        let mut message = Message::assistant().with_text(self.content.clone());
        for partial in &self.partials {
            message = message.with_tool_call(ToolCall::new(
                partial.id.clone(),
                partial.name.clone(),
                parse_arguments(&partial.arguments),
            ));
        }
        message
    }

    /// Yield the final cumulative message at stream end, unless a snapshot
    /// was already emitted at exactly this state.
    pub fn finish(self, last: Option<&Message>) -> Option<Message> {
        if self.content.is_empty() && self.partials.is_empty() {
            return None;
        }
        let message = self.snapshot();
        if let Some(last) = last {
            if last.content == message.content && last.tool_calls == message.tool_calls {
                return None;
            }
        }
        Some(message)
    }
}

impl Default for MessageAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_arguments(raw: &str) -> Value {
    if raw.is_empty() || raw == "null" {
        return serde_json::json!({});
    }
    serde_json::from_str(raw)
        .unwrap_or_else(|_| serde_json::json!({ "_partial": raw }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CANDIDATE_OBJECT: &str =
        r#"{"candidates":[{"content":{"parts":[{"text":"ab"}]}}]}"#;

    #[test]
    fn test_single_object_in_one_chunk() {
        let mut scanner = JsonObjectScanner::new(false);
        let objects = scanner.feed(CANDIDATE_OBJECT.as_bytes());
        assert_eq!(objects.len(), 1);
        assert_eq!(
            objects[0].pointer("/candidates/0/content/parts/0/text"),
            Some(&json!("ab"))
        );
    }

    #[test]
    fn test_object_split_mid_string() {
        // Split between `"a` and `b"`, inside the string literal.
        let split = CANDIDATE_OBJECT.find("ab").unwrap() + 1;
        let bytes = CANDIDATE_OBJECT.as_bytes();
        let mut scanner = JsonObjectScanner::new(false);

        assert!(scanner.feed(&bytes[..split]).is_empty());
        let objects = scanner.feed(&bytes[split..]);
        assert_eq!(objects.len(), 1);
        assert_eq!(
            objects[0].pointer("/candidates/0/content/parts/0/text"),
            Some(&json!("ab"))
        );
    }

    #[test]
    fn test_split_points_are_equivalent() {
        // Whatever two split points we pick, the parse is the same.
        let bytes = CANDIDATE_OBJECT.as_bytes();
        let unsplit = {
            let mut scanner = JsonObjectScanner::new(false);
            scanner.feed(bytes)
        };
        for i in 0..bytes.len() {
            for j in i..bytes.len() {
                let mut scanner = JsonObjectScanner::new(false);
                let mut objects = scanner.feed(&bytes[..i]);
                objects.extend(scanner.feed(&bytes[i..j]));
                objects.extend(scanner.feed(&bytes[j..]));
                assert_eq!(objects, unsplit, "split at {} and {}", i, j);
            }
        }
    }

    #[test]
    fn test_multibyte_text_survives_chunk_splits() {
        // Every byte split point, including the ones inside the two-byte
        // `é`, parses back to the same text.
        let object = r#"{"candidates":[{"content":{"parts":[{"text":"héllo"}]}}]}"#;
        let bytes = object.as_bytes();
        for i in 0..bytes.len() {
            let mut scanner = JsonObjectScanner::new(false);
            let mut objects = scanner.feed(&bytes[..i]);
            objects.extend(scanner.feed(&bytes[i..]));
            assert_eq!(objects.len(), 1, "split at byte {}", i);
            assert_eq!(
                objects[0].pointer("/candidates/0/content/parts/0/text"),
                Some(&json!("héllo")),
                "split at byte {}",
                i
            );
        }
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let mut scanner = JsonObjectScanner::new(false);
        let objects = scanner.feed(br#"{"text":"some {nested} \"braces\" }{"}"#);
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0]["text"], json!(r#"some {nested} "braces" }{"#));
    }

    #[test]
    fn test_multiple_objects_with_array_framing() {
        let mut scanner = JsonObjectScanner::new(false);
        let objects = scanner.feed(br#"[{"a":1},{"b":{"c":2}}]"#);
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0]["a"], json!(1));
        assert_eq!(objects[1]["b"]["c"], json!(2));
    }

    #[test]
    fn test_malformed_object_is_skipped() {
        let mut scanner = JsonObjectScanner::new(false);
        // Balanced braces but not valid JSON, followed by a valid object.
        let objects = scanner.feed(br#"{oops} {"ok":true}"#);
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0]["ok"], json!(true));
    }

    #[test]
    fn test_accumulator_yields_cumulative_text() {
        let mut acc = MessageAccumulator::new();

        assert!(acc.absorb(&json!({
            "candidates": [{"content": {"parts": [{"text": "Hello"}]}}]
        })));
        assert_eq!(acc.snapshot().content, "Hello");

        assert!(acc.absorb(&json!({
            "candidates": [{"content": {"parts": [{"text": ", world"}]}}]
        })));
        assert_eq!(acc.snapshot().content, "Hello, world");
    }

    #[test]
    fn test_accumulator_collects_function_calls() {
        let mut acc = MessageAccumulator::new();
        acc.absorb(&json!({
            "candidates": [{"content": {"parts": [
                {"text": "Let me check."},
                {"functionCall": {"name": "read_file", "args": {"path": "a.txt"}}}
            ]}}]
        }));

        let message = acc.snapshot();
        assert_eq!(message.content, "Let me check.");
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].name, "read_file");
        assert_eq!(message.tool_calls[0].arguments, json!({"path": "a.txt"}));
        assert!(!message.tool_calls[0].id.is_empty());
    }

    #[test]
    fn test_accumulator_assembles_delta_fragments_by_index() {
        let mut acc = MessageAccumulator::new();

        acc.absorb(&json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "id": "call_9", "function": {"name": "search_files", "arguments": "{\"pat"}}
        ]}}]}));
        acc.absorb(&json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "id": "", "function": {"name": "", "arguments": "tern\":\"fn main\"}"}}
        ]}}]}));

        let message = acc.snapshot();
        assert_eq!(message.tool_calls.len(), 1);
        let call = &message.tool_calls[0];
        // Non-empty values replace; empty ones don't.
        assert_eq!(call.id, "call_9");
        assert_eq!(call.name, "search_files");
        assert_eq!(call.arguments, json!({"pattern": "fn main"}));
    }

    #[test]
    fn test_finish_skips_already_emitted_state() {
        let mut acc = MessageAccumulator::new();
        acc.absorb(&json!({
            "candidates": [{"content": {"parts": [{"text": "done"}]}}]
        }));
        let last = acc.snapshot();
        assert!(acc.finish(Some(&last)).is_none());

        let mut acc = MessageAccumulator::new();
        acc.absorb(&json!({
            "candidates": [{"content": {"parts": [{"text": "done"}]}}]
        }));
        let final_message = acc.finish(None).unwrap();
        assert_eq!(final_message.content, "done");
    }
}
