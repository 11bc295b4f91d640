//! Consumer for newline-delimited JSON chat replies.
//!
//! Each line of a streamed `/api/chat` body is a standalone record. Content
//! fragments are surfaced as they arrive; the record with `done: true`
//! carries the token counts and ends consumption. Lines that do not parse
//! are skipped.

use futures_util::{pin_mut, Stream, StreamExt};
use serde::Deserialize;
use tracing::debug;

use crate::error::ChatError;
use crate::types::ChatReply;

/// One `/api/chat` record (streamed line or whole non-streamed body).
#[derive(Debug, Deserialize)]
struct ChatRecord {
    #[serde(default)]
    message: Option<RecordMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecordMessage {
    #[serde(default)]
    content: String,
}

impl ChatRecord {
    fn content(&self) -> &str {
        self.message.as_ref().map(|m| m.content.as_str()).unwrap_or("")
    }

    fn total_tokens(&self) -> u32 {
        self.prompt_eval_count.saturating_add(self.eval_count)
    }
}

/// Splits arbitrary byte chunks into complete lines.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append a chunk and return every line it completed, without the `\n`.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            lines.push(line);
        }
        lines
    }

    /// Whatever followed the last newline.
    pub(crate) fn finish(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

/// Incremental parser for a streamed chat reply.
#[derive(Debug, Default)]
pub struct StreamConsumer {
    lines: LineBuffer,
    content: String,
    skipped: usize,
    finished: Option<ChatReply>,
}

impl StreamConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text accumulated so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Number of lines that failed to parse.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Feed one chunk of the body. Returns the reply once the terminal record
    /// has been seen; anything after it is ignored.
    pub fn feed<F>(&mut self, chunk: &[u8], on_delta: &mut F) -> Result<Option<ChatReply>, ChatError>
    where
        F: FnMut(&str),
    {
        if self.finished.is_none() {
            for line in self.lines.push(chunk) {
                self.handle_line(&line, on_delta)?;
                if self.finished.is_some() {
                    break;
                }
            }
        }
        Ok(self.finished.clone())
    }

    /// Signal end of body. Without a terminal record the stream was truncated.
    pub fn finish<F>(mut self, on_delta: &mut F) -> Result<ChatReply, ChatError>
    where
        F: FnMut(&str),
    {
        if self.finished.is_none() {
            if let Some(rest) = self.lines.finish() {
                self.handle_line(&rest, on_delta)?;
            }
        }
        self.finished.ok_or(ChatError::StreamTruncated)
    }

    fn handle_line<F>(&mut self, line: &[u8], on_delta: &mut F) -> Result<(), ChatError>
    where
        F: FnMut(&str),
    {
        if line.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }

        let record: ChatRecord = match serde_json::from_slice(line) {
            Ok(record) => record,
            Err(e) => {
                self.skipped += 1;
                debug!(error = %e, "Skipping malformed stream record");
                return Ok(());
            }
        };

        if let Some(error) = record.error {
            return Err(ChatError::Backend(error));
        }

        let fragment = record.content();
        if !fragment.is_empty() {
            self.content.push_str(fragment);
            on_delta(fragment);
        }

        if record.done {
            self.finished = Some(ChatReply {
                content: self.content.clone(),
                prompt_tokens: record.prompt_eval_count,
                total_tokens: record.total_tokens(),
            });
        }
        Ok(())
    }
}

/// Drive a byte stream to completion, calling `on_delta` for every non-empty
/// fragment in arrival order.
pub async fn consume_stream<S, B, E, F>(stream: S, mut on_delta: F) -> Result<ChatReply, ChatError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    ChatError: From<E>,
    F: FnMut(&str),
{
    pin_mut!(stream);
    let mut consumer = StreamConsumer::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if let Some(reply) = consumer.feed(chunk.as_ref(), &mut on_delta)? {
            if consumer.skipped() > 0 {
                debug!(skipped = consumer.skipped(), "Stream finished with skipped records");
            }
            return Ok(reply);
        }
    }

    consumer.finish(&mut on_delta)
}

/// Parse a non-streamed `/api/chat` body into the same reply shape.
pub fn parse_reply(body: &[u8]) -> Result<ChatReply, ChatError> {
    let record: ChatRecord = serde_json::from_slice(body)?;
    if let Some(error) = record.error {
        return Err(ChatError::Backend(error));
    }
    Ok(ChatReply {
        content: record.content().to_string(),
        prompt_tokens: record.prompt_eval_count,
        total_tokens: record.total_tokens(),
    })
}
