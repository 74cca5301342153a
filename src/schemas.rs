//! # Schemas Module
//!
//! Wire types for the OpenAI-compatible `/v1/chat/completions` streaming API,
//! plus [`CompletionEvent`], the decoded form of one streamed chunk.
//!
//! Only the fields needed to order events, time them and print their text are
//! modelled strictly. Everything else is optional and unknown fields are ignored,
//! so chunks from vLLM, LightLLM or OpenAI itself all decode.

use crate::error::BenchError;
use crate::streaming::RawEvent;
use serde::{Deserialize, Serialize};
use std::time::Instant;

pub const ROLE_SYSTEM: &str = "system";
pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";

/// A single message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ROLE_USER, content)
    }

    /// Parses raw user input into a message.
    ///
    /// A leading `system:`, `assistant:` or `user:` prefix (case-insensitive)
    /// selects the role; without one the role is `user`. Blank input, or a
    /// prefix with nothing after it, yields `None`.
    pub fn parse_input(input: &str) -> Option<Self> {
        let message = input.trim();
        if message.is_empty() {
            return None;
        }

        for role in [ROLE_SYSTEM, ROLE_ASSISTANT, ROLE_USER] {
            let prefix_len = role.len() + 1;
            let matches_prefix = message
                .get(..prefix_len)
                .map(|head| head.eq_ignore_ascii_case(&format!("{role}:")))
                .unwrap_or(false);

            if matches_prefix {
                let content = message[prefix_len..].trim();
                if content.is_empty() {
                    return None;
                }
                return Some(Self::new(role, content));
            }
        }

        Some(Self::user(message))
    }
}

/// # Chat Completion Request
///
/// Body of a streaming chat completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub stream: bool,
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
}

impl<'a> ChatCompletionRequest<'a> {
    pub fn streaming(model: &'a str, messages: &'a [ChatMessage]) -> Self {
        Self {
            stream: true,
            model,
            messages,
        }
    }
}

/// # Chat Completion Chunk
///
/// One `data:` payload of a streaming chat completion response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub system_fingerprint: Option<String>,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChunkDelta {
    pub role: Option<String>,
    pub content: Option<String>,
}

/// A decoded streaming event: the chunk (or why there is none), where it sits
/// in the stream and when it arrived.
#[derive(Debug)]
pub struct CompletionEvent {
    index: usize,
    received_at: Instant,
    chunk: Result<ChatCompletionChunk, BenchError>,
}

impl CompletionEvent {
    /// Decodes a raw SSE event. Read and decode failures are kept on the event.
    pub fn from_raw(raw: RawEvent) -> Self {
        let chunk = match raw.data {
            Ok(payload) => serde_json::from_str(&payload).map_err(BenchError::Decode),
            Err(err) => Err(BenchError::StreamRead(err)),
        };

        Self {
            index: raw.index,
            received_at: raw.received_at,
            chunk,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    pub fn chunk(&self) -> Option<&ChatCompletionChunk> {
        self.chunk.as_ref().ok()
    }

    pub fn error(&self) -> Option<&BenchError> {
        self.chunk.as_ref().err()
    }

    pub fn is_failure(&self) -> bool {
        self.chunk.is_err()
    }

    /// Text fragment carried by the first choice, if any.
    pub fn text(&self) -> Option<&str> {
        self.chunk()?
            .choices
            .first()?
            .delta
            .content
            .as_deref()
    }

    pub fn into_chunk(self) -> Result<ChatCompletionChunk, BenchError> {
        self.chunk
    }
}

impl From<RawEvent> for CompletionEvent {
    fn from(raw: RawEvent) -> Self {
        Self::from_raw(raw)
    }
}
