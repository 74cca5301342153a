//! # Chat Session
//!
//! Multi-turn conversation on top of [`CompletionClient`]. Each reply is
//! streamed fragment by fragment and then appended to the history, so follow-up
//! prompts carry the whole conversation.

use crate::client::CompletionClient;
use crate::error::BenchError;
use crate::schemas::{ChatMessage, ROLE_ASSISTANT};
use crate::streaming::{EventStream, Next};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One piece of a streamed reply.
#[derive(Debug, Clone, Copy)]
pub enum Fragment<'a> {
    Text(&'a str),
    /// An event that could not be read or decoded.
    Failure(&'a BenchError),
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    client: CompletionClient,
    model: String,
    history: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(client: CompletionClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Sends `message` with the conversation so far and streams the reply into
    /// `on_fragment`.
    ///
    /// The message and the assembled reply join the history only if the
    /// request was accepted. Cancellation while the reply is streaming keeps
    /// the partial reply out of the history and returns [`BenchError::Cancelled`].
    pub async fn send<F>(
        &mut self,
        message: ChatMessage,
        cancel: &CancellationToken,
        mut on_fragment: F,
    ) -> Result<String, BenchError>
    where
        F: FnMut(Fragment<'_>),
    {
        self.history.push(message);

        let mut stream = match self
            .client
            .stream_chat_completion(&self.model, &self.history, cancel)
            .await
        {
            Ok(stream) => stream,
            Err(err) => {
                self.history.pop();
                return Err(err);
            }
        };

        let mut answer = String::new();
        loop {
            match stream.next(cancel).await {
                Next::Item(event) => match (event.text(), event.error()) {
                    (Some(text), _) => {
                        answer.push_str(text);
                        on_fragment(Fragment::Text(text));
                    }
                    (None, Some(err)) => on_fragment(Fragment::Failure(err)),
                    (None, None) => {}
                },
                Next::Exhausted => break,
                Next::Cancelled => {
                    self.history.pop();
                    return Err(BenchError::Cancelled);
                }
            }
        }

        debug!(chars = answer.len(), turns = self.history.len(), "reply complete");
        self.history.push(ChatMessage::new(ROLE_ASSISTANT, answer.clone()));
        Ok(answer)
    }
}
