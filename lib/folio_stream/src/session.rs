//! Chat session state for a streaming client.
//!
//! A [`ChatSession`] owns the visible message list and walks one request at a time through
//! `Idle → Sending → Streaming → Completed | Errored`. Each [`ChatSession::send`] starts a
//! fresh cycle; `&mut self` keeps a second request from starting while one is in flight.

use futures::StreamExt;

use crate::client::Client;
use crate::conversation::{Conversation, ConversationMessage, ConversationRole};
use crate::error::Error;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    #[default]
    Idle,
    /// Request dispatched, waiting for the relay to accept it.
    Sending,
    /// Relay accepted the request; deltas are arriving.
    Streaming,
    Completed,
    Errored,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    #[default]
    Text,
    /// A visible failure notice. Never sent back to the relay.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub role: ConversationRole,
    pub content: String,
    pub kind: MessageKind,
}

impl ChatMessage {
    fn new(role: ConversationRole, content: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            id: xid::new().to_string(),
            role,
            content: content.into(),
            kind,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ConversationRole::User, content, MessageKind::Text)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ConversationRole::Assistant, content, MessageKind::Text)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(ConversationRole::Assistant, content, MessageKind::Error)
    }

    pub fn is_error(&self) -> bool {
        self.kind == MessageKind::Error
    }
}

/// Notification handed to the UI after every change to the message list.
#[derive(Debug)]
pub enum Update<'a> {
    /// The user's turn was appended, before any network activity.
    User(&'a ChatMessage),
    /// One delta was appended to the in-progress assistant message.
    Delta {
        delta: &'a str,
        message: &'a ChatMessage,
    },
    /// The request failed with this message.
    Error(&'a str),
}

#[derive(Debug)]
pub struct ChatSession {
    client: Client,
    messages: Vec<ChatMessage>,
    state: ChatState,
    error: Option<String>,
}

impl ChatSession {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            messages: Vec::new(),
            state: ChatState::Idle,
            error: None,
        }
    }

    /// Seeds the session with earlier turns. System turns are skipped: the relay injects its
    /// own.
    #[must_use]
    pub fn with_history(mut self, conversation: Conversation) -> Self {
        self.messages.extend(
            conversation
                .into_iter()
                .filter(|message| message.role != ConversationRole::System)
                .map(|message| match message.role {
                    ConversationRole::Assistant => ChatMessage::assistant(message.content),
                    _ => ChatMessage::user(message.content),
                }),
        );
        self
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    /// Message of the last failed request, cleared when the next one starts.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Turns replayed to the relay: every text message, error notices excluded.
    pub fn conversation(&self) -> Conversation {
        self.messages
            .iter()
            .filter(|message| !message.is_error())
            .map(|message| ConversationMessage::new(message.role, message.content.clone()))
            .collect()
    }

    /// Sends one user turn and streams the assistant reply into the message list.
    ///
    /// `on_update` runs after every change, once per delta. On failure the error is both
    /// returned and recorded: [`ChatSession::error`] is set, a single error message is
    /// appended, and any partial reply is kept.
    pub async fn send<F>(&mut self, content: &str, mut on_update: F) -> Result<(), Error>
    where
        F: FnMut(Update<'_>),
    {
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::EmptyMessage);
        }

        self.error = None;
        self.messages.push(ChatMessage::user(content));
        if let Some(message) = self.messages.last() {
            on_update(Update::User(message));
        }

        self.state = ChatState::Sending;
        let conversation = self.conversation();

        match self.stream_reply(&conversation, &mut on_update).await {
            Ok(()) => {
                log::debug!("reply completed");
                self.state = ChatState::Completed;
                Ok(())
            }
            Err(error) => {
                self.fail(&error, &mut on_update);
                Err(error)
            }
        }
    }

    async fn stream_reply<F>(
        &mut self,
        conversation: &[ConversationMessage],
        on_update: &mut F,
    ) -> Result<(), Error>
    where
        F: FnMut(Update<'_>),
    {
        let stream = self.client.delta(conversation).await?;
        futures::pin_mut!(stream);

        self.state = ChatState::Streaming;

        let mut reply: Option<usize> = None;
        while let Some(delta) = stream.next().await {
            let delta = delta?;

            let index = match reply {
                Some(index) => index,
                None => {
                    self.messages.push(ChatMessage::assistant(String::new()));
                    let index = self.messages.len() - 1;
                    reply = Some(index);
                    index
                }
            };

            self.messages[index].content.push_str(&delta);
            on_update(Update::Delta {
                delta: &delta,
                message: &self.messages[index],
            });
        }

        Ok(())
    }

    fn fail<F>(&mut self, error: &Error, on_update: &mut F)
    where
        F: FnMut(Update<'_>),
    {
        let message = error.to_string();
        log::error!("chat request failed: {}", message);

        self.state = ChatState::Errored;

        let error_trails = self.messages.last().is_some_and(ChatMessage::is_error);
        if !error_trails {
            self.messages.push(ChatMessage::error(message.clone()));
        }

        on_update(Update::Error(&message));
        self.error = Some(message);
    }
}
