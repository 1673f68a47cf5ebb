use async_stream::stream;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;

use crate::conversation::ConversationMessage;
use crate::error::Error;
use crate::openai::error_message;
use crate::parser::{StreamEvent, StreamParser};

#[derive(Debug, Serialize)]
struct RequestBody<'a> {
    messages: &'a [ConversationMessage],
}

/// HTTP client for the relay's chat endpoint.
#[derive(Debug, Clone)]
pub struct Client {
    pub url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl Client {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            http: reqwest::Client::new(),
        }
    }

    /// Shared secret sent as `Authorization: Bearer <token>`.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Sends the conversation and returns the assistant reply as a lazy stream of text deltas.
    ///
    /// The stream ends after `[DONE]` or a clean EOF, and yields a single error (then ends) on
    /// an error frame or a transport failure. A non-success status fails before any stream
    /// is returned.
    pub async fn delta(
        &self,
        conversation: &[ConversationMessage],
    ) -> Result<impl Stream<Item = Result<String, Error>>, Error> {
        let mut request = self.http.post(&self.url).json(&RequestBody {
            messages: conversation,
        });

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        log::debug!("sending {} turns to {}", conversation.len(), self.url);
        let response = request.send().await?;

        let status = response.status();
        log::debug!("relay status: {}", status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("relay rejected the request ({}): {}", status, body);

            return Err(Error::UpstreamRejected {
                status: status.as_u16(),
                message: rejection_message(status.as_u16(), &body),
            });
        }

        Ok(deltas(response.bytes_stream()))
    }
}

/// Most specific message available for a rejected request: the JSON `error` member, else the
/// raw body, else the status.
pub fn rejection_message(status: u16, body: &str) -> String {
    let fallback = format!("Server returned status {status}");

    match serde_json::from_str::<Value>(body) {
        Ok(value) => value
            .get("error")
            .filter(|error| !error.is_null())
            .map(error_message)
            .unwrap_or(fallback),
        Err(_) if !body.trim().is_empty() => body.to_string(),
        Err(_) => fallback,
    }
}

/// Turns a relay response body into text deltas.
pub fn deltas<S, E>(bytes: S) -> impl Stream<Item = Result<String, Error>>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<Error>,
{
    stream! {
        let mut parser = StreamParser::new();
        futures::pin_mut!(bytes);

        loop {
            let (events, eof) = match bytes.next().await {
                Some(Ok(chunk)) => {
                    parser.push(&chunk);
                    (std::iter::from_fn(|| parser.next_event()).collect::<Vec<_>>(), false)
                }
                Some(Err(e)) => {
                    yield Err(e.into());
                    return;
                }
                None => (parser.finish(), true),
            };

            for event in events {
                let terminal = event.is_terminal();

                match event {
                    StreamEvent::Delta(text) => yield Ok(text),
                    StreamEvent::Done => {}
                    StreamEvent::Error(message) => yield Err(Error::UpstreamStream(message)),
                }

                if terminal {
                    return;
                }
            }

            if eof {
                return;
            }
        }
    }
}
