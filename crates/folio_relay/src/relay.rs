//! The chat relay: validates a conversation, opens a streaming completion upstream and
//! re-frames the upstream event stream for the caller.
//!
//! Once the response headers are sent the caller always sees HTTP 200. Every failure after
//! that point is reported in-band as a single `{"error": ...}` frame, and every stream ends
//! with either `[DONE]` or that error frame.

use std::convert::Infallible;

use async_stream::stream;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderName},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures::stream::{Stream, StreamExt};
use serde_json::{json, Value};

use folio_stream::openai::{self, MessageBody};
use folio_stream::sse::{Frame, LineDecoder, DONE};

use crate::conversation::{parse_request, prepare_messages};
use crate::error::RelayError;
use crate::state::AppState;

pub const CHAT_ROUTE: &str = "/functions/v1/chat";

/// Message of the terminal frame sent on transport failures.
pub const INTERNAL_RELAY_ERROR: &str = "Internal relay error";

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

pub async fn handle_chat(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, RelayError> {
    let conversation = parse_request(&body)?;
    let messages = prepare_messages(
        &state.config.system,
        state.config.system_policy,
        conversation,
    )?;

    log::info!(
        "relaying {} turns to {}",
        messages.len(),
        state.config.model
    );

    let body = state.config.message_body(messages);
    let stream = relay_stream(state.upstream.clone(), body);

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Sse::new(stream).keep_alive(KeepAlive::default()),
    )
        .into_response())
}

/// Logs a caller that went away before the relay finished. Dropping the stream drops the
/// upstream response with it.
#[derive(Default)]
struct DisconnectGuard {
    finished: bool,
}

impl DisconnectGuard {
    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if !self.finished {
            log::debug!("caller disconnected, upstream stream released");
        }
    }
}

/// Upstream request plus re-framing, as a lazy stream of outbound events. Nothing happens
/// until the caller starts polling, which is after the response headers went out.
pub fn relay_stream(
    upstream: openai::Client,
    body: MessageBody,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream! {
        let mut guard = DisconnectGuard::default();

        let response = match upstream.stream(&body).await {
            Ok(response) => response,
            Err(e) => {
                log::error!("upstream request failed: {}", e);
                guard.finish();
                yield Ok(error_event(json!(INTERNAL_RELAY_ERROR)));
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            log::error!("upstream rejected the request ({}): {}", status, text);
            guard.finish();
            yield Ok(error_event(upstream_error(status.as_u16(), &text)));
            return;
        }

        let bytes = response.bytes_stream();
        futures::pin_mut!(bytes);
        let mut decoder = LineDecoder::new();

        loop {
            let (frames, eof) = match bytes.next().await {
                Some(Ok(chunk)) => {
                    decoder.push(&chunk);
                    (std::iter::from_fn(|| decoder.next_frame()).collect::<Vec<_>>(), false)
                }
                Some(Err(e)) => {
                    log::error!("upstream read failed: {}", e);
                    guard.finish();
                    yield Ok(error_event(json!(INTERNAL_RELAY_ERROR)));
                    return;
                }
                None => (decoder.finish(), true),
            };

            for frame in frames {
                let terminal = frame.is_done() || carries_error(&frame);
                if terminal {
                    guard.finish();
                }

                yield Ok(data_event(frame.payload()));

                if terminal {
                    log::debug!("relay finished on a terminal frame");
                    return;
                }
            }

            if eof {
                break;
            }
        }

        log::debug!("upstream closed without [DONE], appending it");
        guard.finish();
        yield Ok(data_event(DONE));
    }
}

/// The `error` member of a rejected upstream body, or a generic message naming the status.
pub fn upstream_error(status: u16, body: &str) -> Value {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|mut value| value.get_mut("error").map(Value::take))
        .filter(|error| !error.is_null())
        .unwrap_or_else(|| json!(format!("Upstream error (status {status})")))
}

/// Whether a data frame is an upstream error object. Those end the relay.
fn carries_error(frame: &Frame) -> bool {
    match frame {
        Frame::Data(payload) if payload.contains("\"error\"") => {
            serde_json::from_str::<Value>(payload)
                .ok()
                .and_then(|value| value.get("error").map(|error| !error.is_null()))
                .unwrap_or(false)
        }
        _ => false,
    }
}

/// A data event carrying `payload` as-is. SSE fields can't hold a carriage return, so a stray
/// one is dropped.
fn data_event(payload: &str) -> Event {
    if payload.contains('\r') {
        return Event::default().data(payload.replace('\r', ""));
    }
    Event::default().data(payload)
}

fn error_event(error: Value) -> Event {
    data_event(&json!({ "error": error }).to_string())
}
