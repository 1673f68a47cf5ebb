//! Request validation and the turn list sent upstream.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use folio_stream::conversation::{Conversation, ConversationMessage, ConversationRole};
use folio_stream::openai::Message;

use crate::error::RelayError;

/// What happens to `system` turns supplied by the caller. The relay's own instruction is
/// always the single, first system turn.
#[derive(ValueEnum, Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SystemPolicy {
    /// Drop them with a warning.
    #[default]
    Strip,
    /// Answer 400.
    Reject,
    /// Append their contents to the injected instruction.
    Merge,
}

/// Parses and validates a `{ "messages": [{role, content}, ...] }` request body.
pub fn parse_request(body: &[u8]) -> Result<Conversation, RelayError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| RelayError::validation("request body must be a JSON object"))?;

    let Some(messages) = value.get("messages").and_then(Value::as_array) else {
        return Err(RelayError::validation("messages array is required"));
    };

    if messages.is_empty() {
        return Err(RelayError::validation("messages array must not be empty"));
    }

    messages
        .iter()
        .enumerate()
        .map(|(index, turn)| parse_turn(index, turn))
        .collect()
}

fn parse_turn(index: usize, turn: &Value) -> Result<ConversationMessage, RelayError> {
    let role = match turn.get("role").and_then(Value::as_str) {
        Some("user") => ConversationRole::User,
        Some("assistant") => ConversationRole::Assistant,
        Some("system") => ConversationRole::System,
        _ => {
            return Err(RelayError::validation(format!(
                "messages[{index}].role must be one of user, assistant, system"
            )))
        }
    };

    let Some(content) = turn.get("content").and_then(Value::as_str) else {
        return Err(RelayError::validation(format!(
            "messages[{index}].content must be a string"
        )));
    };

    Ok(ConversationMessage::new(role, content))
}

/// Builds the upstream turn list: the system instruction first, then the caller's turns in
/// order, with caller `system` turns handled by `policy`.
pub fn prepare_messages(
    system: &str,
    policy: SystemPolicy,
    conversation: Conversation,
) -> Result<Vec<Message>, RelayError> {
    let (system_turns, turns): (Vec<_>, Vec<_>) = conversation
        .into_iter()
        .partition(|message| message.role == ConversationRole::System);

    let mut instruction = system.to_string();

    if !system_turns.is_empty() {
        match policy {
            SystemPolicy::Strip => {
                log::warn!("dropping {} caller supplied system turn(s)", system_turns.len());
            }
            SystemPolicy::Reject => {
                return Err(RelayError::validation("system turns are not accepted"));
            }
            SystemPolicy::Merge => {
                for turn in &system_turns {
                    instruction.push_str("\n\n");
                    instruction.push_str(&turn.content);
                }
            }
        }
    }

    if turns.is_empty() {
        return Err(RelayError::validation(
            "messages must include at least one user or assistant turn",
        ));
    }

    Ok(std::iter::once(ConversationMessage::system(instruction))
        .chain(turns)
        .map(|message| Message::from(&message))
        .collect())
}
