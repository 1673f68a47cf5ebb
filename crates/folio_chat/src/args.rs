use clap::Parser;

use folio_stream::conversation::Conversation;

pub const DEFAULT_URL: &str = "http://localhost:3001/functions/v1/chat";

/// Custom parser function to serialize conversations in JSON formats to the Conversation struct.
fn parse_conversation(s: &str) -> std::result::Result<Conversation, serde_json::Error> {
    let conversation: Conversation = serde_json::from_str(s)?;
    Ok(conversation)
}

#[derive(Default, Clone, Debug, Parser, PartialEq)]
#[command(name = "folio-chat", version = "0.1.0")]
#[command(about = "Chat with a portfolio assistant through a folio relay")]
#[command(
    long_about = "Sends chat turns to a folio relay and prints the assistant's reply as it
streams in.

With a prompt argument (or piped input) a single turn is sent and the process exits,
non-zero if the turn failed. Without one an interactive session starts: every line is a
user turn, `/history` prints the conversation as JSON and `/exit` quits."
)]
pub struct Args {
    /// The user message prompt. Piped `stdin` is prepended to it.
    pub prompt: Option<String>,

    /// Piped input, if any.
    #[clap(skip)]
    pub stdin: Option<String>,

    /// Relay chat endpoint.
    #[clap(long, env = "FOLIO_RELAY_URL", default_value = DEFAULT_URL)]
    pub url: String,

    /// Shared secret sent as a bearer token.
    #[clap(long, env = "FOLIO_API_SECRET", hide_env_values = true)]
    pub token: Option<String>,

    /// Earlier turns to continue from, in JSON format.
    #[clap(long, default_value = "[]", value_parser = parse_conversation)]
    pub conversation: Conversation,

    /// Don't run the spinner
    #[clap(short, long)]
    pub quiet: bool,
}
