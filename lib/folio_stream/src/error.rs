/// Failures seen by the relay's upstream client and by the streaming chat client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Blank user input. Nothing is sent.
    #[error("message is empty")]
    EmptyMessage,

    /// Non-success HTTP status. `message` is the most specific text the body offered.
    #[error("{message}")]
    UpstreamRejected { status: u16, message: String },

    /// An error object embedded in the event stream.
    #[error("{0}")]
    UpstreamStream(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid header value: {0}")]
    Header(String),
}
