#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Chat(#[from] folio_stream::error::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}
