//! Application state shared across handlers.

use std::sync::Arc;

use folio_stream::openai;

use crate::config::RelayConfig;

#[derive(Clone)]
pub struct AppState {
    /// Settings resolved at startup.
    pub config: Arc<RelayConfig>,
    /// Upstream chat completion client. Cheap to clone; clones share a connection pool.
    pub upstream: openai::Client,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Self {
        let upstream = config.upstream();

        Self {
            config: Arc::new(config),
            upstream,
        }
    }
}
