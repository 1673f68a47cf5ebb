//! # folio-relay
//!
//! Streams portfolio chat conversations through an OpenAI-compatible completion API and
//! relays the Server-Sent Events back to the browser.

pub mod args;
pub mod auth;
pub mod config;
pub mod conversation;
pub mod error;
pub mod prelude;
pub mod prompt;
pub mod relay;
pub mod server;
pub mod state;

pub use error::{Error, RelayError};
pub use server::{create_router, run_server};
pub use state::AppState;
