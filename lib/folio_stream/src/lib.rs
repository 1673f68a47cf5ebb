//! Streaming plumbing shared by the folio chat relay and its clients.
//!
//! - [`sse`]: push bytes in, pop complete SSE lines and data frames out.
//! - [`openai`]: upstream chat completion wire types and HTTP client.
//! - [`parser`], [`client`], [`session`]: the consumer side, from relay bytes to an
//!   accumulated assistant message.

pub mod client;
pub mod conversation;
pub mod error;
pub mod openai;
pub mod parser;
pub mod session;
pub mod sse;
