//! Chat completion API client
//!
//! Stateless alternative to the assistant flow: one request per message,
//! no thread kept between messages.

mod client;
mod types;

pub use client::{ChatClient, ChatResponder};
pub use types::*;
