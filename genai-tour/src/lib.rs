//! Guided walkthrough client for the Gemini API.

pub mod chats;
pub mod client;
pub mod error;
pub mod models;
pub mod runner;
pub mod service;

#[cfg(test)]
mod test_support;

pub use genai_tour_types as types;

pub use client::{Client, ClientBuilder, ClientConfig, HttpOptions};
pub use error::{Error, Result};
pub use service::{ConversationSession, GenerativeService};
