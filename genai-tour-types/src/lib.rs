//! Shared wire types for the genai-tour client.

pub mod content;
pub mod models;
pub mod response;
