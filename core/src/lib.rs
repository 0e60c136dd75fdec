//! Shared building blocks for the NotePM MCP adapter: process configuration,
//! the per-invocation error taxonomy, and response text shaping.

pub mod config;
pub mod error;
pub mod text;
