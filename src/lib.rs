//! Briefly: daily email and calendar briefings backed by an LLM.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod search;
pub mod sources;
