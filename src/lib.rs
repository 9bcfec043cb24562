//! Site Digest — scheduled page fetching, summarization and delivery.

pub mod api;
pub mod channels;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod llm;
pub mod retry;
pub mod store;
pub mod task;
