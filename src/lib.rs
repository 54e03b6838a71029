//! Terminology-aware translation memory and post-editing engine for short,
//! formatting-sensitive strings such as game and mod UI text.

pub mod backend;
pub mod config;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod orchestrator;
pub mod retry;
pub mod segmenter;
pub mod server;
pub mod store;
pub mod suggest;
pub mod text;
