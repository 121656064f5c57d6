//! # Log Query Engine
//!
//! Query specification, validation and execution for structured log search.
//!
//! - [`search::SearchQuery`]: immutable query value built with a builder
//! - [`search::SearchService`]: validates, dispatches and times queries
//! - [`search::InMemoryLogStore`] and [`search::TantivyLogIndex`]: backends
//!
//! Configuration is layered with the `config` crate (see [`config::Config`]),
//! logging goes through `tracing`.

pub mod config;
pub mod error;
pub mod models;
pub mod search;

pub use config::Config;
pub use error::{AppError, Result};
pub use models::{LogLevel, LogRecord};
pub use search::{SearchQuery, SearchResponse, SearchService};
