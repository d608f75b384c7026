#![deny(missing_docs)]

//! Core library for the docbrief summarization and question answering service.

/// HTTP routing and REST handlers.
pub mod api;
/// Generative completion client abstraction and adapters.
pub mod completion;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Per-page text extraction and temporary document handling.
pub mod extraction;
/// Structured logging and tracing setup.
pub mod logging;
/// Service counters.
pub mod metrics;
/// Summarization and retrieval pipelines.
pub mod processing;
