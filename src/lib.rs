#![deny(missing_docs)]

//! Core library for the financial document analyzer.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Chat-completions client abstraction and adapters.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Step definitions, the step executor, and the sequential engine.
pub mod pipeline;
/// Per-request scratch storage for uploaded documents.
pub mod scratch;
/// Analysis service tying uploads to pipeline runs.
pub mod service;
/// Tool adapters exposed to pipeline steps.
pub mod tools;
