//! Shared data model and configuration for the Code Story ingestion pipeline.
//!
//! This crate has no I/O of its own. It defines the labeled-property-graph
//! entities every step reads and writes (`domain`), the YAML pipeline
//! configuration shape (`config`), and the retry/error-classification
//! vocabulary (`category`) reused by the graph, queue, and LLM adapters.

pub mod category;
pub mod config;
pub mod domain;

pub use category::ErrorCategory;
pub use config::PipelineConfig;
