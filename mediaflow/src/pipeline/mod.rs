//! The deployed pipeline.
//!
//! This module provides:
//! - The pipeline graph and its in-memory implementation
//! - Dispatch of continuation entries to deployed sequences
//! - The structural ancestry used for span parent resolution

mod ancestry;
mod graph;

pub use ancestry::ArtifactAncestryStore;
pub use graph::{resolve_sequence, ApiResource, InMemoryPipelineGraph, PipelineGraph, ProxyService};
