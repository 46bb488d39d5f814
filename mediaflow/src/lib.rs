//! # Mediaflow
//!
//! The core of a message mediation engine.
//!
//! Messages flow through branching pipelines of sequences and mediators and
//! may suspend at an outbound call, to resume later on another worker.
//! Mediaflow provides:
//!
//! - **Continuation stacks**: record where in a nested pipeline a message is
//!   so mediation can resume at the exact child after a round trip
//! - **Span parent resolution**: rebuild the logical call tree of a flow for
//!   distributed tracing, across suspensions and concurrent message copies
//! - **A synchronous mediation engine** with fault routing and a pending-call
//!   table for suspended messages
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mediaflow::prelude::*;
//!
//! let graph = InMemoryPipelineGraph::new().with_proxy(
//!     ProxyService::new("orders").with_in_sequence(vec![
//!         Arc::new(LogMediator::info("received")),
//!         Arc::new(CallMediator::new("inventory")),
//!         Arc::new(LogMediator::info("answered")),
//!     ]),
//! );
//! let engine = MediationEngine::new(MediationConfig::default(), Arc::new(graph));
//!
//! let message = engine.prepare(MessageContext::new(payload).with_proxy("orders"));
//! engine.inject(&message, SequenceKind::ProxyIn, "orders")?; // suspends at the call
//! engine.complete_call_async(message.execution_id(), response).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod continuation;
pub mod core;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod mediators;
pub mod observability;
pub mod pipeline;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{LoggingConfig, MediationConfig};
    pub use crate::context::{EntryPoint, MessageContext};
    pub use crate::continuation::{
        ContinuationNode, ContinuationStack, ContinuationStackManager, StackObserver,
    };
    pub use crate::core::{
        ComponentId, ComponentKind, ExecutionContextId, FlowId, MediatorKind, SequenceKind,
    };
    pub use crate::engine::{MediationEngine, ResumeOutcome};
    pub use crate::errors::{
        ArtifactKind, ArtifactNotFoundError, ContinuationError, ContractErrorInfo,
        MediationError,
    };
    pub use crate::logging::init_logging;
    pub use crate::mediators::{
        CallMediator, FilterMediator, ForeachMediator, InvokeMediator, IterateMediator,
        LogMediator, MediationScope, Mediator, PropertyMediator, Resumable, SendMediator,
        Sequence, SequenceReference,
    };
    pub use crate::observability::{
        CollectingTracingBackend, LoggingTracingBackend, NoOpTracingBackend, ParentResolver,
        SpanHandler, SpanRecord, SpanStore, TracingBackend,
    };
    pub use crate::pipeline::{
        ApiResource, ArtifactAncestryStore, InMemoryPipelineGraph, PipelineGraph, ProxyService,
    };
    pub use std::sync::Arc;
}
