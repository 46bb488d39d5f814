//! Execution spans of message flows.
//!
//! Every component invocation of a traced message gets a [`SpanRecord`] in
//! the flow's [`SpanStore`]. Before the span opens, a [`ParentResolver`]
//! reconstructs its logical parent from the flow index, the static artifact
//! ancestry or the latest active span.

mod backend;
mod handler;
pub mod resolve;
mod span;
mod store;

pub use backend::{
    CollectingTracingBackend, LoggingTracingBackend, NoOpTracingBackend, SpanEvent,
    TracingBackend,
};
pub use handler::SpanHandler;
pub use resolve::{ParentResolver, ParentStrategy};
pub use span::{SpanHandle, SpanRecord};
pub use store::{ContinuationSequenceEntry, SpanStore, SpanStoreRegistry, SpanTable};
