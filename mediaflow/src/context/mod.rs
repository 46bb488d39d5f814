//! Message contexts for in-flight messages.
//!
//! A message context owns everything that travels with one message copy:
//! its identity, its continuation stack and the chain of spans it has open.

mod message;

pub use message::{EntryPoint, MessageContext};
