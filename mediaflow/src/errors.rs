//! Error types for the mediation engine.
//!
//! Only two classes of failure abort a message: an artifact that cannot be
//! found while dispatching a resume, and a continuation that points at a
//! component unable to resume. Everything else (empty stacks, unresolved
//! span parents) is handled where it happens and never surfaces here.

use crate::core::ExecutionContextId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// The main error type for mediation operations.
#[derive(Debug, Error)]
pub enum MediationError {
    /// A sequence, proxy, API resource or template is not deployed.
    #[error("{0}")]
    ArtifactNotFound(#[from] ArtifactNotFoundError),

    /// A continuation could not be followed.
    #[error("{0}")]
    Continuation(#[from] ContinuationError),

    /// No parked message exists for the given execution id.
    #[error("No suspended message for execution context {0}")]
    UnknownExecution(ExecutionContextId),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl MediationError {
    /// Returns the diagnostic info for this error, when one is defined.
    #[must_use]
    pub fn error_info(&self) -> Option<&ContractErrorInfo> {
        match self {
            Self::ArtifactNotFound(err) => Some(&err.error_info),
            Self::Continuation(err) => Some(&err.error_info),
            Self::UnknownExecution(_) | Self::Internal(_) | Self::Serialization(_) => None,
        }
    }

    /// Returns true if the error must abort mediation of the current message.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ArtifactNotFound(_) | Self::Continuation(_))
    }
}

impl From<serde_json::Error> for MediationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Metadata about an error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "MEDIATION-001-ARTIFACT").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// The kind of deployable artifact a lookup was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// A named sequence.
    Sequence,
    /// A proxy service.
    ProxyService,
    /// A REST API resource.
    ApiResource,
    /// A sequence template.
    Template,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequence => write!(f, "sequence"),
            Self::ProxyService => write!(f, "proxy service"),
            Self::ApiResource => write!(f, "API resource"),
            Self::Template => write!(f, "template"),
        }
    }
}

/// Raised when an artifact referenced by a continuation or a mediator is missing.
#[derive(Debug, Clone, Error)]
#[error("{kind} '{name}' not found")]
pub struct ArtifactNotFoundError {
    /// What was looked up.
    pub kind: ArtifactKind,
    /// The name used for the lookup.
    pub name: String,
    /// Diagnostic info.
    pub error_info: ContractErrorInfo,
}

impl ArtifactNotFoundError {
    /// Creates a new artifact-not-found error.
    #[must_use]
    pub fn new(kind: ArtifactKind, name: impl Into<String>) -> Self {
        let name = name.into();
        let info = ContractErrorInfo::new(
            "MEDIATION-001-ARTIFACT",
            format!("The {kind} '{name}' is not present in the pipeline graph"),
        )
        .with_fix_hint("Deploy the artifact or remove the reference before resuming messages that depend on it.")
        .with_context_entry("artifact_kind", kind.to_string())
        .with_context_entry("artifact_name", name.clone());

        Self {
            kind,
            name,
            error_info: info,
        }
    }
}

/// Raised when a continuation node cannot be followed into the pipeline.
#[derive(Debug, Clone, Error)]
#[error("Cannot resume '{component}' at position {position}: {reason}")]
pub struct ContinuationError {
    /// The component whose child list was being resumed.
    pub component: String,
    /// The position recorded in the continuation node.
    pub position: usize,
    /// Why the position could not be followed.
    pub reason: String,
    /// Diagnostic info.
    pub error_info: ContractErrorInfo,
}

impl ContinuationError {
    /// Creates a new continuation error.
    #[must_use]
    pub fn new(component: impl Into<String>, position: usize, reason: impl Into<String>) -> Self {
        let component = component.into();
        let reason = reason.into();
        let info = ContractErrorInfo::new(
            "MEDIATION-002-CONTINUATION",
            format!("Continuation for '{component}' does not match the deployed pipeline"),
        )
        .with_fix_hint("The pipeline was probably redeployed while messages were suspended.")
        .with_context_entry("position", position.to_string());

        Self {
            component,
            position,
            reason,
            error_info: info,
        }
    }
}
