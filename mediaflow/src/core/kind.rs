//! Component and sequence kind enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The type of a mediator component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediatorKind {
    /// Outbound call that suspends the flow until the response arrives.
    Call,
    /// Fire-and-forward send; the response is handled by an out-sequence.
    Send,
    /// Conditional branch between two anonymous sequences.
    Filter,
    /// Template invocation.
    Invoke,
    /// Splits a message into copies mediated independently.
    Iterate,
    /// Runs a body per item and collects the results.
    Foreach,
    /// Reference to a named sequence.
    Sequence,
    /// Logging.
    Log,
    /// Property assignment.
    Property,
}

impl fmt::Display for MediatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Send => write!(f, "send"),
            Self::Filter => write!(f, "filter"),
            Self::Invoke => write!(f, "invoke"),
            Self::Iterate => write!(f, "iterate"),
            Self::Foreach => write!(f, "foreach"),
            Self::Sequence => write!(f, "sequence"),
            Self::Log => write!(f, "log"),
            Self::Property => write!(f, "property"),
        }
    }
}

/// The kind of pipeline component a span is recorded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// A mediator of the given type.
    Mediator(MediatorKind),
    /// A named sequence (including proxy and API sequences).
    Sequence,
    /// An inline sequence with no name of its own.
    AnonymousSequence,
    /// An outbound endpoint.
    Endpoint,
    /// An inbound endpoint the message arrived through.
    InboundEndpoint,
    /// A proxy service.
    ProxyService,
    /// A REST API resource.
    ApiResource,
    /// A sequence template.
    Template,
}

impl ComponentKind {
    /// Returns true for outbound and inbound endpoints.
    #[must_use]
    pub fn is_endpoint(&self) -> bool {
        matches!(self, Self::Endpoint | Self::InboundEndpoint)
    }

    /// Returns true for Call and Send mediators.
    #[must_use]
    pub fn is_call_or_send(&self) -> bool {
        matches!(
            self,
            Self::Mediator(MediatorKind::Call | MediatorKind::Send)
        )
    }

    /// Returns true for the Foreach mediator.
    #[must_use]
    pub fn is_foreach(&self) -> bool {
        matches!(self, Self::Mediator(MediatorKind::Foreach))
    }

    /// Returns true for anonymous sequences.
    #[must_use]
    pub fn is_anonymous_sequence(&self) -> bool {
        matches!(self, Self::AnonymousSequence)
    }

    /// Returns true for any mediator.
    #[must_use]
    pub fn is_mediator(&self) -> bool {
        matches!(self, Self::Mediator(_))
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mediator(kind) => write!(f, "mediator:{kind}"),
            Self::Sequence => write!(f, "sequence"),
            Self::AnonymousSequence => write!(f, "anonymous_sequence"),
            Self::Endpoint => write!(f, "endpoint"),
            Self::InboundEndpoint => write!(f, "inbound_endpoint"),
            Self::ProxyService => write!(f, "proxy_service"),
            Self::ApiResource => write!(f, "api_resource"),
            Self::Template => write!(f, "template"),
        }
    }
}

/// Where a continuable sequence comes from in the pipeline graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceKind {
    /// A named sequence deployed on its own.
    Named,
    /// A proxy service's in-sequence.
    ProxyIn,
    /// A proxy service's out-sequence.
    ProxyOut,
    /// A proxy service's fault sequence.
    ProxyFault,
    /// An API resource's in-sequence.
    ApiIn,
    /// An API resource's out-sequence.
    ApiOut,
    /// An API resource's fault sequence.
    ApiFault,
    /// An inline sequence; never pushed on a continuation stack.
    Anonymous,
}

impl SequenceKind {
    /// Returns true for anonymous sequences.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// Returns true for the sequences owned by a proxy service.
    #[must_use]
    pub fn is_proxy(&self) -> bool {
        matches!(self, Self::ProxyIn | Self::ProxyOut | Self::ProxyFault)
    }

    /// Returns true for the sequences owned by an API resource.
    #[must_use]
    pub fn is_api(&self) -> bool {
        matches!(self, Self::ApiIn | Self::ApiOut | Self::ApiFault)
    }
}

impl fmt::Display for SequenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named => write!(f, "named"),
            Self::ProxyIn => write!(f, "proxy_in"),
            Self::ProxyOut => write!(f, "proxy_out"),
            Self::ProxyFault => write!(f, "proxy_fault"),
            Self::ApiIn => write!(f, "api_in"),
            Self::ApiOut => write!(f, "api_out"),
            Self::ApiFault => write!(f, "api_fault"),
            Self::Anonymous => write!(f, "anonymous"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_kind_display() {
        assert_eq!(ComponentKind::Mediator(MediatorKind::Call).to_string(), "mediator:call");
        assert_eq!(ComponentKind::AnonymousSequence.to_string(), "anonymous_sequence");
        assert_eq!(ComponentKind::InboundEndpoint.to_string(), "inbound_endpoint");
    }

    #[test]
    fn test_component_kind_predicates() {
        assert!(ComponentKind::Endpoint.is_endpoint());
        assert!(ComponentKind::InboundEndpoint.is_endpoint());
        assert!(!ComponentKind::Sequence.is_endpoint());

        assert!(ComponentKind::Mediator(MediatorKind::Send).is_call_or_send());
        assert!(!ComponentKind::Mediator(MediatorKind::Filter).is_call_or_send());
        assert!(ComponentKind::Mediator(MediatorKind::Foreach).is_foreach());
        assert!(ComponentKind::AnonymousSequence.is_anonymous_sequence());
    }

    #[test]
    fn test_sequence_kind_groups() {
        assert!(SequenceKind::Anonymous.is_anonymous());
        assert!(SequenceKind::ProxyOut.is_proxy());
        assert!(SequenceKind::ApiFault.is_api());
        assert!(!SequenceKind::Named.is_proxy());
        assert!(!SequenceKind::Named.is_api());
    }

    #[test]
    fn test_sequence_kind_serialize() {
        let json = serde_json::to_string(&SequenceKind::ProxyIn).unwrap();
        assert_eq!(json, r#""proxy_in""#);

        let kind: SequenceKind = serde_json::from_str(r#""api_out""#).unwrap();
        assert_eq!(kind, SequenceKind::ApiOut);
    }
}
