//! The mediation engine.
//!
//! Injects messages into entry sequences, parks them at endpoints and
//! resumes them from their continuation stacks when responses arrive.
//! A fatal error aborts the message and routes it to the fault sequence
//! of its entry artifact.

mod env;
mod pending;


pub use env::MediationEnv;
pub use pending::{PendingCall, PendingCalls, PendingKind};

use crate::config::MediationConfig;
use crate::context::MessageContext;
use crate::core::{ComponentId, ComponentKind, ExecutionContextId, FlowId, SequenceKind};
use crate::continuation::ContinuationNode;
use crate::errors::MediationError;
use crate::mediators::{MediationScope, Mediator, Resumable, Sequence};
use crate::observability::{LoggingTracingBackend, TracingBackend};
use crate::pipeline::{resolve_sequence, PipelineGraph};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Where a resumed message ended up.
#[derive(Debug, Clone)]
pub struct ResumeOutcome {
    /// The message that was mediated.
    pub message: Arc<MessageContext>,
    /// True if mediation ran to the end without suspending again.
    pub completed: bool,
}

/// Runs messages through a pipeline graph. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MediationEngine {
    env: Arc<MediationEnv>,
}

impl MediationEngine {
    /// Creates an engine logging spans through `tracing`.
    #[must_use]
    pub fn new(config: MediationConfig, graph: Arc<dyn PipelineGraph>) -> Self {
        Self::with_backend(config, graph, Arc::new(LoggingTracingBackend::default()))
    }

    /// Creates an engine with a custom tracing backend.
    #[must_use]
    pub fn with_backend(
        config: MediationConfig,
        graph: Arc<dyn PipelineGraph>,
        backend: Arc<dyn TracingBackend>,
    ) -> Self {
        Self {
            env: Arc::new(MediationEnv::new(config, graph, backend)),
        }
    }

    /// Returns the engine environment.
    #[must_use]
    pub fn env(&self) -> &MediationEnv {
        &self.env
    }

    /// Applies the engine configuration to a new message: disables
    /// continuation tracking if configured and attaches the span store of
    /// its flow when tracing.
    #[must_use]
    pub fn prepare(&self, message: MessageContext) -> Arc<MessageContext> {
        let config = self.env.config();
        let mut message = message;
        if !config.continuation_enabled {
            message = message.with_continuation(false);
        }
        if config.tracing_enabled && message.span_store().is_none() {
            let store = self.env.stores().get_or_create(message.flow_id());
            message = message.with_span_store(store);
        }
        Arc::new(message)
    }

    /// Mediates an entry sequence.
    ///
    /// Returns false if the message suspended. Once the flow has nothing
    /// left running or parked its span store is discarded.
    pub fn inject(
        &self,
        message: &Arc<MessageContext>,
        kind: SequenceKind,
        name: &str,
    ) -> Result<bool, MediationError> {
        self.env.pending().enter(message.flow_id());
        let result = self.mediate_entry(message, kind, name);
        self.settle(message, result)
    }

    /// Mediates an entry sequence inside the span of the inbound endpoint
    /// that received the message.
    pub fn inject_inbound(
        &self,
        message: &Arc<MessageContext>,
        endpoint: &str,
        kind: SequenceKind,
        name: &str,
    ) -> Result<bool, MediationError> {
        self.env.pending().enter(message.flow_id());
        let scope = MediationScope::new(&self.env, message);
        let id = ComponentId::new(format!("inbound:{endpoint}"));
        let span = scope.open_component(&id, ComponentKind::InboundEndpoint, endpoint, false);

        let result = self.mediate_entry(message, kind, name);
        if let (Ok(true), Some(index)) = (&result, span) {
            scope.close_span(index);
        }
        self.settle(message, result)
    }

    fn mediate_entry(
        &self,
        message: &Arc<MessageContext>,
        kind: SequenceKind,
        name: &str,
    ) -> Result<bool, MediationError> {
        let node = ContinuationNode::sequence(kind, name);
        resolve_sequence(self.env.graph(), &node, message)
            .and_then(|sequence| sequence.mediate(&MediationScope::new(&self.env, message)))
    }

    /// Continues a suspended message from its continuation stack.
    ///
    /// Returns true once the stack is empty or the copy ended, false if the
    /// message suspended again.
    pub fn resume(&self, message: &Arc<MessageContext>) -> Result<bool, MediationError> {
        self.env.pending().enter(message.flow_id());
        let result = self.unwind(message);
        self.settle(message, result)
    }

    fn unwind(&self, message: &Arc<MessageContext>) -> Result<bool, MediationError> {
        if !message.is_continuation_enabled() {
            warn!(
                message_id = %message.execution_id(),
                "Continuation disabled; message cannot be resumed"
            );
            return Ok(false);
        }

        let stacks = self.env.stacks();
        let scope = MediationScope::new(&self.env, message);
        while let Some(node) = stacks.peek(message) {
            let depth = stacks.depth(message);
            let sequence = resolve_sequence(self.env.graph(), &node, message)?;
            debug!(
                message_id = %message.execution_id(),
                sequence = %sequence.name(),
                position = node.position(),
                depth,
                "Resuming sequence"
            );
            self.restore_chain(message, &node);
            if !sequence.resume(&scope, &node)? {
                return Ok(false);
            }
            if stacks.depth(message) >= depth {
                warn!(
                    message_id = %message.execution_id(),
                    sequence = %sequence.name(),
                    "Resumed sequence left its continuation entry; dropping it"
                );
                stacks.pop_sequence(message);
            }
        }

        if let Some(spans) = self.env.spans() {
            spans.close_chain(message);
        }
        Ok(true)
    }

    /// Puts back the span chain saved with `node` when the message no longer
    /// has the sequence's span open, e.g. after its stack was restored into a
    /// fresh context.
    fn restore_chain(&self, message: &MessageContext, node: &ContinuationNode) {
        if !message.is_tracing_enabled() {
            return;
        }
        let (Some(index), Some(chain)) = (node.stats_parent_index(), node.stats_parent_chain())
        else {
            return;
        };
        if message.parent_chain().contains(&index) {
            return;
        }
        debug!(
            message_id = %message.execution_id(),
            flow_index = index,
            chain = ?chain,
            "Restoring span chain from continuation"
        );
        message.restore_parent_chain(chain.to_vec());
    }

    /// Delivers the response of a call: closes the endpoint span, stores
    /// the response as payload and resumes the message.
    pub fn complete_call(
        &self,
        execution_id: ExecutionContextId,
        response: Value,
    ) -> Result<ResumeOutcome, MediationError> {
        let call = self.take_pending(execution_id, PendingKind::Call)?;
        let message = call.message;
        if let Some(index) = call.endpoint_index {
            MediationScope::new(&self.env, &message).close_span(index);
        }
        message.set_payload(response);

        let result = self.unwind(&message);
        let completed = self.settle(&message, result)?;
        Ok(ResumeOutcome { message, completed })
    }

    /// Same as [`complete_call`](Self::complete_call), on the blocking pool.
    ///
    /// The message usually resumes on a different worker than the one it
    /// suspended on.
    pub async fn complete_call_async(
        &self,
        execution_id: ExecutionContextId,
        response: Value,
    ) -> Result<ResumeOutcome, MediationError> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.complete_call(execution_id, response))
            .await
            .map_err(|err| MediationError::Internal(format!("resume task failed: {err}")))?
    }

    /// Delivers the response of a send: mediates the out-sequence of the
    /// entry artifact in a fresh copy of the sent message.
    pub fn deliver_response(
        &self,
        execution_id: ExecutionContextId,
        response: Value,
    ) -> Result<ResumeOutcome, MediationError> {
        let call = self.take_pending(execution_id, PendingKind::Send)?;
        let message = Arc::new(call.message.response_copy(response));
        message.continuation().clear();
        message.restore_parent_chain(call.endpoint_index.into_iter().collect());

        let result = match self.out_sequence(&message) {
            Some(sequence) => sequence.mediate(&MediationScope::new(&self.env, &message)),
            None => {
                debug!(
                    message_id = %message.execution_id(),
                    endpoint = %call.endpoint,
                    "No out-sequence deployed; response dropped"
                );
                Ok(true)
            }
        };
        if let (Ok(true), Some(spans)) = (&result, self.env.spans()) {
            spans.close_chain(&message);
        }
        let completed = self.settle(&message, result)?;
        Ok(ResumeOutcome { message, completed })
    }

    /// Discards everything the engine still holds for a flow: parked copies,
    /// spans left open and the span store. Returns the number of parked
    /// copies dropped.
    ///
    /// Runs on its own once a flow has nothing left running or parked.
    pub fn finish_flow(&self, flow_id: FlowId) -> usize {
        let dropped = self.env.pending().discard_flow(flow_id);
        let Some(store) = self.env.stores().remove(flow_id) else {
            debug!(%flow_id, dropped, "Finished untraced flow");
            return dropped;
        };

        let unfinished: Vec<String> = store
            .read()
            .unpopped_continuation_sequences()
            .map(|entry| entry.name.clone())
            .collect();
        if !unfinished.is_empty() {
            warn!(
                %flow_id,
                sequences = ?unfinished,
                "Flow finished with sequences never left"
            );
        }
        let closed = self
            .env
            .spans()
            .map_or(0, |spans| spans.close_flow(&store));
        debug!(
            %flow_id,
            dropped,
            spans = store.len(),
            closed,
            "Finished flow"
        );
        dropped
    }

    fn take_pending(
        &self,
        execution_id: ExecutionContextId,
        expected: PendingKind,
    ) -> Result<PendingCall, MediationError> {
        let pending = self.env.pending();
        let flow_id = pending
            .flow_of(execution_id)
            .ok_or(MediationError::UnknownExecution(execution_id))?;
        pending.enter(flow_id);
        let Some(call) = pending.take(execution_id) else {
            pending.leave(flow_id);
            return Err(MediationError::UnknownExecution(execution_id));
        };
        if call.kind != expected {
            let kind = call.kind;
            pending.park(call);
            pending.leave(flow_id);
            return Err(MediationError::Internal(format!(
                "message {execution_id} is waiting on a {kind}, not a {expected}"
            )));
        }
        Ok(call)
    }

    fn out_sequence(&self, message: &MessageContext) -> Option<Arc<Sequence>> {
        let graph = self.env.graph();
        let entry = message.entry();
        if let Some(proxy) = &entry.proxy {
            return graph.proxy_sequence(proxy, SequenceKind::ProxyOut);
        }
        match (&entry.api, &entry.resource) {
            (Some(api), Some(resource)) => graph.api_sequence(api, resource, SequenceKind::ApiOut),
            _ => None,
        }
    }

    fn fault_sequence(&self, message: &MessageContext) -> Option<Arc<Sequence>> {
        let graph = self.env.graph();
        let entry = message.entry();
        let entry_fault = if let Some(proxy) = &entry.proxy {
            graph.proxy_sequence(proxy, SequenceKind::ProxyFault)
        } else {
            match (&entry.api, &entry.resource) {
                (Some(api), Some(resource)) => {
                    graph.api_sequence(api, resource, SequenceKind::ApiFault)
                }
                _ => None,
            }
        };
        entry_fault.or_else(|| graph.named_sequence(&self.env.config().fault_sequence))
    }

    /// Applies the abort policy to a mediation result, then releases the
    /// flow once nothing of it runs or waits any more.
    ///
    /// A copy that was abandoned counts as completed.
    fn settle(
        &self,
        message: &Arc<MessageContext>,
        result: Result<bool, MediationError>,
    ) -> Result<bool, MediationError> {
        let result = match result {
            Err(err) if err.is_fatal() => {
                self.route_fault(message, &err);
                Err(err)
            }
            Ok(done) => Ok(done || message.is_finished()),
            other => other,
        };
        let ended = match &result {
            Ok(done) => *done,
            Err(err) => err.is_fatal(),
        };

        let flow_id = message.flow_id();
        if self.env.pending().leave(flow_id) && ended {
            self.finish_flow(flow_id);
        }
        result
    }

    /// Aborts mediation of `message` and runs the fault sequence.
    fn route_fault(&self, message: &Arc<MessageContext>, err: &MediationError) {
        warn!(
            message_id = %message.execution_id(),
            code = err.error_info().map_or("", |info| info.code.as_str()),
            error = %err,
            "Mediation aborted; routing to fault handler"
        );
        let scope = MediationScope::new(&self.env, message);
        scope.abandon();
        message.mark_fault(err.to_string());

        let Some(fault) = self.fault_sequence(message) else {
            warn!(
                message_id = %message.execution_id(),
                "No fault sequence deployed; message dropped"
            );
            return;
        };
        if let Err(fault_err) = fault.mediate(&scope) {
            error!(
                message_id = %message.execution_id(),
                error = %fault_err,
                "Fault sequence failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::InMemoryPipelineGraph;
    use serde_json::json;

    fn engine(config: MediationConfig) -> MediationEngine {
        MediationEngine::new(config, Arc::new(InMemoryPipelineGraph::new()))
    }

    #[test]
    fn test_prepare_applies_config() {
        let plain = engine(MediationConfig::default());
        let message = plain.prepare(MessageContext::new(json!(null)));
        assert!(message.is_continuation_enabled());
        assert!(!message.is_tracing_enabled());

        let traced = engine(
            MediationConfig::default()
                .with_continuation(false)
                .with_tracing(true),
        );
        let first = traced.prepare(MessageContext::new(json!(null)));
        assert!(!first.is_continuation_enabled());
        assert!(first.is_tracing_enabled());

        let same_flow = traced.prepare(MessageContext::new(json!(null)).with_flow_id(first.flow_id()));
        assert!(Arc::ptr_eq(
            first.span_store().unwrap(),
            same_flow.span_store().unwrap()
        ));
        assert_eq!(traced.env().stores().len(), 1);
    }

    #[test]
    fn test_unknown_execution() {
        let engine = engine(MediationConfig::default());
        let id = ExecutionContextId::new();
        let err = engine.complete_call(id, json!(null)).unwrap_err();
        assert!(matches!(err, MediationError::UnknownExecution(missing) if missing == id));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_missing_entry_sequence_is_fatal() {
        let engine = engine(MediationConfig::default());
        let message = engine.prepare(MessageContext::new(json!(null)));
        let err = engine
            .inject(&message, SequenceKind::Named, "main")
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(message.fault(), Some("sequence 'main' not found".to_string()));
    }

    #[test]
    fn test_resume_with_continuation_disabled() {
        let engine = engine(MediationConfig::default().with_continuation(false));
        let message = engine.prepare(MessageContext::new(json!(null)));
        assert!(!engine.resume(&message).unwrap());
    }

    #[test]
    fn test_resume_of_empty_stack_completes() {
        let engine = engine(MediationConfig::default());
        let message = engine.prepare(MessageContext::new(json!(null)));
        assert!(engine.resume(&message).unwrap());
    }
}
