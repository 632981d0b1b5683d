use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::orchestrator::router::AgentKind;

/// What a specialist is allowed to know about the session.
///
/// Built at the router boundary so an agent only sees the identifiers it
/// needs to work on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentContext {
    Spreadsheet { sheet_id: Option<String> },
    Docs { document_id: Option<String> },
    Pdf { conversation_id: String },
    General,
}

/// Structured payload for messages entering a specialist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub conversation_id: String,
    pub input: String,
    pub context: AgentContext,
}

impl AgentRequest {
    pub fn new(conversation_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            input: input.into(),
            context: AgentContext::General,
        }
    }

    pub fn with_context(mut self, context: AgentContext) -> Self {
        self.context = context;
        self
    }
}

/// Standardized response wrapper so downstream tools can rely on metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub output: String,
    pub metadata: Option<serde_json::Value>,
}

impl AgentResponse {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(output: impl Into<String>, metadata: serde_json::Value) -> Self {
        Self {
            output: output.into(),
            metadata: Some(metadata),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub agent: AgentKind,
    pub stage: String,
    pub detail: Option<String>,
}

impl ProgressUpdate {
    pub fn new(agent: AgentKind, stage: impl Into<String>) -> Self {
        Self {
            agent,
            stage: stage.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Receives intermediate steps while a specialist works. Kept apart from the
/// response so callers can stream updates without waiting for the result.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, update: ProgressUpdate);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressObserver for NoopProgress {
    fn on_progress(&self, _update: ProgressUpdate) {}
}

/// Emits every update as an `info!` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressObserver for TracingProgress {
    fn on_progress(&self, update: ProgressUpdate) {
        info!(
            agent = %update.agent,
            stage = %update.stage,
            detail = update.detail.as_deref().unwrap_or(""),
            "Agent progress"
        );
    }
}

#[async_trait]
pub trait AgentBehavior: Send + Sync {
    fn kind(&self) -> AgentKind;

    async fn handle(
        &self,
        request: AgentRequest,
        progress: &dyn ProgressObserver,
    ) -> anyhow::Result<AgentResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn context_serializes_as_tagged_union() {
        let ctx = AgentContext::Spreadsheet {
            sheet_id: Some("sheet-1".into()),
        };
        assert_eq!(
            serde_json::to_value(&ctx).expect("serialize"),
            json!({ "kind": "spreadsheet", "sheet_id": "sheet-1" })
        );
        assert_eq!(
            serde_json::to_value(AgentContext::General).expect("serialize"),
            json!({ "kind": "general" })
        );
    }

    #[test]
    fn request_defaults_to_general_context() {
        let request = AgentRequest::new("conv-1", "hola");
        assert_eq!(request.context, AgentContext::General);
        let request = request.with_context(AgentContext::Pdf {
            conversation_id: "conv-1".into(),
        });
        assert!(matches!(request.context, AgentContext::Pdf { .. }));
    }
}
