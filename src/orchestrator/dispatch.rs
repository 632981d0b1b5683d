use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map as JsonMap, Value};
use tracing::{debug, info, instrument};

use super::router::{route, AgentKind, AgentSelection, SessionState};
use crate::agents::{
    AgentBehavior, AgentContext, AgentRequest, AgentResponse, PdfAgent, ProgressObserver,
    Specialist,
};
use crate::documents::SharedDocumentService;
use crate::llm_client::SharedLlmClient;

type SpecialistHandle = Arc<dyn AgentBehavior>;

/// Conversation state owned by the caller and handed to every dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub conversation_id: String,
    pub has_document_loaded: bool,
    pub active_sheet_id: Option<String>,
    pub active_document_id: Option<String>,
}

impl Session {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            ..Self::default()
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState {
            has_document_loaded: self.has_document_loaded,
            has_active_artifact: self.active_sheet_id.is_some()
                || self.active_document_id.is_some(),
        }
    }

    /// The slice of this session a given specialist may see.
    pub fn agent_context(&self, agent: AgentKind) -> AgentContext {
        match agent {
            AgentKind::Spreadsheet => AgentContext::Spreadsheet {
                sheet_id: self.active_sheet_id.clone(),
            },
            AgentKind::Docs => AgentContext::Docs {
                document_id: self.active_document_id.clone(),
            },
            AgentKind::Pdf => AgentContext::Pdf {
                conversation_id: self.conversation_id.clone(),
            },
            AgentKind::Chart | AgentKind::Research | AgentKind::Direct => AgentContext::General,
        }
    }
}

/// Routes each message to a specialist and falls back to the direct agent
/// when the selected one is not registered.
pub struct Orchestrator {
    direct: SpecialistHandle,
    specialists: HashMap<AgentKind, SpecialistHandle>,
}

impl Orchestrator {
    pub fn new<A>(direct: A) -> Self
    where
        A: AgentBehavior + 'static,
    {
        Self {
            direct: Arc::new(direct),
            specialists: HashMap::new(),
        }
    }

    pub fn with_specialist<A>(mut self, agent: A) -> Self
    where
        A: AgentBehavior + 'static,
    {
        self.specialists.insert(agent.kind(), Arc::new(agent));
        self
    }

    /// Every bundled specialist sharing one LLM client.
    pub fn with_default_specialists(
        llm_client: SharedLlmClient,
        documents: SharedDocumentService,
    ) -> Self {
        Self::new(Specialist::direct(llm_client.clone()))
            .with_specialist(PdfAgent::new(llm_client.clone(), documents))
            .with_specialist(Specialist::spreadsheet(llm_client.clone()))
            .with_specialist(Specialist::docs(llm_client.clone()))
            .with_specialist(Specialist::chart(llm_client.clone()))
            .with_specialist(Specialist::research(llm_client))
    }

    #[instrument(skip_all, fields(conversation_id = %session.conversation_id))]
    pub async fn dispatch(
        &self,
        session: &Session,
        message: &str,
        progress: &dyn ProgressObserver,
    ) -> anyhow::Result<RoutedResponse> {
        let selection = route(message, session.state());
        info!(agent = %selection.agent, reason = %selection.reason, "Routed message");

        let handle = self
            .specialists
            .get(&selection.agent)
            .unwrap_or(&self.direct);
        let executed_agent = handle.kind();

        let request = AgentRequest::new(&session.conversation_id, message)
            .with_context(session.agent_context(executed_agent));
        let mut response = handle.handle(request, progress).await?;
        response.metadata = Some(Self::build_metadata(
            &selection,
            executed_agent,
            session.state(),
            response.metadata.take(),
        ));

        Ok(RoutedResponse {
            response,
            selection,
            executed_agent,
        })
    }

    fn build_metadata(
        selection: &AgentSelection,
        executed_agent: AgentKind,
        state: SessionState,
        agent_meta: Option<Value>,
    ) -> Value {
        let mut metadata = JsonMap::new();
        metadata.insert(
            "router".to_string(),
            json!({
                "suggested_agent": selection.agent,
                "executed_agent": executed_agent,
                "reason": selection.reason,
                "has_document_loaded": state.has_document_loaded,
                "has_active_artifact": state.has_active_artifact,
            }),
        );
        if let Some(agent_meta) = agent_meta {
            metadata.insert("agent".to_string(), agent_meta);
        }
        Value::Object(metadata)
    }
}

pub struct RoutedResponse {
    response: AgentResponse,
    selection: AgentSelection,
    executed_agent: AgentKind,
}

impl RoutedResponse {
    pub fn into_output(self) -> AgentResponse {
        debug!(
            suggested_agent = %self.selection.agent,
            executed_agent = %self.executed_agent,
            "Returning agent output",
        );
        self.response
    }

    pub fn response(&self) -> &AgentResponse {
        &self.response
    }

    pub fn selection(&self) -> &AgentSelection {
        &self.selection
    }

    pub fn executed_agent(&self) -> AgentKind {
        self.executed_agent
    }
}
