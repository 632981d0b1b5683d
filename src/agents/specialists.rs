use async_trait::async_trait;
use serde_json::json;
use tracing::instrument;

use crate::citations::link_citations;
use crate::documents::SharedDocumentService;
use crate::llm_client::SharedLlmClient;
use crate::orchestrator::router::AgentKind;

use super::traits::{
    AgentBehavior, AgentContext, AgentRequest, AgentResponse, ProgressObserver, ProgressUpdate,
};

fn format_prompt(body_hint: &str, request: &AgentRequest, context: Option<&str>) -> String {
    let mut prompt = String::new();

    if let Some(ctx) = context.and_then(|raw| {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }) {
        prompt.push_str(ctx);
        prompt.push_str("\n\n");
    }

    prompt.push_str("Mensaje del usuario:\n");
    prompt.push_str(request.input.trim());

    if !body_hint.trim().is_empty() {
        prompt.push_str("\n\nResponde con ");
        prompt.push_str(body_hint.trim());
        prompt.push('.');
    }

    prompt
}

/// Note about the artifact the user is editing, so the model updates it
/// instead of starting a new one.
fn artifact_note(context: &AgentContext) -> Option<String> {
    match context {
        AgentContext::Spreadsheet {
            sheet_id: Some(id),
        } => Some(format!(
            "Hoja activa: {id}. Modifica esta hoja en lugar de crear una nueva."
        )),
        AgentContext::Docs {
            document_id: Some(id),
        } => Some(format!(
            "Documento activo: {id}. Edita este documento en lugar de crear uno nuevo."
        )),
        _ => None,
    }
}

/// Persona-driven specialist: one directive, one response shape, one LLM call.
pub struct Specialist {
    kind: AgentKind,
    directive: &'static str,
    body_hint: &'static str,
    llm_client: SharedLlmClient,
}

impl Specialist {
    const SPREADSHEET_DIRECTIVE: &'static str = "Eres el agente de hojas de cálculo de Folio. Construyes y modificas tablas, fórmulas y análisis numéricos. Cada vez que menciones el valor de una celda, cítala con el formato [[cell:REF]] o [[cell:REF|VALOR]], por ejemplo [[cell:B2|1500]].";
    const DOCS_DIRECTIVE: &'static str = "Eres el agente de documentos de Folio. Redactas y editas cartas, informes y propuestas con estructura clara y tono profesional.";
    const CHART_DIRECTIVE: &'static str = "Eres el agente de gráficos de Folio. Propones la visualización adecuada para los datos y describes series, ejes y etiquetas.";
    const RESEARCH_DIRECTIVE: &'static str = "Eres el agente de investigación de Folio. Resumes el conocimiento relevante, separas hechos de suposiciones y señalas las preguntas abiertas.";
    const DIRECT_DIRECTIVE: &'static str =
        "Eres Folio, un asistente de escritorio. Responde de forma directa y breve.";

    pub fn new(
        kind: AgentKind,
        directive: &'static str,
        body_hint: &'static str,
        llm_client: SharedLlmClient,
    ) -> Self {
        Self {
            kind,
            directive,
            body_hint,
            llm_client,
        }
    }

    pub fn spreadsheet(llm_client: SharedLlmClient) -> Self {
        Self::new(
            AgentKind::Spreadsheet,
            Self::SPREADSHEET_DIRECTIVE,
            "los cambios propuestos celda por celda y un breve resumen de los resultados",
            llm_client,
        )
    }

    pub fn docs(llm_client: SharedLlmClient) -> Self {
        Self::new(
            AgentKind::Docs,
            Self::DOCS_DIRECTIVE,
            "el texto completo en Markdown, con títulos donde ayuden a la lectura",
            llm_client,
        )
    }

    pub fn chart(llm_client: SharedLlmClient) -> Self {
        Self::new(
            AgentKind::Chart,
            Self::CHART_DIRECTIVE,
            "el tipo de gráfico, las series y ejes, y una frase sobre lo que muestra",
            llm_client,
        )
    }

    pub fn research(llm_client: SharedLlmClient) -> Self {
        Self::new(
            AgentKind::Research,
            Self::RESEARCH_DIRECTIVE,
            "## Hallazgos, ## Fuentes sugeridas, ## Preguntas abiertas",
            llm_client,
        )
    }

    pub fn direct(llm_client: SharedLlmClient) -> Self {
        Self::new(AgentKind::Direct, Self::DIRECT_DIRECTIVE, "", llm_client)
    }

    fn compose_prompt(&self, request: &AgentRequest) -> String {
        let note = artifact_note(&request.context);
        format_prompt(self.body_hint, request, note.as_deref())
    }
}

#[async_trait]
impl AgentBehavior for Specialist {
    fn kind(&self) -> AgentKind {
        self.kind
    }

    #[instrument(skip_all, fields(agent = %self.kind, conversation_id = %request.conversation_id))]
    async fn handle(
        &self,
        request: AgentRequest,
        progress: &dyn ProgressObserver,
    ) -> anyhow::Result<AgentResponse> {
        progress.on_progress(ProgressUpdate::new(self.kind, "generating"));
        let prompt = self.compose_prompt(&request);
        let output = self.llm_client.complete(self.directive, &prompt).await?;
        progress.on_progress(ProgressUpdate::new(self.kind, "completed"));
        Ok(AgentResponse::new(output))
    }
}

/// Answers questions about the conversation's documents with page citations.
pub struct PdfAgent {
    llm_client: SharedLlmClient,
    documents: SharedDocumentService,
}

impl PdfAgent {
    const DIRECTIVE: &'static str = "Eres el agente de documentos PDF de Folio. Respondes únicamente con información de los fragmentos proporcionados y citas cada afirmación con su número entre corchetes, por ejemplo [1].";
    const NO_CONTEXT_NOTE: &'static str = "No se encontraron fragmentos relevantes en los documentos de esta conversación. Si la pregunta depende de ellos, dilo claramente y no inventes contenido.";

    pub fn new(llm_client: SharedLlmClient, documents: SharedDocumentService) -> Self {
        Self {
            llm_client,
            documents,
        }
    }

    fn conversation_id(request: &AgentRequest) -> &str {
        match &request.context {
            AgentContext::Pdf { conversation_id } => conversation_id,
            _ => &request.conversation_id,
        }
    }
}

#[async_trait]
impl AgentBehavior for PdfAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Pdf
    }

    #[instrument(skip_all, fields(agent = "pdf", conversation_id = %request.conversation_id))]
    async fn handle(
        &self,
        request: AgentRequest,
        progress: &dyn ProgressObserver,
    ) -> anyhow::Result<AgentResponse> {
        progress.on_progress(ProgressUpdate::new(AgentKind::Pdf, "searching_documents"));
        let conversation_id = Self::conversation_id(&request);
        let context = self
            .documents
            .context_for(conversation_id, &request.input)
            .await;

        progress.on_progress(
            ProgressUpdate::new(AgentKind::Pdf, "generating")
                .with_detail(format!("{} citas", context.citations.len())),
        );

        let grounding = if context.has_context {
            context.context_text.as_str()
        } else {
            Self::NO_CONTEXT_NOTE
        };
        let prompt = format_prompt("", &request, Some(grounding));
        let raw = self.llm_client.complete(Self::DIRECTIVE, &prompt).await?;
        let output = link_citations(&raw, &context.citations);

        progress.on_progress(ProgressUpdate::new(AgentKind::Pdf, "completed"));

        Ok(AgentResponse::with_metadata(
            output,
            json!({
                "has_context": context.has_context,
                "citations": context.citations,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::agents::traits::NoopProgress;
    use crate::citations::{parse_markers, CitationMarker};
    use crate::config::AppConfig;
    use crate::documents::{DocumentService, InMemoryDocumentStore};
    use crate::llm_client::LlmClient;

    /// Replies with a canned answer and remembers every (system, prompt) pair.
    struct ScriptedLlm {
        reply: String,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedLlm {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn last_call(&self) -> (String, String) {
            self.calls
                .lock()
                .expect("lock")
                .last()
                .cloned()
                .expect("at least one call")
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, system: &str, prompt: &str) -> anyhow::Result<String> {
            self.calls
                .lock()
                .expect("lock")
                .push((system.to_string(), prompt.to_string()));
            Ok(self.reply.clone())
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        stages: Mutex<Vec<String>>,
    }

    impl ProgressObserver for RecordingProgress {
        fn on_progress(&self, update: ProgressUpdate) {
            self.stages.lock().expect("lock").push(update.stage);
        }
    }

    #[tokio::test]
    async fn spreadsheet_prompt_requires_cell_citations() {
        let llm = ScriptedLlm::new("listo");
        let agent = Specialist::spreadsheet(llm.clone());
        let request = AgentRequest::new("conv-1", "suma la columna B").with_context(
            AgentContext::Spreadsheet {
                sheet_id: Some("sheet-7".into()),
            },
        );

        let response = agent.handle(request, &NoopProgress).await.expect("handle");
        assert_eq!(response.output, "listo");

        let (system, prompt) = llm.last_call();
        assert!(system.contains("[[cell:REF]]"));
        assert!(prompt.contains("Hoja activa: sheet-7"));
        assert!(prompt.contains("suma la columna B"));
    }

    #[tokio::test]
    async fn direct_prompt_is_just_the_message() {
        let llm = ScriptedLlm::new("hola");
        let agent = Specialist::direct(llm.clone());
        agent
            .handle(AgentRequest::new("conv-1", "  hola  "), &NoopProgress)
            .await
            .expect("handle");
        let (_, prompt) = llm.last_call();
        assert_eq!(prompt, "Mensaje del usuario:\nhola");
    }

    #[tokio::test]
    async fn pdf_agent_links_numerals_to_markers() {
        let documents = Arc::new(DocumentService::new(
            InMemoryDocumentStore::shared(),
            AppConfig::default(),
        ));
        documents
            .ingest(
                "conv-1",
                "presupuesto.txt",
                "text/plain",
                b"El presupuesto anual asciende a 2 millones de euros.".to_vec(),
            )
            .await;

        let llm = ScriptedLlm::new("Son 2 millones [1].");
        let agent = PdfAgent::new(llm.clone(), documents);
        let progress = RecordingProgress::default();
        let request = AgentRequest::new("conv-1", "presupuesto anual").with_context(
            AgentContext::Pdf {
                conversation_id: "conv-1".into(),
            },
        );

        let response = agent.handle(request, &progress).await.expect("handle");

        let markers = parse_markers(&response.output);
        assert_eq!(markers.len(), 1);
        assert!(matches!(
            &markers[0],
            CitationMarker::Page { id: 1, filename, page: Some(1), .. } if filename == "presupuesto.txt"
        ));

        let metadata = response.metadata.expect("metadata");
        assert_eq!(metadata["has_context"], true);
        assert_eq!(metadata["citations"].as_array().map(Vec::len), Some(1));

        let (_, prompt) = llm.last_call();
        assert!(prompt.contains(">>> \"El presupuesto anual"));
        assert_eq!(
            *progress.stages.lock().expect("lock"),
            vec!["searching_documents", "generating", "completed"]
        );
    }

    #[tokio::test]
    async fn pdf_agent_without_documents_warns_the_model() {
        let documents = Arc::new(DocumentService::new(
            InMemoryDocumentStore::shared(),
            AppConfig::default(),
        ));
        let llm = ScriptedLlm::new("No encontré esa información [1].");
        let agent = PdfAgent::new(llm.clone(), documents);

        let response = agent
            .handle(AgentRequest::new("conv-9", "¿qué dice?"), &NoopProgress)
            .await
            .expect("handle");

        assert_eq!(response.output, "No encontré esa información [1].");
        let (_, prompt) = llm.last_call();
        assert!(prompt.starts_with(PdfAgent::NO_CONTEXT_NOTE));
    }
}
