use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use folio_cortex::agents::{AgentResponse, TracingProgress};
use folio_cortex::citations::{parse_markers, search, CitationMarker};
use folio_cortex::config::AppConfig;
use folio_cortex::documents::{
    extract_file, mime_from_path, DocumentIngest, DocumentService, ExtractionReport,
    InMemoryDocumentStore, SharedDocumentService,
};
use folio_cortex::llm_client::build_llm_client_from_env;
use folio_cortex::orchestrator::{route, Orchestrator, Session, SessionState};

#[derive(Parser, Debug)]
#[command(
    name = "folio-cortex",
    about = "Desktop assistant core: ask questions about your documents with page citations"
)]
struct Cli {
    /// Optional one-shot prompt; if omitted the CLI enters interactive mode.
    #[arg(short, long)]
    prompt: Option<String>,

    /// Files to attach to the conversation before the first message.
    #[arg(short = 'f', long = "file")]
    files: Vec<PathBuf>,

    /// Conversation identifier used for the document store and page cache.
    #[arg(long, default_value = "local")]
    conversation: String,

    /// Spreadsheet currently open in the workspace.
    #[arg(long)]
    sheet: Option<String>,

    /// Document currently open in the workspace.
    #[arg(long = "active-document")]
    active_document: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract a PDF or text file and print the per-page report as JSON.
    Extract {
        path: PathBuf,
        /// Override the MIME type inferred from the extension.
        #[arg(long)]
        mime: Option<String>,
        /// Also print the merged, page-marked text.
        #[arg(long)]
        full: bool,
    },
    /// Search a file for a query and print the cited excerpts.
    Search {
        path: PathBuf,
        query: String,
        #[arg(long, default_value_t = 5)]
        max_results: usize,
    },
    /// Show which specialist a message would be routed to.
    Route {
        message: String,
        #[arg(long)]
        document_loaded: bool,
        #[arg(long)]
        active_artifact: bool,
    },
    /// Build the context block the PDF agent would send for a query.
    Context {
        query: String,
        #[arg(short = 'f', long = "file", required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let config = AppConfig::from_env().context("Invalid configuration")?;

    if let Some(command) = cli.command {
        return run_command(command, config).await;
    }

    let llm_client =
        build_llm_client_from_env(true).context("LLM client initialization failed")?;
    let documents: SharedDocumentService = Arc::new(DocumentService::new(
        InMemoryDocumentStore::shared(),
        config,
    ));
    let orchestrator = Orchestrator::with_default_specialists(llm_client, documents.clone());

    let mut session = Session::new(cli.conversation);
    session.active_sheet_id = cli.sheet;
    session.active_document_id = cli.active_document;

    for path in &cli.files {
        attach(&documents, &session, path).await;
    }

    if let Some(prompt) = cli.prompt {
        run_single(&orchestrator, &documents, &mut session, &prompt).await?;
        return Ok(());
    }

    run_repl(&orchestrator, &documents, &mut session).await
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}

async fn run_command(command: Commands, config: AppConfig) -> anyhow::Result<()> {
    match command {
        Commands::Extract { path, mime, full } => {
            let mime = mime.unwrap_or_else(|| mime_from_path(&path).to_string());
            let outcome = extract_file(&path, &mime, config.max_text_length).await;
            let report = ExtractionReport::from(&outcome);
            println!("{}", serde_json::to_string_pretty(&report)?);
            if let (true, Ok(result)) = (full, &outcome) {
                println!("\n{}", result.merged_content);
            }
        }
        Commands::Search {
            path,
            query,
            max_results,
        } => {
            let result = extract_file(&path, mime_from_path(&path), config.max_text_length)
                .await
                .with_context(|| format!("Failed to extract {}", path.display()))?;
            let hits = search(&query, &result.pages, max_results);
            if hits.is_empty() {
                println!("No matches for \"{query}\".");
            }
            for hit in &hits {
                println!(
                    "p. {} [{}..{}] {}",
                    hit.page_number, hit.start_index, hit.end_index, hit.text
                );
            }
        }
        Commands::Route {
            message,
            document_loaded,
            active_artifact,
        } => {
            let selection = route(
                &message,
                SessionState {
                    has_document_loaded: document_loaded,
                    has_active_artifact: active_artifact,
                },
            );
            println!("{}", serde_json::to_string_pretty(&selection)?);
        }
        Commands::Context { query, files } => {
            let documents = DocumentService::new(InMemoryDocumentStore::shared(), config);
            let session = Session::new("cli-context");
            for path in &files {
                attach(&documents, &session, path).await;
            }
            let context = documents.context_for(&session.conversation_id, &query).await;
            if context.has_context {
                println!("{}", context.context_text);
            } else {
                println!("No document context available.");
            }
        }
    }

    Ok(())
}

async fn attach(documents: &DocumentService, session: &Session, path: &Path) -> DocumentIngest {
    let ingest = documents.ingest_file(&session.conversation_id, path).await;
    if ingest.report.success {
        info!(
            filename = %ingest.filename,
            pages = ingest.report.page_count,
            "Attached document"
        );
    } else {
        warn!(
            filename = %ingest.filename,
            error = ingest.report.error.as_deref().unwrap_or("unknown"),
            "Document could not be attached"
        );
    }
    ingest
}

async fn run_single(
    orchestrator: &Orchestrator,
    documents: &DocumentService,
    session: &mut Session,
    prompt: &str,
) -> anyhow::Result<()> {
    session.has_document_loaded = documents.has_documents(&session.conversation_id).await;

    let response: AgentResponse = orchestrator
        .dispatch(session, prompt, &TracingProgress)
        .await
        .map_err(|err| {
            error!(?err, "Agent request failed");
            err
        })?
        .into_output();

    println!("\nFolio:\n{}\n", response.output);
    print_sources(&response.output);
    Ok(())
}

fn print_sources(output: &str) {
    let pages: Vec<String> = parse_markers(output)
        .into_iter()
        .filter_map(|marker| match marker {
            CitationMarker::Page {
                id, filename, page, ..
            } => Some(match page {
                Some(page) => format!("[{id}] {filename}, p. {page}"),
                None => format!("[{id}] {filename}"),
            }),
            CitationMarker::Cell { .. } => None,
        })
        .collect();

    if pages.is_empty() {
        return;
    }
    println!("Fuentes:");
    for line in pages {
        println!("  {line}");
    }
    println!();
}

async fn run_repl(
    orchestrator: &Orchestrator,
    documents: &DocumentService,
    session: &mut Session,
) -> anyhow::Result<()> {
    println!(
        "Folio Cortex CLI ready. ':attach <path>' adds a document, ':clear' forgets them, 'exit' quits.\n"
    );
    let stdin = io::stdin();

    loop {
        print!("You > ");
        io::stdout().flush()?;

        let mut buffer = String::new();
        if stdin.read_line(&mut buffer)? == 0 {
            break;
        }
        let trimmed = buffer.trim();

        if trimmed.eq_ignore_ascii_case("exit") {
            info!("User exited CLI");
            break;
        }

        if trimmed.is_empty() {
            continue;
        }

        if let Some(path) = trimmed.strip_prefix(":attach ") {
            let ingest = attach(documents, session, Path::new(path.trim())).await;
            println!("{}\n", serde_json::to_string_pretty(&ingest)?);
            continue;
        }

        if trimmed == ":clear" {
            let removed = documents.clear(&session.conversation_id).await?;
            println!("Removed {removed} document(s).\n");
            continue;
        }

        run_single(orchestrator, documents, session, trimmed).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_accepts_prompt_and_files_headlessly() {
        // Ensures CLI parsing stays non-interactive under `cargo test`.
        let cli = Cli::parse_from([
            "folio-cortex",
            "--prompt",
            "¿qué dice el documento?",
            "--file",
            "informe.pdf",
            "-f",
            "notas.txt",
        ]);
        assert_eq!(cli.prompt.as_deref(), Some("¿qué dice el documento?"));
        assert_eq!(
            cli.files,
            vec![PathBuf::from("informe.pdf"), PathBuf::from("notas.txt")]
        );
        assert_eq!(cli.conversation, "local");
        assert!(cli.command.is_none());
    }

    #[test]
    fn cli_help_is_emitted_as_error_kind() {
        // Clap returns DisplayHelp as an error; asserting keeps this headless and fast.
        let err = Cli::command()
            .try_get_matches_from(["folio-cortex", "--help"])
            .expect_err("help should short-circuit");
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn route_subcommand_parses_session_flags() {
        let cli = Cli::parse_from([
            "folio-cortex",
            "route",
            "crea una hoja de cálculo",
            "--document-loaded",
        ]);
        match cli.command {
            Some(Commands::Route {
                message,
                document_loaded,
                active_artifact,
            }) => {
                assert_eq!(message, "crea una hoja de cálculo");
                assert!(document_loaded);
                assert!(!active_artifact);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn context_subcommand_requires_a_file() {
        let err = Cli::command()
            .try_get_matches_from(["folio-cortex", "context", "presupuesto"])
            .expect_err("context without files should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
