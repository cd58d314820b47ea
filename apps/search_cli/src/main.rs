use std::io::Write;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    load_settings, ApiClient, ApiKeyAdmin, ApiKeyForm, AssistantEditor, AssistantForm,
    ClientSettings, ResponseField, SearchQuery, SearchSession, SessionEvent, SessionSnapshot,
    StreamOutcome,
};
use shared::{
    domain::{
        ApiKeyId, ApiKeyRole, ChatSessionId, DocumentSetId, PersonaId, ToolId, UserGroupId,
    },
    protocol::SearchFilters,
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Ask the document search backend and manage assistants")]
struct Args {
    /// Overrides the configured backend base url.
    #[arg(long)]
    api_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream an answer for a question.
    Search {
        query: String,
        #[arg(long)]
        persona: Option<i64>,
        /// Show paced progress phases while the answer streams.
        #[arg(long)]
        narrate: bool,
        #[arg(long = "source")]
        sources: Vec<String>,
        #[arg(long = "document-set")]
        document_sets: Vec<String>,
    },
    /// Show a saved search.
    Session { id: i64 },
    /// List saved searches.
    Sessions,
    #[command(subcommand)]
    ApiKeys(ApiKeyCommand),
    /// Create an assistant.
    Assistant {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: String,
        #[arg(long, default_value = "")]
        system_prompt: String,
        #[arg(long, default_value = "")]
        task_prompt: String,
        #[arg(long)]
        num_chunks: Option<String>,
        #[arg(long)]
        search_tool: Option<i64>,
        #[arg(long)]
        no_search: bool,
        #[arg(long = "document-set")]
        document_sets: Vec<i64>,
        #[arg(long)]
        private: bool,
        #[arg(long = "group")]
        groups: Vec<i64>,
    },
}

#[derive(Subcommand, Debug)]
enum ApiKeyCommand {
    List,
    Create {
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long)]
        admin: bool,
    },
    Regenerate { id: i64 },
    Delete { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(url) = args.api_url {
        settings.api_base_url = url;
    }
    let api = ApiClient::from_settings(&settings).context("building api client")?;

    match args.command {
        Command::Search {
            query,
            persona,
            narrate,
            sources,
            document_sets,
        } => {
            let filters = SearchFilters {
                source_type: (!sources.is_empty()).then_some(sources),
                document_set: (!document_sets.is_empty()).then_some(document_sets),
                ..SearchFilters::default()
            };
            let query = SearchQuery::new(query, persona.map_or(settings.persona_id, PersonaId))
                .with_filters(filters)
                .with_narration(narrate || settings.narration_enabled);
            run_search(api, &settings, query).await
        }
        Command::Session { id } => {
            let session = SearchSession::new(api, settings.phase_timing());
            session.load_saved(ChatSessionId(id)).await?;
            print_result(&session.snapshot().await);
            Ok(())
        }
        Command::Sessions => {
            let session = SearchSession::new(api, settings.phase_timing());
            for saved in session.list_user_searches().await? {
                println!("{:>6}  {}  {}", saved.id.0, saved.time_created, saved.name);
            }
            Ok(())
        }
        Command::ApiKeys(command) => run_api_keys(ApiKeyAdmin::new(api), command).await,
        Command::Assistant {
            name,
            description,
            system_prompt,
            task_prompt,
            num_chunks,
            search_tool,
            no_search,
            document_sets,
            private,
            groups,
        } => {
            let form = AssistantForm {
                name,
                description,
                system_prompt,
                task_prompt,
                num_chunks: num_chunks.unwrap_or_default(),
                search_tool_id: search_tool.map(ToolId),
                search_tool_enabled: !no_search,
                document_set_ids: document_sets.into_iter().map(DocumentSetId).collect(),
                is_public: !private,
                groups: groups.into_iter().map(UserGroupId).collect(),
                ..AssistantForm::default()
            };
            let mut editor = AssistantEditor::create(api);
            match editor.submit(&form).await {
                Ok(persona) => {
                    println!("created assistant {} ({})", persona.id.0, persona.name);
                    Ok(())
                }
                Err(err) => bail!(err.popup_message()),
            }
        }
    }
}

async fn run_search(api: ApiClient, settings: &ClientSettings, query: SearchQuery) -> Result<()> {
    let session = SearchSession::new(api, settings.phase_timing());
    let mut events = session.subscribe_events();
    let token = session.submit(query).await;

    let mut printed = 0;
    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                token.cancel();
                session.cancel().await;
                eprintln!("cancelled");
                break;
            }
            event = events.recv() => event,
        };

        match event {
            Ok(SessionEvent::PhaseChanged(phase)) if !phase.is_idle() => eprintln!("[{phase}]"),
            Ok(SessionEvent::Updated(ResponseField::Answer)) => {
                let snapshot = session.snapshot().await;
                if let Some(answer) = snapshot.response.answer.as_deref() {
                    if answer.len() > printed {
                        print!("{}", &answer[printed..]);
                        let _ = std::io::stdout().flush();
                        printed = answer.len();
                    }
                }
            }
            Ok(SessionEvent::Finished(_)) => break,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "cli: lagged events"),
            Err(RecvError::Closed) => break,
        }
    }
    if printed > 0 {
        println!();
    }

    let outcome = session.wait().await;
    let snapshot = session.snapshot().await;
    print_sources(&snapshot);
    if outcome == Some(StreamOutcome::Failed) {
        if let Some(error) = snapshot.response.error {
            bail!(error);
        }
    }
    Ok(())
}

fn print_result(snapshot: &SessionSnapshot) {
    if let Some(query) = &snapshot.query {
        println!("Q: {query}");
    }
    if let Some(answer) = &snapshot.response.answer {
        println!("A: {answer}");
    }
    print_sources(snapshot);
}

fn print_sources(snapshot: &SessionSnapshot) {
    for quote in &snapshot.display_quotes {
        let source = quote
            .metadata
            .semantic_identifier
            .as_deref()
            .unwrap_or(&quote.document_id);
        println!("  \"{}\" ({source})", quote.text);
    }
    let Some(documents) = &snapshot.response.documents else {
        return;
    };
    let selected = snapshot.response.selected_doc_indices.as_deref().unwrap_or(&[]);
    for (idx, doc) in documents.iter().enumerate() {
        let marker = if selected.contains(&idx) { "*" } else { " " };
        println!(
            "{marker} [{}] {} {}",
            doc.source_type,
            doc.semantic_identifier,
            doc.link.as_deref().unwrap_or("")
        );
    }
}

async fn run_api_keys(admin: ApiKeyAdmin, command: ApiKeyCommand) -> Result<()> {
    let result = match command {
        ApiKeyCommand::List => admin.list().await.map(|keys| {
            for key in keys {
                println!(
                    "{:>4}  {}  {}",
                    key.api_key_id.0,
                    key.api_key_display,
                    key.api_key_name.as_deref().unwrap_or("-")
                );
            }
        }),
        ApiKeyCommand::Create { name, admin: is_admin } => {
            let role = if is_admin {
                ApiKeyRole::Admin
            } else {
                ApiKeyRole::Basic
            };
            admin
                .create(&ApiKeyForm { name, role })
                .await
                .map(|key| print_secret(key.api_key_id, key.api_key))
        }
        ApiKeyCommand::Regenerate { id } => admin
            .regenerate(ApiKeyId(id))
            .await
            .map(|key| print_secret(key.api_key_id, key.api_key)),
        ApiKeyCommand::Delete { id } => admin.delete(ApiKeyId(id)).await,
    };
    result.map_err(|err| anyhow!(err.popup_message()))
}

fn print_secret(id: ApiKeyId, secret: Option<String>) {
    match secret {
        Some(secret) => println!("api key {}: {secret}", id.0),
        None => println!("api key {} saved", id.0),
    }
}
