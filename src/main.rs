use anyhow::Context;
use sage::cli::output::Output;
use sage::cli::{Cli, Commands, HistoryCommands};
use sage::types::RawDocument;
use sage::utils::logging::init_logging;
use sage::utils::toml_config::{LlmProviderConfig, SageConfig, SageConfigManager};
use sage::ResearchService;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    let manager = Arc::new(
        SageConfigManager::new(&cli.config)
            .with_context(|| format!("failed to load {}", cli.config.display()))?,
    );
    let config = manager.config().as_ref().clone();
    let _log_guard = init_logging(&config.logging, cli.verbose)?;

    tracing::debug!(config = %cli.config.display(), "Configuration loaded");

    match cli.command {
        Commands::Ask {
            query,
            session,
            trace,
        } => ask(manager, &output, &query.join(" "), &session, trace).await,
        Commands::Ingest {
            paths,
            url,
            title,
            authors,
        } => ingest(config, &output, paths, url, title, authors).await,
        Commands::History(command) => history(config, &output, command).await,
        Commands::Config { full, validate } => {
            show_config(&config, &cli.config, &output, full, validate)
        }
    }
}

async fn ask(
    manager: Arc<SageConfigManager>,
    output: &Output,
    query: &str,
    session: &str,
    trace: bool,
) -> anyhow::Result<()> {
    let service = ResearchService::from_manager(manager).await?;

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling run");
            watcher.cancel();
        }
    });

    match service
        .run_research_query_with_cancel(session, query, &cancel)
        .await
    {
        Ok(outcome) => {
            output.report(&outcome, trace);
            Ok(())
        }
        Err(e) => {
            output.error(&e.to_string());
            Err(e.into())
        }
    }
}

fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().replace(['_', '-'], " "))
        .unwrap_or_else(|| path.display().to_string())
}

async fn ingest(
    config: SageConfig,
    output: &Output,
    paths: Vec<PathBuf>,
    url: Option<String>,
    title: Option<String>,
    authors: Vec<String>,
) -> anyhow::Result<()> {
    if paths.is_empty() && url.is_none() {
        output.warning("Nothing to ingest");
        output.hint("Pass one or more files, or --url <URL>");
        return Ok(());
    }

    let service = ResearchService::from_config(config).await?;

    if let Some(url) = url {
        let report = service.ingest_url(&url, title.as_deref()).await?;
        output.success(&format!(
            "Indexed '{}': {} chunks, {} entities, {} relations",
            report.title, report.chunk_count, report.entity_count, report.relation_count
        ));
        return Ok(());
    }

    let total = paths.len();
    for (i, path) in paths.iter().enumerate() {
        output.step(i + 1, total, &path.display().to_string());
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let doc_title = match (&title, total) {
            (Some(t), 1) => t.clone(),
            _ => title_from_path(path),
        };
        let document = RawDocument::new(doc_title, text)
            .with_id(path.display().to_string())
            .with_source(path.display().to_string())
            .with_authors(authors.clone());

        match service.ingest(&document).await {
            Ok(report) => output.success(&format!(
                "{} chunks, {} entities, {} relations",
                report.chunk_count, report.entity_count, report.relation_count
            )),
            Err(e) => output.error(&format!("{}: {}", path.display(), e)),
        }
    }
    Ok(())
}

async fn history(
    config: SageConfig,
    output: &Output,
    command: HistoryCommands,
) -> anyhow::Result<()> {
    let service = ResearchService::from_config(config).await?;

    match command {
        HistoryCommands::List { session, limit } => {
            let records = match limit {
                Some(n) => service.recent_history(&session, n).await?,
                None => service.history(&session).await?,
            };
            output.header(&format!("History: {}", session));
            if records.is_empty() {
                output.info("No runs recorded");
            }
            for (i, record) in records.iter().enumerate() {
                output.record(i + 1, record);
            }
        }
        HistoryCommands::Delete { session } => {
            let removed = service.delete_history(&session).await?;
            output.success(&format!("Removed {} run(s) from '{}'", removed, session));
        }
        HistoryCommands::Sessions => {
            let sessions = service.sessions().await?;
            output.header("Sessions");
            if sessions.is_empty() {
                output.info("No sessions recorded");
            } else {
                output.sessions(&sessions);
            }
        }
    }
    output.newline();
    Ok(())
}

fn show_config(
    config: &SageConfig,
    path: &Path,
    output: &Output,
    full: bool,
    validate: bool,
) -> anyhow::Result<()> {
    output.banner();

    if validate {
        match config.validate() {
            Ok(()) => output.success(&format!("{} is valid", path.display())),
            Err(e) => {
                output.error(&e.to_string());
                return Err(e.into());
            }
        }
    }

    if full {
        println!("{}", toml::to_string_pretty(config)?);
        return Ok(());
    }

    output.header("Configuration");
    output.kv("file", &path.display().to_string());
    output.kv("exists", if path.exists() { "yes" } else { "no (defaults)" });
    let llm = match &config.llm.provider {
        Some(LlmProviderConfig::Ollama { model, .. }) => format!("ollama ({})", model),
        Some(LlmProviderConfig::OpenAI { model, .. }) => format!("openai ({})", model),
        None => "none (heuristic agents)".to_string(),
    };
    output.kv("llm", &llm);
    output.kv("data dir", &config.storage.data_dir.display().to_string());
    output.kv(
        "parallel tasks",
        &config.orchestrator.max_parallel_tasks.to_string(),
    );
    output.kv("tool timeout", &format!("{}s", config.tools.timeout_secs));
    output.hint("Use --full to print the effective TOML");
    output.newline();
    Ok(())
}
