//! CLI command implementations.
//!
//! Each handler returns the rendered output; `main` prints it.

#![allow(clippy::format_push_string)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::agent::{
    AgentConfig, ContextMode, DatabaseAgent, DocumentAgent, PromptSet, RetrievalTools,
    create_provider,
};
use crate::chunking::RecursiveSplitter;
use crate::cli::output::{OutputFormat, format_answer, format_chunks};
use crate::cli::parser::{Cli, Commands};
use crate::credentials::{CredentialProfile, load_credentials_if_needed};
use crate::embedding::{EmbedderKind, create_embedder};
use crate::error::{CommandError, Error, IndexError, Result};
use crate::index::{DocumentIndexer, Retriever};
use crate::io::load_pdf_pages;
use crate::sql::{DatabaseConfig, SqlDatabase};

/// Parameters for the `ask` command.
#[derive(Debug, Clone)]
pub struct AskParams<'a> {
    /// PDF to index.
    pub pdf: &'a Path,
    /// Question to answer.
    pub question: &'a str,
    /// Passages returned per retrieval.
    pub top_k: Option<usize>,
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Characters shared between neighbouring chunks.
    pub overlap: usize,
    /// Embedding backend name.
    pub embedder: &'a str,
    /// Answer context mode name.
    pub context: &'a str,
    /// Directory containing prompt template files.
    pub prompt_dir: Option<&'a Path>,
}

/// Parameters for the `sql` command.
#[derive(Debug, Clone)]
pub struct SqlParams<'a> {
    /// Question to answer.
    pub question: &'a str,
    /// Connection string override.
    pub database: Option<&'a str>,
    /// Allowed table override.
    pub table: Option<&'a str>,
    /// Directory containing prompt template files.
    pub prompt_dir: Option<&'a Path>,
}

/// Executes the CLI command.
///
/// # Errors
///
/// Returns an error if the command fails.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);

    match &cli.command {
        Commands::Ask {
            pdf,
            question,
            top_k,
            chunk_size,
            overlap,
            embedder,
            context,
            prompt_dir,
        } => {
            let params = AskParams {
                pdf,
                question,
                top_k: *top_k,
                chunk_size: *chunk_size,
                overlap: *overlap,
                embedder,
                context,
                prompt_dir: prompt_dir.as_deref(),
            };
            cmd_ask(&cli.env_file, &params, cli.verbose, format)
        }
        Commands::Sql {
            question,
            database,
            table,
            prompt_dir,
        } => {
            let params = SqlParams {
                question,
                database: database.as_deref(),
                table: table.as_deref(),
                prompt_dir: prompt_dir.as_deref(),
            };
            cmd_sql(&cli.env_file, &params, cli.verbose, format)
        }
        Commands::Chunks {
            pdf,
            chunk_size,
            overlap,
            preview_len,
        } => cmd_chunks(pdf, *chunk_size, *overlap, *preview_len, format),
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref(), format),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}")).into()
    })
}

/// Indexes the PDF and answers the question with the document agent.
fn cmd_ask(
    env_file: &Path,
    params: &AskParams<'_>,
    verbose: bool,
    format: OutputFormat,
) -> Result<String> {
    let embedder_kind: EmbedderKind = params
        .embedder
        .parse()
        .map_err(CommandError::ExecutionFailed)?;
    let context_mode: ContextMode = params
        .context
        .parse()
        .map_err(CommandError::ExecutionFailed)?;

    let credentials = load_credentials_if_needed(env_file, CredentialProfile::Document)?;
    let mut builder = AgentConfig::builder()
        .credentials(&credentials)
        .from_env()
        .chunk_size(params.chunk_size)
        .chunk_overlap(params.overlap)
        .context_mode(context_mode);
    if let Some(k) = params.top_k {
        builder = builder.retrieval_top_k(k);
    }
    if let Some(dir) = params.prompt_dir {
        builder = builder.prompt_dir(dir);
    }
    let config = builder.build()?;

    let splitter = config.splitter().map_err(IndexError::from)?;
    let embedder = create_embedder(&config, embedder_kind)?;
    let provider = create_provider(&config)?;
    let prompts = PromptSet::load(config.prompt_dir.as_deref());

    let answer = runtime()?.block_on(async move {
        let indexer = DocumentIndexer::new(splitter, embedder, config.embedding_batch_size);
        let index = indexer.index_document(params.pdf).await?;
        info!(source = index.source(), chunks = index.len(), "document indexed");

        let retriever =
            Retriever::new(Arc::new(index), indexer.embedder(), config.retrieval_top_k);
        let agent = DocumentAgent::new(
            provider,
            RetrievalTools::new(retriever),
            config,
            prompts.answer,
        );
        agent
            .answer_question(params.question)
            .await
            .map_err(Error::from)
    })?;

    Ok(format_answer(&answer, verbose, format))
}

/// Answers the question from the configured table.
fn cmd_sql(
    env_file: &Path,
    params: &SqlParams<'_>,
    verbose: bool,
    format: OutputFormat,
) -> Result<String> {
    let credentials = load_credentials_if_needed(env_file, CredentialProfile::Database)?;

    let mut db_config = DatabaseConfig::from_env();
    if let Some(url) = params.database {
        db_config = db_config.with_url(url);
    }
    if let Some(table) = params.table {
        db_config = db_config.with_table(table);
    }

    let mut builder = AgentConfig::builder().credentials(&credentials).from_env();
    if let Some(dir) = params.prompt_dir {
        builder = builder.prompt_dir(dir);
    }
    let config = builder.build()?;

    let db = Arc::new(SqlDatabase::open(&db_config)?);
    let provider = create_provider(&config)?;
    let prompt = PromptSet::load(config.prompt_dir.as_deref())
        .sql_for(&db_config.table, db_config.row_limit);

    let agent = DatabaseAgent::new(provider, db, config, prompt);
    let answer = runtime()?.block_on(agent.answer_from_database(params.question))?;

    Ok(format_answer(&answer, verbose, format))
}

/// Lists the chunks of a PDF.
fn cmd_chunks(
    pdf: &Path,
    chunk_size: usize,
    overlap: usize,
    preview_len: usize,
    format: OutputFormat,
) -> Result<String> {
    let splitter = RecursiveSplitter::new(chunk_size, overlap).map_err(IndexError::from)?;
    let pages = load_pdf_pages(pdf)?;
    let chunks = splitter.split_pages(&pages);
    Ok(format_chunks(
        &pdf.display().to_string(),
        &chunks,
        preview_len,
        format,
    ))
}

/// Writes default prompt templates to a directory.
fn cmd_init_prompts(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let target_dir = dir
        .map(PathBuf::from)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| {
            CommandError::ExecutionFailed(
                "Could not determine home directory for default prompt path".to_string(),
            )
        })?;

    let written = PromptSet::write_defaults(&target_dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write prompt templates: {e}"))
    })?;

    match format {
        OutputFormat::Text => {
            if written.is_empty() {
                Ok(format!(
                    "All prompt templates already exist in: {}\n",
                    target_dir.display()
                ))
            } else {
                let mut output = format!(
                    "Wrote {} prompt template(s) to: {}\n",
                    written.len(),
                    target_dir.display()
                );
                for path in &written {
                    output.push_str(&format!(
                        "  {}\n",
                        path.file_name()
                            .and_then(|n| n.to_str())
                            .unwrap_or("unknown")
                    ));
                }
                output.push_str("\nEdit these files to customize the agents' system prompts.\n");
                Ok(output)
            }
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "directory": target_dir.to_string_lossy(),
                "written": written.iter().map(|p| p.to_string_lossy().into_owned()).collect::<Vec<_>>(),
                "count": written.len()
            });
            Ok(format.to_json(&json))
        }
    }
}
