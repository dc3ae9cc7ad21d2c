//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::chunking::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};

/// Default credentials file.
pub const DEFAULT_ENV_FILE: &str = ".env";

/// docquery: ask questions about a PDF or a database table.
///
/// Answers come from a tool-using LLM agent: document questions go through
/// semantic retrieval over the PDF, table questions through a read-only
/// SQL toolkit.
#[derive(Parser, Debug)]
#[command(name = "docquery")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Credentials file with `KEY=value` lines.
    #[arg(long, global = true, env = "DOCQUERY_ENV_FILE", default_value = DEFAULT_ENV_FILE)]
    pub env_file: PathBuf,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index a PDF and answer a question about it.
    #[command(after_help = r#"Examples:
  docquery ask tese.pdf "Qual é o objetivo do programa?"
  docquery ask relatorio.pdf "Who is eligible?" --top-k 8
  docquery ask tese.pdf "Resuma a conclusão" --context accumulate
  docquery ask tese.pdf "Teste offline" --embedder hash
"#)]
    Ask {
        /// Path to the PDF.
        pdf: PathBuf,

        /// Question to answer.
        question: String,

        /// Passages returned by the retrieve tool.
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Maximum chunk size in characters.
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Characters shared between neighbouring chunks.
        #[arg(long, default_value_t = DEFAULT_OVERLAP)]
        overlap: usize,

        /// Embedding backend: openai or hash.
        #[arg(long, default_value = "openai")]
        embedder: String,

        /// Answer context: latest (last tool output) or accumulate (all).
        #[arg(long, default_value = "latest")]
        context: String,

        /// Directory containing prompt template files.
        #[arg(long, env = "DOCQUERY_PROMPT_DIR")]
        prompt_dir: Option<PathBuf>,
    },

    /// Answer a question from the database table.
    #[command(after_help = r#"Examples:
  docquery sql "Quantos beneficiários existem em SP?"
  docquery sql "Top 5 programs by value" --database sqlite://dados.db
  docquery --format json sql "Total por UF" --table gold_programas_sociais
"#)]
    Sql {
        /// Question to answer.
        question: String,

        /// Connection string (`sqlite://path` or `sqlite::memory:`).
        #[arg(long, env = "DOCQUERY_DATABASE_URL")]
        database: Option<String>,

        /// The only table the agent may query.
        #[arg(long, env = "DOCQUERY_TABLE")]
        table: Option<String>,

        /// Directory containing prompt template files.
        #[arg(long, env = "DOCQUERY_PROMPT_DIR")]
        prompt_dir: Option<PathBuf>,
    },

    /// Split a PDF into chunks without calling any service.
    #[command(after_help = r#"Examples:
  docquery chunks tese.pdf
  docquery chunks tese.pdf --chunk-size 500 --overlap 50
  docquery --format json chunks tese.pdf | jq '.chunks | length'
"#)]
    Chunks {
        /// Path to the PDF.
        pdf: PathBuf,

        /// Maximum chunk size in characters.
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Characters shared between neighbouring chunks.
        #[arg(long, default_value_t = DEFAULT_OVERLAP)]
        overlap: usize,

        /// Preview length in characters.
        #[arg(long, default_value = "80")]
        preview_len: usize,
    },

    /// Write the default prompt templates for customization.
    InitPrompts {
        /// Target directory (defaults to `~/.config/docquery/prompts`).
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ask_defaults() {
        let cli = Cli::try_parse_from(["docquery", "ask", "tese.pdf", "Qual o tema?"])
            .unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert_eq!(cli.format, "text");
        match cli.command {
            Commands::Ask {
                pdf,
                question,
                top_k,
                chunk_size,
                overlap,
                embedder,
                context,
                ..
            } => {
                assert_eq!(pdf, PathBuf::from("tese.pdf"));
                assert_eq!(question, "Qual o tema?");
                assert_eq!(top_k, None);
                assert_eq!(chunk_size, 1000);
                assert_eq!(overlap, 200);
                assert_eq!(embedder, "openai");
                assert_eq!(context, "latest");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "docquery",
            "chunks",
            "a.pdf",
            "--format",
            "json",
            "--env-file",
            "creds.env",
            "-v",
        ])
        .unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert_eq!(cli.format, "json");
        assert_eq!(cli.env_file, PathBuf::from("creds.env"));
        assert!(cli.verbose);
    }

    #[test]
    fn test_missing_question_is_rejected() {
        assert!(Cli::try_parse_from(["docquery", "ask", "tese.pdf"]).is_err());
    }
}
