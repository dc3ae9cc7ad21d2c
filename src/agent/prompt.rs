//! System prompts for the two agents.
//!
//! Prompts can be overridden by markdown files in a prompt directory; any
//! missing file falls back to the compiled-in default.

use std::path::{Path, PathBuf};

/// System prompt for answer generation over retrieved passages.
///
/// The retrieved context is appended after a blank line.
pub const ANSWER_SYSTEM_PROMPT: &str = "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, say that you don't know. \
Use three sentences maximum and keep the answer concise.";

/// System prompt for the SQL agent.
///
/// `{table}` and `{row_limit}` are substituted by [`PromptSet::sql_for`].
pub const SQL_SYSTEM_PROMPT: &str = r"You are an agent designed to interact with a SQL database.

Every query MUST be made only against the table named `{table}`.

Ignore any other table. If the question cannot be answered with the data in `{table}`, tell the user so.

Write a syntactically correct SQL query for the user's question, run it, and give the answer in the same language as the question. Never select all columns unless explicitly asked; select only the relevant ones.

Never use data modification statements (INSERT, UPDATE, DELETE, DROP).

Always limit results to at most {row_limit} rows unless the user explicitly asks for more.

Check the structure of the table before writing your query.";

/// Default prompt directory under user config.
const DEFAULT_PROMPT_DIR: &str = ".config/docquery/prompts";

/// Environment variable naming the prompt directory.
pub const PROMPT_DIR_ENV: &str = "DOCQUERY_PROMPT_DIR";

/// Filename for the answer prompt template.
const ANSWER_FILENAME: &str = "answer.md";
/// Filename for the SQL prompt template.
const SQL_FILENAME: &str = "sql.md";

/// A set of system prompts for all agents.
///
/// Loaded from external template files when available, falling back to
/// compiled-in defaults. Use [`PromptSet::load`] to resolve the prompt
/// directory from CLI flags, environment variables, or the default path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    /// System prompt template for answer generation.
    pub answer: String,
    /// System prompt template for the SQL agent.
    pub sql: String,
}

impl PromptSet {
    /// Loads prompts from the given directory, falling back to compiled-in defaults.
    ///
    /// Resolution order for `prompt_dir`:
    /// 1. Explicit `prompt_dir` argument (from `--prompt-dir` CLI flag)
    /// 2. `DOCQUERY_PROMPT_DIR` environment variable
    /// 3. `~/.config/docquery/prompts/`
    ///
    /// Each file is loaded independently; a missing file uses its default.
    #[must_use]
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let resolved_dir = prompt_dir
            .map(PathBuf::from)
            .or_else(|| std::env::var(PROMPT_DIR_ENV).ok().map(PathBuf::from))
            .or_else(Self::default_dir);

        let load_file = |filename: &str, default: &str| -> String {
            resolved_dir
                .as_ref()
                .map(|dir| dir.join(filename))
                .and_then(|path| std::fs::read_to_string(&path).ok())
                .filter(|text| !text.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            answer: load_file(ANSWER_FILENAME, ANSWER_SYSTEM_PROMPT),
            sql: load_file(SQL_FILENAME, SQL_SYSTEM_PROMPT),
        }
    }

    /// Returns compiled-in defaults without checking the filesystem.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            answer: ANSWER_SYSTEM_PROMPT.to_string(),
            sql: SQL_SYSTEM_PROMPT.to_string(),
        }
    }

    /// The SQL prompt with the table name and row limit filled in.
    #[must_use]
    pub fn sql_for(&self, table: &str, row_limit: usize) -> String {
        self.sql
            .replace("{table}", table)
            .replace("{row_limit}", &row_limit.to_string())
    }

    /// Writes the compiled-in default prompts to the given directory.
    ///
    /// Creates the directory if it does not exist. Existing files are
    /// **not** overwritten.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if directory creation or file writing fails.
    pub fn write_defaults(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let templates = [
            (ANSWER_FILENAME, ANSWER_SYSTEM_PROMPT),
            (SQL_FILENAME, SQL_SYSTEM_PROMPT),
        ];

        let mut written = Vec::new();
        for (filename, content) in &templates {
            let path = dir.join(filename);
            if !path.exists() {
                std::fs::write(&path, content)?;
                written.push(path);
            }
        }

        Ok(written)
    }

    /// Returns the default prompt directory under the user's home.
    ///
    /// Returns `None` if the home directory cannot be determined.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(DEFAULT_PROMPT_DIR))
    }
}
