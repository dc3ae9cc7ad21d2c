//! Tool executors that dispatch tool calls to the retriever and the database.
//!
//! Each executor owns the state of one agent run. Two failure classes are
//! kept apart: problems the model can fix (bad SQL, wrong table, a query
//! before the schema step) come back as error [`ToolResult`]s, while
//! infrastructure failures abort the run with [`AgentError`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::tool::{
    RETRIEVE_TOOL, SQL_LIST_TABLES_TOOL, SQL_QUERY_CHECKER_TOOL, SQL_QUERY_TOOL, SQL_SCHEMA_TOOL,
    ToolCall, ToolDefinition, ToolResult, ToolSet,
};
use crate::error::{AgentError, SqlError};
use crate::index::retriever::Retriever;
use crate::sql::SqlDatabase;

/// Maximum raw byte length of tool argument JSON from the LLM.
const MAX_TOOL_ARGS_LEN: usize = 100_000;

/// Executes the tool calls of one agent.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Definitions of the tools this executor serves.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Runs one tool call.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ToolExecution`] for an unknown tool, malformed
    /// arguments or a failure the model cannot act on, and
    /// [`AgentError::RateLimited`] when a backing service throttles.
    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, AgentError>;
}

fn tool_error(name: &str, message: impl Into<String>) -> AgentError {
    AgentError::ToolExecution {
        name: name.to_string(),
        message: message.into(),
    }
}

/// Parses tool arguments, rejecting oversized payloads first.
fn parse_args<T: DeserializeOwned>(call: &ToolCall) -> Result<T, AgentError> {
    if call.arguments.len() > MAX_TOOL_ARGS_LEN {
        return Err(tool_error(
            &call.name,
            format!(
                "tool arguments too large ({} bytes, max {MAX_TOOL_ARGS_LEN})",
                call.arguments.len()
            ),
        ));
    }
    // Some models send an empty string for tools without parameters.
    let raw = if call.arguments.trim().is_empty() {
        "{}"
    } else {
        call.arguments.as_str()
    };
    serde_json::from_str(raw).map_err(|e| tool_error(&call.name, format!("invalid arguments: {e}")))
}

fn unknown_tool(call: &ToolCall) -> AgentError {
    tool_error(&call.name, "unknown tool")
}

#[derive(Deserialize)]
struct QueryArgs {
    query: String,
}

// ---------------------------------------------------------------------------
// Document retrieval
// ---------------------------------------------------------------------------

/// Serves the `retrieve` tool over one document index.
#[derive(Debug)]
pub struct RetrievalTools {
    retriever: Retriever,
}

impl RetrievalTools {
    /// Wraps a retriever.
    #[must_use]
    pub const fn new(retriever: Retriever) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl ToolExecutor for RetrievalTools {
    fn definitions(&self) -> Vec<ToolDefinition> {
        ToolSet::retrieval().into_definitions()
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, AgentError> {
        if call.name != RETRIEVE_TOOL {
            return Err(unknown_tool(call));
        }
        let args: QueryArgs = parse_args(call)?;
        let passages = self.retriever.retrieve(&args.query).await.map_err(|e| {
            if e.is_rate_limited() {
                AgentError::RateLimited {
                    message: e.to_string(),
                }
            } else {
                tool_error(RETRIEVE_TOOL, e.to_string())
            }
        })?;
        debug!(query = %args.query, bytes = passages.len(), "retrieved passages");
        Ok(ToolResult::ok(&call.id, passages))
    }
}

// ---------------------------------------------------------------------------
// SQL toolkit
// ---------------------------------------------------------------------------

/// `table_names` may arrive as a comma-separated string or a list.
#[derive(Deserialize)]
#[serde(untagged)]
enum TableNames {
    Joined(String),
    List(Vec<String>),
}

impl TableNames {
    fn into_vec(self) -> Vec<String> {
        let raw = match self {
            Self::Joined(s) => s.split(',').map(str::to_string).collect(),
            Self::List(v) => v,
        };
        raw.into_iter()
            .map(|t| t.trim().trim_matches(['"', '`', '\'']).to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

#[derive(Deserialize)]
struct SchemaArgs {
    table_names: TableNames,
}

/// Serves the SQL toolkit for one agent run.
///
/// `sql_db_query` is refused until `sql_db_schema` has succeeded in the
/// same run.
#[derive(Debug)]
pub struct SqlTools {
    db: Arc<SqlDatabase>,
    schema_inspected: AtomicBool,
}

impl SqlTools {
    /// Creates fresh run state over `db`.
    #[must_use]
    pub const fn new(db: Arc<SqlDatabase>) -> Self {
        Self {
            db,
            schema_inspected: AtomicBool::new(false),
        }
    }

    /// Whether `sql_db_schema` has succeeded in this run.
    #[must_use]
    pub fn schema_inspected(&self) -> bool {
        self.schema_inspected.load(Ordering::SeqCst)
    }

    fn list_tables(&self) -> Result<String, SqlError> {
        Ok(self.db.usable_tables()?.join(", "))
    }

    fn schema(&self, args: SchemaArgs) -> Result<String, SqlError> {
        let tables = args.table_names.into_vec();
        if tables.is_empty() {
            return Err(SqlError::Rejected {
                reason: "no table names given".to_string(),
            });
        }
        let info = self.db.table_info(&tables)?;
        self.schema_inspected.store(true, Ordering::SeqCst);
        Ok(info)
    }

    fn query(&self, args: &QueryArgs) -> Result<String, SqlError> {
        if !self.schema_inspected() {
            return Err(SqlError::Rejected {
                reason: format!(
                    "inspect the table with {SQL_SCHEMA_TOOL} before running {SQL_QUERY_TOOL}"
                ),
            });
        }
        self.db.run(&args.query)
    }
}

#[async_trait]
impl ToolExecutor for SqlTools {
    fn definitions(&self) -> Vec<ToolDefinition> {
        ToolSet::sql().into_definitions()
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, AgentError> {
        let result = match call.name.as_str() {
            SQL_LIST_TABLES_TOOL => self.list_tables(),
            SQL_SCHEMA_TOOL => self.schema(parse_args(call)?),
            SQL_QUERY_CHECKER_TOOL => self.db.check(&parse_args::<QueryArgs>(call)?.query),
            SQL_QUERY_TOOL => self.query(&parse_args(call)?),
            _ => return Err(unknown_tool(call)),
        };

        match result {
            Ok(content) => Ok(ToolResult::ok(&call.id, content)),
            Err(SqlError::Lock) => Err(tool_error(&call.name, SqlError::Lock.to_string())),
            Err(e) => {
                debug!(tool = %call.name, error = %e, "tool returned error to model");
                Ok(ToolResult::error(&call.id, e))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::core::Chunk;
    use crate::embedding::{Embedder, HashEmbedder};
    use crate::index::VectorIndex;
    use crate::sql::tests::sample_database;

    fn call(name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: format!("call_{name}"),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    fn sql_tools() -> SqlTools {
        SqlTools::new(Arc::new(sample_database()))
    }

    async fn run(tools: &dyn ToolExecutor, name: &str, args: &str) -> ToolResult {
        tools
            .execute(&call(name, args))
            .await
            .unwrap_or_else(|e| panic!("{name} aborted: {e}"))
    }

    #[tokio::test]
    async fn test_list_tables_hides_other_tables() {
        let tools = sql_tools();
        let result = run(&tools, SQL_LIST_TABLES_TOOL, "").await;
        assert!(!result.is_error);
        assert_eq!(result.content, "gold_programas_sociais");
    }

    #[tokio::test]
    async fn test_query_requires_schema_first() {
        let tools = sql_tools();
        let query = r#"{"query":"SELECT COUNT(*) AS n FROM gold_programas_sociais"}"#;

        let refused = run(&tools, SQL_QUERY_TOOL, query).await;
        assert!(refused.is_error);
        assert!(refused.content.contains(SQL_SCHEMA_TOOL), "{}", refused.content);

        let schema = run(
            &tools,
            SQL_SCHEMA_TOOL,
            r#"{"table_names":"gold_programas_sociais"}"#,
        )
        .await;
        assert!(!schema.is_error, "{}", schema.content);
        assert!(tools.schema_inspected());

        let rows = run(&tools, SQL_QUERY_TOOL, query).await;
        assert!(!rows.is_error, "{}", rows.content);
        assert_eq!(rows.content, r#"[{"n":6}]"#);
    }

    #[tokio::test]
    async fn test_schema_accepts_list_and_rejects_other_tables() {
        let tools = sql_tools();
        let listed = run(
            &tools,
            SQL_SCHEMA_TOOL,
            r#"{"table_names":["gold_programas_sociais"]}"#,
        )
        .await;
        assert!(!listed.is_error, "{}", listed.content);

        let fresh = sql_tools();
        let denied = run(&fresh, SQL_SCHEMA_TOOL, r#"{"table_names":"secrets"}"#).await;
        assert!(denied.is_error);
        assert!(denied.content.contains("secrets"), "{}", denied.content);
        assert!(!fresh.schema_inspected());
    }

    #[tokio::test]
    async fn test_query_checker_and_guard_errors_go_to_model() {
        let tools = sql_tools();
        let checked = run(
            &tools,
            SQL_QUERY_CHECKER_TOOL,
            r#"{"query":"SELECT uf FROM gold_programas_sociais;"}"#,
        )
        .await;
        assert!(!checked.is_error, "{}", checked.content);
        assert!(checked.content.contains("LIMIT 12"), "{}", checked.content);

        let bad_column = run(
            &tools,
            SQL_QUERY_CHECKER_TOOL,
            r#"{"query":"SELECT missing FROM gold_programas_sociais"}"#,
        )
        .await;
        assert!(bad_column.is_error);
        assert!(bad_column.content.starts_with("Error: "));

        let mutation = run(
            &tools,
            SQL_QUERY_CHECKER_TOOL,
            r#"{"query":"DELETE FROM gold_programas_sociais"}"#,
        )
        .await;
        assert!(mutation.is_error);
    }

    #[tokio::test]
    async fn test_infrastructure_failures_abort() {
        let tools = sql_tools();
        let unknown = tools.execute(&call("drop_everything", "{}")).await;
        assert!(matches!(unknown, Err(AgentError::ToolExecution { .. })));

        let malformed = tools.execute(&call(SQL_QUERY_TOOL, "{not json")).await;
        assert!(matches!(
            malformed,
            Err(AgentError::ToolExecution { ref message, .. }) if message.contains("invalid arguments")
        ));

        let huge = format!(r#"{{"query":"{}"}}"#, "x".repeat(MAX_TOOL_ARGS_LEN));
        let oversized = tools.execute(&call(SQL_QUERY_TOOL, &huge)).await;
        assert!(matches!(oversized, Err(AgentError::ToolExecution { .. })));
    }

    #[tokio::test]
    async fn test_retrieve_tool() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::default());
        let mut index = VectorIndex::new("test.pdf");
        for (i, text) in ["renda familiar per capita", "vacinação infantil"]
            .into_iter()
            .enumerate()
        {
            let vector = embedder
                .embed_query(text)
                .await
                .unwrap_or_else(|e| panic!("embed: {e}"));
            let chunk = Chunk {
                content: text.to_string(),
                page: 1,
                index: i,
                char_range: 0..text.chars().count(),
            };
            index
                .insert(chunk, vector)
                .unwrap_or_else(|e| panic!("insert: {e}"));
        }
        let tools = RetrievalTools::new(Retriever::new(Arc::new(index), embedder, 1));

        let result = run(&tools, RETRIEVE_TOOL, r#"{"query":"renda familiar"}"#).await;
        assert_eq!(result.content, "renda familiar per capita");

        let wrong = tools.execute(&call(SQL_QUERY_TOOL, "{}")).await;
        assert!(matches!(wrong, Err(AgentError::ToolExecution { .. })));
    }
}
