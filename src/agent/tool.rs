//! Tool type definitions for function-calling.
//!
//! Provides provider-agnostic types for tool definitions, calls, and results,
//! plus the two tool sets the agents use: document retrieval and the SQL
//! toolkit scoped to one table.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Name of the document retrieval tool.
pub const RETRIEVE_TOOL: &str = "retrieve";
/// Lists the tables the SQL agent may use.
pub const SQL_LIST_TABLES_TOOL: &str = "sql_db_list_tables";
/// Describes table schemas with sample rows.
pub const SQL_SCHEMA_TOOL: &str = "sql_db_schema";
/// Validates a query without running it.
pub const SQL_QUERY_CHECKER_TOOL: &str = "sql_db_query_checker";
/// Runs a query.
pub const SQL_QUERY_TOOL: &str = "sql_db_query";

/// A tool definition that can be sent to an LLM for function-calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (must match dispatch table in executor).
    pub name: String,
    /// Human-readable description of what the tool does.
    pub description: String,
    /// JSON Schema object describing the tool's parameters.
    pub parameters: serde_json::Value,
}

/// A tool call requested by the LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this call (assigned by the provider).
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON-encoded arguments for the tool.
    pub arguments: String,
}

/// The result of executing a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// ID of the tool call this result corresponds to.
    pub tool_call_id: String,
    /// Result content, or an error description the model can act on.
    pub content: String,
    /// Whether this result represents an error.
    pub is_error: bool,
}

impl ToolResult {
    /// A successful result.
    #[must_use]
    pub fn ok(tool_call_id: &str, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.to_string(),
            content: content.into(),
            is_error: false,
        }
    }

    /// An error result returned to the model.
    #[must_use]
    pub fn error(tool_call_id: &str, message: impl std::fmt::Display) -> Self {
        Self {
            tool_call_id: tool_call_id.to_string(),
            content: format!("Error: {message}"),
            is_error: true,
        }
    }
}

/// A set of tool definitions scoped to an agent role.
///
/// - Document agent: `retrieve`
/// - SQL agent: `sql_db_list_tables`, `sql_db_schema`,
///   `sql_db_query_checker`, `sql_db_query`
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    definitions: Vec<ToolDefinition>,
}

impl ToolSet {
    /// Returns the tool definitions in this set.
    #[must_use]
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Consumes the set, returning its definitions.
    #[must_use]
    pub fn into_definitions(self) -> Vec<ToolDefinition> {
        self.definitions
    }

    /// Returns `true` if this set contains no tools.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Returns the number of tools in this set.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Tool set for the document agent.
    #[must_use]
    pub fn retrieval() -> Self {
        Self {
            definitions: vec![def_retrieve()],
        }
    }

    /// Tool set for the SQL agent.
    #[must_use]
    pub fn sql() -> Self {
        Self {
            definitions: vec![
                def_sql_list_tables(),
                def_sql_schema(),
                def_sql_query_checker(),
                def_sql_query(),
            ],
        }
    }

    /// Empty tool set (no tools available).
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Tool schema definitions
// ---------------------------------------------------------------------------

fn def_retrieve() -> ToolDefinition {
    ToolDefinition {
        name: RETRIEVE_TOOL.to_string(),
        description: "Retrieve the document passages most relevant to the question.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search text describing the information needed."
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
    }
}

fn def_sql_list_tables() -> ToolDefinition {
    ToolDefinition {
        name: SQL_LIST_TABLES_TOOL.to_string(),
        description: "List the tables available for querying, as a comma-separated string."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        }),
    }
}

fn def_sql_schema() -> ToolDefinition {
    ToolDefinition {
        name: SQL_SCHEMA_TOOL.to_string(),
        description: "Get the schema and sample rows for the given tables. Call \
                       sql_db_list_tables first to be sure the tables exist. Must be called \
                       before sql_db_query."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "table_names": {
                    "type": "string",
                    "description": "Comma-separated list of table names."
                }
            },
            "required": ["table_names"],
            "additionalProperties": false
        }),
    }
}

fn def_sql_query_checker() -> ToolDefinition {
    ToolDefinition {
        name: SQL_QUERY_CHECKER_TOOL.to_string(),
        description: "Check whether a SQL query is valid before executing it. Returns the \
                       query that would run, or a description of the problem."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The SQL query to check."
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
    }
}

fn def_sql_query() -> ToolDefinition {
    ToolDefinition {
        name: SQL_QUERY_TOOL.to_string(),
        description: "Execute a SQL SELECT query and return the rows as JSON. If the query \
                       is wrong an error is returned; rewrite it and try again."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "A detailed and correct SQL SELECT query."
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
    }
}
