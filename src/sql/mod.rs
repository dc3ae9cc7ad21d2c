//! Read-only SQL access to one analytical table.
//!
//! [`SqlDatabase`] wraps a SQLite connection and exposes the four
//! operations the SQL agent's tools need. Every model-written statement
//! passes through [`QueryGuard`] first.

pub mod guard;

use std::fmt::Write;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde_json::{Map, Value};

use crate::error::SqlError;

pub use guard::QueryGuard;

/// Table the agent is allowed to query by default.
pub const DEFAULT_TABLE: &str = "gold_programas_sociais";
/// Sample rows shown with a table schema.
pub const DEFAULT_SAMPLE_ROWS: usize = 5;
/// Row limit appended to queries without one.
pub const DEFAULT_ROW_LIMIT: usize = 12;
/// Upper bound for explicit `LIMIT` clauses.
pub const DEFAULT_MAX_ROW_LIMIT: usize = 100;
/// Default connection string.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://docquery.db";

/// Environment variable holding the connection string.
pub const DATABASE_URL_ENV: &str = "DOCQUERY_DATABASE_URL";
/// Environment variable overriding the allowed table.
pub const TABLE_ENV: &str = "DOCQUERY_TABLE";

/// Longest cell value shown in schema samples.
const SAMPLE_VALUE_MAX_CHARS: usize = 100;

/// Connection and scoping settings for the SQL agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// `sqlite://<path>` or `sqlite::memory:`.
    pub url: String,
    /// The only table visible to the agent.
    pub table: String,
    /// Rows included with the schema description.
    pub sample_rows: usize,
    /// Limit appended when a query has none.
    pub row_limit: usize,
    /// Largest limit a query may request.
    pub max_row_limit: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            table: DEFAULT_TABLE.to_string(),
            sample_rows: DEFAULT_SAMPLE_ROWS,
            row_limit: DEFAULT_ROW_LIMIT,
            max_row_limit: DEFAULT_MAX_ROW_LIMIT,
        }
    }
}

impl DatabaseConfig {
    /// Defaults overridden by `DOCQUERY_DATABASE_URL` and `DOCQUERY_TABLE`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(DATABASE_URL_ENV)
            && !url.is_empty()
        {
            config.url = url;
        }
        if let Ok(table) = std::env::var(TABLE_ENV)
            && !table.is_empty()
        {
            config.table = table;
        }
        config
    }

    /// Sets the connection string.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Sets the allowed table.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }
}

/// SQLite connection scoped to a single table.
#[derive(Debug)]
pub struct SqlDatabase {
    conn: Mutex<Connection>,
    config: DatabaseConfig,
    guard: QueryGuard,
}

impl SqlDatabase {
    /// Opens the database named by `config.url`. Files are opened read-only.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Open`] for an unsupported URL or a file that
    /// cannot be opened.
    pub fn open(config: &DatabaseConfig) -> Result<Self, SqlError> {
        let open_err = |message: String| SqlError::Open {
            url: config.url.clone(),
            message,
        };

        let conn = if config.url == "sqlite::memory:" {
            Connection::open_in_memory().map_err(|e| open_err(e.to_string()))?
        } else if let Some(path) = config.url.strip_prefix("sqlite://") {
            if path.is_empty() {
                return Err(open_err("missing database path".to_string()));
            }
            Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(|e| open_err(e.to_string()))?
        } else {
            return Err(open_err(
                "expected sqlite://<path> or sqlite::memory:".to_string(),
            ));
        };

        tracing::debug!(url = %config.url, table = %config.table, "opened database");
        Ok(Self::from_connection(conn, config.clone()))
    }

    /// Wraps an existing connection.
    #[must_use]
    pub fn from_connection(conn: Connection, config: DatabaseConfig) -> Self {
        let guard = QueryGuard::new(config.table.clone(), config.row_limit, config.max_row_limit);
        Self {
            conn: Mutex::new(conn),
            config,
            guard,
        }
    }

    /// Connection and scoping settings.
    #[must_use]
    pub const fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// The guard applied to every query.
    #[must_use]
    pub const fn guard(&self) -> &QueryGuard {
        &self.guard
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqlError> {
        self.conn.lock().map_err(|_| SqlError::Lock)
    }

    fn is_allowed(&self, table: &str) -> bool {
        table.eq_ignore_ascii_case(&self.config.table)
    }

    /// Names of the allowed tables that exist in the database.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if the catalog cannot be read.
    pub fn usable_tables(&self) -> Result<Vec<String>, SqlError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names.into_iter().filter(|n| self.is_allowed(n)).collect())
    }

    /// `CREATE` statement and sample rows for each requested table.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::TableNotAllowed`] for a table outside the
    /// allow-list and [`SqlError::Rejected`] for one that does not exist.
    pub fn table_info(&self, tables: &[String]) -> Result<String, SqlError> {
        let mut out = String::new();
        for table in tables {
            let table = table.trim();
            if !self.is_allowed(table) {
                return Err(SqlError::TableNotAllowed {
                    table: table.to_string(),
                    allowed: self.config.table.clone(),
                });
            }
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(&self.describe_table(table)?);
        }
        Ok(out)
    }

    fn describe_table(&self, table: &str) -> Result<String, SqlError> {
        let conn = self.lock()?;
        let ddl: Option<String> = conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE name = ?1 COLLATE NOCASE",
                [table],
                |row| row.get(0),
            )
            .optional()?;
        let Some(ddl) = ddl else {
            return Err(SqlError::Rejected {
                reason: format!("table '{table}' does not exist"),
            });
        };

        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM \"{}\" LIMIT {}",
            table.replace('"', "\"\""),
            self.config.sample_rows
        ))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([])?;

        let mut sample = String::new();
        let mut count = 0usize;
        while let Some(row) = rows.next()? {
            let cells = (0..columns.len())
                .map(|i| row.get_ref(i).map(sample_cell))
                .collect::<Result<Vec<_>, _>>()?;
            sample.push_str(&cells.join("\t"));
            sample.push('\n');
            count += 1;
        }

        let mut out = format!("{}\n\n/*\n", ddl.trim());
        let _ = writeln!(out, "{count} rows from {table} table:");
        let _ = writeln!(out, "{}", columns.join("\t"));
        out.push_str(&sample);
        out.push_str("*/");
        Ok(out)
    }

    /// Validates `query` and compiles it with `EXPLAIN` without running it.
    ///
    /// Returns the statement that [`SqlDatabase::run`] would execute.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if the guard rejects the query or SQLite cannot
    /// compile it.
    pub fn check(&self, query: &str) -> Result<String, SqlError> {
        let guarded = self.guard.check(query)?;
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("EXPLAIN {guarded}"))?;
        let mut rows = stmt.query([])?;
        while rows.next()?.is_some() {}
        Ok(guarded)
    }

    /// Runs a guarded query and returns the rows as a JSON array of objects.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if the guard rejects the query or it fails.
    pub fn run(&self, query: &str) -> Result<String, SqlError> {
        let guarded = self.guard.check(query)?;
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&guarded)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut obj = Map::new();
            for (i, name) in columns.iter().enumerate() {
                obj.insert(name.clone(), json_value(row.get_ref(i)?));
            }
            out.push(Value::Object(obj));
        }
        tracing::debug!(query = %guarded, rows = out.len(), "query executed");
        Ok(Value::Array(out).to_string())
    }
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
    }
}

fn sample_cell(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t)
            .chars()
            .take(SAMPLE_VALUE_MAX_CHARS)
            .collect(),
        ValueRef::Blob(b) => format!("<blob {} bytes>", b.len()),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
pub(crate) mod tests {
    use super::*;

    /// In-memory database with the default table and a decoy table.
    pub(crate) fn sample_database() -> SqlDatabase {
        let conn = Connection::open_in_memory().unwrap_or_else(|e| panic!("open: {e}"));
        conn.execute_batch(
            "CREATE TABLE gold_programas_sociais (
                 programa TEXT NOT NULL,
                 uf TEXT NOT NULL,
                 beneficiarios INTEGER NOT NULL,
                 valor REAL
             );
             INSERT INTO gold_programas_sociais VALUES
                 ('Bolsa Familia', 'SP', 2500000, 1.5e9),
                 ('Bolsa Familia', 'RJ', 1200000, 7.1e8),
                 ('Auxilio Gas', 'SP', 800000, NULL),
                 ('Auxilio Gas', 'MG', 650000, 1.2e8),
                 ('BPC', 'BA', 400000, 3.3e8),
                 ('BPC', 'PE', 350000, 2.9e8);
             CREATE TABLE secrets (token TEXT);
             INSERT INTO secrets VALUES ('hidden');",
        )
        .unwrap_or_else(|e| panic!("seed: {e}"));
        SqlDatabase::from_connection(conn, DatabaseConfig::default().with_url("sqlite::memory:"))
    }

    #[test]
    fn test_usable_tables_scoped() {
        let db = sample_database();
        let tables = db.usable_tables().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(tables, vec![DEFAULT_TABLE.to_string()]);
    }

    #[test]
    fn test_table_info() {
        let db = sample_database();
        let info = db
            .table_info(&[DEFAULT_TABLE.to_string()])
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(info.starts_with("CREATE TABLE gold_programas_sociais"), "{info}");
        assert!(info.contains("5 rows from gold_programas_sociais table:"), "{info}");
        assert!(info.contains("programa\tuf\tbeneficiarios\tvalor"));
        assert!(info.contains("NULL"));
        assert!(!info.contains("PE"));
    }

    #[test]
    fn test_table_info_rejects_other_tables() {
        let db = sample_database();
        let result = db.table_info(&["secrets".to_string()]);
        assert!(matches!(result, Err(SqlError::TableNotAllowed { .. })));
    }

    #[test]
    fn test_run_returns_json_rows() {
        let db = sample_database();
        let out = db
            .run("SELECT uf, beneficiarios FROM gold_programas_sociais WHERE programa = 'BPC' ORDER BY uf")
            .unwrap_or_else(|e| panic!("{e}"));
        let rows: Value = serde_json::from_str(&out).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(
            rows,
            serde_json::json!([
                {"uf": "BA", "beneficiarios": 400_000},
                {"uf": "PE", "beneficiarios": 350_000}
            ])
        );
    }

    #[test]
    fn test_run_applies_row_limit() {
        let db = SqlDatabase::from_connection(
            Connection::open_in_memory().unwrap_or_else(|e| panic!("{e}")),
            DatabaseConfig {
                row_limit: 2,
                ..DatabaseConfig::default()
            },
        );
        {
            let conn = db.lock().unwrap_or_else(|e| panic!("{e}"));
            conn.execute_batch(
                "CREATE TABLE gold_programas_sociais (n INTEGER);
                 INSERT INTO gold_programas_sociais VALUES (1), (2), (3), (4);",
            )
            .unwrap_or_else(|e| panic!("{e}"));
        }
        let out = db
            .run("SELECT n FROM gold_programas_sociais")
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(out, r#"[{"n":1},{"n":2}]"#);
    }

    #[test]
    fn test_run_rejects_mutation() {
        let db = sample_database();
        assert!(matches!(
            db.run("DELETE FROM gold_programas_sociais"),
            Err(SqlError::Rejected { .. })
        ));
    }

    #[test]
    fn test_run_never_reads_other_tables() {
        let db = sample_database();
        for query in [
            "SELECT * FROM (secrets)",
            "SELECT * FROM gold_programas_sociais g JOIN (secrets) s LIMIT 1",
            "SELECT 1 AS hit FROM gold_programas_sociais WHERE 'hidden' IN secrets",
            "SELECT token FROM secrets WINDOW w AS (ORDER BY token), secrets AS (ORDER BY token)",
        ] {
            let result = db.run(query);
            assert!(
                matches!(result, Err(SqlError::TableNotAllowed { .. })),
                "{query}: {result:?}"
            );
        }
    }

    #[test]
    fn test_check_reports_sql_errors() {
        let db = sample_database();
        let ok = db
            .check("SELECT COUNT(*) FROM gold_programas_sociais")
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(ok.ends_with("LIMIT 12"));
        assert!(matches!(
            db.check("SELECT no_such_column FROM gold_programas_sociais"),
            Err(SqlError::Query(_))
        ));
    }

    #[test]
    fn test_open_urls() {
        let memory = SqlDatabase::open(&DatabaseConfig::default().with_url("sqlite::memory:"));
        assert!(memory.is_ok());
        let bad = SqlDatabase::open(&DatabaseConfig::default().with_url("postgres://x"));
        assert!(matches!(bad, Err(SqlError::Open { .. })));
        let missing = SqlDatabase::open(
            &DatabaseConfig::default().with_url("sqlite:///nonexistent/dir/db.sqlite"),
        );
        assert!(matches!(missing, Err(SqlError::Open { .. })));
    }

    #[test]
    fn test_open_file_is_read_only() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let path = dir.path().join("data.db");
        Connection::open(&path)
            .and_then(|c| c.execute_batch("CREATE TABLE gold_programas_sociais (n INTEGER);"))
            .unwrap_or_else(|e| panic!("{e}"));

        let url = format!("sqlite://{}", path.display());
        let db = SqlDatabase::open(&DatabaseConfig::default().with_url(url))
            .unwrap_or_else(|e| panic!("{e}"));
        let conn = db.lock().unwrap_or_else(|e| panic!("{e}"));
        assert!(conn.execute("INSERT INTO gold_programas_sociais VALUES (1)", []).is_err());
    }
}
