//! Structural validation of model-written SQL.
//!
//! The guard accepts a single read-only statement over one table (plus CTEs
//! defined in the statement) and bounds the number of rows it returns.

use std::fmt::Write;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::SqlError;

/// Keywords that change data or schema, or reach outside the table.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "REPLACE", "ATTACH", "DETACH",
    "PRAGMA", "VACUUM", "TRUNCATE", "GRANT", "REVOKE", "REINDEX",
];

#[allow(clippy::expect_used)]
static KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(r"(?i)\b({})\b", FORBIDDEN_KEYWORDS.join("|"));
    Regex::new(&pattern).expect("keyword pattern is valid")
});

#[allow(clippy::expect_used)]
static TRAILING_LIMIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bLIMIT\s+(\d+)(?:\s*(,)\s*(\d+)|\s+OFFSET\s+\d+)?\s*$")
        .expect("limit pattern is valid")
});

/// Validates and rewrites queries for a single allowed table.
#[derive(Debug, Clone)]
pub struct QueryGuard {
    allowed_table: String,
    row_limit: usize,
    max_row_limit: usize,
}

impl QueryGuard {
    /// Creates a guard. `max_row_limit` is raised to `row_limit` if smaller.
    #[must_use]
    pub fn new(allowed_table: impl Into<String>, row_limit: usize, max_row_limit: usize) -> Self {
        Self {
            allowed_table: allowed_table.into(),
            row_limit,
            max_row_limit: max_row_limit.max(row_limit),
        }
    }

    /// The only table queries may read.
    #[must_use]
    pub fn allowed_table(&self) -> &str {
        &self.allowed_table
    }

    /// Checks `query` and returns the statement that may be executed.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Rejected`] for anything other than a single
    /// read-only statement, and [`SqlError::TableNotAllowed`] when another
    /// table is referenced.
    pub fn check(&self, query: &str) -> Result<String, SqlError> {
        let (clean, masked) = strip_comments(query)?;

        let end = masked.trim_end().len();
        let (mut clean, mut masked) = (clean[..end].to_string(), masked[..end].to_string());
        if masked.ends_with(';') {
            clean.pop();
            masked.pop();
        }
        let start = masked.len() - masked.trim_start().len();
        let end = masked.trim_end().len();
        let clean = clean[start..end].to_string();
        let masked = masked[start..end].to_string();

        if masked.is_empty() {
            return Err(rejected("empty query"));
        }
        if masked.contains(';') {
            return Err(rejected("only a single statement is allowed"));
        }

        let first = masked
            .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        if first != "SELECT" && first != "WITH" {
            return Err(rejected("only SELECT queries are allowed"));
        }

        if let Some(keyword) = forbidden_keyword(&masked) {
            return Err(rejected(&format!("{keyword} statements are not allowed")));
        }

        self.check_tables(&masked)?;
        Ok(self.apply_limit(clean, &masked))
    }

    fn check_tables(&self, masked: &str) -> Result<(), SqlError> {
        let tokens = tokenize(masked);
        let ctes = cte_definitions(&tokens);
        let allowed = self.allowed_table.to_lowercase();

        for table in table_references(&tokens) {
            // A CTE only shadows unqualified names that follow its definition.
            let is_cte = !table.qualified
                && ctes
                    .iter()
                    .any(|(name, at)| *name == table.name && *at < table.position);
            if table.name != allowed && !is_cte {
                return Err(SqlError::TableNotAllowed {
                    table: table.raw,
                    allowed: self.allowed_table.clone(),
                });
            }
        }
        Ok(())
    }

    fn apply_limit(&self, mut clean: String, masked: &str) -> String {
        let Some(caps) = TRAILING_LIMIT_RE.captures(masked) else {
            let _ = write!(clean, " LIMIT {}", self.row_limit);
            return clean;
        };

        // `LIMIT offset, count` puts the row count second.
        let count = if caps.get(2).is_some() { caps.get(3) } else { caps.get(1) };
        let Some(count) = count else { return clean };
        let within = matches!(count.as_str().parse::<usize>(), Ok(n) if n <= self.max_row_limit);
        if !within {
            clean.replace_range(count.range(), &self.max_row_limit.to_string());
        }
        clean
    }
}

fn rejected(reason: &str) -> SqlError {
    SqlError::Rejected {
        reason: reason.to_string(),
    }
}

fn forbidden_keyword(masked: &str) -> Option<String> {
    KEYWORD_RE.find_iter(masked).find_map(|m| {
        let word = m.as_str().to_ascii_uppercase();
        // replace(x, y, z) is a string function, not REPLACE INTO.
        let is_call = masked[m.end()..].trim_start().starts_with('(');
        if word == "REPLACE" && is_call {
            None
        } else {
            Some(word)
        }
    })
}

/// Keywords that close the table list of a `FROM` clause.
const CLAUSE_END_KEYWORDS: &[&str] = &[
    "WHERE", "GROUP", "HAVING", "ORDER", "LIMIT", "WINDOW", "UNION", "EXCEPT", "INTERSECT",
    "SELECT", "VALUES",
];

/// Lexical unit of a masked query.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
    Literal,
    Number,
    Punct(char),
}

impl Token {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Self::Word(w) if w.eq_ignore_ascii_case(keyword))
    }

    fn is_any_keyword(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| self.is_keyword(k))
    }

    fn name(&self) -> Option<&str> {
        match self {
            Self::Word(w) | Self::Quoted(w) => Some(w.as_str()),
            _ => None,
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Splits a comment-free query whose literals are blanked into tokens.
fn tokenize(masked: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = masked.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '\'' => {
                for next in chars.by_ref() {
                    if next == '\'' {
                        break;
                    }
                }
                tokens.push(Token::Literal);
            }
            '"' | '`' | '[' => {
                let close = if c == '[' { ']' } else { c };
                let mut name = String::new();
                while let Some(next) = chars.next() {
                    if next != close {
                        name.push(next);
                    } else if close != ']' && chars.peek() == Some(&close) {
                        chars.next();
                        name.push(close);
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Quoted(name));
            }
            c if is_word_char(c) => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if !is_word_char(next) {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                tokens.push(if c.is_ascii_digit() {
                    Token::Number
                } else {
                    Token::Word(word)
                });
            }
            other => tokens.push(Token::Punct(other)),
        }
    }
    tokens
}

/// A table named by a query.
#[derive(Debug)]
struct TableRef {
    /// Name as written, schema included.
    raw: String,
    /// Lowercased table name without schema.
    name: String,
    qualified: bool,
    /// Token index of the reference.
    position: usize,
}

/// Reads a possibly schema-qualified name at `start`, returning it with the
/// index of the following token.
fn qualified_name(tokens: &[Token], start: usize) -> Option<(TableRef, usize)> {
    let mut parts = vec![tokens.get(start)?.name()?];
    let mut next = start + 1;
    while matches!(tokens.get(next), Some(Token::Punct('.'))) {
        let Some(part) = tokens.get(next + 1).and_then(Token::name) else {
            break;
        };
        parts.push(part);
        next += 2;
    }
    let name = parts.last().map(|p| p.to_lowercase()).unwrap_or_default();
    let table = TableRef {
        raw: parts.join("."),
        name,
        qualified: parts.len() > 1,
        position: start,
    };
    Some((table, next))
}

fn closing_paren(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::Punct('(') => depth += 1,
            Token::Punct(')') => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Names defined by the leading `WITH` clause, with the token index of
/// each definition.
fn cte_definitions(tokens: &[Token]) -> Vec<(String, usize)> {
    let mut ctes = Vec::new();
    if !tokens.first().is_some_and(|t| t.is_keyword("WITH")) {
        return ctes;
    }
    let mut i = 1;
    if tokens.get(i).is_some_and(|t| t.is_keyword("RECURSIVE")) {
        i += 1;
    }

    while let Some(name) = tokens.get(i).and_then(Token::name) {
        let position = i;
        i += 1;
        if matches!(tokens.get(i), Some(Token::Punct('('))) {
            let Some(close) = closing_paren(tokens, i) else {
                break;
            };
            i = close + 1;
        }
        if !tokens.get(i).is_some_and(|t| t.is_keyword("AS")) {
            break;
        }
        i += 1;
        if tokens.get(i).is_some_and(|t| t.is_keyword("NOT")) {
            i += 1;
        }
        if tokens.get(i).is_some_and(|t| t.is_keyword("MATERIALIZED")) {
            i += 1;
        }
        if !matches!(tokens.get(i), Some(Token::Punct('('))) {
            break;
        }
        let Some(close) = closing_paren(tokens, i) else {
            break;
        };
        ctes.push((name.to_lowercase(), position));
        i = close + 1;
        if !matches!(tokens.get(i), Some(Token::Punct(','))) {
            break;
        }
        i += 1;
    }
    ctes
}

/// Every table read by the query: `FROM` and `JOIN` items, including
/// parenthesised ones and comma lists, and the target of `IN <table>`.
fn table_references(tokens: &[Token]) -> Vec<TableRef> {
    let mut tables = Vec::new();
    // One entry per open parenthesis: whether it is inside a table list.
    let mut in_from = vec![false];
    let mut expect_table = false;
    let mut i = 0;

    while let Some(token) = tokens.get(i) {
        match token {
            Token::Punct('(') => {
                let subquery = tokens
                    .get(i + 1)
                    .is_some_and(|t| t.is_any_keyword(&["SELECT", "WITH", "VALUES"]));
                if expect_table && !subquery {
                    in_from.push(true);
                } else {
                    in_from.push(false);
                    expect_table = false;
                }
            }
            Token::Punct(')') => {
                if in_from.len() > 1 {
                    in_from.pop();
                }
                expect_table = false;
            }
            Token::Punct(',') => {
                if in_from.last() == Some(&true) {
                    expect_table = true;
                }
            }
            t if t.is_any_keyword(&["FROM", "JOIN"]) => {
                if let Some(frame) = in_from.last_mut() {
                    *frame = true;
                }
                expect_table = true;
            }
            t if t.is_keyword("IN") => {
                if let Some((table, next)) = qualified_name(tokens, i + 1) {
                    tables.push(table);
                    i = next;
                    continue;
                }
            }
            t if t.is_any_keyword(CLAUSE_END_KEYWORDS) => {
                if let Some(frame) = in_from.last_mut() {
                    *frame = false;
                }
                expect_table = false;
            }
            _ if expect_table => {
                expect_table = false;
                if let Some((table, next)) = qualified_name(tokens, i) {
                    tables.push(table);
                    i = next;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }
    tables
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Code,
    Literal,
    Quoted,
}

/// Removes comments and returns the cleaned query alongside a copy in which
/// string literal contents are blanked, byte for byte.
fn strip_comments(sql: &str) -> Result<(String, String), SqlError> {
    let mut clean = String::with_capacity(sql.len());
    let mut masked = String::with_capacity(sql.len());
    let mut state = ScanState::Code;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            ScanState::Code => match c {
                '-' if chars.peek() == Some(&'-') => {
                    for next in chars.by_ref() {
                        if next == '\n' {
                            clean.push('\n');
                            masked.push('\n');
                            break;
                        }
                    }
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    let mut prev = '\0';
                    let mut closed = false;
                    for next in chars.by_ref() {
                        if prev == '*' && next == '/' {
                            closed = true;
                            break;
                        }
                        prev = next;
                    }
                    if !closed {
                        return Err(rejected("unterminated block comment"));
                    }
                    clean.push(' ');
                    masked.push(' ');
                }
                '\'' => {
                    state = ScanState::Literal;
                    clean.push(c);
                    masked.push(c);
                }
                '"' => {
                    state = ScanState::Quoted;
                    clean.push(c);
                    masked.push(c);
                }
                _ => {
                    clean.push(c);
                    masked.push(c);
                }
            },
            ScanState::Literal => {
                clean.push(c);
                if c == '\'' {
                    if chars.peek() == Some(&'\'') {
                        chars.next();
                        clean.push('\'');
                        masked.push_str("  ");
                    } else {
                        masked.push('\'');
                        state = ScanState::Code;
                    }
                } else {
                    masked.extend(std::iter::repeat_n(' ', c.len_utf8()));
                }
            }
            ScanState::Quoted => {
                clean.push(c);
                masked.push(c);
                if c == '"' {
                    state = ScanState::Code;
                }
            }
        }
    }

    match state {
        ScanState::Code => Ok((clean, masked)),
        ScanState::Literal => Err(rejected("unterminated string literal")),
        ScanState::Quoted => Err(rejected("unterminated quoted identifier")),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use test_case::test_case;

    const TABLE: &str = "gold_programas_sociais";

    fn guard() -> QueryGuard {
        QueryGuard::new(TABLE, 12, 100)
    }

    #[test_case("SELECT * FROM gold_programas_sociais", "SELECT * FROM gold_programas_sociais LIMIT 12" ; "appends default limit")]
    #[test_case("select count(*) from gold_programas_sociais;", "select count(*) from gold_programas_sociais LIMIT 12" ; "strips trailing semicolon")]
    #[test_case("SELECT uf FROM gold_programas_sociais LIMIT 5", "SELECT uf FROM gold_programas_sociais LIMIT 5" ; "keeps small limit")]
    #[test_case("SELECT uf FROM gold_programas_sociais LIMIT 500", "SELECT uf FROM gold_programas_sociais LIMIT 100" ; "clamps large limit")]
    #[test_case("SELECT uf FROM gold_programas_sociais LIMIT 10, 500", "SELECT uf FROM gold_programas_sociais LIMIT 10, 100" ; "clamps comma limit count")]
    #[test_case("SELECT uf FROM gold_programas_sociais -- note\n", "SELECT uf FROM gold_programas_sociais LIMIT 12" ; "strips line comment")]
    #[test_case("SELECT 'DROP TABLE x' AS s FROM gold_programas_sociais", "SELECT 'DROP TABLE x' AS s FROM gold_programas_sociais LIMIT 12" ; "keyword inside literal")]
    #[test_case("WITH t AS (SELECT uf FROM gold_programas_sociais) SELECT * FROM t", "WITH t AS (SELECT uf FROM gold_programas_sociais) SELECT * FROM t LIMIT 12" ; "cte name allowed")]
    #[test_case("SELECT replace(uf, 'A', 'B') FROM gold_programas_sociais", "SELECT replace(uf, 'A', 'B') FROM gold_programas_sociais LIMIT 12" ; "replace function allowed")]
    #[test_case("SELECT * FROM \"gold_programas_sociais\" g WHERE g.uf IN (SELECT uf FROM gold_programas_sociais)", "SELECT * FROM \"gold_programas_sociais\" g WHERE g.uf IN (SELECT uf FROM gold_programas_sociais) LIMIT 12" ; "quoted table and subquery")]
    #[test_case("WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 3) SELECT x FROM n", "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 3) SELECT x FROM n LIMIT 12" ; "recursive cte")]
    #[test_case("WITH a AS (SELECT uf FROM gold_programas_sociais), b AS (SELECT uf FROM a) SELECT * FROM b", "WITH a AS (SELECT uf FROM gold_programas_sociais), b AS (SELECT uf FROM a) SELECT * FROM b LIMIT 12" ; "chained ctes")]
    #[test_case("SELECT * FROM (gold_programas_sociais)", "SELECT * FROM (gold_programas_sociais) LIMIT 12" ; "parenthesised allowed table")]
    #[test_case("SELECT uf FROM gold_programas_sociais WHERE uf IN ('SP', 'RJ')", "SELECT uf FROM gold_programas_sociais WHERE uf IN ('SP', 'RJ') LIMIT 12" ; "in value list")]
    #[test_case("SELECT uf, rank() OVER w FROM gold_programas_sociais WINDOW w AS (ORDER BY uf)", "SELECT uf, rank() OVER w FROM gold_programas_sociais WINDOW w AS (ORDER BY uf) LIMIT 12" ; "named window")]
    fn test_accepts(query: &str, expected: &str) {
        let out = guard()
            .check(query)
            .unwrap_or_else(|e| panic!("rejected {query}: {e}"));
        assert_eq!(out, expected);
    }

    #[test_case("" ; "empty")]
    #[test_case("  ;  " ; "only semicolon")]
    #[test_case("DROP TABLE gold_programas_sociais" ; "drop")]
    #[test_case("UPDATE gold_programas_sociais SET uf = 'SP'" ; "update")]
    #[test_case("DELETE FROM gold_programas_sociais" ; "delete")]
    #[test_case("INSERT INTO gold_programas_sociais VALUES (1)" ; "insert")]
    #[test_case("PRAGMA table_info(gold_programas_sociais)" ; "pragma")]
    #[test_case("SELECT 1; DELETE FROM gold_programas_sociais" ; "multiple statements")]
    #[test_case("WITH x AS (SELECT 1) DELETE FROM gold_programas_sociais" ; "cte delete")]
    #[test_case("SELECT * FROM gold_programas_sociais /* open" ; "unterminated comment")]
    #[test_case("SELECT 'open FROM gold_programas_sociais" ; "unterminated literal")]
    fn test_rejects(query: &str) {
        let result = guard().check(query);
        assert!(
            matches!(result, Err(SqlError::Rejected { .. })),
            "{query}: {result:?}"
        );
    }

    #[test_case("SELECT * FROM other_table" ; "other table")]
    #[test_case("SELECT * FROM sqlite_master" ; "catalog table")]
    #[test_case("SELECT * FROM gold_programas_sociais a JOIN secrets b ON a.id = b.id" ; "join")]
    #[test_case("SELECT * FROM gold_programas_sociais, secrets" ; "comma join")]
    #[test_case("SELECT * FROM main.secrets" ; "schema qualified")]
    #[test_case("SELECT * FROM (secrets)" ; "parenthesised table")]
    #[test_case("SELECT * FROM ((secrets))" ; "nested parentheses")]
    #[test_case("SELECT * FROM gold_programas_sociais g JOIN (secrets) s LIMIT 1" ; "parenthesised join")]
    #[test_case("SELECT * FROM gold_programas_sociais g, (secrets)" ; "parenthesised comma item")]
    #[test_case("SELECT 1 AS hit FROM gold_programas_sociais WHERE 'hidden' IN secrets" ; "in table")]
    #[test_case("SELECT 1 FROM gold_programas_sociais WHERE uf NOT IN main.secrets" ; "not in qualified table")]
    #[test_case("SELECT token FROM secrets WINDOW w AS (ORDER BY token), secrets AS (ORDER BY token)" ; "window named like table")]
    #[test_case("SELECT * FROM (SELECT 1) x, secrets" ; "comma after subquery")]
    #[test_case("SELECT * FROM gold_programas_sociais a JOIN gold_programas_sociais b ON a.uf = b.uf, secrets" ; "comma after join constraint")]
    #[test_case("SELECT (SELECT token FROM secrets) FROM gold_programas_sociais" ; "scalar subquery")]
    #[test_case("WITH a AS (SELECT * FROM secrets), secrets AS (SELECT 1) SELECT * FROM a" ; "cte used before definition")]
    #[test_case("WITH secrets AS (SELECT 1) SELECT * FROM main.secrets" ; "qualified name behind cte")]
    #[test_case("SELECT * FROM pragma_table_info('secrets')" ; "table valued function")]
    fn test_table_not_allowed(query: &str) {
        let result = guard().check(query);
        assert!(
            matches!(result, Err(SqlError::TableNotAllowed { .. })),
            "{query}: {result:?}"
        );
    }

    #[test]
    fn test_rejection_names_the_table() {
        let result = guard().check("SELECT * FROM gold_programas_sociais JOIN (main.secrets)");
        assert!(
            matches!(result, Err(SqlError::TableNotAllowed { ref table, .. }) if table == "main.secrets"),
            "{result:?}"
        );
    }

    #[test]
    fn test_tokenize_quoted_identifiers() {
        assert_eq!(
            tokenize(r#""a""b" [c d] `e`"#),
            vec![
                Token::Quoted(r#"a"b"#.to_string()),
                Token::Quoted("c d".to_string()),
                Token::Quoted("e".to_string()),
            ]
        );
    }

    #[test]
    fn test_table_match_is_case_insensitive() {
        assert!(guard().check("SELECT * FROM GOLD_PROGRAMAS_SOCIAIS").is_ok());
    }

    #[test]
    fn test_max_limit_not_below_default() {
        let g = QueryGuard::new(TABLE, 12, 5);
        let out = g
            .check("SELECT * FROM gold_programas_sociais LIMIT 12")
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(out.ends_with("LIMIT 12"));
    }

    #[test]
    fn test_multibyte_literal_keeps_alignment() {
        let out = guard()
            .check("SELECT * FROM gold_programas_sociais WHERE municipio = 'São Paulo' LIMIT 900")
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(out.ends_with("'São Paulo' LIMIT 100"), "{out}");
    }
}
