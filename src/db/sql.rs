//! Generated SQL for row counts and replica seeding
//!
//! Table names come from configuration, so they are checked twice before
//! being spliced into a statement: each dotted part must be a plain or
//! double-quoted identifier, and the final text must parse as exactly one
//! statement of the expected kind.

use sqlparser::ast::Statement;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

/// Error building a statement
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SqlError {
    #[error("Empty table name")]
    EmptyTable,
    #[error("Invalid table name '{0}'")]
    InvalidTable(String),
    #[error("Failed to parse generated SQL: {0}")]
    Parse(String),
    #[error("Generated SQL is not a single {expected} statement")]
    UnexpectedStatement { expected: &'static str },
}

/// Build `SELECT COUNT(*) FROM <table>`
pub fn count_rows_sql(table: &str) -> Result<String, SqlError> {
    let table = table_name(table)?;
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    expect_single(&sql, "SELECT", |stmt| matches!(stmt, Statement::Query(_)))?;
    Ok(sql)
}

/// Build `CREATE TABLE IF NOT EXISTS <target> AS SELECT * FROM <source>`
pub fn seed_table_sql(source: &str, target: &str) -> Result<String, SqlError> {
    let source = table_name(source)?;
    let target = table_name(target)?;
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} AS SELECT * FROM {}",
        target, source
    );
    expect_single(&sql, "CREATE TABLE", |stmt| {
        matches!(stmt, Statement::CreateTable { .. })
    })?;
    Ok(sql)
}

fn expect_single<F>(sql: &str, expected: &'static str, is_expected: F) -> Result<(), SqlError>
where
    F: Fn(&Statement) -> bool,
{
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .map_err(|e| SqlError::Parse(e.to_string()))?;
    match statements.as_slice() {
        [stmt] if is_expected(stmt) => Ok(()),
        _ => Err(SqlError::UnexpectedStatement { expected }),
    }
}

/// Validate a possibly schema-qualified table name and return it trimmed
fn table_name(raw: &str) -> Result<&str, SqlError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(SqlError::EmptyTable);
    }

    let invalid = || SqlError::InvalidTable(name.to_string());
    let mut chars = name.chars().peekable();
    let mut parts = 0;

    loop {
        match chars.next() {
            Some('"') => {
                let mut len = 0;
                loop {
                    match chars.next() {
                        Some('"') if chars.peek() == Some(&'"') => {
                            chars.next();
                            len += 1;
                        }
                        Some('"') => break,
                        Some(_) => len += 1,
                        None => return Err(invalid()),
                    }
                }
                if len == 0 {
                    return Err(invalid());
                }
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
                        chars.next();
                    } else {
                        break;
                    }
                }
            }
            _ => return Err(invalid()),
        }

        parts += 1;
        match chars.next() {
            None if parts <= 3 => return Ok(name),
            Some('.') if parts < 3 => continue,
            _ => return Err(invalid()),
        }
    }
}
