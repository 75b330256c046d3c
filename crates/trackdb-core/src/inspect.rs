//! Schema inspection - reads a database's table definitions into a
//! [`Schema`] snapshot.
//!
//! Inspection is read-only. Any storage failure, a file that is not a
//! database, or a table outside the supported model (duplicate names,
//! composite primary key) is reported as [`Error::SchemaRead`]. Column types
//! outside the supported set are not an error; they are carried as
//! [`ColumnType::Unknown`](crate::schema::ColumnType::Unknown).

use crate::error::{Error, Result};
use crate::schema::{Column, DefaultValue, Schema, Table};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use tracing::debug;

const USER_TABLES: &str = "SELECT name, sql FROM sqlite_master \
     WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
     ORDER BY rowid";

const TABLE_COLUMNS: &str =
    "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid";

/// Open a database file without write access.
pub fn open_read_only(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| Error::schema_read(path.display().to_string(), "cannot open database", Some(e)))
}

/// Inspect the database at `path`.
pub fn inspect_path(path: &Path) -> Result<Schema> {
    let conn = open_read_only(path)?;
    inspect(&conn, &path.display().to_string())
}

/// Inspect an open database. `label` names the database in errors.
pub fn inspect(conn: &Connection, label: &str) -> Result<Schema> {
    let read_error = |reason: &str, e: rusqlite::Error| Error::schema_read(label, reason, Some(e));

    let mut stmt = conn
        .prepare(USER_TABLES)
        .map_err(|e| read_error("cannot list tables", e))?;
    let definitions: Vec<(String, Option<String>)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .and_then(|rows| rows.collect())
        .map_err(|e| read_error("cannot list tables", e))?;

    let mut schema = Schema::new();
    for (name, sql) in definitions {
        let table = inspect_table(conn, &name, sql.as_deref())
            .map_err(|e| read_error(&format!("cannot read columns of {}", name), e))?;
        schema = schema.with_table(table);
    }

    schema
        .validate()
        .map_err(|reason| Error::schema_read(label, reason, None))?;

    debug!(database = label, tables = ?schema.table_names(), "inspected schema");
    Ok(schema)
}

fn inspect_table(
    conn: &Connection,
    name: &str,
    sql: Option<&str>,
) -> rusqlite::Result<Table> {
    let mut stmt = conn.prepare(TABLE_COLUMNS)?;
    let mut columns = stmt
        .query_map([name], |row| {
            let name: String = row.get(0)?;
            let declared: Option<String> = row.get(1)?;
            let not_null: bool = row.get(2)?;
            let default: Option<String> = row.get(3)?;
            let pk: i64 = row.get(4)?;

            let mut column = Column::declared(name, declared.unwrap_or_default());
            if not_null {
                column = column.not_null();
            }
            if let Some(raw) = default {
                column = column.with_default(DefaultValue::from_sql(&raw));
            }
            if pk > 0 {
                column = column.primary_key();
            }
            Ok(column)
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    // Only an INTEGER PRIMARY KEY may carry AUTOINCREMENT.
    if let (Some(sql), Some(key)) = (sql, columns.iter_mut().find(|c| c.primary_key)) {
        key.auto_increment = declares_autoincrement(sql, &key.name);
    }

    Ok(columns
        .into_iter()
        .fold(Table::new(name), |table, column| table.with_column(column)))
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Word(&'a str),
    Quoted(String),
    Literal,
    Open,
    Close,
    Comma,
    Other,
}

impl Token<'_> {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(word) if word.eq_ignore_ascii_case(keyword))
    }

    fn names(&self, column: &str) -> bool {
        match self {
            Token::Word(word) => word.eq_ignore_ascii_case(column),
            Token::Quoted(name) => name.eq_ignore_ascii_case(column),
            _ => false,
        }
    }
}

/// Split `CREATE TABLE` text into tokens, dropping comments and whitespace.
fn tokenize(sql: &str) -> Vec<Token<'_>> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = sql[i..].find('\n').map_or(bytes.len(), |n| i + n + 1);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = sql[i + 2..].find("*/").map_or(bytes.len(), |n| i + n + 4);
            }
            b'\'' | b'"' | b'`' | b'[' => {
                let close = if c == b'[' { b']' } else { c };
                let mut text = String::new();
                let mut start = i + 1;
                let mut j = start;
                loop {
                    match bytes.get(j) {
                        None => {
                            text.push_str(&sql[start..]);
                            j = bytes.len();
                            break;
                        }
                        Some(&b) if b == close => {
                            text.push_str(&sql[start..j]);
                            // Doubled quotes escape themselves; brackets do not nest.
                            if close != b']' && bytes.get(j + 1) == Some(&close) {
                                text.push(char::from(close));
                                j += 2;
                                start = j;
                            } else {
                                j += 1;
                                break;
                            }
                        }
                        Some(_) => j += 1,
                    }
                }
                tokens.push(if c == b'\'' {
                    Token::Literal
                } else {
                    Token::Quoted(text)
                });
                i = j;
            }
            b'(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            b')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            b',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            c if c.is_ascii_whitespace() => i += 1,
            c if is_word_byte(c) => {
                let end = bytes[i..]
                    .iter()
                    .position(|&b| !is_word_byte(b))
                    .map_or(bytes.len(), |n| i + n);
                tokens.push(Token::Word(&sql[i..end]));
                i = end;
            }
            _ => {
                tokens.push(Token::Other);
                i += 1;
            }
        }
    }
    tokens
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || !b.is_ascii()
}

/// Column and constraint definitions: the top-level comma-separated parts
/// of the first parenthesized list.
fn definitions<'t, 'a>(tokens: &'t [Token<'a>]) -> Vec<&'t [Token<'a>]> {
    let Some(open) = tokens.iter().position(|t| *t == Token::Open) else {
        return Vec::new();
    };

    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = open + 1;
    for (i, token) in tokens.iter().enumerate().skip(open + 1) {
        match token {
            Token::Open => depth += 1,
            Token::Close if depth == 0 => {
                parts.push(&tokens[start..i]);
                break;
            }
            Token::Close => depth -= 1,
            Token::Comma if depth == 0 => {
                parts.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts
}

/// Check whether `column` is declared AUTOINCREMENT, either in its own
/// definition or in a `PRIMARY KEY (...)` table constraint naming it.
fn declares_autoincrement(sql: &str, column: &str) -> bool {
    let tokens = tokenize(sql);
    definitions(&tokens).into_iter().any(|definition| {
        let Some(first) = definition.first() else {
            return false;
        };
        if !definition.iter().any(|t| t.is_keyword("AUTOINCREMENT")) {
            return false;
        }
        if first.is_keyword("PRIMARY") || first.is_keyword("CONSTRAINT") {
            definition.iter().any(|t| t.names(column))
        } else {
            first.names(column)
        }
    })
}
