//! Column type and default value definitions.

use serde::{Deserialize, Serialize};

/// Declared column types understood by the engine.
///
/// The set is closed: any declared type that does not resolve to one of the
/// storage affinities below is carried as [`ColumnType::Unknown`] and is never
/// considered compatible with anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// 64-bit signed integer.
    Integer,
    /// UTF-8 text.
    Text,
    /// Binary data.
    Blob,
    /// 64-bit floating point.
    Real,
    /// A declared type outside the supported set.
    Unknown,
}

impl ColumnType {
    /// Resolve a declared SQL type using SQLite's affinity rules.
    ///
    /// An empty declaration has blob affinity. Declarations that would get
    /// numeric affinity (`NUMERIC`, `DECIMAL`, `BOOLEAN`, `DATE`, ...) are
    /// reported as [`ColumnType::Unknown`].
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.trim().to_ascii_uppercase();

        if upper.contains("INT") {
            ColumnType::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            ColumnType::Text
        } else if upper.is_empty() || upper.contains("BLOB") {
            ColumnType::Blob
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            ColumnType::Real
        } else {
            ColumnType::Unknown
        }
    }

    /// Canonical SQL spelling of this type.
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Text => "TEXT",
            ColumnType::Blob => "BLOB",
            ColumnType::Real => "REAL",
            ColumnType::Unknown => "",
        }
    }

    /// Check whether values stored as `self` can be carried into a column of
    /// type `target` without loss.
    ///
    /// Only identity and `integer -> real` widening qualify.
    pub fn widens_to(&self, target: ColumnType) -> bool {
        match (self, target) {
            (ColumnType::Unknown, _) | (_, ColumnType::Unknown) => false,
            (ColumnType::Integer, ColumnType::Real) => true,
            (from, to) => *from == to,
        }
    }

    /// The value synthesized for a non-null column that has no declared
    /// default.
    pub fn zero_value(&self) -> DefaultValue {
        match self {
            ColumnType::Integer => DefaultValue::Integer(0),
            ColumnType::Real => DefaultValue::Real(0.0),
            ColumnType::Text | ColumnType::Unknown => DefaultValue::Text(String::new()),
            ColumnType::Blob => DefaultValue::Blob(Vec::new()),
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::Text => write!(f, "text"),
            ColumnType::Blob => write!(f, "blob"),
            ColumnType::Real => write!(f, "real"),
            ColumnType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Default value for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DefaultValue {
    /// Null value.
    Null,
    /// Integer literal.
    Integer(i64),
    /// Floating point literal.
    Real(f64),
    /// String literal.
    Text(String),
    /// Blob literal.
    Blob(Vec<u8>),
    /// Any other expression, kept verbatim (`CURRENT_TIMESTAMP`, `(datetime('now'))`).
    Expression(String),
}

impl DefaultValue {
    /// Parse the default clause text as reported by `PRAGMA table_info`.
    pub fn from_sql(raw: &str) -> Self {
        let trimmed = raw.trim();

        if trimmed.eq_ignore_ascii_case("NULL") {
            return DefaultValue::Null;
        }
        if let Ok(value) = trimmed.parse::<i64>() {
            return DefaultValue::Integer(value);
        }
        if looks_like_real(trimmed) {
            if let Ok(value) = trimmed.parse::<f64>() {
                return DefaultValue::Real(value);
            }
        }
        if let Some(inner) = strip_quotes(trimmed, '\'') {
            return DefaultValue::Text(inner.replace("''", "'"));
        }
        if let Some(hex_body) = trimmed
            .strip_prefix("X'")
            .or_else(|| trimmed.strip_prefix("x'"))
            .and_then(|rest| rest.strip_suffix('\''))
        {
            if let Ok(bytes) = hex::decode(hex_body) {
                return DefaultValue::Blob(bytes);
            }
        }

        DefaultValue::Expression(trimmed.to_string())
    }

    /// Render as an SQL literal or expression usable in a `DEFAULT` clause or
    /// a `SELECT` list.
    pub fn to_sql(&self) -> String {
        match self {
            DefaultValue::Null => "NULL".to_string(),
            DefaultValue::Integer(v) => v.to_string(),
            DefaultValue::Real(v) => {
                let rendered = v.to_string();
                if rendered.contains('.') || rendered.contains('e') || rendered.contains("inf") {
                    rendered
                } else {
                    format!("{}.0", rendered)
                }
            }
            DefaultValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            DefaultValue::Blob(bytes) => format!("X'{}'", hex::encode_upper(bytes)),
            DefaultValue::Expression(expr) => expr.clone(),
        }
    }
}

fn looks_like_real(s: &str) -> bool {
    let body = s.strip_prefix(['-', '+']).unwrap_or(s);
    !body.is_empty()
        && body.chars().next().is_some_and(|c| c.is_ascii_digit() || c == '.')
        && body
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+'))
}

fn strip_quotes(s: &str, quote: char) -> Option<&str> {
    if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
        Some(&s[1..s.len() - 1])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affinity_resolution() {
        assert_eq!(ColumnType::from_declared("INTEGER"), ColumnType::Integer);
        assert_eq!(ColumnType::from_declared("bigint"), ColumnType::Integer);
        assert_eq!(ColumnType::from_declared("VARCHAR(255)"), ColumnType::Text);
        assert_eq!(ColumnType::from_declared("text"), ColumnType::Text);
        assert_eq!(ColumnType::from_declared(""), ColumnType::Blob);
        assert_eq!(ColumnType::from_declared("BLOB"), ColumnType::Blob);
        assert_eq!(ColumnType::from_declared("DOUBLE PRECISION"), ColumnType::Real);
        assert_eq!(ColumnType::from_declared("NUMERIC"), ColumnType::Unknown);
        assert_eq!(ColumnType::from_declared("DATETIME"), ColumnType::Unknown);
    }

    #[test]
    fn test_widening() {
        assert!(ColumnType::Integer.widens_to(ColumnType::Real));
        assert!(ColumnType::Text.widens_to(ColumnType::Text));
        assert!(!ColumnType::Real.widens_to(ColumnType::Integer));
        assert!(!ColumnType::Integer.widens_to(ColumnType::Text));
        assert!(!ColumnType::Unknown.widens_to(ColumnType::Unknown));
    }

    #[test]
    fn test_default_parsing() {
        assert_eq!(DefaultValue::from_sql("NULL"), DefaultValue::Null);
        assert_eq!(DefaultValue::from_sql("42"), DefaultValue::Integer(42));
        assert_eq!(DefaultValue::from_sql("-1.5"), DefaultValue::Real(-1.5));
        assert_eq!(
            DefaultValue::from_sql("'it''s'"),
            DefaultValue::Text("it's".to_string())
        );
        assert_eq!(
            DefaultValue::from_sql("X'0A0B'"),
            DefaultValue::Blob(vec![0x0a, 0x0b])
        );
        assert_eq!(
            DefaultValue::from_sql("CURRENT_TIMESTAMP"),
            DefaultValue::Expression("CURRENT_TIMESTAMP".to_string())
        );
    }

    #[test]
    fn test_default_rendering() {
        assert_eq!(DefaultValue::Text("it's".into()).to_sql(), "'it''s'");
        assert_eq!(DefaultValue::Real(0.0).to_sql(), "0.0");
        assert_eq!(DefaultValue::Blob(vec![]).to_sql(), "X''");
        assert_eq!(ColumnType::Integer.zero_value().to_sql(), "0");
    }
}
