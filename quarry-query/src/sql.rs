//! SQL dialect details and literal escaping.

use serde::{Deserialize, Serialize};

/// Check if a name is a plain identifier that never needs quoting.
///
/// Bookkeeping tables such as the migration history must have plain names.
/// Plain identifiers start with a letter or underscore and continue with
/// letters, digits or underscores.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// The SQL dialect a statement is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// PostgreSQL uses $1, $2, etc.
    #[default]
    #[serde(alias = "postgres", alias = "postgresql")]
    PostgreSQL,
    /// MySQL uses ?, ?, etc.
    MySQL,
    /// SQLite uses ?, ?, etc.
    SQLite,
}

impl DatabaseType {
    /// Get the native parameter placeholder for a 1-based index.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::PostgreSQL => format!("${}", index),
            Self::MySQL | Self::SQLite => "?".to_string(),
        }
    }

    /// Get the dialect name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgresql",
            Self::MySQL => "mysql",
            Self::SQLite => "sqlite",
        }
    }

    /// Quote a string as a SQL literal.
    ///
    /// Every `'` is doubled. MySQL additionally treats backslash as an escape
    /// character inside literals, so backslashes are doubled there too.
    pub fn quote_str(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len() + 2);
        out.push('\'');
        for ch in value.chars() {
            match ch {
                '\'' => out.push_str("''"),
                '\\' if matches!(self, Self::MySQL) => out.push_str("\\\\"),
                _ => out.push(ch),
            }
        }
        out.push('\'');
        out
    }

    /// Render bytes as a binary literal.
    pub fn bytes_literal(&self, bytes: &[u8]) -> String {
        match self {
            Self::PostgreSQL => format!("'\\x{}'::bytea", hex::encode(bytes)),
            Self::MySQL | Self::SQLite => format!("X'{}'", hex::encode(bytes)),
        }
    }
}
