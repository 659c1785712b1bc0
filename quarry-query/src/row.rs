//! Result sets returned by drivers.
//!
//! Drivers hand back every cell as text (or NULL) together with a column
//! schema. Typed access parses the text on demand:
//!
//! ```rust
//! use quarry_query::row::{Column, ResultSet};
//! use quarry_query::SqlType;
//!
//! let mut rs = ResultSet::new(vec![
//!     Column::new(0, "id", SqlType::Int8),
//!     Column::new(1, "name", SqlType::Text),
//! ]);
//! rs.push_row(vec![Some("1".into()), None]).unwrap();
//!
//! let row = rs.first().unwrap();
//! assert_eq!(row.get_i64("id").unwrap(), 1);
//! assert_eq!(row.get_opt("name").unwrap(), None);
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};
use crate::value::SqlType;

/// One column of a result schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Zero-based position in the row.
    pub ordinal: usize,
    /// Column name as reported by the driver.
    pub name: String,
    /// Reported type.
    pub kind: SqlType,
}

impl Column {
    /// Create a column description.
    pub fn new(ordinal: usize, name: impl Into<String>, kind: SqlType) -> Self {
        Self {
            ordinal,
            name: name.into(),
            kind,
        }
    }
}

/// Something that identifies a column: an ordinal or a name.
pub trait ColumnIndex: fmt::Display {
    /// Resolve to an ordinal within `columns`.
    fn ordinal(&self, columns: &[Column]) -> Option<usize>;
}

impl ColumnIndex for usize {
    fn ordinal(&self, columns: &[Column]) -> Option<usize> {
        (*self < columns.len()).then_some(*self)
    }
}

impl ColumnIndex for &str {
    fn ordinal(&self, columns: &[Column]) -> Option<usize> {
        columns.iter().position(|c| c.name == *self)
    }
}

impl ColumnIndex for String {
    fn ordinal(&self, columns: &[Column]) -> Option<usize> {
        self.as_str().ordinal(columns)
    }
}

/// A single row of text cells sharing its result set's schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<Option<String>>,
}

impl Row {
    /// The row's schema.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no cells.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a nullable cell as text.
    pub fn get_opt<I: ColumnIndex>(&self, index: I) -> QueryResult<Option<&str>> {
        let ordinal = index.ordinal(&self.columns).ok_or_else(|| {
            QueryError::row_decode(format!("column '{}' not found", index))
                .with_parameter(index.to_string())
        })?;
        Ok(self.values.get(ordinal).and_then(|v| v.as_deref()))
    }

    /// Get a non-null cell as text.
    pub fn get_str<I: ColumnIndex>(&self, index: I) -> QueryResult<&str> {
        let name = index.to_string();
        self.get_opt(index)?.ok_or_else(|| {
            QueryError::row_decode(format!("unexpected null in column '{}'", name))
                .with_parameter(name)
        })
    }

    /// Parse a non-null cell with `FromStr`.
    pub fn get<T, I>(&self, index: I) -> QueryResult<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
        I: ColumnIndex,
    {
        let name = index.to_string();
        let text = self.get_str(index)?;
        parse_cell(&name, text)
    }

    /// Parse a nullable cell with `FromStr`.
    pub fn get_parsed_opt<T, I>(&self, index: I) -> QueryResult<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
        I: ColumnIndex,
    {
        let name = index.to_string();
        self.get_opt(index)?
            .map(|text| parse_cell(&name, text))
            .transpose()
    }

    /// Get a 64-bit integer column value.
    pub fn get_i64<I: ColumnIndex>(&self, index: I) -> QueryResult<i64> {
        self.get(index)
    }

    /// Get a float column value.
    pub fn get_f64<I: ColumnIndex>(&self, index: I) -> QueryResult<f64> {
        self.get(index)
    }

    /// Get a boolean column value.
    ///
    /// Accepts the spellings drivers use in text mode: `t`/`f`,
    /// `true`/`false` and `1`/`0`.
    pub fn get_bool<I: ColumnIndex>(&self, index: I) -> QueryResult<bool> {
        let name = index.to_string();
        match self.get_str(index)?.to_ascii_lowercase().as_str() {
            "t" | "true" | "1" => Ok(true),
            "f" | "false" | "0" => Ok(false),
            other => Err(QueryError::row_decode(format!(
                "cannot read '{}' in column '{}' as bool",
                other, name
            ))
            .with_parameter(name)),
        }
    }
}

fn parse_cell<T>(column: &str, text: &str) -> QueryResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    text.parse().map_err(|e: T::Err| {
        QueryError::row_decode(format!(
            "cannot read '{}' in column '{}' as {}: {}",
            text,
            column,
            std::any::type_name::<T>(),
            e
        ))
        .with_parameter(column)
    })
}

/// Types that can be built from a row.
pub trait FromRow: Sized {
    /// Decode one row.
    fn from_row(row: &Row) -> QueryResult<Self>;
}

/// Rows returned by a query, plus the number of affected rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    columns: Arc<[Column]>,
    rows: Vec<Row>,
    /// Rows affected, as reported by the driver.
    pub rows_affected: u64,
}

impl ResultSet {
    /// Create an empty result set with the given schema.
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns: columns.into(),
            rows: Vec::new(),
            rows_affected: 0,
        }
    }

    /// A result set with no columns and no rows.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Append a row of text cells; its width must match the schema.
    pub fn push_row(&mut self, values: Vec<Option<String>>) -> QueryResult<()> {
        if values.len() != self.columns.len() {
            return Err(QueryError::row_decode(format!(
                "row has {} cells but the result has {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        self.rows.push(Row {
            columns: Arc::clone(&self.columns),
            values,
        });
        Ok(())
    }

    /// The schema.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The rows.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// The first row, if any.
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate over the rows.
    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// Decode every row into `T`.
    pub fn decode<T: FromRow>(&self) -> QueryResult<Vec<T>> {
        self.rows.iter().map(T::from_row).collect()
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn users() -> ResultSet {
        let mut rs = ResultSet::new(vec![
            Column::new(0, "id", SqlType::Int8),
            Column::new(1, "email", SqlType::Text),
            Column::new(2, "active", SqlType::Bool),
            Column::new(3, "score", SqlType::Float8),
        ]);
        rs.push_row(vec![
            Some("1".into()),
            Some("a@example.com".into()),
            Some("t".into()),
            Some("1.5".into()),
        ])
        .unwrap();
        rs.push_row(vec![Some("2".into()), None, Some("false".into()), None])
            .unwrap();
        rs
    }

    #[test]
    fn test_typed_access() {
        let rs = users();
        let row = rs.first().unwrap();
        assert_eq!(row.get_i64("id").unwrap(), 1);
        assert_eq!(row.get_i64(0).unwrap(), 1);
        assert_eq!(row.get_str("email").unwrap(), "a@example.com");
        assert!(row.get_bool("active").unwrap());
        assert_eq!(row.get_f64("score").unwrap(), 1.5);
        assert_eq!(row.get::<u8, _>("id").unwrap(), 1);
    }

    #[test]
    fn test_nulls() {
        let rs = users();
        let row = &rs.rows()[1];
        assert_eq!(row.get_opt("email").unwrap(), None);
        assert_eq!(row.get_parsed_opt::<f64, _>("score").unwrap(), None);
        assert!(!row.get_bool("active").unwrap());

        let err = row.get_str("email").unwrap_err();
        assert_eq!(err.code, ErrorCode::RowDecode);
        assert!(err.message.contains("unexpected null"));
    }

    #[test]
    fn test_decode_errors() {
        let rs = users();
        let row = rs.first().unwrap();

        let err = row.get_i64("email").unwrap_err();
        assert_eq!(err.code, ErrorCode::RowDecode);
        assert_eq!(err.context.parameter.as_deref(), Some("email"));

        let err = row.get_opt("missing").unwrap_err();
        assert!(err.message.contains("not found"));
        assert!(row.get_opt(9).is_err());
    }

    #[test]
    fn test_push_row_checks_width() {
        let mut rs = ResultSet::new(vec![Column::new(0, "x", SqlType::Text)]);
        assert!(rs.push_row(vec![]).is_err());
        assert!(rs.is_empty());
    }

    #[test]
    fn test_from_row() {
        #[derive(Debug, PartialEq)]
        struct User {
            id: i64,
            email: Option<String>,
        }

        impl FromRow for User {
            fn from_row(row: &Row) -> QueryResult<Self> {
                Ok(Self {
                    id: row.get_i64("id")?,
                    email: row.get_opt("email")?.map(str::to_string),
                })
            }
        }

        let users: Vec<User> = users().decode().unwrap();
        assert_eq!(
            users,
            vec![
                User {
                    id: 1,
                    email: Some("a@example.com".into())
                },
                User { id: 2, email: None },
            ]
        );
    }
}
