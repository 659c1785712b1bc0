//! Parameterized SQL statements.
//!
//! A [`Statement`] is parsed once when it is created. Placeholders are found
//! with the [`scanner`](crate::scanner), so text inside literals, quoted
//! identifiers and comments is never mistaken for a parameter:
//!
//! - named parameters: `:name` (a letter, then letters, digits or `_`);
//!   the `::` cast operator is not a parameter
//! - positional parameters: `?` takes slots 0, 1, 2... in order of
//!   appearance, `$n` addresses slot `n - 1`
//!
//! Rendering either inlines every value as an escaped literal
//! ([`Statement::render`]) or produces driver-native placeholders with an
//! ordered value list ([`Statement::render_native`]).
//!
//! ```rust
//! use quarry_query::{Statement, ValueEncoderRegistry};
//!
//! let mut stmt = Statement::new("select * from t where name = ? and id = :id");
//! stmt.bind(0, "O'Brien").unwrap().bind_named("id", 5).unwrap();
//!
//! let sql = stmt.render(&ValueEncoderRegistry::new()).unwrap();
//! assert_eq!(sql, "select * from t where name = 'O''Brien' and id = 5");
//! ```

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexSet;
use tracing::debug;

use crate::encoder::ValueEncoderRegistry;
use crate::error::{QueryError, QueryResult};
use crate::scanner;
use crate::sql::DatabaseType;
use crate::value::{SqlType, Value};

/// Maximum nesting of encoder applications and lists while resolving a value.
const MAX_RESOLVE_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    /// Index into the statement's parameter names.
    Named(usize),
    /// Zero-based positional slot.
    Positional(usize),
}

/// A SQL template with its placeholders and bound values.
#[derive(Debug, Clone)]
pub struct Statement {
    sql: String,
    segments: Vec<Segment>,
    names: IndexSet<String>,
    slots: BTreeSet<usize>,
    /// Highest slot plus one.
    positional_count: usize,
    positional: BTreeMap<usize, Value>,
    named: Vec<Option<Value>>,
}

impl Statement {
    /// Parse a SQL template.
    pub fn new(sql: impl Into<String>) -> Self {
        let sql = sql.into();
        let (segments, names, slots) = parse(&sql);
        let positional_count = slots.last().map_or(0, |last| last + 1);

        Self {
            positional_count,
            positional: BTreeMap::new(),
            named: vec![None; names.len()],
            sql,
            segments,
            names,
            slots,
        }
    }

    /// The original SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Named parameters, in order of first appearance.
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Whether `name` is a named parameter of this statement.
    pub fn has_parameter(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of positional slots (highest slot plus one).
    pub fn positional_count(&self) -> usize {
        self.positional_count
    }

    /// Bind a value to a zero-based positional slot.
    pub fn bind(&mut self, index: usize, value: impl Into<Value>) -> QueryResult<&mut Self> {
        if index >= self.positional_count {
            return Err(
                QueryError::index_out_of_bounds(index, self.positional_count).with_sql(&self.sql)
            );
        }
        self.positional.insert(index, value.into());
        Ok(self)
    }

    /// Bind a value to a named parameter.
    pub fn bind_named(&mut self, name: &str, value: impl Into<Value>) -> QueryResult<&mut Self> {
        let index = self
            .names
            .get_index_of(name)
            .ok_or_else(|| QueryError::unknown_parameter(name).with_sql(&self.sql))?;
        self.named[index] = Some(value.into());
        Ok(self)
    }

    /// Bind a NULL of the given type to a positional slot.
    pub fn bind_null(&mut self, index: usize, kind: SqlType) -> QueryResult<&mut Self> {
        self.bind(index, Value::TypedNull(kind))
    }

    /// Bind a NULL of the given type to a named parameter.
    pub fn bind_null_named(&mut self, name: &str, kind: SqlType) -> QueryResult<&mut Self> {
        self.bind_named(name, Value::TypedNull(kind))
    }

    /// Drop every bound value.
    pub fn clear_bindings(&mut self) {
        self.positional.clear();
        self.named.iter_mut().for_each(|v| *v = None);
    }

    /// Slots that appear in the text but have no value yet, positional first.
    pub fn missing_parameters(&self) -> Vec<String> {
        let positional = self
            .slots
            .iter()
            .filter(|slot| !self.positional.contains_key(slot))
            .map(|slot| slot.to_string());
        let named = self
            .names
            .iter()
            .zip(&self.named)
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name.clone());
        positional.chain(named).collect()
    }

    /// Render with every value inlined, using the default dialect.
    pub fn render(&self, registry: &ValueEncoderRegistry) -> QueryResult<String> {
        self.render_dialect(DatabaseType::default(), registry)
    }

    /// Render with every value inlined as a literal of `dialect`.
    pub fn render_dialect(
        &self,
        dialect: DatabaseType,
        registry: &ValueEncoderRegistry,
    ) -> QueryResult<String> {
        let (positional, named) = self.resolve(registry)?;

        let mut out = String::with_capacity(self.sql.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Positional(slot) => {
                    out.push_str(&literal(lookup_slot(&positional, *slot)?, dialect)?);
                }
                Segment::Named(index) => {
                    out.push_str(&literal(lookup(&named, *index)?, dialect)?);
                }
            }
        }

        debug!(
            dialect = dialect.name(),
            positional = self.slots.len(),
            named = self.names.len(),
            "Rendered statement"
        );
        Ok(out)
    }

    /// Render with native placeholders and return the values in order.
    ///
    /// Every placeholder occurrence gets its own native parameter; list
    /// values expand to one parameter per element.
    pub fn render_native(
        &self,
        dialect: DatabaseType,
        registry: &ValueEncoderRegistry,
    ) -> QueryResult<(String, Vec<Value>)> {
        let (positional, named) = self.resolve(registry)?;

        let mut out = String::with_capacity(self.sql.len());
        let mut params = Vec::new();
        for segment in &self.segments {
            let value = match segment {
                Segment::Text(text) => {
                    out.push_str(text);
                    continue;
                }
                Segment::Positional(slot) => lookup_slot(&positional, *slot)?,
                Segment::Named(index) => lookup(&named, *index)?,
            };
            match value {
                Value::List(items) => {
                    out.push('(');
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        params.push(item.clone());
                        out.push_str(&dialect.placeholder(params.len()));
                    }
                    out.push(')');
                }
                other => {
                    params.push(other.clone());
                    out.push_str(&dialect.placeholder(params.len()));
                }
            }
        }

        debug!(
            dialect = dialect.name(),
            params = params.len(),
            "Rendered native statement"
        );
        Ok((out, params))
    }

    /// Check every slot is bound and run values through the registry.
    ///
    /// Positional slots are checked in ascending order, then named
    /// parameters, so the first missing slot is reported deterministically.
    #[allow(clippy::type_complexity)]
    fn resolve(
        &self,
        registry: &ValueEncoderRegistry,
    ) -> QueryResult<(BTreeMap<usize, Value>, Vec<Option<Value>>)> {
        let mut positional = BTreeMap::new();
        for &slot in &self.slots {
            let value = self
                .positional
                .get(&slot)
                .ok_or_else(|| QueryError::value_not_supplied(slot.to_string()).with_sql(&self.sql))?;
            positional.insert(slot, resolve_value(value, registry, true, 0)?);
        }

        let mut named = Vec::with_capacity(self.names.len());
        for (name, value) in self.names.iter().zip(&self.named) {
            let value = value
                .as_ref()
                .ok_or_else(|| QueryError::value_not_supplied(name.as_str()).with_sql(&self.sql))?;
            named.push(Some(resolve_value(value, registry, true, 0)?));
        }

        Ok((positional, named))
    }
}

fn lookup_slot(values: &BTreeMap<usize, Value>, slot: usize) -> QueryResult<&Value> {
    values
        .get(&slot)
        .ok_or_else(|| QueryError::internal(format!("positional slot {} was not resolved", slot)))
}

fn lookup(values: &[Option<Value>], index: usize) -> QueryResult<&Value> {
    values
        .get(index)
        .and_then(Option::as_ref)
        .ok_or_else(|| QueryError::internal(format!("parameter slot {} was not resolved", index)))
}

/// Apply registry encoders until only built-in values remain.
///
/// Encoder output is never offered back to an encoder of a built-in type,
/// so an override such as `String -> String` terminates.
fn resolve_value(
    value: &Value,
    registry: &ValueEncoderRegistry,
    allow_builtin_override: bool,
    depth: usize,
) -> QueryResult<Value> {
    if depth > MAX_RESOLVE_DEPTH {
        return Err(QueryError::invalid_value(format!(
            "value nesting exceeds {} levels while encoding '{}'",
            MAX_RESOLVE_DEPTH,
            value.kind()
        )));
    }

    if let Value::List(items) = value {
        return items
            .iter()
            .map(|item| resolve_value(item, registry, allow_builtin_override, depth + 1))
            .collect::<QueryResult<Vec<_>>>()
            .map(Value::List);
    }

    if allow_builtin_override || matches!(value, Value::Custom(_)) {
        if let Some(encoded) = registry.encode(value) {
            return resolve_value(&encoded?, registry, false, depth + 1);
        }
    }

    match value {
        Value::Custom(custom) => Err(QueryError::unsupported_type(custom.type_name())),
        other => Ok(other.clone()),
    }
}

/// Render a resolved value as a SQL literal.
fn literal(value: &Value, dialect: DatabaseType) -> QueryResult<String> {
    Ok(match value {
        Value::Null => "NULL".to_string(),
        Value::TypedNull(kind) => match (dialect, kind) {
            (DatabaseType::PostgreSQL, SqlType::Unknown(_)) => "NULL".to_string(),
            (DatabaseType::PostgreSQL, kind) => format!("NULL::{}", kind.name()),
            _ => "NULL".to_string(),
        },
        Value::Bool(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) if v.is_nan() => "'NaN'".to_string(),
        Value::Float(v) if v.is_infinite() => {
            if v.is_sign_positive() { "'Infinity'" } else { "'-Infinity'" }.to_string()
        }
        Value::Float(v) => v.to_string(),
        Value::String(v) => dialect.quote_str(v),
        Value::Bytes(v) => dialect.bytes_literal(v),
        Value::Json(v) => dialect.quote_str(&v.to_string()),
        Value::List(items) => {
            let parts = items
                .iter()
                .map(|item| literal(item, dialect))
                .collect::<QueryResult<Vec<_>>>()?;
            format!("({})", parts.join(", "))
        }
        Value::Custom(custom) => return Err(QueryError::unsupported_type(custom.type_name())),
    })
}

fn word_end(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
        pos += 1;
    }
    pos
}

fn digits_end(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    pos
}

fn parse(sql: &str) -> (Vec<Segment>, IndexSet<String>, BTreeSet<usize>) {
    let bytes = sql.as_bytes();
    let mut segments = Vec::new();
    let mut names = IndexSet::new();
    let mut slots = BTreeSet::new();
    let mut text_start = 0;
    let mut next_question = 0;

    scanner::scan_silent(sql, |pos, ch, _| {
        let (segment, end) = match ch {
            ':' => match bytes.get(pos + 1) {
                // `::` cast operator
                Some(b':') => return Some(pos + 2),
                Some(b) if b.is_ascii_alphabetic() => {
                    let end = word_end(bytes, pos + 2);
                    let (index, _) = names.insert_full(sql[pos + 1..end].to_string());
                    (Segment::Named(index), end)
                }
                _ => return None,
            },
            '?' => {
                let slot = next_question;
                next_question += 1;
                (Segment::Positional(slot), pos + 1)
            }
            '$' => {
                let end = digits_end(bytes, pos + 1);
                if end == pos + 1 {
                    return None;
                }
                let number: usize = sql[pos + 1..end].parse().ok()?;
                if number == 0 {
                    return Some(end);
                }
                (Segment::Positional(number - 1), end)
            }
            _ => return None,
        };

        if let Segment::Positional(slot) = segment {
            slots.insert(slot);
        }
        if text_start < pos {
            segments.push(Segment::Text(sql[text_start..pos].to_string()));
        }
        segments.push(segment);
        text_start = end;
        Some(end)
    });

    if text_start < sql.len() {
        segments.push(Segment::Text(sql[text_start..].to_string()));
    }

    (segments, names, slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use pretty_assertions::assert_eq;

    fn registry() -> ValueEncoderRegistry {
        ValueEncoderRegistry::new()
    }

    #[test]
    fn test_named_parameter() {
        let mut stmt = Statement::new("select * from t where id = :id");
        stmt.bind_named("id", 5).unwrap();
        assert_eq!(stmt.render(&registry()).unwrap(), "select * from t where id = 5");
    }

    #[test]
    fn test_positional_string_is_escaped() {
        let mut stmt = Statement::new("select * from t where name = ?");
        stmt.bind(0, "O'Brien").unwrap();
        assert_eq!(
            stmt.render(&registry()).unwrap(),
            "select * from t where name = 'O''Brien'"
        );
    }

    #[test]
    fn test_extraction_skips_protected_spans() {
        let stmt = Statement::new(
            "select ':a', \":b\", `:c` -- :d ?\n/* :e ? */ $$ :f ? $$ from t where x = :g and y = ?",
        );
        assert_eq!(stmt.parameter_names().collect::<Vec<_>>(), vec!["g"]);
        assert_eq!(stmt.positional_count(), 1);
    }

    #[test]
    fn test_cast_is_not_a_parameter() {
        let mut stmt = Statement::new("select :v::text, '1'::int");
        assert_eq!(stmt.parameter_names().collect::<Vec<_>>(), vec!["v"]);
        stmt.bind_named("v", "x").unwrap();
        assert_eq!(stmt.render(&registry()).unwrap(), "select 'x'::text, '1'::int");
    }

    #[test]
    fn test_dollar_positional() {
        let mut stmt = Statement::new("select $2, $1, $1, $0");
        assert_eq!(stmt.positional_count(), 2);
        stmt.bind(0, 10).unwrap().bind(1, 20).unwrap();
        assert_eq!(stmt.render(&registry()).unwrap(), "select 20, 10, 10, $0");
    }

    #[test]
    fn test_large_dollar_slot_is_sparse() {
        let mut stmt = Statement::new("select $1000000000000000000, $2");
        assert_eq!(stmt.positional_count(), 1_000_000_000_000_000_000);
        assert_eq!(
            stmt.missing_parameters(),
            vec!["1".to_string(), "999999999999999999".to_string()]
        );

        stmt.bind(1, "b").unwrap().bind(999_999_999_999_999_999, 7).unwrap();
        assert_eq!(stmt.render(&registry()).unwrap(), "select 7, 'b'");

        let err = stmt.bind(1_000_000_000_000_000_000, 1).unwrap_err();
        assert_eq!(err.code, ErrorCode::ParameterIndexOutOfBounds);
    }

    #[test]
    fn test_dollar_beyond_usize_is_text() {
        let stmt = Statement::new("select $99999999999999999999999999");
        assert_eq!(stmt.positional_count(), 0);
        assert_eq!(stmt.render(&registry()).unwrap(), "select $99999999999999999999999999");
    }

    #[test]
    fn test_dollar_tag_is_not_positional() {
        let stmt = Statement::new("select $fn$ ? $fn$, $1");
        assert_eq!(stmt.positional_count(), 1);
    }

    #[test]
    fn test_repeated_named_parameter() {
        let mut stmt = Statement::new("select :a, :b, :a");
        assert_eq!(stmt.parameter_names().collect::<Vec<_>>(), vec!["a", "b"]);
        stmt.bind_named("a", 1).unwrap().bind_named("b", 2).unwrap();
        assert_eq!(stmt.render(&registry()).unwrap(), "select 1, 2, 1");
    }

    #[test]
    fn test_bind_overwrites() {
        let mut stmt = Statement::new("select ?");
        stmt.bind(0, 1).unwrap();
        stmt.bind(0, 2).unwrap();
        assert_eq!(stmt.render(&registry()).unwrap(), "select 2");
    }

    #[test]
    fn test_bind_errors() {
        let mut stmt = Statement::new("select ?, :name");

        let err = stmt.bind(1, 1).unwrap_err();
        assert_eq!(err.code, ErrorCode::ParameterIndexOutOfBounds);
        assert_eq!(err.context.parameter.as_deref(), Some("1"));

        let err = stmt.bind_named("other", 1).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownParameter);
        assert_eq!(err.context.parameter.as_deref(), Some("other"));
    }

    #[test]
    fn test_missing_value_names_the_slot() {
        let mut stmt = Statement::new("select ?, ?, :a, :b");

        let err = stmt.render(&registry()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValueNotSupplied);
        assert_eq!(err.context.parameter.as_deref(), Some("0"));

        stmt.bind(0, 1).unwrap().bind(1, 2).unwrap().bind_named("a", 3).unwrap();
        let err = stmt.render(&registry()).unwrap_err();
        assert_eq!(err.context.parameter.as_deref(), Some("b"));
        assert_eq!(stmt.missing_parameters(), vec!["b".to_string()]);

        stmt.bind_named("b", 4).unwrap();
        assert!(stmt.missing_parameters().is_empty());
        assert_eq!(stmt.render(&registry()).unwrap(), "select 1, 2, 3, 4");
    }

    #[test]
    fn test_every_slot_must_be_bound() {
        let sql = "select :a, ?, :b, ?";
        for skip in 0..4 {
            let mut stmt = Statement::new(sql);
            for slot in 0..4 {
                if slot == skip {
                    continue;
                }
                match slot {
                    0 => stmt.bind_named("a", 1).unwrap(),
                    1 => stmt.bind(0, 1).unwrap(),
                    2 => stmt.bind_named("b", 1).unwrap(),
                    _ => stmt.bind(1, 1).unwrap(),
                };
            }
            assert!(stmt.render(&registry()).is_err(), "slot {} unbound", skip);
        }
    }

    #[test]
    fn test_render_is_idempotent() {
        let mut stmt = Statement::new("insert into t values (:a, ?, :b)");
        stmt.bind_named("a", "x'y").unwrap();
        stmt.bind(0, 3.5).unwrap();
        stmt.bind_named("b", vec![1i64, 2]).unwrap();

        let first = stmt.render(&registry()).unwrap();
        let second = stmt.render(&registry()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "insert into t values ('x''y', 3.5, (1, 2))");
    }

    #[test]
    fn test_injection_strings_stay_literals() {
        let payloads = [
            "'; drop table users; --",
            "x' or '1'='1",
            "/* comment */ ' --",
            "$$ ; $$",
            "''''",
        ];
        for payload in payloads {
            let mut stmt = Statement::new("select ?");
            stmt.bind(0, payload).unwrap();
            let sql = stmt.render(&registry()).unwrap();

            // The whole literal must be one protected span.
            let spans = scanner::spans(&sql);
            let literal_spans: Vec<_> = spans
                .iter()
                .filter(|s| s.context == scanner::Context::SingleQuoted)
                .collect();
            assert_eq!(literal_spans.len(), 1, "payload {payload:?} rendered as {sql}");
            assert_eq!(literal_spans[0].range.end, sql.len());
            assert_eq!(scanner::split_statements(&sql).len(), 1);
        }
    }

    #[test]
    fn test_literal_rules() {
        let mut stmt = Statement::new("select ?, ?, ?, ?, ?, ?, ?, ?");
        stmt.bind(0, Value::Null).unwrap();
        stmt.bind(1, true).unwrap();
        stmt.bind(2, -7).unwrap();
        stmt.bind(3, f64::NAN).unwrap();
        stmt.bind(4, f64::NEG_INFINITY).unwrap();
        stmt.bind(5, vec![0xabu8, 0x01]).unwrap();
        stmt.bind(6, serde_json::json!({"k": "it's"})).unwrap();
        stmt.bind(7, Vec::<i64>::new()).unwrap();

        assert_eq!(
            stmt.render(&registry()).unwrap(),
            "select NULL, true, -7, 'NaN', '-Infinity', '\\xab01'::bytea, '{\"k\":\"it''s\"}', ()"
        );
        assert_eq!(
            stmt.render_dialect(DatabaseType::SQLite, &registry()).unwrap(),
            "select NULL, true, -7, 'NaN', '-Infinity', X'ab01', '{\"k\":\"it''s\"}', ()"
        );
    }

    #[test]
    fn test_typed_null() {
        let mut stmt = Statement::new("select :a, :b");
        stmt.bind_null_named("a", SqlType::Int4).unwrap();
        stmt.bind_null_named("b", SqlType::Unknown("x; drop".into())).unwrap();
        assert_eq!(stmt.render(&registry()).unwrap(), "select NULL::int4, NULL");
        assert_eq!(
            stmt.render_dialect(DatabaseType::MySQL, &registry()).unwrap(),
            "select NULL, NULL"
        );
    }

    #[test]
    fn test_mysql_backslash() {
        let mut stmt = Statement::new("select ?");
        stmt.bind(0, "a\\' or 1=1 --").unwrap();
        assert_eq!(
            stmt.render_dialect(DatabaseType::MySQL, &registry()).unwrap(),
            "select 'a\\\\'' or 1=1 --'"
        );
    }

    #[test]
    fn test_custom_value_needs_encoder() {
        struct Celsius(f64);

        let mut stmt = Statement::new("select :t");
        stmt.bind_named("t", Value::custom(Celsius(21.5))).unwrap();

        let err = stmt.render(&registry()).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedValueType);
        assert!(err.message.contains("Celsius"));

        let mut registry = ValueEncoderRegistry::new();
        registry.register(|c: &Celsius| Value::Float(c.0));
        assert_eq!(stmt.render(&registry).unwrap(), "select 21.5");
    }

    #[test]
    fn test_encoder_output_is_escaped() {
        struct Raw(&'static str);

        let mut registry = ValueEncoderRegistry::new();
        registry.register(|r: &Raw| Value::String(r.0.to_string()));

        let mut stmt = Statement::new("select ?");
        stmt.bind(0, Value::custom(Raw("1'); drop table t; --"))).unwrap();
        assert_eq!(
            stmt.render(&registry).unwrap(),
            "select '1''); drop table t; --'"
        );
    }

    #[test]
    fn test_builtin_override_terminates() {
        let mut registry = ValueEncoderRegistry::new();
        registry.register(|s: &String| Value::String(s.to_uppercase()));

        let mut stmt = Statement::new("select ?");
        stmt.bind(0, "abc").unwrap();
        assert_eq!(stmt.render(&registry).unwrap(), "select 'ABC'");
    }

    #[test]
    fn test_cyclic_custom_encoders_fail() {
        struct Ping;
        struct Pong;

        let mut registry = ValueEncoderRegistry::new();
        registry.register(|_: &Ping| Value::custom(Pong));
        registry.register(|_: &Pong| Value::custom(Ping));

        let mut stmt = Statement::new("select ?");
        stmt.bind(0, Value::custom(Ping)).unwrap();
        let err = stmt.render(&registry).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidValue);
    }

    #[test]
    fn test_render_native_postgres() {
        let mut stmt = Statement::new("select * from t where id in :ids and name = ? and ids = :ids");
        stmt.bind_named("ids", vec![1i64, 2]).unwrap();
        stmt.bind(0, "bob").unwrap();

        let (sql, params) = stmt
            .render_native(DatabaseType::PostgreSQL, &registry())
            .unwrap();
        assert_eq!(
            sql,
            "select * from t where id in ($1, $2) and name = $3 and ids = ($4, $5)"
        );
        assert_eq!(
            params,
            vec![
                Value::Int(1),
                Value::Int(2),
                Value::String("bob".into()),
                Value::Int(1),
                Value::Int(2),
            ]
        );
    }

    #[test]
    fn test_render_native_question_marks() {
        let mut stmt = Statement::new("update t set a = :a where b = '?' and c = ?");
        stmt.bind_named("a", 1).unwrap().bind(0, 2).unwrap();

        let (sql, params) = stmt.render_native(DatabaseType::MySQL, &registry()).unwrap();
        assert_eq!(sql, "update t set a = ? where b = '?' and c = ?");
        assert_eq!(params, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_clear_bindings() {
        let mut stmt = Statement::new("select ?");
        stmt.bind(0, 1).unwrap();
        stmt.clear_bindings();
        assert_eq!(stmt.missing_parameters(), vec!["0".to_string()]);
    }
}
