//! Values, conditions and SQL generation.
//!
//! Every literal value is bound through a named parameter. The only text
//! ever spliced into SQL besides validated identifiers is a [`SqlKeyword`].

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::ser::{Serialize, Serializer};
use std::collections::BTreeMap;

use super::DbError;

/// SQL keywords allowed to stand in for a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlKeyword {
    CurrentTimestamp,
}

impl SqlKeyword {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            SqlKeyword::CurrentTimestamp => "CURRENT_TIMESTAMP",
        }
    }
}

/// A column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    /// Stored as `0`/`1`; read back as `Bool` for `BOOLEAN` columns.
    Bool(bool),
    /// Inlined into the statement instead of bound.
    Keyword(SqlKeyword),
}

impl Value {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Integer(n) => Some(*n != 0),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(n) => ToSqlOutput::Borrowed(ValueRef::Integer(*n)),
            Value::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Bool(b) => ToSqlOutput::Borrowed(ValueRef::Integer(i64::from(*b))),
            Value::Keyword(k) => ToSqlOutput::Borrowed(ValueRef::Text(k.as_sql().as_bytes())),
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(v: ValueRef<'_>) -> Self {
        match v {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(n) => Value::Integer(n),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Integer(n) => serializer.serialize_i64(*n),
            Value::Real(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Blob(b) => serializer.serialize_bytes(b),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Keyword(k) => serializer.serialize_str(k.as_sql()),
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $v:ident),* $(,)?) => {
        $(impl From<$t> for Value {
            fn from(x: $t) -> Self {
                Value::$v(x.into())
            }
        })*
    };
}

value_from! {
    i64 => Integer,
    i32 => Integer,
    u32 => Integer,
    f64 => Real,
    String => Text,
    &str => Text,
    Vec<u8> => Blob,
    bool => Bool,
    SqlKeyword => Keyword,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A row keyed by column name.
pub type Row = BTreeMap<String, Value>;

/// Build a [`Row`] from `(column, value)` pairs.
pub fn row<const N: usize>(pairs: [(&str, Value); N]) -> Row {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Gt,
    Lt,
    Ge,
    Le,
    Ne,
    Like,
    NotLike,
}

impl Op {
    fn as_sql(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Gt => ">",
            Op::Lt => "<",
            Op::Ge => ">=",
            Op::Le => "<=",
            Op::Ne => "!=",
            Op::Like => "LIKE",
            Op::NotLike => "NOT LIKE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cond {
    Cmp(Op, Value),
    Between { low: Value, high: Value, negated: bool },
    In { values: Vec<Value>, negated: bool },
    IsNull,
    IsNotNull,
}

/// Conditions joined with `AND`. An empty `Where` renders no clause.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Where {
    conds: Vec<(String, Cond)>,
}

impl Where {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn cond(mut self, column: &str, cond: Cond) -> Self {
        self.conds.push((column.to_string(), cond));
        self
    }

    #[must_use]
    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.cond(column, Cond::Cmp(Op::Eq, value.into()))
    }

    #[must_use]
    pub fn op(self, column: &str, op: Op, value: impl Into<Value>) -> Self {
        self.cond(column, Cond::Cmp(op, value.into()))
    }

    #[must_use]
    pub fn between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.cond(
            column,
            Cond::Between {
                low: low.into(),
                high: high.into(),
                negated: false,
            },
        )
    }

    #[must_use]
    pub fn not_between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.cond(
            column,
            Cond::Between {
                low: low.into(),
                high: high.into(),
                negated: true,
            },
        )
    }

    #[must_use]
    pub fn is_in<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.cond(
            column,
            Cond::In {
                values: values.into_iter().map(Into::into).collect(),
                negated: false,
            },
        )
    }

    #[must_use]
    pub fn not_in<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.cond(
            column,
            Cond::In {
                values: values.into_iter().map(Into::into).collect(),
                negated: true,
            },
        )
    }

    #[must_use]
    pub fn is_null(self, column: &str) -> Self {
        self.cond(column, Cond::IsNull)
    }

    #[must_use]
    pub fn is_not_null(self, column: &str) -> Self {
        self.cond(column, Cond::IsNotNull)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conds.is_empty()
    }

    fn render(&self, q: &mut Query) -> Result<(), DbError> {
        if self.conds.is_empty() {
            return Ok(());
        }
        let mut parts = Vec::with_capacity(self.conds.len());
        for (i, (col, cond)) in self.conds.iter().enumerate() {
            validate_ident(col)?;
            let name = format!("$where_{i}_{}", col.replace('.', "_"));
            let part = match cond {
                Cond::Cmp(op, v) => format!("{col} {} {}", op.as_sql(), q.bind(&name, v)),
                Cond::Between { low, high, negated } => format!(
                    "{col} {}BETWEEN {} AND {}",
                    if *negated { "NOT " } else { "" },
                    q.bind(&format!("{name}_low"), low),
                    q.bind(&format!("{name}_high"), high),
                ),
                Cond::In { values, negated } => {
                    let list: Vec<String> = values
                        .iter()
                        .enumerate()
                        .map(|(j, v)| q.bind(&format!("{name}_{j}"), v))
                        .collect();
                    format!(
                        "{col} {}IN ({})",
                        if *negated { "NOT " } else { "" },
                        list.join(", ")
                    )
                }
                Cond::IsNull => format!("{col} IS NULL"),
                Cond::IsNotNull => format!("{col} IS NOT NULL"),
            };
            parts.push(part);
        }
        q.sql.push_str(" WHERE ");
        q.sql.push_str(&parts.join(" AND "));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub columns: Vec<String>,
    pub desc: bool,
}

impl Order {
    pub fn asc<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            desc: false,
        }
    }

    pub fn desc<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            desc: true,
            ..Self::asc(columns)
        }
    }
}

/// A selected column, optionally aliased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnName {
    pub name: String,
    pub alias: Option<String>,
}

impl ColumnName {
    #[must_use]
    pub fn aliased(name: &str, alias: &str) -> Self {
        Self {
            name: name.to_string(),
            alias: Some(alias.to_string()),
        }
    }
}

impl From<&str> for ColumnName {
    fn from(name: &str) -> Self {
        Self {
            name: name.to_string(),
            alias: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Columns {
    #[default]
    All,
    List(Vec<ColumnName>),
}

impl<C: Into<ColumnName>, const N: usize> From<[C; N]> for Columns {
    fn from(cols: [C; N]) -> Self {
        Columns::List(cols.into_iter().map(Into::into).collect())
    }
}

impl Columns {
    fn render(&self, table: Option<&str>) -> Result<String, DbError> {
        let qualify = |name: &str| match table {
            Some(t) => format!("{t}.{name}"),
            None => name.to_string(),
        };
        match self {
            Columns::All => Ok(qualify("*")),
            Columns::List(cols) => {
                let mut out = Vec::with_capacity(cols.len());
                for c in cols {
                    validate_ident(&c.name)?;
                    match &c.alias {
                        Some(alias) => {
                            validate_ident(alias)?;
                            out.push(format!("{} AS {alias}", qualify(&c.name)));
                        }
                        None => out.push(qualify(&c.name)),
                    }
                }
                Ok(out.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
            JoinKind::Full => "FULL",
        }
    }
}

/// `JOIN table ON table.column = match_table.match_column`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub table: String,
    pub columns: Columns,
    pub column: String,
    pub match_table: String,
    pub match_column: String,
    pub kind: Option<JoinKind>,
}

impl Join {
    #[must_use]
    pub fn new(table: &str, column: &str, match_table: &str, match_column: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: Columns::All,
            column: column.to_string(),
            match_table: match_table.to_string(),
            match_column: match_column.to_string(),
            kind: None,
        }
    }

    #[must_use]
    pub fn kind(mut self, kind: JoinKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn columns(mut self, columns: impl Into<Columns>) -> Self {
        self.columns = columns.into();
        self
    }
}

/// Options for `Table::select`.
#[derive(Debug, Clone, Default)]
pub struct SelectOpts {
    pub columns: Columns,
    pub distinct: bool,
    pub filter: Where,
    pub order: Option<Order>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub joins: Vec<Join>,
}

impl SelectOpts {
    #[must_use]
    pub fn filter(filter: Where) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }
}

/// A statement and its named parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub sql: String,
    pub params: Vec<(String, Value)>,
}

impl Query {
    fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Bind `value` as `name` and return the placeholder text; keywords are
    /// returned inline and not bound.
    fn bind(&mut self, name: &str, value: &Value) -> String {
        match value {
            Value::Keyword(k) => k.as_sql().to_string(),
            v => {
                self.params.push((name.to_string(), v.clone()));
                name.to_string()
            }
        }
    }
}

/// Reject anything but `[A-Za-z_][A-Za-z0-9_]*`, optionally `table.column`.
pub fn validate_ident(name: &str) -> Result<(), DbError> {
    let ok = !name.is_empty()
        && name.split('.').count() <= 2
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if ok {
        Ok(())
    } else {
        Err(DbError::InvalidIdentifier(name.to_string()))
    }
}

fn with_paranoid(filter: &Where, table: &str, paranoid: bool, qualify: bool) -> Where {
    if !paranoid {
        return filter.clone();
    }
    let col = if qualify {
        format!("{table}.time_deleted")
    } else {
        "time_deleted".to_string()
    };
    filter.clone().is_null(&col)
}

pub(crate) fn select_sql(table: &str, opts: &SelectOpts, paranoid: bool) -> Result<Query, DbError> {
    validate_ident(table)?;
    let joined = !opts.joins.is_empty();
    let mut cols = vec![opts.columns.render(joined.then_some(table))?];
    for j in &opts.joins {
        validate_ident(&j.table)?;
        cols.push(j.columns.render(Some(&j.table))?);
    }
    let mut q = Query::new(format!(
        "SELECT{} {} FROM {table}",
        if opts.distinct { " DISTINCT" } else { "" },
        cols.join(", ")
    ));
    for j in &opts.joins {
        validate_ident(&j.column)?;
        validate_ident(&j.match_table)?;
        validate_ident(&j.match_column)?;
        let kind = j.kind.map(|k| format!("{} ", k.as_sql())).unwrap_or_default();
        q.sql.push_str(&format!(
            " {kind}JOIN {t} ON {t}.{c} = {mt}.{mc}",
            t = j.table,
            c = j.column,
            mt = j.match_table,
            mc = j.match_column,
        ));
    }
    with_paranoid(&opts.filter, table, paranoid, joined).render(&mut q)?;
    if let Some(order) = &opts.order {
        for c in &order.columns {
            validate_ident(c)?;
        }
        q.sql.push_str(&format!(
            " ORDER BY {}{}",
            order.columns.join(", "),
            if order.desc { " DESC" } else { "" }
        ));
    }
    match (opts.limit, opts.offset) {
        (Some(limit), _) => {
            q.sql.push_str(" LIMIT $limit");
            q.params.push(("$limit".into(), Value::Integer(limit)));
        }
        (None, Some(_)) => q.sql.push_str(" LIMIT -1"),
        (None, None) => {}
    }
    if let Some(offset) = opts.offset {
        q.sql.push_str(" OFFSET $offset");
        q.params.push(("$offset".into(), Value::Integer(offset)));
    }
    Ok(q)
}

pub(crate) fn count_sql(table: &str, filter: &Where, paranoid: bool) -> Result<Query, DbError> {
    validate_ident(table)?;
    let mut q = Query::new(format!("SELECT COUNT(*) AS count FROM {table}"));
    with_paranoid(filter, table, paranoid, false).render(&mut q)?;
    Ok(q)
}

pub(crate) fn insert_sql(table: &str, data: &Row) -> Result<Query, DbError> {
    validate_ident(table)?;
    if data.is_empty() {
        return Err(DbError::EmptyInsert);
    }
    let mut q = Query::default();
    let mut cols = Vec::with_capacity(data.len());
    let mut vals = Vec::with_capacity(data.len());
    for (col, v) in data {
        validate_ident(col)?;
        cols.push(col.as_str());
        vals.push(q.bind(&format!("$value_{col}"), v));
    }
    q.sql = format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        cols.join(", "),
        vals.join(", ")
    );
    Ok(q)
}

pub(crate) fn update_sql(table: &str, data: &Row, filter: &Where) -> Result<Query, DbError> {
    validate_ident(table)?;
    if data.is_empty() {
        return Err(DbError::EmptyInsert);
    }
    let mut q = Query::default();
    let mut sets = Vec::with_capacity(data.len());
    for (col, v) in data {
        validate_ident(col)?;
        sets.push(format!("{col} = {}", q.bind(&format!("$set_{col}"), v)));
    }
    q.sql = format!("UPDATE {table} SET {}", sets.join(", "));
    filter.render(&mut q)?;
    Ok(q)
}

pub(crate) fn delete_sql(table: &str, filter: &Where) -> Result<Query, DbError> {
    validate_ident(table)?;
    let mut q = Query::new(format!("DELETE FROM {table}"));
    filter.render(&mut q)?;
    Ok(q)
}
