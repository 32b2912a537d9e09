//! Declarative table schemas and the DDL generated from them.

use super::query::{validate_ident, Row, SqlKeyword};
use super::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Text,
    /// Stored as INTEGER; decoded back to a boolean on read.
    Boolean,
    Real,
    Blob,
}

impl ColumnType {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Text => "TEXT",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Real => "REAL",
            ColumnType::Blob => "BLOB",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Integer(i64),
    Real(f64),
    /// Rendered as a quoted string literal.
    Text(String),
    Keyword(SqlKeyword),
}

impl DefaultValue {
    fn to_sql(&self) -> String {
        match self {
            DefaultValue::Integer(n) => n.to_string(),
            DefaultValue::Real(f) => f.to_string(),
            DefaultValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            DefaultValue::Keyword(k) => k.as_sql().to_string(),
        }
    }
}

impl From<i64> for DefaultValue {
    fn from(n: i64) -> Self {
        DefaultValue::Integer(n)
    }
}

impl From<bool> for DefaultValue {
    fn from(b: bool) -> Self {
        DefaultValue::Integer(i64::from(b))
    }
}

impl From<&str> for DefaultValue {
    fn from(s: &str) -> Self {
        DefaultValue::Text(s.to_string())
    }
}

impl From<SqlKeyword> for DefaultValue {
    fn from(k: SqlKeyword) -> Self {
        DefaultValue::Keyword(k)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub table: String,
    pub column: String,
}

/// One column of a [`TableSchema`].
///
/// Columns are `NOT NULL` unless [`ColumnDef::allow_null`] is set.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub ty: ColumnType,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub allow_null: bool,
    pub unique: bool,
    pub default: Option<DefaultValue>,
    pub index: bool,
    pub fts: bool,
    pub reference: Option<Reference>,
}

impl ColumnDef {
    #[must_use]
    pub fn new(ty: ColumnType) -> Self {
        Self {
            ty,
            primary_key: false,
            auto_increment: false,
            allow_null: false,
            unique: false,
            default: None,
            index: false,
            fts: false,
            reference: None,
        }
    }

    #[must_use]
    pub fn integer() -> Self {
        Self::new(ColumnType::Integer)
    }

    #[must_use]
    pub fn text() -> Self {
        Self::new(ColumnType::Text)
    }

    #[must_use]
    pub fn boolean() -> Self {
        Self::new(ColumnType::Boolean)
    }

    #[must_use]
    pub fn real() -> Self {
        Self::new(ColumnType::Real)
    }

    #[must_use]
    pub fn blob() -> Self {
        Self::new(ColumnType::Blob)
    }

    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    #[must_use]
    pub fn allow_null(mut self) -> Self {
        self.allow_null = true;
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn default(mut self, value: impl Into<DefaultValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    #[must_use]
    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    #[must_use]
    pub fn fts(mut self) -> Self {
        self.fts = true;
        self
    }

    #[must_use]
    pub fn references(mut self, table: &str, column: &str) -> Self {
        self.reference = Some(Reference {
            table: table.to_string(),
            column: column.to_string(),
        });
        self
    }

    fn to_sql(&self, name: &str) -> String {
        let mut code = format!("{name} {}", self.ty.as_sql());
        if self.primary_key {
            code.push_str(" PRIMARY KEY");
        }
        if self.auto_increment {
            code.push_str(" AUTOINCREMENT");
        }
        if !self.allow_null {
            code.push_str(" NOT NULL");
        }
        if self.unique {
            code.push_str(" UNIQUE");
        }
        if let Some(d) = &self.default {
            code.push_str(" DEFAULT ");
            code.push_str(&d.to_sql());
        }
        if let Some(r) = &self.reference {
            code.push_str(&format!(" REFERENCES {}({})", r.table, r.column));
        }
        code
    }
}

/// Ordered column definitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSchema {
    pub columns: Vec<(String, ColumnDef)>,
}

impl TableSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn column(mut self, name: &str, def: ColumnDef) -> Self {
        self.columns.push((name.to_string(), def));
        self
    }
}

/// Extra columns and seed data for a new table.
#[derive(Debug, Clone, Default)]
pub struct TableOpts {
    /// Add `time_created TEXT DEFAULT CURRENT_TIMESTAMP`.
    pub time_created: bool,
    /// Add `time_updated` plus a trigger stamping it on every update.
    pub time_updated: bool,
    /// Soft-delete through a nullable `time_deleted` column.
    pub paranoid: bool,
    /// Rows inserted right after creation.
    pub init_data: Vec<Row>,
}

/// DDL statements creating `table`, in execution order.
///
/// # Errors
///
/// * [`DbError::Config`] - the name ends in `_fts`, or `time_updated` is
///   requested without a primary key
/// * [`DbError::InvalidIdentifier`] - a table or column name is not a plain
///   identifier
pub fn create_table_sql(table: &str, schema: &TableSchema, opts: &TableOpts) -> Result<Vec<String>, DbError> {
    validate_ident(table)?;
    if table.ends_with("_fts") {
        return Err(DbError::Config(format!(
            "cannot manually operate a fts table: {table}"
        )));
    }

    let mut columns = schema.columns.clone();
    let now = DefaultValue::Keyword(SqlKeyword::CurrentTimestamp);
    if opts.time_created {
        columns.push(("time_created".into(), ColumnDef::text().default(now.clone())));
    }
    if opts.time_updated {
        columns.push(("time_updated".into(), ColumnDef::text().default(now)));
    }
    if opts.paranoid {
        columns.push(("time_deleted".into(), ColumnDef::text().allow_null()));
    }

    let mut defs = Vec::with_capacity(columns.len());
    for (name, def) in &columns {
        validate_ident(name)?;
        if let Some(r) = &def.reference {
            validate_ident(&r.table)?;
            validate_ident(&r.column)?;
        }
        defs.push(format!("    {}", def.to_sql(name)));
    }
    let mut stmts = vec![format!("CREATE TABLE {table} (\n{}\n)", defs.join(",\n"))];

    let mut pks = Vec::new();
    let mut fts = Vec::new();
    for (name, def) in &schema.columns {
        if def.primary_key {
            pks.push(name.as_str());
        }
        if def.index {
            stmts.push(format!("CREATE INDEX idx_{table}_{name} ON {table}({name})"));
        }
        if def.fts {
            fts.push(name.as_str());
        }
    }

    let pk_match = |alias: &str| {
        pks.iter()
            .map(|pk| format!("{pk} = {alias}.{pk}"))
            .collect::<Vec<_>>()
            .join(" AND ")
    };

    if opts.time_updated {
        if pks.is_empty() {
            return Err(DbError::Config(format!(
                "time_updated requires a primary key on table {table}"
            )));
        }
        stmts.push(format!(
            "CREATE TRIGGER trigger_{table}_time_updated\n\
             AFTER UPDATE ON {table}\n\
             BEGIN\n\
             UPDATE {table}\n\
             SET time_updated = CURRENT_TIMESTAMP\n\
             WHERE {};\n\
             END",
            pk_match("NEW")
        ));
    }

    if !fts.is_empty() {
        if pks.is_empty() {
            return Err(DbError::Config(format!(
                "full-text search requires a primary key on table {table}"
            )));
        }
        let all: Vec<&str> = pks.iter().chain(fts.iter()).copied().collect();
        stmts.push(format!(
            "CREATE VIRTUAL TABLE {table}_fts USING fts5 ({})",
            all.join(", ")
        ));
        stmts.push(format!(
            "CREATE TRIGGER trigger_{table}_fts_insert\n\
             AFTER INSERT ON {table}\n\
             BEGIN\n\
             INSERT INTO {table}_fts ({})\n\
             VALUES ({});\n\
             END",
            all.join(", "),
            all.iter().map(|c| format!("NEW.{c}")).collect::<Vec<_>>().join(", ")
        ));
        stmts.push(format!(
            "CREATE TRIGGER trigger_{table}_fts_update\n\
             AFTER UPDATE ON {table}\n\
             BEGIN\n\
             UPDATE {table}_fts\n\
             SET {}\n\
             WHERE {};\n\
             END",
            fts.iter().map(|c| format!("{c} = NEW.{c}")).collect::<Vec<_>>().join(", "),
            pk_match("NEW")
        ));
        stmts.push(format!(
            "CREATE TRIGGER trigger_{table}_fts_delete\n\
             AFTER DELETE ON {table}\n\
             BEGIN\n\
             DELETE FROM {table}_fts\n\
             WHERE {};\n\
             END",
            pk_match("OLD")
        ));
    }
    Ok(stmts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableSchema {
        TableSchema::new()
            .column("id", ColumnDef::integer().primary_key().auto_increment())
            .column("name", ColumnDef::text().unique().index())
            .column("admin", ColumnDef::boolean().default(false))
            .column("bio", ColumnDef::text().allow_null().fts())
    }

    #[test]
    fn test_column_sql() {
        let def = ColumnDef::integer().references("user", "id").allow_null();
        assert_eq!(def.to_sql("owner"), "owner INTEGER REFERENCES user(id)");
        let def = ColumnDef::text().default("it's");
        assert_eq!(def.to_sql("s"), "s TEXT NOT NULL DEFAULT 'it''s'");
    }

    #[test]
    fn test_create_table_statements() {
        let opts = TableOpts {
            time_created: true,
            time_updated: true,
            paranoid: true,
            ..Default::default()
        };
        let stmts = create_table_sql("user", &users(), &opts).unwrap();
        assert_eq!(
            stmts[0],
            "CREATE TABLE user (\n\
             \x20   id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,\n\
             \x20   name TEXT NOT NULL UNIQUE,\n\
             \x20   admin BOOLEAN NOT NULL DEFAULT 0,\n\
             \x20   bio TEXT,\n\
             \x20   time_created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,\n\
             \x20   time_updated TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,\n\
             \x20   time_deleted TEXT\n\
             )"
        );
        assert_eq!(stmts[1], "CREATE INDEX idx_user_name ON user(name)");
        assert!(stmts[2].starts_with("CREATE TRIGGER trigger_user_time_updated"));
        assert!(stmts[2].contains("WHERE id = NEW.id;"));
        assert_eq!(stmts[3], "CREATE VIRTUAL TABLE user_fts USING fts5 (id, bio)");
        assert!(stmts[4].contains("VALUES (NEW.id, NEW.bio);"));
        assert!(stmts[5].contains("SET bio = NEW.bio"));
        assert!(stmts[6].contains("WHERE id = OLD.id;"));
        assert_eq!(stmts.len(), 7);
    }

    #[test]
    fn test_time_updated_requires_primary_key() {
        let schema = TableSchema::new().column("name", ColumnDef::text());
        let opts = TableOpts {
            time_updated: true,
            ..Default::default()
        };
        assert!(matches!(
            create_table_sql("t", &schema, &opts),
            Err(DbError::Config(_))
        ));
    }

    #[test]
    fn test_fts_suffix_rejected() {
        let schema = TableSchema::new().column("id", ColumnDef::integer().primary_key());
        assert!(matches!(
            create_table_sql("post_fts", &schema, &TableOpts::default()),
            Err(DbError::Config(_))
        ));
    }
}
