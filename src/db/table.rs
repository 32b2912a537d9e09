use std::sync::Arc;

use super::query::{count_sql, delete_sql, insert_sql, select_sql, update_sql};
use super::{Database, DbError, Query, Row, SelectOpts, SqlKeyword, Value, Where};

/// Handle to one table.
///
/// Cheap to clone; clones share the database connection. Column metadata is
/// read from the catalog when the handle is created.
#[derive(Debug, Clone)]
pub struct Table {
    db: Database,
    name: String,
    paranoid: bool,
    has_fts: bool,
    bool_columns: Arc<Vec<String>>,
    primary_keys: Arc<Vec<String>>,
}

impl Table {
    pub(crate) fn load(db: Database, name: &str) -> Result<Self, DbError> {
        let columns = db.with_conn(|c| {
            let mut stmt = c.prepare(&format!("PRAGMA table_info({name})"))?;
            let rows = stmt.query_map([], |r| {
                Ok((
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, i64>(5)?,
                ))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;
        let paranoid = columns.iter().any(|(n, _, _)| n == "time_deleted");
        let bool_columns = columns
            .iter()
            .filter(|(_, ty, _)| ty.eq_ignore_ascii_case("BOOLEAN"))
            .map(|(n, _, _)| n.clone())
            .collect();
        let primary_keys = columns
            .iter()
            .filter(|(_, _, pk)| *pk > 0)
            .map(|(n, _, _)| n.clone())
            .collect();
        let has_fts = db.has_table(&format!("{name}_fts"))?;
        Ok(Self {
            db,
            name: name.to_string(),
            paranoid,
            has_fts,
            bool_columns: Arc::new(bool_columns),
            primary_keys: Arc::new(primary_keys),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether deletes are soft (`time_deleted`).
    #[must_use]
    pub fn is_paranoid(&self) -> bool {
        self.paranoid
    }

    #[must_use]
    pub fn primary_keys(&self) -> &[String] {
        &self.primary_keys
    }

    fn decode(&self, mut rows: Vec<Row>) -> Vec<Row> {
        if self.bool_columns.is_empty() {
            return rows;
        }
        for row in &mut rows {
            for col in self.bool_columns.iter() {
                if let Some(v) = row.get_mut(col) {
                    if let Value::Integer(n) = *v {
                        *v = Value::Bool(n != 0);
                    }
                }
            }
        }
        rows
    }

    /// Select rows. Soft-deleted rows of paranoid tables are skipped.
    pub fn select(&self, opts: &SelectOpts) -> Result<Vec<Row>, DbError> {
        let q = select_sql(&self.name, opts, self.paranoid)?;
        Ok(self.decode(self.db.query(&q)?))
    }

    /// First row matching `filter`.
    pub fn find(&self, filter: &Where) -> Result<Option<Row>, DbError> {
        let opts = SelectOpts {
            filter: filter.clone(),
            limit: Some(1),
            ..SelectOpts::default()
        };
        Ok(self.select(&opts)?.into_iter().next())
    }

    pub fn find_all(&self, filter: &Where) -> Result<Vec<Row>, DbError> {
        self.select(&SelectOpts::filter(filter.clone()))
    }

    pub fn count(&self, filter: &Where) -> Result<i64, DbError> {
        let q = count_sql(&self.name, filter, self.paranoid)?;
        Ok(self
            .db
            .query(&q)?
            .first()
            .and_then(|r| r.get("count"))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    /// Full-text search over the `fts` columns, best match first.
    ///
    /// # Errors
    ///
    /// [`DbError::Config`] if the table has no full-text columns.
    pub fn search(&self, text: &str) -> Result<Vec<Row>, DbError> {
        if !self.has_fts || self.primary_keys.is_empty() {
            return Err(DbError::Config(format!(
                "table {} has no full-text index",
                self.name
            )));
        }
        let t = &self.name;
        let on = self
            .primary_keys
            .iter()
            .map(|pk| format!("{t}.{pk} = {t}_fts.{pk}"))
            .collect::<Vec<_>>()
            .join(" AND ");
        let mut sql = format!("SELECT {t}.* FROM {t}_fts JOIN {t} ON {on} WHERE {t}_fts MATCH $query");
        if self.paranoid {
            sql.push_str(&format!(" AND {t}.time_deleted IS NULL"));
        }
        sql.push_str(&format!(" ORDER BY {t}_fts.rank"));
        let q = Query {
            sql,
            params: vec![("$query".into(), Value::Text(text.to_string()))],
        };
        Ok(self.decode(self.db.query(&q)?))
    }

    /// Insert a row and return its rowid.
    ///
    /// # Errors
    ///
    /// [`DbError::EmptyInsert`] for an empty row; constraint violations come
    /// back as [`DbError::Sqlite`].
    pub fn insert(&self, data: &Row) -> Result<i64, DbError> {
        let q = insert_sql(&self.name, data)?;
        self.db.execute_insert(&q)
    }

    /// Update matching rows, returning how many changed.
    pub fn update(&self, data: &Row, filter: &Where) -> Result<usize, DbError> {
        let q = update_sql(&self.name, data, filter)?;
        self.db.execute(&q)
    }

    /// Delete matching rows. Paranoid tables stamp `time_deleted` instead.
    pub fn delete(&self, filter: &Where) -> Result<usize, DbError> {
        if self.paranoid {
            let data = Row::from([(
                "time_deleted".to_string(),
                Value::Keyword(SqlKeyword::CurrentTimestamp),
            )]);
            return self.update(&data, filter);
        }
        let q = delete_sql(&self.name, filter)?;
        self.db.execute(&q)
    }

    /// Remove every row, including soft-deleted ones.
    pub fn clear(&self) -> Result<usize, DbError> {
        self.db.execute(&delete_sql(&self.name, &Where::new())?)
    }
}
