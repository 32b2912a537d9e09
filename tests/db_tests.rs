//! Tests for the SQLite table layer against real database files
//!
//! # Test Coverage
//!
//! - Schema creation with references, indexes and timestamps
//! - Filters, ordering, pagination and joins through `Table::select`
//! - Boolean decoding and soft deletes
//! - Full-text search kept in sync by triggers
//! - Nested transactions and persistence across reopen

use sitekit::db::{
    row, ColumnDef, ColumnName, Database, DatabaseOpts, DbError, Join, JoinKind, Op, Order,
    SelectOpts, Table, TableOpts, TableSchema, Value, Where,
};

struct Blog {
    db: Database,
    users: Table,
    posts: Table,
}

fn blog(db: Database) -> Blog {
    let users = db
        .table(
            "user",
            &TableSchema::new()
                .column("id", ColumnDef::integer().primary_key().auto_increment())
                .column("name", ColumnDef::text().unique())
                .column("admin", ColumnDef::boolean().default(false)),
            TableOpts {
                time_created: true,
                ..Default::default()
            },
        )
        .unwrap();
    let posts = db
        .table(
            "post",
            &TableSchema::new()
                .column("id", ColumnDef::integer().primary_key().auto_increment())
                .column("author", ColumnDef::integer().index().references("user", "id"))
                .column("title", ColumnDef::text().fts())
                .column("body", ColumnDef::text().fts())
                .column("score", ColumnDef::integer().default(0)),
            TableOpts {
                time_created: true,
                time_updated: true,
                paranoid: true,
                ..Default::default()
            },
        )
        .unwrap();
    Blog { db, users, posts }
}

fn seed(b: &Blog) {
    let fang = b
        .users
        .insert(&row([("name", "fang".into()), ("admin", true.into())]))
        .unwrap();
    let kit = b.users.insert(&row([("name", "kit".into())])).unwrap();
    for (author, title, body, score) in [
        (fang, "Rust lifetimes", "borrowing explained", 5),
        (fang, "SQLite tricks", "savepoints and triggers", 3),
        (kit, "Gardening", "tomatoes all summer", 8),
        (kit, "Rust in the garden", "a sensor project", 1),
    ] {
        b.posts
            .insert(&row([
                ("author", author.into()),
                ("title", title.into()),
                ("body", body.into()),
                ("score", score.into()),
            ]))
            .unwrap();
    }
}

fn titles(rows: &[sitekit::db::Row]) -> Vec<String> {
    rows.iter()
        .map(|r| r["title"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_select_filters_and_pagination() {
    let b = blog(Database::memory().unwrap());
    seed(&b);

    let rows = b
        .posts
        .select(&SelectOpts {
            filter: Where::new().op("score", Op::Ge, 3),
            order: Some(Order::desc(["score"])),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(titles(&rows), vec!["Gardening", "Rust lifetimes", "SQLite tricks"]);

    let page = b
        .posts
        .select(&SelectOpts {
            order: Some(Order::asc(["id"])),
            limit: Some(2),
            offset: Some(1),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(titles(&page), vec!["SQLite tricks", "Gardening"]);

    let rows = b
        .posts
        .find_all(&Where::new().op("title", Op::Like, "Rust%").between("score", 0, 4))
        .unwrap();
    assert_eq!(titles(&rows), vec!["Rust in the garden"]);

    assert_eq!(b.posts.count(&Where::new().is_in("score", [1, 8])).unwrap(), 2);
    assert_eq!(b.posts.count(&Where::new().not_in("score", [1, 8])).unwrap(), 2);
}

#[test]
fn test_distinct_columns() {
    let b = blog(Database::memory().unwrap());
    seed(&b);
    let rows = b
        .posts
        .select(&SelectOpts {
            columns: ["author"].into(),
            distinct: true,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.len() == 1));
}

#[test]
fn test_join_with_alias() {
    let b = blog(Database::memory().unwrap());
    seed(&b);
    let rows = b
        .posts
        .select(&SelectOpts {
            columns: ["title"].into(),
            filter: Where::new().eq("user.name", "kit"),
            order: Some(Order::asc(["post.id"])),
            joins: vec![Join::new("user", "id", "post", "author")
                .kind(JoinKind::Inner)
                .columns([ColumnName::aliased("name", "author_name")])],
            ..Default::default()
        })
        .unwrap();
    assert_eq!(titles(&rows), vec!["Gardening", "Rust in the garden"]);
    assert_eq!(rows[0]["author_name"], Value::Text("kit".into()));
}

#[test]
fn test_booleans_and_defaults() {
    let b = blog(Database::memory().unwrap());
    seed(&b);
    let fang = b.users.find(&Where::new().eq("name", "fang")).unwrap().unwrap();
    let kit = b.users.find(&Where::new().eq("name", "kit")).unwrap().unwrap();
    assert_eq!(fang["admin"], Value::Bool(true));
    assert_eq!(kit["admin"], Value::Bool(false));
    assert!(fang["time_created"].as_str().is_some());

    let admins = b.users.find_all(&Where::new().eq("admin", true)).unwrap();
    assert_eq!(admins.len(), 1);
}

#[test]
fn test_unique_violation_is_sqlite_error() {
    let b = blog(Database::memory().unwrap());
    seed(&b);
    let err = b.users.insert(&row([("name", "fang".into())])).unwrap_err();
    assert!(matches!(err, DbError::Sqlite(_)));
}

#[test]
fn test_update_stamps_time_updated() {
    let b = blog(Database::memory().unwrap());
    seed(&b);
    let changed = b
        .posts
        .update(&row([("score", 10.into())]), &Where::new().eq("title", "Gardening"))
        .unwrap();
    assert_eq!(changed, 1);
    let post = b.posts.find(&Where::new().eq("title", "Gardening")).unwrap().unwrap();
    assert_eq!(post["score"], Value::Integer(10));
    assert!(post["time_updated"].as_str().is_some());
}

#[test]
fn test_soft_delete_hides_from_select_count_and_search() {
    let b = blog(Database::memory().unwrap());
    seed(&b);
    assert_eq!(b.posts.search("rust").unwrap().len(), 2);

    let deleted = b.posts.delete(&Where::new().eq("title", "Rust lifetimes")).unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(b.posts.count(&Where::new()).unwrap(), 3);
    assert!(b.posts.find(&Where::new().eq("title", "Rust lifetimes")).unwrap().is_none());
    assert_eq!(titles(&b.posts.search("rust").unwrap()), vec!["Rust in the garden"]);

    let raw = b
        .db
        .query(&sitekit::db::Query {
            sql: "SELECT COUNT(*) AS n FROM post WHERE time_deleted IS NOT NULL".into(),
            params: Vec::new(),
        })
        .unwrap();
    assert_eq!(raw[0]["n"], Value::Integer(1));
}

#[test]
fn test_search_tracks_updates_and_body_columns() {
    let b = blog(Database::memory().unwrap());
    seed(&b);
    assert_eq!(titles(&b.posts.search("tomatoes").unwrap()), vec!["Gardening"]);

    b.posts
        .update(
            &row([("body", "peppers all summer".into())]),
            &Where::new().eq("title", "Gardening"),
        )
        .unwrap();
    assert!(b.posts.search("tomatoes").unwrap().is_empty());
    assert_eq!(b.posts.search("peppers").unwrap().len(), 1);
    assert!(b.users.search("fang").is_err());
}

#[test]
fn test_nested_transactions() {
    let b = blog(Database::memory().unwrap());
    let outer: Result<(), DbError> = b.db.transaction(|| {
        b.users.insert(&row([("name", "outer".into())]))?;
        let inner: Result<(), DbError> = b.db.transaction(|| {
            b.users.insert(&row([("name", "inner".into())]))?;
            Err(DbError::Config("abort inner".into()))
        });
        assert!(inner.is_err());
        Ok(())
    });
    outer.unwrap();
    let names: Vec<Value> = b
        .users
        .find_all(&Where::new())
        .unwrap()
        .into_iter()
        .map(|r| r["name"].clone())
        .collect();
    assert_eq!(names, vec![Value::Text("outer".into())]);
}

#[test]
fn test_reopen_keeps_rows_and_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data/blog.db");
    {
        let b = blog(Database::open(&path, DatabaseOpts { wal: true }).unwrap());
        seed(&b);
    }
    let db = Database::open(&path, DatabaseOpts::default()).unwrap();
    let posts = db.get_table("post").unwrap().unwrap();
    assert!(posts.is_paranoid());
    assert_eq!(posts.primary_keys(), ["id".to_string()]);
    assert_eq!(posts.count(&Where::new()).unwrap(), 4);
    assert_eq!(posts.search("savepoints").unwrap().len(), 1);
}

#[test]
fn test_identifiers_are_validated() {
    let b = blog(Database::memory().unwrap());
    let err = b
        .posts
        .find_all(&Where::new().eq("title; DROP TABLE post", "x"))
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidIdentifier(_)));
    assert!(b.db.has_table("post").unwrap());
}
