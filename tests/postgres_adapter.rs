//! Runs against a live PostgreSQL server when `TEST_DATABASE_URL` is set.
//! Every test returns early otherwise.

use chrono::NaiveDate;
use fleetdb::{Backend, Config, DbAdapter, RunResult, params};
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};

async fn connect() -> Option<DbAdapter> {
    let url = std::env::var("TEST_DATABASE_URL")
        .ok()
        .filter(|u| !u.trim().is_empty())?;
    let cfg = Config {
        database_url: Some(url),
        pool_size: 2,
        ..Config::default()
    };
    Some(DbAdapter::connect(&cfg).await.expect("failed to build pg pool"))
}

fn scratch_table(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .subsec_nanos();
    format!("{prefix}_{}_{nanos}", std::process::id())
}

async fn create_items(db: &DbAdapter, table: &str) {
    db.run_converted(
        &format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT UNIQUE NOT NULL,
                qty INTEGER,
                price REAL,
                due DATE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )"
        ),
        (),
    )
    .await
    .expect("create table failed");
}

async fn drop_table(db: &DbAdapter, table: &str) {
    db.run(&format!("DROP TABLE IF EXISTS {table}"), ())
        .await
        .expect("drop table failed");
}

#[tokio::test]
async fn converted_insert_returns_serial_id() {
    let Some(db) = connect().await else { return };
    assert_eq!(db.backend(), Backend::Postgres);
    let table = scratch_table("items");
    create_items(&db, &table).await;

    let first = db
        .run_converted(
            &format!("INSERT INTO {table} (code, qty, price) VALUES (?, ?, ?);"),
            params!["A-1", 3, 9.5],
        )
        .await
        .unwrap();
    assert_eq!(first.changes, 1);
    let id = first.last_id.expect("serial id reported");

    let row = db
        .get_converted(&format!("SELECT * FROM {table} WHERE id = ?"), params![id])
        .await
        .unwrap()
        .expect("row inserted");
    assert_eq!(row["code"], json!("A-1"));
    assert_eq!(row["qty"], json!(3));
    assert_eq!(row["price"], json!(9.5));
    assert!(row["created_at"].is_string());

    drop_table(&db, &table).await;
}

#[tokio::test]
async fn insert_or_ignore_becomes_on_conflict() {
    let Some(db) = connect().await else { return };
    let table = scratch_table("items");
    create_items(&db, &table).await;

    let sql = format!("INSERT OR IGNORE INTO {table} (code, qty) VALUES (?, ?)");
    let inserted = db.run_converted(&sql, params!["dup", 1]).await.unwrap();
    assert_eq!(inserted.changes, 1);
    let ignored = db.run_converted(&sql, params!["dup", 2]).await.unwrap();
    assert_eq!(ignored, RunResult::default());

    drop_table(&db, &table).await;
}

#[tokio::test]
async fn plain_duplicate_is_unique_violation() {
    let Some(db) = connect().await else { return };
    let table = scratch_table("items");
    create_items(&db, &table).await;

    let sql = format!("INSERT INTO {table} (code) VALUES (?)");
    db.run_converted(&sql, params!["same"]).await.unwrap();
    let err = db.run_converted(&sql, params!["same"]).await.unwrap_err();
    assert!(err.is_unique_violation(), "{err}");

    drop_table(&db, &table).await;
}

#[tokio::test]
async fn update_reports_rows_affected() {
    let Some(db) = connect().await else { return };
    let table = scratch_table("items");
    create_items(&db, &table).await;

    for code in ["x", "y", "z"] {
        db.run_converted(
            &format!("INSERT INTO {table} (code, qty) VALUES (?, ?)"),
            params![code, None::<i64>],
        )
        .await
        .unwrap();
    }
    let updated = db
        .run_converted(&format!("UPDATE {table} SET qty = ? WHERE qty IS NULL"), params![7])
        .await
        .unwrap();
    assert_eq!(updated, RunResult { last_id: None, changes: 3 });

    let rows = db
        .all_converted(&format!("SELECT code FROM {table} WHERE qty = ? ORDER BY code"), params![7])
        .await
        .unwrap();
    let codes: Vec<_> = rows.iter().map(|r| r["code"].clone()).collect();
    assert_eq!(codes, vec![json!("x"), json!("y"), json!("z")]);

    drop_table(&db, &table).await;
}

#[tokio::test]
async fn sqlite_date_functions_run_on_postgres() {
    let Some(db) = connect().await else { return };
    let row = db
        .get_converted(
            "SELECT date('now', '+7 days') > date('now') AS later, datetime('now') <= datetime('now') AS stable",
            (),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row["later"], json!(true));
    assert_eq!(row["stable"], json!(true));
}

#[tokio::test]
async fn numeric_and_bytea_columns_decode() {
    let Some(db) = connect().await else { return };
    let row = db
        .get(
            "SELECT 12.50::numeric AS amount, '\\xcafe'::bytea AS blob, NULL::text AS missing",
            (),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row["amount"], json!("12.50"));
    assert_eq!(row["blob"], json!("yv4="));
    assert_eq!(row["missing"], json!(null));
}

#[tokio::test]
async fn interval_oid_and_array_columns_decode() {
    let Some(db) = connect().await else { return };
    let row = db
        .get(
            "SELECT interval '7 days' AS week, \
                    interval '1 year 2 months 3 days 04:05:06' AS long, \
                    26::oid AS o, \
                    ARRAY['a', 'b'] AS tags, \
                    ARRAY[1, 2, 3] AS nums, \
                    'ab'::char(3) AS padded, \
                    '10.0.0.1'::inet AS addr",
            (),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row["week"], json!("7 days"));
    assert_eq!(row["long"], json!("1 year 2 mons 3 days 04:05:06"));
    assert_eq!(row["o"], json!(26));
    assert_eq!(row["tags"], json!(["a", "b"]));
    assert_eq!(row["nums"], json!([1, 2, 3]));
    assert_eq!(row["padded"], json!("ab "));
    let addr = row["addr"].as_str().expect("inet rendered as a string");
    assert!(!addr.contains('\u{0}'), "{addr:?}");
}

#[tokio::test]
async fn text_params_are_typed_not_coerced() {
    let Some(db) = connect().await else { return };
    let table = scratch_table("items");
    create_items(&db, &table).await;

    let insert = format!("INSERT INTO {table} (code, due) VALUES (?, ?)");
    let err = db
        .run_converted(&insert, params!["txt", "2030-01-15"])
        .await
        .unwrap_err();
    assert!(err.database_error().is_some(), "{err}");

    let due = NaiveDate::from_ymd_opt(2030, 1, 15).unwrap();
    let ok = db.run_converted(&insert, params!["date", due]).await.unwrap();
    let id = ok.last_id.expect("serial id reported");

    let by_text = db
        .get_converted(&format!("SELECT code FROM {table} WHERE id = ?"), params![id.to_string()])
        .await;
    assert!(by_text.is_err());

    let cast = db
        .get_converted(
            &format!("SELECT due FROM {table} WHERE id = ?::integer AND due = ?::date"),
            params![id.to_string(), "2030-01-15"],
        )
        .await
        .unwrap()
        .expect("cast parameters match");
    assert_eq!(cast["due"], json!("2030-01-15"));

    drop_table(&db, &table).await;
}

#[tokio::test]
async fn missing_table_is_classified() {
    let Some(db) = connect().await else { return };
    let err = db
        .all_converted("SELECT * FROM fleetdb_table_that_does_not_exist", ())
        .await
        .unwrap_err();
    assert!(err.is_undefined_table(), "{err}");
}
