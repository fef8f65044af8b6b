//! SQLite-backed document collections.
//!
//! Each collection is a table `(_id, doc, inserted_at)`; `doc` holds the JSON
//! text and is guarded by `json_valid`. Collection names are interpolated into
//! DDL, so they are restricted to identifiers.
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{DocumentCollection, StoreError};

/// Open a pool for `database_url`, creating the database file (and its parent
/// directory) when missing.
///
/// The pool holds a single connection: writes are sequential, and an
/// in-memory database only exists inside the connection that created it.
pub async fn connect(database_url: &str) -> Result<SqlitePool, StoreError> {
    let url = prepare_sqlite_url(database_url)?;
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    info!(url=%url, "store.connect");
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched.
fn prepare_sqlite_url(url: &str) -> Result<String, StoreError> {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return Ok(url.to_string());
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return Ok(url.to_string());
    }

    let expanded_path = match path_part.strip_prefix("~/") {
        Some(rest) => match std::env::var("HOME") {
            Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
            Err(_) => path_part.to_string(),
        },
        None => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Config(format!(
                    "cannot create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
    }

    let mut rebuilt = format!("sqlite://{expanded_path}");
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    Ok(rebuilt)
}

fn validate_collection_name(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StoreError::Config(format!(
            "collection name `{name}` must be an identifier ([A-Za-z_][A-Za-z0-9_]*)"
        )));
    }
    if name.to_ascii_lowercase().starts_with("sqlite_") {
        return Err(StoreError::Config(format!(
            "collection name `{name}` uses the reserved sqlite_ prefix"
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct SqliteCollection {
    pool: SqlitePool,
    name: String,
    insert_sql: String,
}

impl SqliteCollection {
    /// Bind to collection `name`, creating its table if it does not exist yet.
    pub async fn open(pool: SqlitePool, name: &str) -> Result<Self, StoreError> {
        validate_collection_name(name)?;
        let ddl = format!(
            r#"CREATE TABLE IF NOT EXISTS "{name}" (
                 _id         TEXT PRIMARY KEY NOT NULL,
                 doc         TEXT NOT NULL CHECK (json_valid(doc)),
                 inserted_at TEXT NOT NULL
               )"#
        );
        sqlx::query(&ddl).execute(&pool).await?;
        debug!(collection=%name, "store.collection.open");
        Ok(Self {
            insert_sql: format!(r#"INSERT INTO "{name}" (_id, doc, inserted_at) VALUES (?1, ?2, ?3)"#),
            pool,
            name: name.to_string(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of documents currently stored.
    pub async fn count(&self) -> Result<i64, StoreError> {
        let row = sqlx::query(&format!(r#"SELECT COUNT(*) AS n FROM "{}""#, self.name))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("n")?)
    }
}

#[async_trait]
impl DocumentCollection for SqliteCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_one(&self, document: &Value) -> Result<String, StoreError> {
        if !document.is_object() {
            return Err(StoreError::InvalidDocument(
                "top-level document must be a JSON object".into(),
            ));
        }
        let body = serde_json::to_string(document)
            .map_err(|e| StoreError::InvalidDocument(e.to_string()))?;
        let id = Uuid::new_v4().to_string();
        let inserted_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        let res = sqlx::query(&self.insert_sql)
            .bind(&id)
            .bind(&body)
            .bind(&inserted_at)
            .execute(&self.pool)
            .await?;
        debug!(
            collection=%self.name,
            doc_id=%id,
            rows=res.rows_affected(),
            "store.insert_one"
        );
        Ok(id)
    }
}
