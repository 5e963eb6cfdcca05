use crate::errors::{ErrorKind, StoreError};
use crate::models::{Article, ErrorRecord};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use rusqlite::{Connection, ErrorCode, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use super::Storage;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS article (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    visited_url TEXT NOT NULL,
    scraped_from TEXT NOT NULL,
    netloc TEXT NOT NULL,
    path TEXT NOT NULL,
    title TEXT NOT NULL,
    text TEXT NOT NULL,
    description TEXT,
    summary TEXT NOT NULL,
    authors TEXT NOT NULL,
    images TEXT NOT NULL,
    lang TEXT,
    keywords TEXT NOT NULL,
    publish_date TEXT,
    fake INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_article_visited_url ON article(visited_url);

CREATE TABLE IF NOT EXISTS "error" (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL,
    url TEXT NOT NULL,
    source_article TEXT,
    from_fake INTEGER NOT NULL,
    additional_info TEXT,
    creation_date TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_error_url ON "error"(url);
"#;

const INSERT_ARTICLE: &str = r#"
INSERT INTO article (url, visited_url, scraped_from, netloc, path, title, text, description,
                     summary, authors, images, lang, keywords, publish_date, fake)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
RETURNING url
"#;

const INSERT_ERROR: &str = r#"
INSERT INTO "error" (type, url, source_article, from_fake, additional_info, creation_date)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#;

const DELETE_DUPLICATE_ERRORS: &str = r#"
DELETE FROM "error"
WHERE id NOT IN (SELECT MAX(id) FROM "error" GROUP BY url)
"#;

const DELETE_RESOLVED_ERRORS: &str = r#"
DELETE FROM "error"
WHERE url IN (SELECT url FROM article)
   OR url IN (SELECT visited_url FROM article)
"#;

#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` on the blocking pool with the connection locked.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Task("connection lock poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn insert_article(conn: &Connection, a: &Article) -> Result<String, StoreError> {
    let authors = serde_json::to_string(&a.authors)?;
    let images = serde_json::to_string(&a.images)?;
    let keywords = serde_json::to_string(&a.keywords)?;
    let publish_date = a.publish_date.map(|d| d.to_rfc3339());
    conn.query_row(
        INSERT_ARTICLE,
        params![
            a.url,
            a.visited_url,
            a.scraped_from,
            a.netloc(),
            a.path(),
            a.title,
            a.text,
            a.description,
            a.summary,
            authors,
            images,
            a.lang,
            keywords,
            publish_date,
            a.fake,
        ],
        |row| row.get::<_, String>(0),
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(code, detail)
            if code.code == ErrorCode::ConstraintViolation =>
        {
            StoreError::UniqueViolation(detail.unwrap_or_else(|| format!("article.url {}", a.url)))
        }
        other => StoreError::Database(other),
    })
}

type ErrorRow = (String, String, Option<String>, bool, Option<String>, String);

fn read_error_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ErrorRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn store_articles(&self, articles: &[Article]) -> Vec<Result<String, StoreError>> {
        let owned = articles.to_vec();
        let count = owned.len();
        let outcome = self
            .with_conn(move |conn| {
                Ok(owned
                    .iter()
                    .map(|a| insert_article(conn, a))
                    .collect::<Vec<_>>())
            })
            .await;
        match outcome {
            Ok(results) => results,
            Err(e) => {
                let reason = e.to_string();
                (0..count).map(|_| Err(StoreError::Task(reason.clone()))).collect()
            }
        }
    }

    async fn store_errors(&self, errors: &[ErrorRecord]) -> Result<(), StoreError> {
        let owned = errors.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(INSERT_ERROR)?;
                for e in &owned {
                    stmt.execute(params![
                        e.kind.as_str(),
                        e.url,
                        e.source,
                        e.fake,
                        e.info,
                        e.timestamp.to_rfc3339(),
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn select_errors(
        &self,
        fake: bool,
        exclude: &[ErrorKind],
    ) -> Result<Vec<ErrorRecord>, StoreError> {
        let exclude = exclude.to_vec();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                r#"SELECT type, url, source_article, from_fake, additional_info, creation_date
                   FROM "error" WHERE from_fake = ?1 ORDER BY id"#,
            )?;
            let rows = stmt.query_map(params![fake], read_error_row)?;
            let mut records = Vec::new();
            for row in rows {
                let (kind, url, source, fake, info, created) = row?;
                let kind = match kind.parse::<ErrorKind>() {
                    Ok(kind) if !exclude.contains(&kind) => kind,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(%url, error = %e, "Skipping error row");
                        continue;
                    }
                };
                let timestamp = DateTime::parse_from_rfc3339(&created)
                    .map(|d| d.with_timezone(&Local))
                    .unwrap_or_else(|_| Local::now());
                records.push(ErrorRecord {
                    kind,
                    url,
                    source,
                    fake,
                    info,
                    timestamp,
                });
            }
            Ok(records)
        })
        .await
    }

    async fn delete_resolved_and_duplicate_errors(&self) -> Result<(usize, usize), StoreError> {
        let counts = self
            .with_conn(|conn| {
                let duplicates = conn.execute(DELETE_DUPLICATE_ERRORS, [])?;
                let resolved = conn.execute(DELETE_RESOLVED_ERRORS, [])?;
                Ok((duplicates, resolved))
            })
            .await?;
        info!(duplicates = counts.0, resolved = counts.1, "Error table cleaned");
        Ok(counts)
    }
}

#[cfg(test)]
impl SqliteStorage {
    /// URL of a stored article, if any.
    pub async fn article_url(&self, url: &str) -> Result<Option<String>, StoreError> {
        use rusqlite::OptionalExtension;
        let url = url.to_string();
        self.with_conn(move |conn| {
            conn.query_row("SELECT url FROM article WHERE url = ?1", params![url], |row| row.get(0))
                .optional()
                .map_err(Into::into)
        })
        .await
    }
}
