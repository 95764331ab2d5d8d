use std::path::Path;
use std::sync::{Arc, LazyLock, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{Type, Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::model::{CanonicalListing, CompanyLevel, ExperienceLevel};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

static TABLE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cannot open store at {path}: {reason}")]
    Connect { path: String, reason: String },
    #[error("invalid table name '{0}'")]
    InvalidTable(String),
    #[error("store query failed: {0}")]
    Query(#[from] rusqlite::Error),
    #[error("store write failed for {url}: {source}")]
    Write {
        url: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("store worker failed: {0}")]
    Worker(String),
    #[error("retention window of {0} days is out of range")]
    InvalidRetention(i64),
}

/// Conditions for listing reads. Text filters are case-insensitive substring
/// matches, levels are exact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingFilter {
    /// Matches title, company or description.
    pub search: Option<String>,
    pub title: Option<String>,
    pub location: Option<String>,
    pub experience_level: Option<ExperienceLevel>,
    pub company_level: Option<CompanyLevel>,
}

/// Rows matching either condition are deleted.
#[derive(Debug, Clone)]
pub struct PurgeFilter {
    pub crawled_before: DateTime<Utc>,
    pub posted_marker: Option<Regex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Document store holding one row per listing url.
#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn find_many(
        &self,
        filter: &ListingFilter,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<CanonicalListing>, StoreError>;

    async fn count(&self, filter: &ListingFilter) -> Result<u64, StoreError>;

    async fn upsert_by_url(&self, listing: CanonicalListing) -> Result<UpsertOutcome, StoreError>;

    async fn delete_many(&self, filter: &PurgeFilter) -> Result<u64, StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total: u64,
    pub per_experience: Vec<(String, u64)>,
    pub newest: Option<DateTime<Utc>>,
    pub oldest: Option<DateTime<Utc>>,
}

/// SQLite-backed [`ListingStore`]. One connection shared behind a mutex,
/// every call runs on the blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    table: Arc<str>,
}

impl SqliteStore {
    pub fn open(path: &str, table: &str) -> Result<Self, StoreError> {
        check_table(table)?;
        let connect_err = |reason: String| StoreError::Connect {
            path: path.to_string(),
            reason,
        };

        if path != ":memory:" {
            if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir).map_err(|e| connect_err(e.to_string()))?;
            }
        }
        let conn = Connection::open(path).map_err(|e| connect_err(e.to_string()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| connect_err(e.to_string()))?;
        Self::init(conn, table)
    }

    pub fn open_in_memory(table: &str) -> Result<Self, StoreError> {
        check_table(table)?;
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Connect {
            path: ":memory:".into(),
            reason: e.to_string(),
        })?;
        Self::init(conn, table)
    }

    fn init(conn: Connection, table: &str) -> Result<Self, StoreError> {
        register_regexp(&conn)?;
        init_schema(&conn, table)?;
        debug!(table, "Store ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table: Arc::from(table),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &str) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let table = Arc::clone(&self.table);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| StoreError::Worker("connection lock poisoned".into()))?;
            f(&conn, &table)
        })
        .await
        .map_err(|e| StoreError::Worker(e.to_string()))?
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.with_conn(|conn, table| {
            let (total, newest, oldest): (i64, Option<DateTime<Utc>>, Option<DateTime<Utc>>) =
                conn.query_row(
                    &format!("SELECT COUNT(*), MAX(date_crawled), MIN(date_crawled) FROM {table}"),
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT experience_level, COUNT(*) FROM {table}
                 GROUP BY experience_level ORDER BY COUNT(*) DESC, experience_level"
            ))?;
            let per_experience = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(StoreStats {
                total: total as u64,
                per_experience,
                newest,
                oldest,
            })
        })
        .await
    }
}

fn check_table(table: &str) -> Result<(), StoreError> {
    if TABLE_NAME_RE.is_match(table) {
        Ok(())
    } else {
        Err(StoreError::InvalidTable(table.to_string()))
    }
}

fn init_schema(conn: &Connection, table: &str) -> Result<(), StoreError> {
    conn.execute_batch(&format!(
        "
        CREATE TABLE IF NOT EXISTS {table} (
            id               INTEGER PRIMARY KEY,
            url              TEXT UNIQUE NOT NULL,
            title            TEXT NOT NULL,
            company          TEXT NOT NULL DEFAULT '',
            location         TEXT NOT NULL DEFAULT '',
            experience_level TEXT NOT NULL,
            company_level    TEXT,
            job_type         TEXT NOT NULL,
            description      TEXT NOT NULL DEFAULT '',
            posted_date      TEXT,
            date_crawled     TEXT NOT NULL,
            experience_text  TEXT,
            salary           TEXT,
            skills           TEXT,
            posted_text      TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_crawled ON {table}(date_crawled);
        CREATE INDEX IF NOT EXISTS idx_{table}_experience ON {table}(experience_level);
        "
    ))?;
    Ok(())
}

/// `regexp(pattern, text)`; NULL text never matches.
fn register_regexp(conn: &Connection) -> Result<(), StoreError> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let re: Arc<Regex> = ctx.get_or_create_aux(0, |vr| -> Result<_, BoxError> {
                Ok(Regex::new(vr.as_str()?)?)
            })?;
            match ctx.get_raw(1) {
                ValueRef::Null => Ok(false),
                value => {
                    let text = value
                        .as_str()
                        .map_err(|e| rusqlite::Error::UserFunctionError(e.into()))?;
                    Ok(re.is_match(text))
                }
            }
        },
    )?;
    Ok(())
}

// ── Filters ──

/// WHERE clause (empty when unfiltered) and its positional parameters.
fn where_clause(filter: &ListingFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    if let Some(search) = non_empty(&filter.search) {
        clauses.push(
            "(instr(lower(title), lower(?)) > 0 \
             OR instr(lower(company), lower(?)) > 0 \
             OR instr(lower(description), lower(?)) > 0)",
        );
        for _ in 0..3 {
            values.push(Value::Text(search.to_string()));
        }
    }
    if let Some(title) = non_empty(&filter.title) {
        clauses.push("instr(lower(title), lower(?)) > 0");
        values.push(Value::Text(title.to_string()));
    }
    if let Some(location) = non_empty(&filter.location) {
        clauses.push("instr(lower(location), lower(?)) > 0");
        values.push(Value::Text(location.to_string()));
    }
    if let Some(level) = filter.experience_level {
        clauses.push("experience_level = ?");
        values.push(Value::Text(level.as_str().to_string()));
    }
    if let Some(level) = filter.company_level {
        clauses.push("company_level = ?");
        values.push(Value::Text(level.as_str().to_string()));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

// ── Rows ──

const COLUMNS: &str = "title, company, location, experience_level, company_level, job_type, \
     description, url, posted_date, date_crawled, experience_text, salary, skills, posted_text";

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn listing_from_row(row: &Row<'_>) -> rusqlite::Result<CanonicalListing> {
    let company_level = match row.get::<_, Option<String>>(4)? {
        Some(text) => Some(text.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
        })?),
        None => None,
    };
    Ok(CanonicalListing {
        title: row.get(0)?,
        company: row.get(1)?,
        location: row.get(2)?,
        experience_level: parse_column(row, 3)?,
        company_level,
        job_type: parse_column(row, 5)?,
        description: row.get(6)?,
        url: row.get(7)?,
        posted_date: row.get(8)?,
        date_crawled: row.get(9)?,
        experience_text: row.get(10)?,
        salary: row.get(11)?,
        skills: row.get(12)?,
        posted_text: row.get(13)?,
    })
}

fn upsert(conn: &Connection, table: &str, l: &CanonicalListing) -> rusqlite::Result<UpsertOutcome> {
    let tx = conn.unchecked_transaction()?;
    let exists = tx
        .query_row(&format!("SELECT 1 FROM {table} WHERE url = ?1"), [&l.url], |_| Ok(()))
        .optional()?
        .is_some();

    tx.execute(
        &format!(
            "INSERT INTO {table} ({COLUMNS})
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)
             ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                company = excluded.company,
                location = excluded.location,
                experience_level = excluded.experience_level,
                company_level = COALESCE(excluded.company_level, {table}.company_level),
                job_type = excluded.job_type,
                description = excluded.description,
                posted_date = excluded.posted_date,
                date_crawled = excluded.date_crawled,
                experience_text = excluded.experience_text,
                salary = excluded.salary,
                skills = excluded.skills,
                posted_text = excluded.posted_text"
        ),
        params![
            l.title,
            l.company,
            l.location,
            l.experience_level.as_str(),
            l.company_level.map(|c| c.as_str()),
            l.job_type.as_str(),
            l.description,
            l.url,
            l.posted_date,
            l.date_crawled,
            l.experience_text,
            l.salary,
            l.skills,
            l.posted_text,
        ],
    )?;
    tx.commit()?;

    Ok(if exists {
        UpsertOutcome::Updated
    } else {
        UpsertOutcome::Inserted
    })
}

#[async_trait]
impl ListingStore for SqliteStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.with_conn(|conn, _| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
        .await
    }

    async fn find_many(
        &self,
        filter: &ListingFilter,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<CanonicalListing>, StoreError> {
        let (clause, mut values) = where_clause(filter);
        values.push(Value::Integer(limit.min(i64::MAX as u64) as i64));
        values.push(Value::Integer(skip.min(i64::MAX as u64) as i64));
        self.with_conn(move |conn, table| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM {table}{clause}
                 ORDER BY date_crawled DESC, url
                 LIMIT ? OFFSET ?"
            ))?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), listing_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn count(&self, filter: &ListingFilter) -> Result<u64, StoreError> {
        let (clause, values) = where_clause(filter);
        self.with_conn(move |conn, table| {
            let n: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {table}{clause}"),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
        .await
    }

    async fn upsert_by_url(&self, listing: CanonicalListing) -> Result<UpsertOutcome, StoreError> {
        self.with_conn(move |conn, table| {
            upsert(conn, table, &listing).map_err(|source| StoreError::Write {
                url: listing.url.clone(),
                source,
            })
        })
        .await
    }

    async fn delete_many(&self, filter: &PurgeFilter) -> Result<u64, StoreError> {
        let crawled_before = filter.crawled_before;
        let marker = filter.posted_marker.as_ref().map(|re| re.as_str().to_string());
        self.with_conn(move |conn, table| {
            let deleted = match marker {
                Some(pattern) => conn.execute(
                    &format!(
                        "DELETE FROM {table}
                         WHERE date_crawled < ?1 OR regexp(?2, posted_text)"
                    ),
                    params![crawled_before, pattern],
                )?,
                None => conn.execute(
                    &format!("DELETE FROM {table} WHERE date_crawled < ?1"),
                    params![crawled_before],
                )?,
            };
            Ok(deleted as u64)
        })
        .await
    }
}
