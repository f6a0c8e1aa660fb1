use crate::types::{NewArticle, Result, SearchHit, SourceCategory, StoredArticle, WatchError};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{debug, info};

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        title TEXT NOT NULL,
        link TEXT NOT NULL,
        summary TEXT NOT NULL,
        score REAL NOT NULL,
        published TEXT NOT NULL,
        source TEXT NOT NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_articles_title_published ON articles(title, published)",
    "CREATE INDEX IF NOT EXISTS idx_articles_published ON articles(published)",
    r#"
    CREATE VIRTUAL TABLE IF NOT EXISTS articles_fts USING fts5(
        title,
        content,
        published UNINDEXED,
        article_id UNINDEXED
    )
    "#,
];

/// SQLite-backed article store with a full-text index kept in step with
/// the primary table. Assumes a single writer per database.
pub struct ArticleStore {
    db: SqlitePool,
}

impl ArticleStore {
    /// Open (creating if needed) the database at `database_url` and set up the schema
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let db = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { db };
        store.setup_schema().await?;
        info!("Article store ready at {}", database_url);
        Ok(store)
    }

    /// Private in-memory database, used by tests and dry runs
    pub async fn in_memory() -> Result<Self> {
        // one connection that never expires, or the database vanishes
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { db };
        store.setup_schema().await?;
        Ok(store)
    }

    pub async fn setup_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.db).await?;
        }
        debug!("Article schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Insert the articles whose `(title, published)` is not stored yet.
    ///
    /// Rows and index entries are written in one transaction; on failure
    /// nothing becomes visible. Returns the number of inserted rows.
    pub async fn persist(&self, articles: &[NewArticle]) -> Result<usize> {
        let rows = sqlx::query("SELECT title, published FROM articles")
            .fetch_all(&self.db)
            .await?;

        let mut seen: HashSet<(String, String)> = HashSet::with_capacity(rows.len());
        for row in &rows {
            seen.insert((row.try_get("title")?, row.try_get("published")?));
        }

        let fresh: Vec<&NewArticle> = articles
            .iter()
            .filter(|article| seen.insert(article.dedup_key()))
            .collect();

        if fresh.is_empty() {
            info!("Nothing new to persist ({} already stored)", articles.len());
            return Ok(0);
        }

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        for article in &fresh {
            let result = sqlx::query(
                r#"
                INSERT INTO articles (created_at, updated_at, title, link, summary, score, published, source)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(now)
            .bind(now)
            .bind(&article.title)
            .bind(&article.link)
            .bind(&article.summary)
            .bind(article.score)
            .bind(&article.published)
            .bind(article.source.as_str())
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO articles_fts (title, content, published, article_id) VALUES (?, ?, ?, ?)")
                .bind(&article.title)
                .bind(&article.summary)
                .bind(&article.published)
                .bind(result.last_insert_rowid())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!(
            "Persisted {} new articles ({} duplicates skipped)",
            fresh.len(),
            articles.len() - fresh.len()
        );
        Ok(fresh.len())
    }

    /// Full-text search, best match first.
    ///
    /// `date_min`/`date_max` bound `published` inclusively; `date_max` is
    /// compared at its own precision, so `2025-01-31` covers that whole day.
    pub async fn search(
        &self,
        query: &str,
        date_min: Option<&str>,
        date_max: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let Some(fts_query) = to_fts_query(query) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT a.id, a.created_at, a.updated_at, a.title, a.link, a.summary, a.score, a.published, a.source,
                   bm25(articles_fts) AS rank,
                   highlight(articles_fts, 0, '<mark>', '</mark>') AS title_highlight,
                   snippet(articles_fts, 1, '<mark>', '</mark>', '...', 32) AS snippet
            FROM articles_fts
            JOIN articles a ON a.id = articles_fts.article_id
            WHERE articles_fts MATCH ?
              AND (? IS NULL OR a.published >= ?)
              AND (? IS NULL OR substr(a.published, 1, length(?)) <= ?)
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(&fts_query)
        .bind(date_min)
        .bind(date_min)
        .bind(date_max)
        .bind(date_max)
        .bind(date_max)
        .bind(limit as i64)
        .fetch_all(&self.db)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let rank: f64 = row.try_get("rank")?;
            scored.push((
                -rank,
                row_to_article(row)?,
                row.try_get::<String, _>("title_highlight")?,
                row.try_get::<String, _>("snippet")?,
            ));
        }

        let best = scored.iter().map(|(r, ..)| *r).fold(0.0_f64, f64::max);
        let hits: Vec<SearchHit> = scored
            .into_iter()
            .map(|(raw, article, title_highlight, snippet)| SearchHit {
                article,
                relevance: if best > 0.0 { (raw / best * 100.0).clamp(0.0, 100.0) } else { 100.0 },
                title_highlight,
                snippet,
            })
            .collect();

        debug!("Search '{}' returned {} hits", query, hits.len());
        Ok(hits)
    }

    /// All articles, or those whose `published` contains `date`, newest first
    pub async fn list_by_date(&self, date: Option<&str>) -> Result<Vec<StoredArticle>> {
        let rows = match date {
            Some(date) => {
                sqlx::query(
                    "SELECT * FROM articles WHERE published LIKE ? ESCAPE '\\' ORDER BY published DESC, id DESC",
                )
                .bind(format!("%{}%", escape_like(date)))
                .fetch_all(&self.db)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM articles ORDER BY published DESC, id DESC")
                    .fetch_all(&self.db)
                    .await?
            }
        };

        rows.iter().map(row_to_article).collect()
    }

    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM articles")
            .fetch_one(&self.db)
            .await?;
        Ok(row.try_get("count")?)
    }

    /// Number of full-text index entries
    pub async fn indexed_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM articles_fts")
            .fetch_one(&self.db)
            .await?;
        Ok(row.try_get("count")?)
    }
}

fn row_to_article(row: &SqliteRow) -> Result<StoredArticle> {
    let source: String = row.try_get("source")?;
    Ok(StoredArticle {
        id: row.try_get("id")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        title: row.try_get("title")?,
        link: row.try_get("link")?,
        summary: row.try_get("summary")?,
        score: row.try_get("score")?,
        published: row.try_get("published")?,
        source: SourceCategory::from_str(&source)
            .map_err(|e| WatchError::Parse(format!("Bad stored source '{}': {}", source, e)))?,
    })
}

/// Escape LIKE wildcards so `text` only matches itself
fn escape_like(text: &str) -> String {
    text.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Turn free text into an FTS5 query: every token becomes a quoted string,
/// so operators and punctuation in user input are matched literally.
pub fn to_fts_query(query: &str) -> Option<String> {
    let tokens: Vec<String> = query
        .split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect();

    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}
