//! SQLite persistence for the pattern library.
//!
//! The library is loaded in full at engine init and rewritten in one
//! transaction after each committed training batch; the version counter in
//! `library_meta` bumps on every commit so analysis results can record which
//! library view they saw.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{EngineError, Result};
use crate::library::{Pattern, PatternLibrary};
use crate::models::Category;

/// Open (creating if missing) the pattern database. The literal `:memory:`
/// yields a process-local library; a memory pool must hold a single
/// connection or each checkout would see a different empty database.
pub async fn connect(path: &Path) -> Result<SqlitePool> {
    let memory = path.to_str() == Some(":memory:");

    if !memory {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::PatternMatch(e.to_string()))?;
        }
    }

    let url = if memory {
        "sqlite::memory:".to_string()
    } else {
        format!("sqlite:{}", path.display())
    };

    let options = SqliteConnectOptions::from_str(&url)
        .map_err(|e| EngineError::PatternMatch(e.to_string()))?
        .create_if_missing(true)
        .journal_mode(if memory {
            sqlx::sqlite::SqliteJournalMode::Memory
        } else {
            sqlx::sqlite::SqliteJournalMode::Wal
        });

    let pool = SqlitePoolOptions::new()
        .max_connections(if memory { 1 } else { 5 })
        .connect_with(options)
        .await
        .map_err(|e| EngineError::PatternMatch(e.to_string()))?;

    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS patterns (
            id TEXT PRIMARY KEY,
            category TEXT NOT NULL,
            centroid BLOB NOT NULL,
            correction TEXT NOT NULL,
            support_count INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| EngineError::PatternMatch(e.to_string()))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS library_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| EngineError::PatternMatch(e.to_string()))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_patterns_category ON patterns(category)")
        .execute(pool)
        .await
        .map_err(|e| EngineError::PatternMatch(e.to_string()))?;

    Ok(())
}

/// Load the full library. Unknown category strings mean a corrupt or
/// newer-schema database and fail the load.
pub async fn load(pool: &SqlitePool) -> Result<PatternLibrary> {
    let version: Option<i64> = sqlx::query_scalar("SELECT version FROM library_meta WHERE id = 1")
        .fetch_optional(pool)
        .await
        .map_err(|e| EngineError::PatternMatch(e.to_string()))?;

    let rows = sqlx::query(
        "SELECT id, category, centroid, correction, support_count, created_at, updated_at \
         FROM patterns ORDER BY created_at, id",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| EngineError::PatternMatch(e.to_string()))?;

    let mut library = PatternLibrary::new();
    library.set_version(version.unwrap_or(0));

    for row in rows {
        let category_str: String = row.get("category");
        let category = Category::parse(&category_str).ok_or_else(|| {
            EngineError::PatternMatch(format!("unknown pattern category '{}'", category_str))
        })?;
        let blob: Vec<u8> = row.get("centroid");
        let support: i64 = row.get("support_count");
        library.insert(Pattern {
            id: row.get("id"),
            category,
            centroid: blob_to_vec(&blob),
            correction: row.get("correction"),
            support_count: support as u32,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        });
    }

    Ok(library)
}

/// Persist the library: full rewrite in one transaction, bumping the version
/// counter. The library's in-memory version is updated to match on success.
pub async fn commit(pool: &SqlitePool, library: &mut PatternLibrary) -> Result<()> {
    let new_version = library.version() + 1;

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| EngineError::PatternMatch(e.to_string()))?;

    sqlx::query("DELETE FROM patterns")
        .execute(&mut *tx)
        .await
        .map_err(|e| EngineError::PatternMatch(e.to_string()))?;

    for pattern in library.iter() {
        sqlx::query(
            "INSERT INTO patterns (id, category, centroid, correction, support_count, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&pattern.id)
        .bind(pattern.category.as_str())
        .bind(vec_to_blob(&pattern.centroid))
        .bind(&pattern.correction)
        .bind(pattern.support_count as i64)
        .bind(pattern.created_at)
        .bind(pattern.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| EngineError::PatternMatch(e.to_string()))?;
    }

    sqlx::query(
        "INSERT INTO library_meta (id, version) VALUES (1, ?) \
         ON CONFLICT(id) DO UPDATE SET version = excluded.version",
    )
    .bind(new_version)
    .execute(&mut *tx)
    .await
    .map_err(|e| EngineError::PatternMatch(e.to_string()))?;

    tx.commit()
        .await
        .map_err(|e| EngineError::PatternMatch(e.to_string()))?;

    library.set_version(new_version);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrainingExample;
    use std::path::PathBuf;

    async fn memory_pool() -> SqlitePool {
        let pool = connect(&PathBuf::from(":memory:")).await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn empty_database_loads_version_zero() {
        let pool = memory_pool().await;
        let library = load(&pool).await.unwrap();
        assert_eq!(library.version(), 0);
        assert!(library.is_empty());
    }

    #[tokio::test]
    async fn commit_then_load_roundtrips() {
        let pool = memory_pool().await;
        let mut library = load(&pool).await.unwrap();
        library.absorb(
            &TrainingExample {
                original: "perpetual".to_string(),
                corrected: "two years".to_string(),
                category: Category::Duration,
                embedding: vec![0.25, -0.5, 1.0],
            },
            0.85,
            42,
        );
        commit(&pool, &mut library).await.unwrap();
        assert_eq!(library.version(), 1);

        let loaded = load(&pool).await.unwrap();
        assert_eq!(loaded.version(), 1);
        assert_eq!(loaded.len(), 1);
        let pattern = &loaded.patterns(Category::Duration)[0];
        assert_eq!(pattern.centroid, vec![0.25, -0.5, 1.0]);
        assert_eq!(pattern.correction, "two years");
        assert_eq!(pattern.support_count, 1);
        assert_eq!(pattern.created_at, 42);
    }

    #[tokio::test]
    async fn version_bumps_on_every_commit() {
        let pool = memory_pool().await;
        let mut library = load(&pool).await.unwrap();
        commit(&pool, &mut library).await.unwrap();
        commit(&pool, &mut library).await.unwrap();
        assert_eq!(library.version(), 2);
        assert_eq!(load(&pool).await.unwrap().version(), 2);
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();
    }
}
