//! Persistent cache store
//!
//! SQLite-backed key-value index over on-disk artifacts. Keys are SHA-256
//! hashes of the normalized value, so concurrent callers racing on the same
//! logical key converge on the same row; all writes are idempotent upserts
//! (last writer wins, payloads for the same key are expected to be
//! equivalent). Audio and feature entries are treated as misses when the
//! referenced path no longer exists on disk.

use crate::config::CacheConfig;
use crate::error::CacheError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};

/// Aggregate cache state for one key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub query_cached: bool,
    pub audio_cached: bool,
    pub feature_cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_path: Option<String>,
}

/// SQLite-backed cache store shared by discovery, retrieval, analysis and
/// lyrics.
pub struct CacheStore {
    pool: SqlitePool,
    pub root_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub feature_dir: PathBuf,
}

impl CacheStore {
    /// Open (or create) the cache at the configured location.
    pub async fn open(config: &CacheConfig) -> Result<Self, CacheError> {
        Self::open_at(&config.root_dir, &config.sqlite_path).await
    }

    pub async fn open_at(root_dir: &Path, sqlite_path: &Path) -> Result<Self, CacheError> {
        let root_dir = root_dir.to_path_buf();
        let audio_dir = root_dir.join("audio");
        let feature_dir = root_dir.join("features");

        std::fs::create_dir_all(&audio_dir)?;
        std::fs::create_dir_all(&feature_dir)?;
        if let Some(parent) = sqlite_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(sqlite_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            root_dir,
            audio_dir,
            feature_dir,
        };
        store.init_tables().await?;
        Ok(store)
    }

    async fn init_tables(&self) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS query_cache (
                query_key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS source_audio (
                source_key TEXT PRIMARY KEY,
                audio_path TEXT NOT NULL,
                format TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feature_cache (
                audio_key TEXT PRIMARY KEY,
                feature_path TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS lyrics_cache (
                source_key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS lyrics_analysis_cache (
                lyrics_key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Content-addressed key: SHA-256 hex of the trimmed, lower-cased value.
    pub fn normalize_key(value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(value.trim().to_lowercase().as_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Cached discovery payload for a query, honoring the TTL.
    pub async fn get_query(&self, query: &str, ttl_sec: u64) -> Result<Option<String>, CacheError> {
        let query_key = Self::normalize_key(query);
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT payload, created_at FROM query_cache WHERE query_key = ?")
                .bind(&query_key)
                .fetch_optional(&self.pool)
                .await?;

        let Some((payload, created_at)) = row else {
            return Ok(None);
        };
        let age = Utc::now().timestamp().saturating_sub(created_at);
        if age > ttl_sec as i64 {
            tracing::debug!(query_key = %query_key, age_sec = age, "Query cache entry expired");
            return Ok(None);
        }
        Ok(Some(payload))
    }

    pub async fn put_query(&self, query: &str, payload: &str) -> Result<(), CacheError> {
        let query_key = Self::normalize_key(query);
        sqlx::query(
            r#"
            INSERT INTO query_cache(query_key, payload, created_at)
            VALUES(?, ?, ?)
            ON CONFLICT(query_key) DO UPDATE SET
              payload = excluded.payload,
              created_at = excluded.created_at
            "#,
        )
        .bind(&query_key)
        .bind(payload)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Cached audio path and format for a source key. A row whose path has
    /// vanished from disk is a miss.
    pub async fn get_audio(&self, source_key: &str) -> Result<Option<(String, String)>, CacheError> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT audio_path, format FROM source_audio WHERE source_key = ?")
                .bind(source_key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.filter(|(path, _)| Path::new(path).exists()))
    }

    pub async fn put_audio(&self, source_key: &str, audio_path: &str, format: &str) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            INSERT INTO source_audio(source_key, audio_path, format, created_at)
            VALUES(?, ?, ?, ?)
            ON CONFLICT(source_key) DO UPDATE SET
              audio_path = excluded.audio_path,
              format = excluded.format,
              created_at = excluded.created_at
            "#,
        )
        .bind(source_key)
        .bind(audio_path)
        .bind(format)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_feature_path(&self, audio_key: &str) -> Result<Option<String>, CacheError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT feature_path FROM feature_cache WHERE audio_key = ?")
                .bind(audio_key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(path,)| path).filter(|path| Path::new(path).exists()))
    }

    pub async fn put_feature_path(&self, audio_key: &str, feature_path: &str) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            INSERT INTO feature_cache(audio_key, feature_path, created_at)
            VALUES(?, ?, ?)
            ON CONFLICT(audio_key) DO UPDATE SET
              feature_path = excluded.feature_path,
              created_at = excluded.created_at
            "#,
        )
        .bind(audio_key)
        .bind(feature_path)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_lyrics(&self, source_key: &str) -> Result<Option<String>, CacheError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT payload FROM lyrics_cache WHERE source_key = ?")
                .bind(source_key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(payload,)| payload))
    }

    pub async fn put_lyrics(&self, source_key: &str, payload: &str) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            INSERT INTO lyrics_cache(source_key, payload, created_at)
            VALUES(?, ?, ?)
            ON CONFLICT(source_key) DO UPDATE SET
              payload = excluded.payload,
              created_at = excluded.created_at
            "#,
        )
        .bind(source_key)
        .bind(payload)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_lyrics_analysis(&self, lyrics_key: &str) -> Result<Option<String>, CacheError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT payload FROM lyrics_analysis_cache WHERE lyrics_key = ?")
                .bind(lyrics_key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(payload,)| payload))
    }

    pub async fn put_lyrics_analysis(&self, lyrics_key: &str, payload: &str) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            INSERT INTO lyrics_analysis_cache(lyrics_key, payload, created_at)
            VALUES(?, ?, ?)
            ON CONFLICT(lyrics_key) DO UPDATE SET
              payload = excluded.payload,
              created_at = excluded.created_at
            "#,
        )
        .bind(lyrics_key)
        .bind(payload)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Aggregate view over all tables for one key.
    pub async fn cache_status(&self, key: &str) -> Result<CacheStatus, CacheError> {
        let cache_key = Self::normalize_key(key);

        let query: Option<(i64,)> =
            sqlx::query_as("SELECT created_at FROM query_cache WHERE query_key = ?")
                .bind(&cache_key)
                .fetch_optional(&self.pool)
                .await?;
        let audio: Option<(String,)> =
            sqlx::query_as("SELECT audio_path FROM source_audio WHERE source_key = ?")
                .bind(&cache_key)
                .fetch_optional(&self.pool)
                .await?;
        let feature: Option<(String,)> =
            sqlx::query_as("SELECT feature_path FROM feature_cache WHERE audio_key = ?")
                .bind(&cache_key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(CacheStatus {
            query_cached: query.is_some(),
            audio_cached: audio.is_some(),
            feature_cached: feature.is_some(),
            audio_path: audio.map(|(path,)| path),
            feature_path: feature.map(|(path,)| path),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store(dir: &tempfile::TempDir) -> CacheStore {
        CacheStore::open_at(&dir.path().join("cache"), &dir.path().join("cache/index.sqlite"))
            .await
            .unwrap()
    }

    #[test]
    fn normalize_key_is_case_and_whitespace_insensitive() {
        let a = CacheStore::normalize_key("Mac Miller Good News");
        let b = CacheStore::normalize_key("  mac miller good news  ");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn query_cache_roundtrip_and_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let cache = store(&dir).await;

        assert!(cache.get_query("q", 60).await.unwrap().is_none());
        cache.put_query("q", "one").await.unwrap();
        assert_eq!(cache.get_query("q", 60).await.unwrap().as_deref(), Some("one"));

        // Same key again: idempotent upsert, last writer wins.
        cache.put_query("q", "two").await.unwrap();
        assert_eq!(cache.get_query("q", 60).await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn audio_entry_with_missing_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = store(&dir).await;

        let gone = dir.path().join("cache/audio/gone.wav");
        cache
            .put_audio("key", gone.to_str().unwrap(), "wav")
            .await
            .unwrap();
        assert!(cache.get_audio("key").await.unwrap().is_none());

        let present = dir.path().join("cache/audio/present.wav");
        std::fs::write(&present, b"x").unwrap();
        cache
            .put_audio("key", present.to_str().unwrap(), "wav")
            .await
            .unwrap();
        let (path, format) = cache.get_audio("key").await.unwrap().unwrap();
        assert_eq!(path, present.to_str().unwrap());
        assert_eq!(format, "wav");
    }

    #[tokio::test]
    async fn cache_status_reports_all_tables() {
        let dir = tempfile::tempdir().unwrap();
        let cache = store(&dir).await;
        let key = "status key";
        let hashed = CacheStore::normalize_key(key);

        cache.put_query(key, "{}").await.unwrap();
        let audio_path = dir.path().join("cache/audio/a.wav");
        std::fs::write(&audio_path, b"x").unwrap();
        cache
            .put_audio(&hashed, audio_path.to_str().unwrap(), "wav")
            .await
            .unwrap();

        let status = cache.cache_status(key).await.unwrap();
        assert!(status.query_cached);
        assert!(status.audio_cached);
        assert!(!status.feature_cached);
        assert_eq!(status.audio_path.as_deref(), audio_path.to_str());
        assert!(status.feature_path.is_none());
    }

    #[tokio::test]
    async fn lyrics_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = store(&dir).await;
        cache.put_lyrics("lk", "{\"source\":\"none\"}").await.unwrap();
        assert!(cache.get_lyrics("lk").await.unwrap().is_some());
        assert!(cache.get_lyrics_analysis("lk").await.unwrap().is_none());
    }
}
