//! Credential cache
//!
//! A single JSON record at a well-known path, written whole and atomically
//! (temp file in the same directory, then rename). Loading never fails: a
//! missing, stale or unreadable record is simply absent.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::config::CredentialConfig;
use crate::types::Credential;

#[derive(Debug, Deserialize)]
struct StoredRecord {
    enc_token: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct RecordRef<'a> {
    enc_token: &'a str,
    user_id: &'a str,
    timestamp: String,
}

/// State of the cache file, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Fresh,
    Stale,
    Absent,
    Corrupt,
}

/// Accepts RFC 3339 and naive local ISO timestamps
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|ts| ts.with_timezone(&Utc))
}

#[derive(Debug, Clone)]
pub struct CredentialCache {
    path: PathBuf,
    ttl: Duration,
    default_user_id: String,
}

impl CredentialCache {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration, default_user_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ttl,
            default_user_id: default_user_id.into(),
        }
    }

    pub fn from_config(config: &CredentialConfig) -> Self {
        Self::new(&config.cache_path, config.ttl(), &config.default_user_id)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh cached credential, if any
    pub fn load(&self) -> Option<Credential> {
        self.load_at(Utc::now())
    }

    pub fn load_at(&self, now: DateTime<Utc>) -> Option<Credential> {
        let credential = match self.read() {
            Ok(Some(credential)) => credential,
            Ok(None) => {
                debug!("No cached credential at {}", self.path.display());
                return None;
            }
            Err(e) => {
                warn!("Ignoring unreadable credential cache: {:#}", e);
                return None;
            }
        };

        if credential.is_fresh_at(now, self.ttl) {
            debug!("Cached credential {} is fresh", credential.fingerprint());
            Some(credential)
        } else {
            info!(
                "Cached credential from {} has expired",
                credential.issued_at().to_rfc3339()
            );
            None
        }
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> CacheStatus {
        match self.read() {
            Ok(Some(c)) if c.is_fresh_at(now, self.ttl) => CacheStatus::Fresh,
            Ok(Some(_)) => CacheStatus::Stale,
            Ok(None) => CacheStatus::Absent,
            Err(_) => CacheStatus::Corrupt,
        }
    }

    fn read(&self) -> Result<Option<Credential>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path).context("Failed to read cache file")?;
        let record: StoredRecord =
            serde_json::from_str(&contents).context("Failed to parse cache JSON")?;

        let Some(token) = record.enc_token.filter(|t| !t.trim().is_empty()) else {
            anyhow::bail!("cache record has no token");
        };
        let issued_at = parse_timestamp(&record.timestamp)
            .with_context(|| format!("Bad cache timestamp: {}", record.timestamp))?;
        let user_id = record
            .user_id
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| self.default_user_id.clone());

        Ok(Some(Credential::new(token, user_id, issued_at)))
    }

    /// Persist the credential, replacing any previous record.
    ///
    /// Returns whether the write went through; failures are logged.
    pub fn save(&self, credential: &Credential) -> bool {
        match self.write(credential) {
            Ok(()) => {
                info!(
                    "Cached credential {} at {}",
                    credential.fingerprint(),
                    self.path.display()
                );
                true
            }
            Err(e) => {
                warn!("Credential caching failed: {:#}", e);
                false
            }
        }
    }

    fn write(&self, credential: &Credential) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).context("Failed to create cache directory")?;

        let record = RecordRef {
            enc_token: credential.enc_token(),
            user_id: credential.user_id(),
            timestamp: credential.issued_at().to_rfc3339(),
        };

        let mut tmp = NamedTempFile::new_in(dir).context("Failed to create temp file")?;
        serde_json::to_writer_pretty(&mut tmp, &record).context("Failed to serialize credential")?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .context("Failed to move cache file into place")?;
        Ok(())
    }

    /// Remove the record. Missing files are fine.
    pub fn clear(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove credential cache: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache_in(dir: &TempDir) -> CredentialCache {
        CredentialCache::new(dir.path().join("token_cache.json"), Duration::hours(8), "JOL229")
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        let cred = Credential::new("enc-abc", "AB1234", Utc::now() - Duration::minutes(5));

        assert!(cache.save(&cred));
        let loaded = cache.load().unwrap();
        assert_eq!(loaded.enc_token(), "enc-abc");
        assert_eq!(loaded.user_id(), "AB1234");
    }

    #[test]
    fn test_fresh_reused_stale_ignored() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        let now = Utc::now();

        cache.save(&Credential::new("young", "AB1234", now - Duration::hours(7)));
        assert_eq!(cache.load_at(now).unwrap().enc_token(), "young");

        cache.save(&Credential::new("old", "AB1234", now - Duration::hours(9)));
        assert!(cache.load_at(now).is_none());
        assert_eq!(cache.status_at(now), CacheStatus::Stale);
    }

    #[test]
    fn test_missing_file_is_absent() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        assert!(cache.load().is_none());
        assert_eq!(cache.status_at(Utc::now()), CacheStatus::Absent);
    }

    #[test]
    fn test_corrupt_file_is_absent() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        std::fs::write(cache.path(), "{ \"enc_token\": \"abc\", ").unwrap();
        assert!(cache.load().is_none());
        assert_eq!(cache.status_at(Utc::now()), CacheStatus::Corrupt);

        std::fs::write(cache.path(), r#"{"enc_token": "", "timestamp": "2023-11-30T10:00:00"}"#)
            .unwrap();
        assert!(cache.load().is_none());
    }

    #[test]
    fn test_legacy_naive_timestamp_and_missing_user() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        let issued = Local::now().naive_local() - Duration::hours(1);
        let body = format!(
            r#"{{"enc_token": "legacy", "timestamp": "{}"}}"#,
            issued.format("%Y-%m-%dT%H:%M:%S%.f")
        );
        std::fs::write(cache.path(), body).unwrap();

        let loaded = cache.load().unwrap();
        assert_eq!(loaded.enc_token(), "legacy");
        assert_eq!(loaded.user_id(), "JOL229");
    }

    #[test]
    fn test_save_replaces_whole_record() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache.save(&Credential::new("first", "AB1234", Utc::now()));
        cache.save(&Credential::new("second", "CD5678", Utc::now()));

        let loaded = cache.load().unwrap();
        assert_eq!(loaded.enc_token(), "second");
        assert_eq!(loaded.user_id(), "CD5678");

        // Only the record itself remains, no stray temp files
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_save_into_missing_directory() {
        let dir = TempDir::new().unwrap();
        let cache = CredentialCache::new(
            dir.path().join("nested/state/token_cache.json"),
            Duration::hours(8),
            "JOL229",
        );
        assert!(cache.save(&Credential::new("tok", "AB1234", Utc::now())));
        assert!(cache.load().is_some());

        cache.clear();
        cache.clear();
        assert!(cache.load().is_none());
    }
}
