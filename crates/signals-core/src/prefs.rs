// ============================================================================
// PrefsDb — Embedded Database (redb)
// ============================================================================
// Non-secure local state: the cached subscription tier and the last-login
// timestamp. Tokens never land here; they live in the keyring store.
// Default path: ~/.signals/client.redb (override via SIGNALS_DB_PATH)
// ============================================================================

use anyhow::{anyhow, Result};
use chrono::Utc;
use redb::{Database, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::access::SubscriptionTier;

const PREFS: TableDefinition<&str, &[u8]> = TableDefinition::new("prefs");

const KEY_TIER: &str = "prefs:subscription_tier";
const KEY_LAST_LOGIN: &str = "prefs:last_login";

/// Cached subscription tier with the time it was fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedTier {
    pub tier: SubscriptionTier,
    pub cached_at: i64,
}

/// Embedded prefs database for the signals client.
pub struct PrefsDb {
    db: Database,
    path: PathBuf,
}

impl PrefsDb {
    /// Open (or create) the database at the given path.
    /// If `path` is None, uses SIGNALS_DB_PATH env var or ~/.signals/client.redb
    pub fn open(path: Option<&str>) -> Result<Self> {
        let db_path = if let Some(p) = path {
            PathBuf::from(p)
        } else if let Ok(env_path) = std::env::var("SIGNALS_DB_PATH") {
            PathBuf::from(env_path)
        } else {
            let home =
                dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
            let signals_dir = home.join(".signals");
            std::fs::create_dir_all(&signals_dir)
                .map_err(|e| anyhow!("Failed to create .signals directory: {}", e))?;
            signals_dir.join("client.redb")
        };

        info!("Opening prefs database at: {}", db_path.display());

        let db =
            Database::create(&db_path).map_err(|e| anyhow!("Failed to open database: {}", e))?;

        // Ensure the table exists by doing a write transaction
        let write_txn = db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let _ = write_txn
                .open_table(PREFS)
                .map_err(|e| anyhow!("Failed to create prefs table: {}", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| anyhow!("Failed to commit init: {}", e))?;

        Ok(Self { db, path: db_path })
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let mut table = write_txn
                .open_table(PREFS)
                .map_err(|e| anyhow!("Failed to open prefs table: {}", e))?;
            table
                .insert(key, value)
                .map_err(|e| anyhow!("Failed to insert pref: {}", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| anyhow!("Failed to commit: {}", e))?;
        debug!("Stored pref: {}", key);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn
            .open_table(PREFS)
            .map_err(|e| anyhow!("Failed to open prefs table: {}", e))?;
        Ok(table
            .get(key)
            .map_err(|e| anyhow!("Failed to get pref: {}", e))?
            .map(|v| v.value().to_vec()))
    }

    // ========================================================================
    // Subscription tier cache
    // ========================================================================

    pub fn set_tier(&self, tier: SubscriptionTier) -> Result<()> {
        let cached = CachedTier {
            tier,
            cached_at: Utc::now().timestamp(),
        };
        let value =
            bincode::serialize(&cached).map_err(|e| anyhow!("Failed to serialize tier: {}", e))?;
        self.put(KEY_TIER, &value)
    }

    pub fn get_tier(&self) -> Result<Option<CachedTier>> {
        match self.get(KEY_TIER)? {
            Some(value) => {
                let cached: CachedTier = bincode::deserialize(&value)
                    .map_err(|e| anyhow!("Failed to deserialize tier: {}", e))?;
                Ok(Some(cached))
            }
            None => Ok(None),
        }
    }

    // ========================================================================
    // Last login
    // ========================================================================

    pub fn set_last_login(&self, timestamp: i64) -> Result<()> {
        self.put(KEY_LAST_LOGIN, &timestamp.to_le_bytes())
    }

    pub fn get_last_login(&self) -> Result<Option<i64>> {
        match self.get(KEY_LAST_LOGIN)? {
            Some(value) => {
                let bytes: [u8; 8] = value
                    .as_slice()
                    .try_into()
                    .map_err(|_| anyhow!("Corrupt last-login entry"))?;
                Ok(Some(i64::from_le_bytes(bytes)))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db(name: &str) -> (PrefsDb, PathBuf) {
        let path = std::env::temp_dir().join(format!(
            "signals-prefs-test-{}-{}.redb",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        let db = PrefsDb::open(Some(path.to_str().expect("utf8 path"))).expect("open db");
        (db, path)
    }

    #[test]
    fn test_tier_cache_round_trip() {
        let (db, path) = temp_db("tier");
        assert!(db.get_tier().unwrap().is_none());

        db.set_tier(SubscriptionTier::Premium).unwrap();
        let cached = db.get_tier().unwrap().unwrap();
        assert_eq!(cached.tier, SubscriptionTier::Premium);
        assert!(cached.cached_at > 0);

        db.set_tier(SubscriptionTier::Free).unwrap();
        assert_eq!(db.get_tier().unwrap().unwrap().tier, SubscriptionTier::Free);

        drop(db);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_last_login_round_trip() {
        let (db, path) = temp_db("login");
        assert!(db.get_last_login().unwrap().is_none());

        db.set_last_login(1_756_000_000).unwrap();
        assert_eq!(db.get_last_login().unwrap(), Some(1_756_000_000));

        drop(db);
        let _ = std::fs::remove_file(path);
    }
}
