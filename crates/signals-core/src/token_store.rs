//! ============================================================================
//! Token Store - Durable storage for the session token pair
//! ============================================================================
//! Two opaque strings, nothing else. The keyring backend holds them as a
//! single JSON-encoded keychain entry; the memory backend exists for tests
//! and ephemeral sessions. Writes complete before the call returns, so a
//! dependent reading after `save` always observes the new pair.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;

/// Access/refresh token pair persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Durable key/value storage for the session tokens.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<TokenPair>, StoreError>;
    fn save(&self, tokens: &TokenPair) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

/// OS keychain backed store. One entry per (service, user) pair holding the
/// JSON-encoded tokens.
pub struct KeyringTokenStore {
    service: String,
    user: String,
}

impl KeyringTokenStore {
    pub fn new(service: &str, user: &str) -> Self {
        Self {
            service: service.to_string(),
            user: user.to_string(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, StoreError> {
        keyring::Entry::new(&self.service, &self.user).map_err(|e| StoreError(e.to_string()))
    }
}

impl TokenStore for KeyringTokenStore {
    fn load(&self) -> Result<Option<TokenPair>, StoreError> {
        match self.entry()?.get_password() {
            Ok(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StoreError(format!("corrupt token entry: {}", e))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StoreError(e.to_string())),
        }
    }

    fn save(&self, tokens: &TokenPair) -> Result<(), StoreError> {
        let json = serde_json::to_string(tokens).map_err(|e| StoreError(e.to_string()))?;
        self.entry()?
            .set_password(&json)
            .map_err(|e| StoreError(e.to_string()))?;
        debug!("token pair persisted to keyring");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match self.entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => {
                info!("token pair cleared from keyring");
                Ok(())
            }
            Err(e) => Err(StoreError(e.to_string())),
        }
    }
}

/// In-process store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryTokenStore {
    inner: Mutex<Option<TokenPair>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<TokenPair>, StoreError> {
        Ok(self
            .inner
            .lock()
            .map_err(|_| StoreError("token store lock poisoned".to_string()))?
            .clone())
    }

    fn save(&self, tokens: &TokenPair) -> Result<(), StoreError> {
        *self
            .inner
            .lock()
            .map_err(|_| StoreError("token store lock poisoned".to_string()))? =
            Some(tokens.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self
            .inner
            .lock()
            .map_err(|_| StoreError("token store lock poisoned".to_string()))? = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(access: &str, refresh: &str) -> TokenPair {
        TokenPair {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
        }
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.load().unwrap(), None);

        store.save(&pair("A1", "R1")).unwrap();
        assert_eq!(store.load().unwrap(), Some(pair("A1", "R1")));

        store.save(&pair("A2", "R2")).unwrap();
        assert_eq!(store.load().unwrap(), Some(pair("A2", "R2")));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = MemoryTokenStore::new();
        store.clear().unwrap();
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_token_pair_json_round_trip() {
        let original = pair("A1", "R1");
        let json = serde_json::to_string(&original).unwrap();
        let decoded: TokenPair = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, original);
    }
}
