//! Device-local cart persistence.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use suraj_jewels_core::CartSnapshot;

/// Errors reading or writing the device cart.
#[derive(Debug, Error)]
pub enum CartStoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt cart file: {0}")]
    Json(#[from] serde_json::Error),

    /// Used by in-memory stores that were told to fail.
    #[error("Cart store unavailable")]
    Unavailable,
}

/// Where the confirmed cart lives between runs.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Load the saved cart, if there is one.
    async fn load(&self) -> Result<Option<CartSnapshot>, CartStoreError>;

    /// Replace the saved cart.
    async fn save(&self, snapshot: &CartSnapshot) -> Result<(), CartStoreError>;
}

/// Cart saved as a JSON file.
#[derive(Debug, Clone)]
pub struct FileCartStore {
    path: PathBuf,
}

impl FileCartStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> CartStoreError {
        CartStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl CartStore for FileCartStore {
    async fn load(&self) -> Result<Option<CartSnapshot>, CartStoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    async fn save(&self, snapshot: &CartSnapshot) -> Result<(), CartStoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_vec_pretty(snapshot)?;
        // Staged and renamed so the cart file is replaced atomically.
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, json)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        debug!(path = %self.path.display(), lines = snapshot.lines.len(), "Cart saved");
        Ok(())
    }
}

/// Cart kept in memory only.
#[derive(Debug, Default)]
pub struct MemoryCartStore {
    saved: Mutex<Option<CartSnapshot>>,
    failing: Mutex<bool>,
}

impl MemoryCartStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that starts out holding `snapshot`.
    #[must_use]
    pub fn with_snapshot(snapshot: CartSnapshot) -> Self {
        Self {
            saved: Mutex::new(Some(snapshot)),
            failing: Mutex::new(false),
        }
    }

    /// The last saved cart.
    #[must_use]
    pub fn snapshot(&self) -> Option<CartSnapshot> {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make every later load and save fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(PoisonError::into_inner) = failing;
    }

    fn check(&self) -> Result<(), CartStoreError> {
        if *self.failing.lock().unwrap_or_else(PoisonError::into_inner) {
            Err(CartStoreError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CartStore for MemoryCartStore {
    async fn load(&self) -> Result<Option<CartSnapshot>, CartStoreError> {
        self.check()?;
        Ok(self.snapshot())
    }

    async fn save(&self, snapshot: &CartSnapshot) -> Result<(), CartStoreError> {
        self.check()?;
        *self.saved.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use suraj_jewels_core::{CartLine, DeviceId, Price, ProductId};

    use super::*;

    fn snapshot() -> CartSnapshot {
        CartSnapshot {
            device_id: DeviceId::generate(),
            lines: vec![CartLine {
                product_id: ProductId::new("P1"),
                quantity: 2,
                unit_price: Price::inr(Decimal::new(4999, 0)).unwrap(),
                updated_at: Utc::now(),
            }],
            synced: None,
        }
    }

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("suraj-jewels-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_empty() {
        let store = FileCartStore::new(scratch_path("cart.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_creates_directories() {
        let path = scratch_path("nested/cart.json");
        let store = FileCartStore::new(&path);
        let saved = snapshot();

        store.save(&saved).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(saved));
        assert!(!path.with_extension("json.tmp").exists());

        let _ = std::fs::remove_dir_all(path.parent().unwrap().parent().unwrap());
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_file() {
        let path = scratch_path("cart.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();

        let err = FileCartStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, CartStoreError::Json(_)));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_memory_store_failure_toggle() {
        let store = MemoryCartStore::new();
        store.set_failing(true);
        assert!(store.save(&snapshot()).await.is_err());

        store.set_failing(false);
        store.save(&snapshot()).await.unwrap();
        assert_eq!(store.snapshot().unwrap().lines.len(), 1);
    }
}
