use sled::Db;
use tracing::debug;

use crate::utils::Result;

/// Durable blob storage for the outstanding subscription tables.
pub trait SubscriptionStore: Send + Sync {
    fn save_string(&self, key: &str, content: &str) -> Result<()>;

    /// `Ok(None)` when nothing was stored under `key` yet.
    fn load_string(&self, key: &str) -> Result<Option<String>>;
}

#[derive(Clone)]
pub struct SledStore {
    db: Db,
}

impl SledStore {
    pub fn open(path: &str) -> Result<Self> {
        let db = sled::open(path)?;
        debug!(path, "opened subscription store");
        Ok(Self { db })
    }

    /// Store that lives only as long as the process.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }
}

impl SubscriptionStore for SledStore {
    fn save_string(&self, key: &str, content: &str) -> Result<()> {
        self.db.insert(key.as_bytes(), content.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }

    fn load_string(&self, key: &str) -> Result<Option<String>> {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("db", &"sled::Db")
            .finish()
    }
}
