use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::provider::{OAuthCredentials, Platform};
use crate::utils::crypto::SealingKey;

/// Persisted form of one platform's OAuth credentials. `credentials` is the
/// serialized [`OAuthCredentials`] payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub platform: Platform,
    pub credentials: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    fn upsert(previous: Option<CredentialRecord>, platform: Platform, payload: String) -> Self {
        let now = Utc::now();
        Self {
            platform,
            credentials: payload,
            created_at: previous.map(|r| r.created_at).unwrap_or(now),
            updated_at: now,
        }
    }

    pub fn decode(&self) -> Result<OAuthCredentials> {
        OAuthCredentials::from_payload(&self.credentials)
    }
}

/// Backend holding at most one live credential record per platform.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, platform: Platform) -> Result<Option<CredentialRecord>>;

    /// Insert or update in place. `created_at` is only set on first insert.
    async fn set(&self, platform: Platform, credentials: &OAuthCredentials) -> Result<()>;

    async fn delete(&self, platform: Platform) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    records: RwLock<HashMap<Platform, CredentialRecord>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, platform: Platform) -> Result<Option<CredentialRecord>> {
        Ok(self.records.read().await.get(&platform).cloned())
    }

    async fn set(&self, platform: Platform, credentials: &OAuthCredentials) -> Result<()> {
        let payload = credentials.to_payload()?;
        let mut records = self.records.write().await;
        let previous = records.remove(&platform);
        records.insert(platform, CredentialRecord::upsert(previous, platform, payload));
        Ok(())
    }

    async fn delete(&self, platform: Platform) -> Result<()> {
        self.records.write().await.remove(&platform);
        Ok(())
    }
}

/// One sealed file per platform under `<data_dir>/credentials/`.
pub struct FileCredentialStore {
    dir: PathBuf,
    key: SealingKey,
}

impl FileCredentialStore {
    pub fn open(data_dir: &Path) -> Result<Self> {
        let dir = data_dir.join("credentials");
        let key = SealingKey::load_or_create(data_dir)?;
        Ok(Self { dir, key })
    }

    fn record_path(&self, platform: Platform) -> PathBuf {
        self.dir.join(format!("{platform}.json"))
    }

    async fn read(&self, platform: Platform) -> Result<Option<CredentialRecord>> {
        let path = self.record_path(platform);

        let encoded = match fs::read_to_string(&path).await {
            Ok(encoded) => encoded,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::persistence(&format!("read {}", path.display()), e)),
        };

        // I/O failures above are persistence errors; a record that reads
        // but cannot be opened is corrupt credentials
        let corrupt = |e: &dyn std::fmt::Display| {
            Error::Authentication(format!("stored {platform} credentials are corrupt: {e}"))
        };
        let sealed = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| corrupt(&e))?;
        let json = self.key.open(&sealed).map_err(|e| corrupt(&e))?;

        serde_json::from_slice(&json)
            .map(Some)
            .map_err(|e| corrupt(&e))
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, platform: Platform) -> Result<Option<CredentialRecord>> {
        self.read(platform).await
    }

    async fn set(&self, platform: Platform, credentials: &OAuthCredentials) -> Result<()> {
        let previous = match self.read(platform).await {
            Ok(previous) => previous,
            Err(err) if err.is_auth_error() => {
                warn!(%platform, error = %err, "replacing unreadable credential record");
                None
            }
            Err(err) => return Err(err),
        };
        let record = CredentialRecord::upsert(previous, platform, credentials.to_payload()?);

        let json = serde_json::to_vec(&record)
            .map_err(|e| Error::persistence("serialize credential record", e))?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(self.key.seal(&json)?);

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::persistence("create credentials dir", e))?;

        let path = self.record_path(platform);
        fs::write(&path, encoded)
            .await
            .map_err(|e| Error::persistence(&format!("write {}", path.display()), e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| Error::persistence("restrict credential record", e))?;
        }

        debug!(%platform, path = %path.display(), "stored credentials");
        Ok(())
    }

    async fn delete(&self, platform: Platform) -> Result<()> {
        let path = self.record_path(platform);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::persistence(&format!("delete {}", path.display()), e)),
        }
    }
}
