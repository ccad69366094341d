//! In-memory, versioned artifact service.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{
    ArtifactKey, ArtifactService, DeleteRequest, ListRequest, ListResponse, LoadRequest,
    LoadResponse, SaveRequest, SaveResponse,
};
use crate::error::{Result, TrellisError};
use crate::types::Part;

/// User-scoped files are stored under this session id.
const USER_SCOPE: &str = "";

type Versions = BTreeMap<u64, Part>;

#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifactService {
    files: Arc<RwLock<HashMap<ArtifactKey, Versions>>>,
}

impl InMemoryArtifactService {
    pub fn new() -> Self {
        Self::default()
    }

    fn storage_key(key: &ArtifactKey) -> ArtifactKey {
        if key.is_user_scoped() {
            ArtifactKey {
                session_id: USER_SCOPE.to_string(),
                ..key.clone()
            }
        } else {
            key.clone()
        }
    }

    fn lock_poisoned() -> TrellisError {
        TrellisError::Io(std::io::Error::other("artifact store lock poisoned"))
    }

    fn not_found(key: &ArtifactKey, version: Option<u64>) -> TrellisError {
        match version {
            Some(v) => TrellisError::ArtifactNotFound(format!("{} (version {v})", key.file_name)),
            None => TrellisError::ArtifactNotFound(key.file_name.clone()),
        }
    }
}

#[async_trait]
impl ArtifactService for InMemoryArtifactService {
    async fn save(&self, request: SaveRequest) -> Result<SaveResponse> {
        if request.key.file_name.is_empty() {
            return Err(TrellisError::InvalidArgument(
                "artifact file name must not be empty".into(),
            ));
        }
        let key = Self::storage_key(&request.key);
        let mut files = self.files.write().map_err(|_| Self::lock_poisoned())?;
        let versions = files.entry(key).or_default();
        let version = versions.keys().next_back().map_or(0, |v| v + 1);
        versions.insert(version, request.part);
        Ok(SaveResponse { version })
    }

    async fn load(&self, request: LoadRequest) -> Result<LoadResponse> {
        let key = Self::storage_key(&request.key);
        let files = self.files.read().map_err(|_| Self::lock_poisoned())?;
        let versions = files
            .get(&key)
            .ok_or_else(|| Self::not_found(&request.key, request.version))?;
        let part = match request.version {
            Some(v) => versions.get(&v),
            None => versions.values().next_back(),
        };
        part.cloned()
            .map(|part| LoadResponse { part })
            .ok_or_else(|| Self::not_found(&request.key, request.version))
    }

    async fn list(&self, request: ListRequest) -> Result<ListResponse> {
        let files = self.files.read().map_err(|_| Self::lock_poisoned())?;
        let names: BTreeSet<String> = files
            .keys()
            .filter(|k| k.app_name == request.app_name && k.user_id == request.user_id)
            .filter(|k| k.session_id == request.session_id || k.session_id == USER_SCOPE)
            .map(|k| k.file_name.clone())
            .collect();
        Ok(ListResponse {
            file_names: names.into_iter().collect(),
        })
    }

    async fn delete(&self, request: DeleteRequest) -> Result<()> {
        let key = Self::storage_key(&request.key);
        let mut files = self.files.write().map_err(|_| Self::lock_poisoned())?;
        match request.version {
            None => {
                files.remove(&key);
            }
            Some(v) => {
                if let Some(versions) = files.get_mut(&key) {
                    versions.remove(&v);
                    if versions.is_empty() {
                        files.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    async fn versions(&self, key: ArtifactKey) -> Result<Vec<u64>> {
        let storage_key = Self::storage_key(&key);
        let files = self.files.read().map_err(|_| Self::lock_poisoned())?;
        files
            .get(&storage_key)
            .map(|versions| versions.keys().copied().collect())
            .ok_or_else(|| Self::not_found(&key, None))
    }
}
