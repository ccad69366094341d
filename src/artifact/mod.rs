//! Artifacts: named, versioned blobs stored outside the conversation history.

pub mod in_memory;

pub use in_memory::InMemoryArtifactService;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Part;

/// Names with this prefix are shared by every session of the user.
pub const USER_SCOPED_PREFIX: &str = "user:";

/// Location of one artifact file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    pub file_name: String,
}

impl ArtifactKey {
    pub fn is_user_scoped(&self) -> bool {
        self.file_name.starts_with(USER_SCOPED_PREFIX)
    }
}

#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub key: ArtifactKey,
    pub part: Part,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveResponse {
    pub version: u64,
}

#[derive(Debug, Clone, Default)]
pub struct LoadRequest {
    pub key: ArtifactKey,
    /// Latest when absent.
    pub version: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct LoadResponse {
    pub part: Part,
}

#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct ListResponse {
    /// Sorted, session and user-scoped names together.
    pub file_names: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteRequest {
    pub key: ArtifactKey,
    /// Every version when absent.
    pub version: Option<u64>,
}

/// Storage for artifacts.
#[async_trait]
pub trait ArtifactService: Send + Sync {
    async fn save(&self, request: SaveRequest) -> Result<SaveResponse>;

    async fn load(&self, request: LoadRequest) -> Result<LoadResponse>;

    async fn list(&self, request: ListRequest) -> Result<ListResponse>;

    async fn delete(&self, request: DeleteRequest) -> Result<()>;

    /// Stored versions of one file, ascending.
    async fn versions(&self, key: ArtifactKey) -> Result<Vec<u64>>;
}

/// Artifact access bound to one session.
#[derive(Clone)]
pub struct Artifacts {
    service: Arc<dyn ArtifactService>,
    app_name: String,
    user_id: String,
    session_id: String,
}

impl std::fmt::Debug for Artifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifacts")
            .field("app_name", &self.app_name)
            .field("user_id", &self.user_id)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl Artifacts {
    pub fn new(
        service: Arc<dyn ArtifactService>,
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            service,
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }

    fn key(&self, file_name: &str) -> ArtifactKey {
        ArtifactKey {
            app_name: self.app_name.clone(),
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
            file_name: file_name.to_string(),
        }
    }

    /// Store a new version of `file_name`, returning its version number.
    pub async fn save(&self, file_name: &str, part: Part) -> Result<u64> {
        let key = self.key(file_name);
        Ok(self.service.save(SaveRequest { key, part }).await?.version)
    }

    pub async fn load(&self, file_name: &str) -> Result<Part> {
        self.load_version(file_name, None).await
    }

    pub async fn load_version(&self, file_name: &str, version: Option<u64>) -> Result<Part> {
        let key = self.key(file_name);
        Ok(self.service.load(LoadRequest { key, version }).await?.part)
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        let request = ListRequest {
            app_name: self.app_name.clone(),
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
        };
        Ok(self.service.list(request).await?.file_names)
    }

    pub async fn delete(&self, file_name: &str) -> Result<()> {
        let key = self.key(file_name);
        self.service.delete(DeleteRequest { key, version: None }).await
    }

    pub async fn versions(&self, file_name: &str) -> Result<Vec<u64>> {
        self.service.versions(self.key(file_name)).await
    }
}
