//! Object stores for generated images
//!
//! [`FsObjectStore`] writes under a local directory and hands out `file://`
//! URLs; it also downloads `http(s)://` URLs so template and earlier images
//! hosted elsewhere can be used as references. [`InMemoryObjectStore`] is
//! for tests and throwaway runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use slide_forge_sdk::{CollaboratorError, CollaboratorResult, ObjectStore};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

const STORE: &str = "object_store";

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        _ => "bin",
    }
}

/// Objects kept in process memory under `mem://objects/{uuid}.{ext}`
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<String, Bytes>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object at a caller-chosen URL
    pub async fn insert(&self, url: impl Into<String>, bytes: impl Into<Bytes>) {
        self.objects.write().await.insert(url.into(), bytes.into());
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, bytes: Bytes, content_type: &str) -> CollaboratorResult<String> {
        let url = format!(
            "mem://objects/{}.{}",
            Uuid::new_v4(),
            extension_for(content_type)
        );
        self.objects.write().await.insert(url.clone(), bytes);
        Ok(url)
    }

    async fn get(&self, url: &str) -> CollaboratorResult<Bytes> {
        self.objects
            .read()
            .await
            .get(url)
            .cloned()
            .ok_or_else(|| CollaboratorError::NotFound(url.to_string()))
    }
}

/// Objects stored as files under a root directory
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
    http: reqwest::Client,
}

impl FsObjectStore {
    pub async fn open(root: impl AsRef<Path>) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(root.as_ref()).await?;
        let root = tokio::fs::canonicalize(root.as_ref()).await?;
        Ok(Self {
            root,
            http: reqwest::Client::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn download(&self, url: &str) -> CollaboratorResult<Bytes> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| CollaboratorError::service(STORE, e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CollaboratorError::NotFound(url.to_string()));
        }
        let response = response
            .error_for_status()
            .map_err(|e| CollaboratorError::service(STORE, e.to_string()))?;
        response
            .bytes()
            .await
            .map_err(|e| CollaboratorError::service(STORE, e.to_string()))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, bytes: Bytes, content_type: &str) -> CollaboratorResult<String> {
        let path = self
            .root
            .join(format!("{}.{}", Uuid::new_v4(), extension_for(content_type)));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| CollaboratorError::service(STORE, e.to_string()))?;
        debug!(path = %path.display(), bytes = bytes.len(), "stored object");
        Ok(format!("file://{}", path.display()))
    }

    async fn get(&self, url: &str) -> CollaboratorResult<Bytes> {
        if url.starts_with("http://") || url.starts_with("https://") {
            return self.download(url).await;
        }
        let Some(path) = url.strip_prefix("file://") else {
            return Err(CollaboratorError::NotFound(url.to_string()));
        };
        match tokio::fs::read(path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CollaboratorError::NotFound(url.to_string()))
            }
            Err(e) => Err(CollaboratorError::service(STORE, e.to_string())),
        }
    }
}
