//! Download destination for finished batch results.
//!
//! Backends:
//! - On-disk storage (a downloads directory) for normal use
//! - In-memory storage for tests
//!
//! This is a small wrapper around `object_store`, which provides both.

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use object_store::ObjectStore;
use object_store::ObjectStoreExt;
use object_store::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("invalid output config: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object_store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Filesystem,
    Memory,
}

impl OutputKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputKind::Filesystem => "filesystem",
            OutputKind::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputBackendConfig {
    Filesystem { root: PathBuf },
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    pub backend: OutputBackendConfig,
    /// Optional sub-directory applied to every saved file.
    pub prefix: Option<String>,
}

const DEFAULT_OUTPUT_DIR: &str = "./downloads";

impl OutputConfig {
    pub fn memory() -> Self {
        Self {
            backend: OutputBackendConfig::Memory,
            prefix: None,
        }
    }

    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: OutputBackendConfig::Filesystem { root: root.into() },
            prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = non_empty(prefix.into());
        self
    }

    /// Build a config from environment variables.
    ///
    /// - `OUTPUT_BACKEND`: `filesystem` (default) or `memory`
    /// - `OUTPUT_DIR`: download directory (default: `./downloads`)
    /// - `OUTPUT_PREFIX`: optional sub-directory, e.g. `batch-42/`
    pub fn from_env() -> Result<Self, OutputError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, OutputError> {
        let backend = lookup("OUTPUT_BACKEND").and_then(non_empty);
        let prefix = lookup("OUTPUT_PREFIX").and_then(non_empty);
        let root = || {
            lookup("OUTPUT_DIR")
                .and_then(non_empty)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
        };

        let cfg = match backend.as_deref() {
            None | Some("filesystem") | Some("fs") => Self::filesystem(root()),
            Some("memory") | Some("mem") => Self::memory(),
            Some(other) => {
                return Err(OutputError::InvalidConfig(format!(
                    "unsupported OUTPUT_BACKEND={other} (expected filesystem|memory)"
                )));
            }
        };

        Ok(Self { prefix, ..cfg })
    }
}

/// Where downloaded results end up.
#[derive(Clone)]
pub struct OutputStore {
    kind: OutputKind,
    store: Arc<dyn ObjectStore>,
    prefix: Option<String>,
}

impl std::fmt::Debug for OutputStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStore")
            .field("kind", &self.kind)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl OutputStore {
    pub fn kind(&self) -> OutputKind {
        self.kind
    }

    pub async fn new(cfg: OutputConfig) -> Result<Self, OutputError> {
        let (kind, store) = match cfg.backend {
            OutputBackendConfig::Filesystem { root } => {
                ensure_dir(&root)?;
                let fs = object_store::local::LocalFileSystem::new_with_prefix(&root)?;
                (OutputKind::Filesystem, Arc::new(fs) as _)
            }
            OutputBackendConfig::Memory => {
                let mem = object_store::memory::InMemory::new();
                (OutputKind::Memory, Arc::new(mem) as _)
            }
        };

        Ok(Self {
            kind,
            store,
            prefix: cfg.prefix.and_then(non_empty),
        })
    }

    pub async fn from_env() -> Result<Self, OutputError> {
        Self::new(OutputConfig::from_env()?).await
    }

    fn to_path(&self, file_name: &str) -> Result<Path, OutputError> {
        let file_name = file_name.trim_start_matches('/');
        if file_name.is_empty() {
            return Err(OutputError::InvalidConfig(
                "file name must not be empty".to_string(),
            ));
        }

        let joined = match self.prefix.as_deref().map(|p| p.trim_matches('/')) {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}/{file_name}"),
            _ => file_name.to_string(),
        };

        Ok(Path::from(joined))
    }

    /// Write a file, replacing any previous file of the same name.
    pub async fn save_file(&self, file_name: &str, data: Bytes) -> Result<(), OutputError> {
        let path = self.to_path(file_name)?;
        self.store
            .put(&path, object_store::PutPayload::from(data))
            .await?;
        Ok(())
    }

    /// Read back a saved file.
    pub async fn load_file(&self, file_name: &str) -> Result<Bytes, OutputError> {
        let path = self.to_path(file_name)?;
        let res = self.store.get(&path).await?;
        Ok(res.bytes().await?)
    }

    pub async fn delete_file(&self, file_name: &str) -> Result<(), OutputError> {
        let path = self.to_path(file_name)?;
        self.store.delete(&path).await?;
        Ok(())
    }
}

fn ensure_dir(root: &FsPath) -> Result<(), OutputError> {
    std::fs::create_dir_all(root)?;
    Ok(())
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
