use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use walkdir::WalkDir;

use crate::document::HabitDocument;
use crate::store::{HabitStore, StoreError};

/// Stores each habit as `<id>.json` under one directory.
pub struct JsonDirStore {
    root: PathBuf,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl JsonDirStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("unable to create habit store at {}", root.display()))?;
        tracing::info!(path = %root.display(), "opened habit store");
        Ok(Self {
            root,
            watcher: Mutex::new(None),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Calls `on_change` whenever a habit document under the root is
    /// created, modified or removed. The caller reloads in response.
    pub fn watch(&self, on_change: impl Fn() + Send + 'static) -> Result<()> {
        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return Ok(());
        }
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    if event.paths.iter().any(|path| is_document(path)) {
                        tracing::debug!(?event, "habit store change detected");
                        on_change();
                    }
                }
                Err(err) => tracing::warn!(%err, "habit store watch error"),
            }
        })?;
        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .with_context(|| format!("unable to watch {}", self.root.display()))?;
        *slot = Some(watcher);
        Ok(())
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        let valid = !id.is_empty()
            && id != "."
            && id != ".."
            && !id.contains(|c: char| c == '/' || c == '\\' || c == '\0');
        if !valid {
            return Err(StoreError::Rejected(format!("`{id}` is not a storable id")));
        }
        Ok(self.root.join(format!("{id}.json")))
    }
}

#[async_trait]
impl HabitStore for JsonDirStore {
    async fn load_all(&self) -> Result<Vec<HabitDocument>, StoreError> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() && is_document(entry.path()) {
                paths.push(entry.into_path());
            }
        }

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            let raw = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => raw,
                // Removed between the scan and the read.
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            match serde_json::from_str::<HabitDocument>(&raw) {
                Ok(doc) => documents.push(doc),
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "skipping unreadable habit document")
                }
            }
        }
        Ok(documents)
    }

    async fn put(&self, document: &HabitDocument) -> Result<(), StoreError> {
        let path = self.path_for(&document.id)?;
        let payload = serde_json::to_string_pretty(document)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, payload).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        let path = self.path_for(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
