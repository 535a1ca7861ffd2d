// File-backed store for sources created by the multi-source wizard
use crate::application::ports::SourceStore;
use crate::domain::data_source::CreatedSource;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct SourceCache {
    path: PathBuf,
    sources: Mutex<Vec<CreatedSource>>,
}

impl SourceCache {
    /// Open the cache at `path`. A missing file starts empty.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let sources = if path.exists() {
            let raw = std::fs::read(&path)
                .with_context(|| format!("Failed to read source cache {}", path.display()))?;
            serde_json::from_slice(&raw).context("Failed to parse source cache")?
        } else {
            Vec::new()
        };

        tracing::debug!("Loaded {} cached sources from {}", sources.len(), path.display());
        Ok(Self {
            path,
            sources: Mutex::new(sources),
        })
    }

    fn persist(&self, sources: &[CreatedSource]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_vec_pretty(sources)?;
        std::fs::write(&self.path, body)
            .with_context(|| format!("Failed to write source cache {}", self.path.display()))
    }
}

impl SourceStore for SourceCache {
    fn sources(&self) -> Vec<CreatedSource> {
        self.sources.lock().clone()
    }

    fn insert(&self, source: CreatedSource) -> Result<()> {
        let mut sources = self.sources.lock();
        sources.retain(|s| s.id != source.id);
        sources.push(source);
        self.persist(&sources)
    }

    fn clear(&self) -> Result<()> {
        let mut sources = self.sources.lock();
        sources.clear();
        self.persist(&sources)
    }
}
