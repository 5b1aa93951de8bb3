use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use anyhow::{bail, Context, Result};

/// Persists generated artifacts and hands back an opaque locator.
pub trait ArtifactStore: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<String>;
}

/// Writes artifacts as files under a root directory. The locator is the file path.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create artifact directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
        let relative = Path::new(key);
        if key.is_empty() || !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            bail!("artifact key {key:?} must be a relative path without '..'");
        }

        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&path, bytes)
            .with_context(|| format!("failed to write artifact {}", path.display()))?;

        Ok(path.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_under_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("artifacts")).unwrap();

        let locator = store.put("abc/overlay.png", b"png-bytes").unwrap();
        assert_eq!(fs::read(&locator).unwrap(), b"png-bytes");
        assert!(locator.starts_with(store.root().to_string_lossy().as_ref()));
    }

    #[test]
    fn escaping_keys_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().to_path_buf()).unwrap();
        assert!(store.put("../outside.png", b"x").is_err());
        assert!(store.put("/etc/passwd", b"x").is_err());
        assert!(store.put("", b"x").is_err());
    }
}
