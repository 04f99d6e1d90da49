use async_trait::async_trait;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Access to uploaded files by key. Archives are directories whose members
/// are addressed as `<archive>/<member>`.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn read(&self, key: &str) -> io::Result<Vec<u8>>;
    async fn write(&self, key: &str, data: &[u8]) -> io::Result<()>;
    async fn exists(&self, key: &str) -> bool;
    /// Keys of the regular files directly under `prefix`, sorted.
    async fn list(&self, prefix: &str) -> io::Result<Vec<String>>;
    async fn remove(&self, key: &str) -> io::Result<()>;
}

pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> io::Result<PathBuf> {
        let rel = Path::new(key);
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("file key escapes the store: {}", key),
            ));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn read(&self, key: &str) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.resolve(key)?).await
    }

    async fn write(&self, key: &str, data: &[u8]) -> io::Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, data).await
    }

    async fn exists(&self, key: &str) -> bool {
        match self.resolve(key) {
            Ok(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn list(&self, prefix: &str) -> io::Result<Vec<String>> {
        let dir = self.resolve(prefix)?;
        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            keys.push(format!("{}/{}", prefix.trim_end_matches('/'), name));
        }
        keys.sort();
        Ok(keys)
    }

    async fn remove(&self, key: &str) -> io::Result<()> {
        tokio::fs::remove_file(self.resolve(key)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_list_read_remove() {
        let dir = tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        store.write("bundle/b.tsv", b"b").await.unwrap();
        store.write("bundle/a.tsv", b"a").await.unwrap();
        store.write("bundle/nested/c.tsv", b"c").await.unwrap();

        let keys = store.list("bundle").await.unwrap();
        assert_eq!(keys, vec!["bundle/a.tsv", "bundle/b.tsv"]);
        assert_eq!(store.read("bundle/a.tsv").await.unwrap(), b"a");

        store.remove("bundle/a.tsv").await.unwrap();
        assert!(!store.exists("bundle/a.tsv").await);
        assert!(store.exists("bundle/b.tsv").await);
    }

    #[tokio::test]
    async fn rejects_keys_outside_root() {
        let dir = tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());
        let err = store.read("../etc/passwd").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(!store.exists("/etc/passwd").await);
    }
}
