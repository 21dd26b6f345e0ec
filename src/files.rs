use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Where product images live. References are paths relative to the store
/// root, e.g. `products/P1700000000-3f2a.png`.
pub trait FileStore: Send + Sync {
    fn put(&self, bytes: &[u8], path: &str) -> io::Result<String>;
    fn exists(&self, reference: &str) -> bool;
    fn delete(&self, reference: &str) -> io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalFileStore { root: root.into() }
    }

    fn resolve(&self, reference: &str) -> io::Result<PathBuf> {
        let relative = Path::new(reference);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("file reference `{}` leaves the storage root", reference),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl FileStore for LocalFileStore {
    fn put(&self, bytes: &[u8], path: &str) -> io::Result<String> {
        let target = self.resolve(path)?;
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&target, bytes)?;
        log::debug!("stored {} bytes at {}", bytes.len(), target.display());
        Ok(path.to_string())
    }

    fn exists(&self, reference: &str) -> bool {
        self.resolve(reference).map(|p| p.is_file()).unwrap_or(false)
    }

    fn delete(&self, reference: &str) -> io::Result<()> {
        fs::remove_file(self.resolve(reference)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_exists_delete() {
        let root = std::env::temp_dir().join(format!("files-{}", uuid::Uuid::new_v4()));
        let store = LocalFileStore::new(&root);

        let reference = store.put(b"png", "products/a.png").unwrap();
        assert_eq!(reference, "products/a.png");
        assert!(store.exists(&reference));

        store.delete(&reference).unwrap();
        assert!(!store.exists(&reference));
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn refuses_paths_outside_the_root() {
        let store = LocalFileStore::new(std::env::temp_dir());
        assert!(store.put(b"x", "../escape.png").is_err());
        assert!(!store.exists("/etc/passwd"));
    }
}
