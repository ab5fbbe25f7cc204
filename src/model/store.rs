//! Versioned artifact storage
//!
//! Scaler and classifier blobs are written once per version and never
//! overwritten. Every load-mutate-persist cycle runs inside
//! `ArtifactRegistry::exclusive`.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::{DotaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Scaler,
    Classifier,
}

impl ArtifactKind {
    pub fn name(&self) -> &'static str {
        match self {
            ArtifactKind::Scaler => "scaler",
            ArtifactKind::Classifier => "classifier",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Storage for versioned artifact blobs
pub trait ArtifactStore: Send + Sync {
    /// Highest stored version, if any
    fn latest_version(&self, kind: ArtifactKind) -> Result<Option<u64>>;

    fn load(&self, kind: ArtifactKind, version: u64) -> Result<Vec<u8>>;

    /// Fails with `ArtifactConflict` if the version already exists
    fn save(&self, kind: ArtifactKind, version: u64, bytes: &[u8]) -> Result<()>;

    fn load_latest(&self, kind: ArtifactKind) -> Result<Option<(u64, Vec<u8>)>> {
        match self.latest_version(kind)? {
            Some(version) => Ok(Some((version, self.load(kind, version)?))),
            None => Ok(None),
        }
    }
}

/// Artifacts as `<dir>/<kind>-v<version>.json`
pub struct FileArtifactStore {
    dir: PathBuf,
}

impl FileArtifactStore {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(FileArtifactStore { dir })
    }

    fn path(&self, kind: ArtifactKind, version: u64) -> PathBuf {
        self.dir.join(format!("{}-v{}.json", kind, version))
    }

    fn parse_version(kind: ArtifactKind, file_name: &str) -> Option<u64> {
        file_name
            .strip_prefix(kind.name())?
            .strip_prefix("-v")?
            .strip_suffix(".json")?
            .parse()
            .ok()
    }
}

impl ArtifactStore for FileArtifactStore {
    fn latest_version(&self, kind: ArtifactKind) -> Result<Option<u64>> {
        let mut latest = None;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(version) = entry
                .file_name()
                .to_str()
                .and_then(|name| Self::parse_version(kind, name))
            {
                latest = latest.max(Some(version));
            }
        }
        Ok(latest)
    }

    fn load(&self, kind: ArtifactKind, version: u64) -> Result<Vec<u8>> {
        Ok(fs::read(self.path(kind, version))?)
    }

    fn save(&self, kind: ArtifactKind, version: u64, bytes: &[u8]) -> Result<()> {
        let path = self.path(kind, version);
        if path.exists() {
            return Err(DotaError::ArtifactConflict {
                kind: kind.to_string(),
                version,
            });
        }

        // Readers see either no file or the complete one
        let tmp = self.dir.join(format!(".{}-v{}.tmp", kind, version));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        log::info!("Saved {} v{} to {}", kind, version, path.display());
        Ok(())
    }
}

/// In-process store
#[derive(Default)]
pub struct MemoryArtifactStore {
    blobs: RwLock<HashMap<(ArtifactKind, u64), Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn latest_version(&self, kind: ArtifactKind) -> Result<Option<u64>> {
        Ok(self
            .blobs
            .read()
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, v)| *v)
            .max())
    }

    fn load(&self, kind: ArtifactKind, version: u64) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .get(&(kind, version))
            .cloned()
            .ok_or_else(|| {
                DotaError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} v{} not found", kind, version),
                ))
            })
    }

    fn save(&self, kind: ArtifactKind, version: u64, bytes: &[u8]) -> Result<()> {
        let mut blobs = self.blobs.write();
        if blobs.contains_key(&(kind, version)) {
            return Err(DotaError::ArtifactConflict {
                kind: kind.to_string(),
                version,
            });
        }
        blobs.insert((kind, version), bytes.to_vec());
        Ok(())
    }
}

/// Store shared behind one exclusive scope
#[derive(Clone)]
pub struct ArtifactRegistry {
    store: Arc<dyn ArtifactStore>,
    lock: Arc<Mutex<()>>,
}

impl ArtifactRegistry {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        ArtifactRegistry {
            store,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryArtifactStore::new()))
    }

    /// Run `f` with exclusive access to the store.
    ///
    /// Not reentrant: inside `f`, use the store handed in, never the registry.
    pub fn exclusive<T>(&self, f: impl FnOnce(&dyn ArtifactStore) -> Result<T>) -> Result<T> {
        let _guard = self.lock.lock();
        f(self.store.as_ref())
    }

    /// Consistent read of the latest artifacts
    pub fn read<T>(&self, f: impl FnOnce(&dyn ArtifactStore) -> Result<T>) -> Result<T> {
        self.exclusive(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn ArtifactStore) {
        assert_eq!(store.latest_version(ArtifactKind::Scaler).unwrap(), None);

        store.save(ArtifactKind::Scaler, 1, b"one").unwrap();
        store.save(ArtifactKind::Scaler, 2, b"two").unwrap();
        store.save(ArtifactKind::Classifier, 7, b"clf").unwrap();

        assert_eq!(store.latest_version(ArtifactKind::Scaler).unwrap(), Some(2));
        assert_eq!(store.latest_version(ArtifactKind::Classifier).unwrap(), Some(7));
        assert_eq!(store.load(ArtifactKind::Scaler, 1).unwrap(), b"one");
        assert_eq!(
            store.load_latest(ArtifactKind::Scaler).unwrap(),
            Some((2, b"two".to_vec()))
        );

        match store.save(ArtifactKind::Scaler, 2, b"again") {
            Err(DotaError::ArtifactConflict { version, .. }) => assert_eq!(version, 2),
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(store.load(ArtifactKind::Scaler, 2).unwrap(), b"two");
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryArtifactStore::new());
    }

    #[test]
    fn test_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::open(dir.path()).unwrap();
        exercise(&store);

        // No temp files left behind
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().all(|n| n.ends_with(".json")));
    }

    #[test]
    fn test_file_versions_ignore_other_kinds() {
        assert_eq!(
            FileArtifactStore::parse_version(ArtifactKind::Scaler, "scaler-v12.json"),
            Some(12)
        );
        assert_eq!(
            FileArtifactStore::parse_version(ArtifactKind::Scaler, "classifier-v12.json"),
            None
        );
    }
}
