//! Backup-on-start and restore-on-corruption beneath every persisted document.
//!
//! Each run copies the live documents into `data_backups/<YYYYmmdd_HHMMSS>/`.
//! Backups are never pruned. A document that fails to parse is replaced by
//! the newest backup copy that does parse; if none does, the caller gets an
//! empty document and a [`LoadStatus::Lost`] marker.

use crate::error::StoreError;
use fs4::fs_std::FileExt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const BACKUP_DIR: &str = "data_backups";
const BACKUP_STAMP: &str = "%Y%m%d_%H%M%S";
const LOCK_FILE: &str = ".rollcall.lock";

/// A whole-file persisted value.
pub trait Document: Default + Sized {
    /// File name inside the data directory.
    const FILE_NAME: &'static str;

    fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error>;

    fn encode(&self) -> Result<Vec<u8>, serde_json::Error>;
}

/// How a document was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// Primary file parsed.
    Primary,
    /// No primary file yet; started empty.
    Missing,
    /// Primary was corrupt and has been rewritten from this backup.
    Restored { backup: PathBuf },
    /// Primary and every backup were unreadable; started empty.
    Lost,
}

#[derive(Debug)]
pub struct Loaded<T> {
    pub value: T,
    pub status: LoadStatus,
}

/// Exclusive hold on a data directory. Released when dropped, or by the OS
/// when the process dies.
#[derive(Debug)]
pub struct DirLock {
    _file: fs::File,
}

/// The data directory and its backup tree.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;
        Ok(Self { root })
    }

    /// Take the directory's advisory lock without waiting.
    ///
    /// Every process that loads documents into memory and writes them back
    /// must hold this, or its whole-file saves would undo another's.
    pub fn lock(&self) -> Result<DirLock, StoreError> {
        let path = self.path_of(LOCK_FILE);
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;
        match file.try_lock_exclusive() {
            Ok(true) => Ok(DirLock { _file: file }),
            Ok(false) => Err(StoreError::Locked {
                path: self.root.clone(),
            }),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    fn backup_root(&self) -> PathBuf {
        self.root.join(BACKUP_DIR)
    }

    /// Copy every existing file in `file_names` into a fresh timestamped
    /// backup directory. Returns the directory created.
    pub fn backup(&self, file_names: &[&str]) -> Result<PathBuf, StoreError> {
        let stamp = chrono::Local::now().format(BACKUP_STAMP).to_string();
        let parent = self.backup_root();
        fs::create_dir_all(&parent).map_err(|e| StoreError::io(&parent, e))?;

        // Two runs within one second get distinct, still-sortable names.
        let mut dir = parent.join(&stamp);
        let mut n = 1;
        while dir.exists() {
            dir = parent.join(format!("{stamp}_{n}"));
            n += 1;
        }
        fs::create_dir(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let mut copied = 0;
        for name in file_names {
            let src = self.path_of(name);
            if !src.is_file() {
                continue;
            }
            let dst = dir.join(name);
            fs::copy(&src, &dst).map_err(|e| StoreError::io(&dst, e))?;
            copied += 1;
        }
        tracing::info!(dir = %dir.display(), copied, "data backup created");
        Ok(dir)
    }

    /// Backup directories, newest first.
    pub fn backups(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(self.backup_root()) else {
            return Vec::new();
        };
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort_by_cached_key(|p| {
            let name = p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            let (stamp, n) = backup_order(&name);
            std::cmp::Reverse((stamp.to_string(), n))
        });
        dirs
    }

    /// Read a document, restoring from backup if the primary is corrupt.
    pub fn load<D: Document>(&self) -> Loaded<D> {
        let primary = self.path_of(D::FILE_NAME);
        let bytes = match fs::read(&primary) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Loaded {
                    value: D::default(),
                    status: LoadStatus::Missing,
                };
            }
            Err(e) => {
                tracing::warn!(path = %primary.display(), error = %e, "primary unreadable");
                return self.restore(&primary);
            }
        };

        match D::decode(&bytes) {
            Ok(value) => Loaded {
                value,
                status: LoadStatus::Primary,
            },
            Err(e) => {
                tracing::warn!(path = %primary.display(), error = %e, "primary corrupt");
                self.restore(&primary)
            }
        }
    }

    fn restore<D: Document>(&self, primary: &Path) -> Loaded<D> {
        for dir in self.backups() {
            let candidate = dir.join(D::FILE_NAME);
            let Ok(bytes) = fs::read(&candidate) else {
                continue;
            };
            let Ok(value) = D::decode(&bytes) else {
                tracing::debug!(path = %candidate.display(), "backup copy also corrupt");
                continue;
            };

            if let Err(e) = write_atomic(primary, &bytes) {
                tracing::warn!(path = %primary.display(), error = %e, "could not rewrite primary from backup");
            }
            tracing::warn!(
                file = D::FILE_NAME,
                backup = %dir.display(),
                "restored from backup"
            );
            return Loaded {
                value,
                status: LoadStatus::Restored { backup: dir },
            };
        }

        tracing::warn!(file = D::FILE_NAME, "no readable backup; starting empty, data lost");
        Loaded {
            value: D::default(),
            status: LoadStatus::Lost,
        }
    }

    /// Replace a document on disk.
    pub fn save<D: Document>(&self, doc: &D) -> Result<(), StoreError> {
        let bytes = doc.encode().map_err(|source| StoreError::Encode {
            name: D::FILE_NAME,
            source,
        })?;
        write_atomic(&self.path_of(D::FILE_NAME), &bytes)
    }

    /// Append raw bytes to a document without rewriting it.
    pub fn append(&self, file_name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_of(file_name);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;
        file.write_all(bytes).map_err(|e| StoreError::io(&path, e))
    }
}

/// Split `<stamp>_<n>` into its stamp and collision counter (0 when absent).
fn backup_order(name: &str) -> (&str, u32) {
    match name.rsplit_once('_') {
        Some((stamp, n)) if stamp.contains('_') => (stamp, n.parse().unwrap_or(0)),
        _ => (name, 0),
    }
}

/// Write to a sibling temp file then rename into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    fs::write(&tmp, bytes).map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Numbers(Vec<u32>);

    impl Document for Numbers {
        const FILE_NAME: &'static str = "numbers.json";

        fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
            serde_json::from_slice(bytes)
        }

        fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
            serde_json::to_vec(self)
        }
    }

    fn write_backup(data: &DataDir, stamp: &str, contents: &str) {
        let dir = data.backup_root().join(stamp);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(Numbers::FILE_NAME), contents).unwrap();
    }

    #[test]
    fn test_missing_primary_is_empty() {
        let tmp = TempDir::new().unwrap();
        let data = DataDir::open(tmp.path()).unwrap();
        let loaded = data.load::<Numbers>();
        assert_eq!(loaded.value, Numbers::default());
        assert_eq!(loaded.status, LoadStatus::Missing);
    }

    #[test]
    fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let data = DataDir::open(tmp.path()).unwrap();
        data.save(&Numbers(vec![1, 2, 3])).unwrap();
        let loaded = data.load::<Numbers>();
        assert_eq!(loaded.value, Numbers(vec![1, 2, 3]));
        assert_eq!(loaded.status, LoadStatus::Primary);
    }

    #[test]
    fn test_corrupt_primary_restores_newest_parseable_backup() {
        let tmp = TempDir::new().unwrap();
        let data = DataDir::open(tmp.path()).unwrap();
        write_backup(&data, "20240101_080000", "[1]");
        write_backup(&data, "20240102_080000", "[2]");
        write_backup(&data, "20240103_080000", "{not json");
        fs::write(data.path_of(Numbers::FILE_NAME), "garbage").unwrap();

        let loaded = data.load::<Numbers>();
        assert_eq!(loaded.value, Numbers(vec![2]));
        match loaded.status {
            LoadStatus::Restored { backup } => {
                assert!(backup.ends_with("20240102_080000"));
            }
            other => panic!("expected Restored, got {other:?}"),
        }

        // Primary was rewritten and now loads cleanly.
        let again = data.load::<Numbers>();
        assert_eq!(again.value, Numbers(vec![2]));
        assert_eq!(again.status, LoadStatus::Primary);
    }

    #[test]
    fn test_all_backups_corrupt_is_lost() {
        let tmp = TempDir::new().unwrap();
        let data = DataDir::open(tmp.path()).unwrap();
        write_backup(&data, "20240101_080000", "nope");
        fs::write(data.path_of(Numbers::FILE_NAME), "").unwrap();

        let loaded = data.load::<Numbers>();
        assert_eq!(loaded.value, Numbers::default());
        assert_eq!(loaded.status, LoadStatus::Lost);
    }

    #[test]
    fn test_backup_without_copy_in_newest_dir_falls_through() {
        let tmp = TempDir::new().unwrap();
        let data = DataDir::open(tmp.path()).unwrap();
        write_backup(&data, "20240101_080000", "[7]");
        fs::create_dir_all(data.backup_root().join("20240105_080000")).unwrap();
        fs::write(data.path_of(Numbers::FILE_NAME), "[").unwrap();

        assert_eq!(data.load::<Numbers>().value, Numbers(vec![7]));
    }

    #[test]
    fn test_backup_copies_existing_files_and_never_prunes() {
        let tmp = TempDir::new().unwrap();
        let data = DataDir::open(tmp.path()).unwrap();
        data.save(&Numbers(vec![9])).unwrap();

        let first = data.backup(&[Numbers::FILE_NAME, "absent.json"]).unwrap();
        let second = data.backup(&[Numbers::FILE_NAME]).unwrap();

        assert_ne!(first, second);
        assert!(first.join(Numbers::FILE_NAME).is_file());
        assert!(!first.join("absent.json").exists());
        assert_eq!(data.backups().len(), 2);
        // Newest first.
        assert_eq!(data.backups()[0], second);
    }

    #[test]
    fn test_backups_order_collision_suffix_numerically() {
        let tmp = TempDir::new().unwrap();
        let data = DataDir::open(tmp.path()).unwrap();
        for name in ["20240101_080000", "20240101_080000_9", "20240101_080000_10", "20231231_235959_12"] {
            fs::create_dir_all(data.backup_root().join(name)).unwrap();
        }
        let names: Vec<String> = data
            .backups()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["20240101_080000_10", "20240101_080000_9", "20240101_080000", "20231231_235959_12"]
        );
    }

    #[test]
    fn test_lock_is_exclusive_until_dropped() {
        let tmp = TempDir::new().unwrap();
        let data = DataDir::open(tmp.path()).unwrap();
        let held = data.lock().unwrap();

        let other = DataDir::open(tmp.path()).unwrap();
        assert!(matches!(other.lock(), Err(StoreError::Locked { .. })));

        drop(held);
        assert!(other.lock().is_ok());
    }

    #[test]
    fn test_append_creates_and_extends() {
        let tmp = TempDir::new().unwrap();
        let data = DataDir::open(tmp.path()).unwrap();
        data.append("log.jsonl", b"a\n").unwrap();
        data.append("log.jsonl", b"b\n").unwrap();
        assert_eq!(fs::read_to_string(data.path_of("log.jsonl")).unwrap(), "a\nb\n");
    }
}
