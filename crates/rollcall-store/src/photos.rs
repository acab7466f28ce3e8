//! Reference photos captured at enrollment, `<id>.jpg` under `photos/`.

use crate::error::StoreError;
use crate::roster::PersonId;
use image::GrayImage;
use std::fs;
use std::path::{Path, PathBuf};

pub const PHOTO_DIR: &str = "photos";

#[derive(Debug, Clone)]
pub struct PhotoStore {
    dir: PathBuf,
}

impl PhotoStore {
    pub fn open(data_root: &Path) -> Result<Self, StoreError> {
        let dir = data_root.join(PHOTO_DIR);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, id: &PersonId) -> PathBuf {
        self.dir.join(format!("{id}.jpg"))
    }

    pub fn save(&self, id: &PersonId, frame: &GrayImage) -> Result<PathBuf, StoreError> {
        let path = self.path_for(id);
        frame
            .save_with_format(&path, image::ImageFormat::Jpeg)
            .map_err(|source| StoreError::Photo {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    /// Returns whether a photo existed.
    pub fn remove(&self, id: &PersonId) -> Result<bool, StoreError> {
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }
}
