//! The application context: persisted stores loaded behind the startup
//! backup, plus the roster operations the CLI exposes.

use crate::attendance::LedgerEngine;
use crate::events::{Notifier, SessionEvent};
use crate::pipeline::Gallery;
use crate::shared::Shared;
use image::GrayImage;
use rollcall_core::Encoding;
use rollcall_store::{
    AttendanceLedger, AttendanceRecord, DataDir, DirLock, Document, LoadStatus, Loaded, PersonId, PhotoStore, Registry,
    Roster, ScanLog, Schedule, StoreError, ValidationError, DOCUMENTS,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no attendance records to export")]
    NothingToExport,
    #[error("failed to write export {path}: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(v) => AppError::Validation(v),
            other => AppError::Store(other),
        }
    }
}

pub struct App {
    _lock: DirLock,
    data: DataDir,
    photos: PhotoStore,
    roster: Shared<Roster>,
    registry: Shared<Registry>,
    ledger: Shared<AttendanceLedger>,
    notifier: Arc<dyn Notifier>,
}

impl App {
    /// Lock and back up the data directory, then load every store, restoring
    /// corrupt documents from backup.
    ///
    /// Fails with [`StoreError::Locked`] while another process (a running
    /// scan, say) has the directory open.
    pub fn open(data_root: &Path, notifier: Arc<dyn Notifier>) -> Result<Self, AppError> {
        let data = DataDir::open(data_root)?;
        let lock = data.lock()?;
        data.backup(&DOCUMENTS)?;

        let roster: Roster = load_reporting(&data, notifier.as_ref()).value;
        let registry: Registry = load_reporting(&data, notifier.as_ref()).value;
        let ledger: AttendanceLedger = load_reporting(&data, notifier.as_ref()).value;

        // The audit log is only appended to, so an unrecoverable copy would
        // stay corrupt forever. Start a fresh one; this run's backup keeps
        // the bad file.
        let scan_log = load_reporting::<ScanLog>(&data, notifier.as_ref());
        if scan_log.status == LoadStatus::Lost {
            data.save(&ScanLog::default())?;
        }
        let scan_log = scan_log.value;

        for entry in registry.entries() {
            if !roster.contains(&entry.id) {
                tracing::warn!(id = %entry.id, "registry entry has no roster row");
            }
        }
        tracing::info!(
            people = roster.people().len(),
            encodings = registry.len(),
            records = ledger.records().len(),
            scans = scan_log.entries().len(),
            "data loaded"
        );

        Ok(Self {
            _lock: lock,
            photos: PhotoStore::open(data.root())?,
            data,
            roster: Shared::new(roster),
            registry: Shared::new(registry),
            ledger: Shared::new(ledger),
            notifier,
        })
    }

    pub fn people(&self) -> Arc<Roster> {
        self.roster.load()
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.load()
    }

    pub fn gallery(&self) -> Gallery {
        Gallery {
            registry: self.registry.clone(),
            roster: self.roster.clone(),
        }
    }

    pub fn ledger_engine(&self, cooldown: Duration) -> LedgerEngine {
        LedgerEngine::new(
            self.data.clone(),
            self.roster.clone(),
            self.ledger.clone(),
            cooldown,
            self.notifier.clone(),
        )
    }

    /// Rename a person and rewrite the name on their existing ledger rows.
    /// Returns the number of ledger rows updated.
    pub fn rename(&self, id: &PersonId, name: &str) -> Result<usize, AppError> {
        let data = &self.data;
        let name = self.roster.update(|roster| {
            roster.rename(id, name)?;
            data.save(roster)?;
            Ok::<_, StoreError>(roster.get(id).map(|p| p.name.clone()).unwrap_or_default())
        })?;

        let rows = self.ledger.update(|ledger| {
            let n = ledger.rename_person(id, &name);
            if n > 0 {
                data.save(ledger)?;
            }
            Ok::<_, StoreError>(n)
        })?;
        tracing::info!(id = %id, name = %name, rows, "person renamed");
        Ok(rows)
    }

    pub fn set_schedule(&self, id: &PersonId, schedule: Option<Schedule>) -> Result<(), AppError> {
        let data = &self.data;
        self.roster.update(|roster| {
            roster.set_schedule(id, schedule)?;
            data.save(roster)
        })?;
        tracing::info!(id = %id, "schedule updated");
        Ok(())
    }

    /// Remove a person everywhere: roster, ledger rows, registry and photo.
    /// Returns the number of ledger rows removed.
    pub fn delete(&self, id: &PersonId) -> Result<usize, AppError> {
        if !self.roster.load().contains(id) {
            return Err(ValidationError::UnknownId(id.to_string()).into());
        }
        let data = &self.data;

        self.roster.update(|roster| {
            roster.remove(id);
            data.save(roster)
        })?;
        let rows = self.ledger.update(|ledger| {
            let n = ledger.remove_person(id);
            if n > 0 {
                data.save(ledger)?;
            }
            Ok::<_, StoreError>(n)
        })?;
        self.registry.update(|registry| {
            if registry.remove(id) {
                data.save(registry)?;
            }
            Ok::<_, StoreError>(())
        })?;
        if let Err(e) = self.photos.remove(id) {
            tracing::warn!(id = %id, error = %e, "could not remove reference photo");
        }

        tracing::info!(id = %id, rows, "person deleted");
        Ok(rows)
    }

    /// Persist a completed enrollment: photo, registry entry, roster row.
    ///
    /// Everything is validated first. If a later write fails the earlier
    /// ones are undone.
    pub fn commit_enrollment(
        &self,
        id: &PersonId,
        name: &str,
        schedule: Option<Schedule>,
        encoding: Encoding,
        photo: &GrayImage,
    ) -> Result<(), AppError> {
        let name = self.roster.load().check_new(id, name)?;
        if self.registry.load().contains(id) {
            return Err(ValidationError::DuplicateId(id.to_string()).into());
        }
        if encoding.is_empty() {
            return Err(ValidationError::Empty("encoding").into());
        }
        let data = &self.data;

        self.photos.save(id, photo)?;

        if let Err(e) = self.registry.update(|registry| {
            registry.insert(id.clone(), encoding)?;
            data.save(registry)
        }) {
            self.discard_photo(id);
            return Err(e.into());
        }

        if let Err(e) = self.roster.update(|roster| {
            roster.add(id.clone(), &name, schedule)?;
            data.save(roster)
        }) {
            let undo = self.registry.update(|registry| {
                registry.remove(id);
                data.save(registry)
            });
            if let Err(undo) = undo {
                tracing::error!(id = %id, error = %undo, "could not roll back registry entry");
            }
            self.discard_photo(id);
            return Err(e.into());
        }

        tracing::info!(id = %id, name = %name, "person enrolled");
        Ok(())
    }

    fn discard_photo(&self, id: &PersonId) {
        if let Err(e) = self.photos.remove(id) {
            tracing::warn!(id = %id, error = %e, "could not remove reference photo");
        }
    }

    /// Rows for one month, newest first.
    pub fn history(&self, year: i32, month: u32) -> Vec<AttendanceRecord> {
        self.ledger.load().history(year, month).into_iter().cloned().collect()
    }

    pub fn years(&self, current: i32) -> Vec<i32> {
        self.ledger.load().years(current)
    }

    /// Write the ledger, or one month of it, to `dest` in the stored format.
    /// Returns the number of rows written.
    pub fn export(&self, dest: &Path, month: Option<(i32, u32)>) -> Result<usize, AppError> {
        let ledger = self.ledger.load();
        let selected = match month {
            Some((year, month)) => {
                let mut subset = AttendanceLedger::default();
                // history() is newest first; restore stored order.
                for record in ledger.history(year, month).into_iter().rev() {
                    subset.push(record.clone());
                }
                subset
            }
            None => AttendanceLedger::clone(&ledger),
        };
        if selected.is_empty() {
            return Err(AppError::NothingToExport);
        }

        let bytes = selected.encode().map_err(|source| StoreError::Encode {
            name: AttendanceLedger::FILE_NAME,
            source,
        })?;
        std::fs::write(dest, bytes).map_err(|source| AppError::Export {
            path: dest.to_path_buf(),
            source,
        })?;
        let rows = selected.records().len();
        tracing::info!(path = %dest.display(), rows, "ledger exported");
        Ok(rows)
    }
}

fn load_reporting<D: Document>(data: &DataDir, notifier: &dyn Notifier) -> Loaded<D> {
    let loaded = data.load::<D>();
    match &loaded.status {
        LoadStatus::Primary | LoadStatus::Missing => {}
        LoadStatus::Restored { backup } => notifier.notify(&SessionEvent::DataRestored {
            file: D::FILE_NAME,
            backup: backup.clone(),
        }),
        LoadStatus::Lost => notifier.notify(&SessionEvent::DataCorrupted { file: D::FILE_NAME }),
    }
    loaded
}
