//! rollcall-store — persisted state.
//!
//! Every document lives as one file in the data directory and is read through
//! [`DataDir::load`], which restores from the startup backups when the
//! primary copy is corrupt.

pub mod error;
pub mod ledger;
pub mod photos;
pub mod registry;
pub mod resilient;
pub mod roster;
pub mod scan_log;

pub use error::{StoreError, ValidationError};
pub use ledger::{AttendanceLedger, AttendanceRecord};
pub use photos::PhotoStore;
pub use registry::{Registry, RegistryEntry};
pub use resilient::{DataDir, DirLock, Document, LoadStatus, Loaded};
pub use roster::{Person, PersonId, Roster, Schedule};
pub use scan_log::{ScanLog, ScanLogEntry};

/// File names of every document copied by the startup backup.
pub const DOCUMENTS: [&str; 4] = [
    Roster::FILE_NAME,
    Registry::FILE_NAME,
    AttendanceLedger::FILE_NAME,
    ScanLog::FILE_NAME,
];
