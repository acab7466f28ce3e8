//! Append-only audit trail of accepted scans, one JSON object per line.

use crate::error::StoreError;
use crate::resilient::{DataDir, Document};
use crate::roster::PersonId;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanLogEntry {
    pub id: PersonId,
    pub name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanLog {
    entries: Vec<ScanLogEntry>,
}

impl ScanLog {
    pub fn entries(&self) -> &[ScanLogEntry] {
        &self.entries
    }

    /// Append one entry to the on-disk log without rewriting it.
    pub fn append(data: &DataDir, entry: &ScanLogEntry) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(entry).map_err(|source| StoreError::Encode {
            name: Self::FILE_NAME,
            source,
        })?;
        line.push(b'\n');
        data.append(Self::FILE_NAME, &line)
    }
}

impl Document for ScanLog {
    const FILE_NAME: &'static str = "scan_log.jsonl";

    /// Any unparseable line marks the whole log corrupt.
    fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let entries = serde_json::Deserializer::from_slice(bytes)
            .into_iter::<ScanLogEntry>()
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut out = Vec::new();
        for entry in &self.entries {
            serde_json::to_writer(&mut out, entry)?;
            out.push(b'\n');
        }
        Ok(out)
    }
}
