//! Commit Journal
//!
//! One record naming every key a publish is about to install. Its presence
//! on disk is the commit point of a filesystem publish.
//!
//! ## Format
//! ```text
//! ┌───────────┬─────────┬──────────┬────────────────────────┐
//! │ Magic (4) │ CRC (4) │ Len (4)  │ bincode(CommitRecord)  │
//! └───────────┴─────────┴──────────┴────────────────────────┘
//! ```
//! CRC covers the payload only. Integers are little-endian.

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::key::Key;

const MAGIC: &[u8; 4] = b"SSCJ";

/// Magic (4) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 12;

/// Keys installed by one publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Snapshot generation this publish produces
    pub generation: u64,

    /// Timestamp (unix millis) when the record was written
    pub timestamp: u64,

    /// Every key whose pending copy must be installed
    pub keys: Vec<Key>,
}

impl CommitRecord {
    pub fn new(generation: u64, keys: Vec<Key>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            generation,
            timestamp,
            keys,
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;
        let len = u32::try_from(payload.len())
            .map_err(|_| StoreError::Serialization("commit record too large".to_string()))?;

        let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE || &bytes[0..4] != MAGIC {
            return Err(StoreError::Corruption("bad commit journal header".to_string()));
        }
        let crc = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;

        let payload = &bytes[HEADER_SIZE..];
        if payload.len() != len {
            return Err(StoreError::Corruption(format!(
                "commit journal payload is {} bytes, header says {}",
                payload.len(),
                len
            )));
        }
        if crc32fast::hash(payload) != crc {
            return Err(StoreError::Corruption("commit journal CRC mismatch".to_string()));
        }
        Ok(bincode::deserialize(payload)?)
    }

    /// Write to `path` through a temp file and rename, so the record
    /// appears whole or not at all
    pub fn write(&self, path: &Path, sync: bool) -> Result<()> {
        let tmp = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&self.serialize()?)?;
            if sync {
                file.sync_all()?;
            }
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Read the record at `path`, `None` when there is no journal
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Self::deserialize(&bytes).map(Some)
    }
}
