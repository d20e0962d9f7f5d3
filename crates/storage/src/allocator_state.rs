//! Persisted allocator state
//!
//! Fixed-format record written on shutdown and read back at startup:
//!
//! ```text
//! counter   : i64, big-endian (8 bytes)
//! scan_mode : u8, 0 or 1     (1 byte)
//! ```
//!
//! A missing file means `counter = 0, scan_mode = false`. Writes go to a
//! temporary sibling first and are renamed into place, so a crash leaves
//! either the old or the new record.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{self, File};
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use tessera_core::{Error, Result};

/// Encoded size of [`AllocatorState`]
pub const STATE_RECORD_SIZE: usize = 9;

/// Counter and scan-mode flag of the identifier allocator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorState {
    /// Last identifier handed to the prefetch queue by the counter
    pub counter: i64,
    /// Whether the counter reached its bound
    pub scan_mode: bool,
}

impl AllocatorState {
    /// Serialize to the fixed record
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(STATE_RECORD_SIZE);
        // Writing into a Vec cannot fail
        let _ = bytes.write_i64::<BigEndian>(self.counter);
        let _ = bytes.write_u8(u8::from(self.scan_mode));
        bytes
    }

    /// Deserialize from the fixed record
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != STATE_RECORD_SIZE {
            return Err(Error::Corruption(format!(
                "allocator state has {} bytes, expected {}",
                bytes.len(),
                STATE_RECORD_SIZE
            )));
        }
        let mut cursor = Cursor::new(bytes);
        let counter = cursor.read_i64::<BigEndian>()?;
        let scan_mode = match cursor.read_u8()? {
            0 => false,
            1 => true,
            other => {
                return Err(Error::Corruption(format!(
                    "invalid scan-mode flag {:#04x}",
                    other
                )))
            }
        };
        if counter < 0 {
            return Err(Error::Corruption(format!("negative counter {}", counter)));
        }
        Ok(AllocatorState { counter, scan_mode })
    }

    /// Read the state file; absence yields the default state
    pub fn read(path: &Path) -> Result<Self> {
        match fs::read(path) {
            Ok(bytes) => Self::from_bytes(&bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(AllocatorState::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the state file atomically
    pub fn write(&self, path: &Path) -> Result<()> {
        let tmp = temp_path(path);
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&self.to_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
