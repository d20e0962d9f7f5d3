//! Context configuration via `tessera.toml`
//!
//! On first open, a default `tessera.toml` is written into the data
//! directory. To change settings, edit the file and reopen the context.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tessera_core::{Error, Result};
use tessera_storage::{AllocatorOptions, DEFAULT_MAX_IDENTIFIER, DEFAULT_QUEUE_SIZE};

/// Config file name placed in the data directory.
pub const CONFIG_FILE_NAME: &str = "tessera.toml";

/// Default name of the persisted allocator state.
pub const DEFAULT_STATE_FILE: &str = "identifier.state";

/// Configuration loaded from `tessera.toml`.
///
/// # Example
///
/// ```toml
/// max_identifier = 1000000
/// queue_size = 1000
/// lock_timeout_ms = 5000
/// state_file = "identifier.state"
/// entity_scoped_identifiers = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TesseraConfig {
    /// Largest identifier the global counter may produce.
    #[serde(default = "default_max_identifier")]
    pub max_identifier: i64,
    /// Capacity of the allocator's prefetch queue.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// How long a lock acquisition may wait before it is reported as a deadlock.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Allocator state file, relative to the data directory.
    #[serde(default = "default_state_file")]
    pub state_file: String,
    /// Draw identities per entity instead of from the global allocator.
    #[serde(default)]
    pub entity_scoped_identifiers: bool,
}

fn default_max_identifier() -> i64 {
    DEFAULT_MAX_IDENTIFIER
}

fn default_queue_size() -> usize {
    DEFAULT_QUEUE_SIZE
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

fn default_state_file() -> String {
    DEFAULT_STATE_FILE.to_string()
}

impl Default for TesseraConfig {
    fn default() -> Self {
        Self {
            max_identifier: default_max_identifier(),
            queue_size: default_queue_size(),
            lock_timeout_ms: default_lock_timeout_ms(),
            state_file: default_state_file(),
            entity_scoped_identifiers: false,
        }
    }
}

impl TesseraConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Tessera configuration
#
# Largest identifier the global counter hands out before the allocator
# switches to scanning storage for unassigned identifiers.
# max_identifier = 9223372036854775807

# Identifiers prefetched per refill (default: 1000)
queue_size = 1000

# Lock wait timeout in milliseconds, reported as a deadlock (default: 5000)
lock_timeout_ms = 5000

# Allocator state, relative to the data directory
state_file = "identifier.state"

# Give every entity its own identifier space (default: false)
entity_scoped_identifiers = false
"#
    }

    /// Reject settings the allocator cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a zero queue size, a non-positive
    /// identifier bound or an empty state file name.
    pub fn validate(&self) -> Result<()> {
        if self.queue_size == 0 {
            return Err(Error::invalid_input("queue_size must be at least 1"));
        }
        if self.max_identifier < 1 {
            return Err(Error::invalid_input(format!(
                "max_identifier must be positive, got {}",
                self.max_identifier
            )));
        }
        if self.state_file.trim().is_empty() {
            return Err(Error::invalid_input("state_file must not be empty"));
        }
        Ok(())
    }

    /// Allocator sizing derived from this config.
    pub fn allocator_options(&self) -> AllocatorOptions {
        AllocatorOptions {
            max_identifier: self.max_identifier,
            queue_size: self.queue_size,
        }
    }

    /// Lock wait timeout.
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Read, parse and validate config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TesseraConfig = toml::from_str(&content).map_err(|e| {
            Error::invalid_input(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::invalid_input(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
