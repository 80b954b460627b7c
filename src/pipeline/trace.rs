use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{DriverError, DriverResult};

/// Collects one translator trace per batch and writes them all at shutdown.
pub struct BeamTraceRecorder<T> {
    path: PathBuf,
    entries: Vec<T>,
}

impl<T: Serialize> BeamTraceRecorder<T> {
    /// Fails early when the destination directory does not exist, so a long
    /// run is not wasted on an unwritable trace path.
    pub fn new(path: PathBuf) -> DriverResult<Self> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        if !parent.is_dir() {
            return Err(DriverError::io(
                format!("open beam trace {}", path.display()),
                std::io::Error::new(std::io::ErrorKind::NotFound, "parent directory not found"),
            ));
        }
        Ok(Self {
            path,
            entries: Vec::new(),
        })
    }

    pub fn record(&mut self, trace: T) {
        self.entries.push(trace);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes every entry, in batch order, as one pretty-printed JSON array.
    pub fn finish(self) -> DriverResult<PathBuf> {
        let text = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| DriverError::json("serialize beam trace", e))?;
        std::fs::write(&self.path, text)
            .map_err(|e| DriverError::io(format!("write beam trace {}", self.path.display()), e))?;
        Ok(self.path)
    }
}
