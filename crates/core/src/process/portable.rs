//! Portable identifiers for re-attaching to non-blocking processes.

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::error::ProcessError;
use super::exec_buffer::STORAGE_PREFIX;

const SEPARATOR: char = '.';

/// Identifies a still-running process across independent invocations.
///
/// Renders as `<storage suffix>.<boundary>.<unix timestamp>`. The storage
/// suffix is the part of the storage file name after [`STORAGE_PREFIX`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortableId {
    storage_suffix: String,
    boundary: String,
    created_at: DateTime<Utc>,
}

impl PortableId {
    /// Builds an id from a handle's storage location and boundary.
    pub fn new(
        storage: &Path,
        boundary: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ProcessError> {
        let file_name = storage
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let storage_suffix = match file_name.rfind(STORAGE_PREFIX) {
            Some(pos) => file_name[pos + STORAGE_PREFIX.len()..].to_string(),
            None => file_name,
        };

        let id = Self {
            storage_suffix,
            boundary: boundary.to_string(),
            // Sub-second precision does not survive the round trip.
            created_at: truncate_to_seconds(created_at),
        };
        id.check_segments()?;
        Ok(id)
    }

    /// Storage file name without the prefix.
    pub fn storage_suffix(&self) -> &str {
        &self.storage_suffix
    }

    /// Boundary token of the originating handle.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// When the id was issued.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Storage file location inside `storage_dir`.
    pub fn storage_path(&self, storage_dir: &Path) -> PathBuf {
        storage_dir.join(format!("{}{}", STORAGE_PREFIX, self.storage_suffix))
    }

    fn check_segments(&self) -> Result<(), ProcessError> {
        for (label, segment) in [("storage", &self.storage_suffix), ("boundary", &self.boundary)] {
            if segment.is_empty() {
                return Err(ProcessError::invalid_portable_id(
                    self.to_string(),
                    format!("empty {} segment", label),
                ));
            }
            if segment.contains(SEPARATOR) || segment.contains(['/', '\\']) {
                return Err(ProcessError::invalid_portable_id(
                    self.to_string(),
                    format!("{} segment contains a reserved character", label),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for PortableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.storage_suffix,
            self.boundary,
            self.created_at.timestamp(),
            sep = SEPARATOR
        )
    }
}

impl FromStr for PortableId {
    type Err = ProcessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(SEPARATOR).collect();
        let [storage_suffix, boundary, timestamp] = parts.as_slice() else {
            return Err(ProcessError::invalid_portable_id(
                s,
                format!("expected 3 segments, found {}", parts.len()),
            ));
        };

        let created_at = timestamp
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| ProcessError::invalid_portable_id(s, "timestamp is not a valid unix time"))?;

        let id = Self {
            storage_suffix: storage_suffix.to_string(),
            boundary: boundary.to_string(),
            created_at,
        };
        id.check_segments()?;
        Ok(id)
    }
}

fn truncate_to_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(at.timestamp(), 0).unwrap_or(at)
}
