//! Lockfile error taxonomy.

use thiserror::Error;

/// Stable error codes, one per [`LockError`] variant.
pub mod codes {
    pub const LOCK_INCONSISTENT_SNAPSHOT: &str = "LOCK_INCONSISTENT_SNAPSHOT";
    pub const LOCK_MALFORMED_PLACEMENT: &str = "LOCK_MALFORMED_PLACEMENT";
    pub const LOCK_PLACEMENT_CONFLICT: &str = "LOCK_PLACEMENT_CONFLICT";
    pub const LOCK_UNSUPPORTED_FORMAT: &str = "LOCK_UNSUPPORTED_FORMAT";
    pub const LOCK_INVALID_LOCKFILE: &str = "LOCK_INVALID_LOCKFILE";
    pub const LOCK_INVALID_MANIFEST: &str = "LOCK_INVALID_MANIFEST";
    pub const LOCK_UNSUPPORTED_RESOLUTION: &str = "LOCK_UNSUPPORTED_RESOLUTION";
    pub const LOCK_TOO_LARGE: &str = "LOCK_TOO_LARGE";
}

/// Errors raised while building, walking or projecting a snapshot.
///
/// Cycles are never an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// A declared dependency has no record in the snapshot.
    #[error("Inconsistent snapshot: no record satisfies {name}@{range}")]
    InconsistentSnapshot { name: String, range: String },

    /// A physical path cannot be mapped to any known record.
    #[error("Malformed placement: {path}")]
    MalformedPlacement { path: String },

    /// Every candidate location for `name` would shadow an existing consumer.
    #[error("Placement conflict: cannot place {name} below {path}")]
    PlacementConflict { path: String, name: String },

    #[error("Unsupported lockfile format: {hint}")]
    UnsupportedFormat { hint: String },

    #[error("Invalid {format} lockfile: {message}")]
    InvalidLockfile {
        format: &'static str,
        message: String,
    },

    #[error("Invalid manifest: {message}")]
    InvalidManifest { message: String },

    #[error("Unsupported resolution: {value}")]
    UnsupportedResolution { value: String },

    #[error("Snapshot has {entries} records, limit is {limit}")]
    TooLarge { entries: usize, limit: usize },
}

impl LockError {
    /// Get the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InconsistentSnapshot { .. } => codes::LOCK_INCONSISTENT_SNAPSHOT,
            Self::MalformedPlacement { .. } => codes::LOCK_MALFORMED_PLACEMENT,
            Self::PlacementConflict { .. } => codes::LOCK_PLACEMENT_CONFLICT,
            Self::UnsupportedFormat { .. } => codes::LOCK_UNSUPPORTED_FORMAT,
            Self::InvalidLockfile { .. } => codes::LOCK_INVALID_LOCKFILE,
            Self::InvalidManifest { .. } => codes::LOCK_INVALID_MANIFEST,
            Self::UnsupportedResolution { .. } => codes::LOCK_UNSUPPORTED_RESOLUTION,
            Self::TooLarge { .. } => codes::LOCK_TOO_LARGE,
        }
    }

    #[must_use]
    pub fn inconsistent(name: &str, range: &str) -> Self {
        Self::InconsistentSnapshot {
            name: name.to_string(),
            range: range.to_string(),
        }
    }

    #[must_use]
    pub fn malformed(path: &str) -> Self {
        Self::MalformedPlacement {
            path: path.to_string(),
        }
    }

    pub fn invalid_lockfile(format: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidLockfile {
            format,
            message: message.into(),
        }
    }

    pub fn invalid_manifest(message: impl Into<String>) -> Self {
        Self::InvalidManifest {
            message: message.into(),
        }
    }

    pub fn unsupported_resolution(value: impl Into<String>) -> Self {
        Self::UnsupportedResolution {
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_offender() {
        let err = LockError::inconsistent("lodash", "^4.17.0");
        assert_eq!(
            err.to_string(),
            "Inconsistent snapshot: no record satisfies lodash@^4.17.0"
        );
        assert_eq!(err.code(), codes::LOCK_INCONSISTENT_SNAPSHOT);

        let err = LockError::malformed("node_modules/a/node_modules/b");
        assert_eq!(
            err.to_string(),
            "Malformed placement: node_modules/a/node_modules/b"
        );
    }

    #[test]
    fn test_error_codes_are_stable() {
        let all = [
            codes::LOCK_INCONSISTENT_SNAPSHOT,
            codes::LOCK_MALFORMED_PLACEMENT,
            codes::LOCK_PLACEMENT_CONFLICT,
            codes::LOCK_UNSUPPORTED_FORMAT,
            codes::LOCK_INVALID_LOCKFILE,
            codes::LOCK_INVALID_MANIFEST,
            codes::LOCK_UNSUPPORTED_RESOLUTION,
            codes::LOCK_TOO_LARGE,
        ];
        for code in all {
            assert!(code.starts_with("LOCK_"));
            assert!(code.chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }
}
