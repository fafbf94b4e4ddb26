// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Graywerk.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for all Graywerk operations.
///
/// Only the configuration variants abort a batch. Everything raised while
/// handling a single image is caught at that image's task boundary and
/// turned into an [`ItemReport`](crate::types::ItemReport).
#[derive(Debug, Error)]
pub enum GraywerkError {
    // -- Configuration (fatal, checked before any task starts) --
    #[error("input directory {} does not exist or is not a directory", .0.display())]
    InputDirectory(PathBuf),

    #[error("invalid configuration: {0}")]
    Config(String),

    // -- Per-item failures --
    #[error("failed to decode {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("row band {band} [{start}, {end}) failed: {reason}")]
    RowProcessing {
        band: usize,
        start: u32,
        end: u32,
        reason: String,
    },

    #[error("failed to encode {}: {reason}", .path.display())]
    Encode { path: PathBuf, reason: String },

    #[error("interrupted while waiting for a permit")]
    InterruptedWait,

    #[error("image worker panicked: {0}")]
    WorkerPanicked(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GraywerkError {
    /// Whether this error aborts the whole run rather than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InputDirectory(_) | Self::Config(_))
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GraywerkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configuration_errors_are_fatal() {
        assert!(GraywerkError::InputDirectory("imagenes".into()).is_fatal());
        assert!(GraywerkError::Config("zero bands".into()).is_fatal());
        assert!(!GraywerkError::InterruptedWait.is_fatal());
        assert!(
            !GraywerkError::Decode {
                path: "a.jpg".into(),
                reason: "truncated".into()
            }
            .is_fatal()
        );
    }

    #[test]
    fn messages_name_the_file() {
        let err = GraywerkError::Encode {
            path: "out/a_gris.jpg".into(),
            reason: "disk full".into(),
        };
        assert_eq!(err.to_string(), "failed to encode out/a_gris.jpg: disk full");
    }
}
