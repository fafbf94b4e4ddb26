// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GraywerkError, Result};
use crate::types::ProcessingMode;

/// Extensions accepted when running in sequential (in-place) mode.
const SEQUENTIAL_EXTENSIONS: [&str; 2] = ["jpg", "jpeg"];

/// Settings for one batch run.
///
/// Every field has a default, so a JSON file only needs to name the values it
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Directory scanned for input images. Must exist.
    pub input_dir: PathBuf,
    /// Directory receiving converted images in parallel mode (created if absent).
    pub output_dir: PathBuf,
    /// Upper bound on images processed at the same time.
    pub max_concurrent_images: usize,
    /// Number of row bands each admitted image is split into.
    pub bands_per_image: u32,
    /// Accepted file extensions, matched case-insensitively, without the dot.
    pub extensions: Vec<String>,
    /// Inserted between the base name and the extension of each output file.
    pub output_suffix: String,
    /// Parallel (separate output directory) or sequential (overwrite in place).
    pub mode: ProcessingMode,
    /// Quality used when writing JPEG output (1-100).
    pub jpeg_quality: u8,
    /// Optional path for a JSON copy of the batch result.
    pub report_path: Option<PathBuf>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("imagenes"),
            output_dir: PathBuf::from("imagenes_grises"),
            max_concurrent_images: 10,
            bands_per_image: 4,
            extensions: vec!["png".into(), "jpg".into(), "jpeg".into()],
            output_suffix: "_gris".into(),
            mode: ProcessingMode::Parallel,
            jpeg_quality: 75,
            report_path: None,
        }
    }
}

impl BatchConfig {
    /// Preset for the sequential variant: one image at a time, one band,
    /// JPEG input only, results written over the source files.
    pub fn sequential() -> Self {
        Self {
            max_concurrent_images: 1,
            bands_per_image: 1,
            extensions: SEQUENTIAL_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            mode: ProcessingMode::Sequential,
            ..Self::default()
        }
    }

    /// Load a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&data)?;
        Ok(config)
    }

    /// Reject settings that cannot drive a batch.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_images == 0 {
            return Err(GraywerkError::Config(
                "max_concurrent_images must be at least 1".into(),
            ));
        }
        if self.bands_per_image == 0 {
            return Err(GraywerkError::Config(
                "bands_per_image must be at least 1".into(),
            ));
        }
        if self.effective_extensions().is_empty() {
            return Err(GraywerkError::Config("no accepted extensions".into()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(GraywerkError::Config(format!(
                "jpeg_quality {} outside 1-100",
                self.jpeg_quality
            )));
        }
        Ok(())
    }

    /// Extensions actually accepted for the configured mode, lowercased.
    ///
    /// Sequential mode only ever touches JPEG files.
    pub fn effective_extensions(&self) -> Vec<String> {
        let configured = self
            .extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase());
        match self.mode {
            ProcessingMode::Parallel => configured.collect(),
            ProcessingMode::Sequential => configured
                .filter(|e| SEQUENTIAL_EXTENSIONS.contains(&e.as_str()))
                .collect(),
        }
    }

    /// Whether `file_name` ends in one of the accepted extensions.
    pub fn accepts(&self, file_name: &str) -> bool {
        let lower = file_name.to_ascii_lowercase();
        self.effective_extensions()
            .iter()
            .any(|ext| lower.ends_with(&format!(".{ext}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = BatchConfig::default();
        assert_eq!(config.input_dir, PathBuf::from("imagenes"));
        assert_eq!(config.output_dir, PathBuf::from("imagenes_grises"));
        assert_eq!(config.max_concurrent_images, 10);
        assert_eq!(config.bands_per_image, 4);
        assert_eq!(config.mode, ProcessingMode::Parallel);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graywerk.json");
        std::fs::write(&path, r#"{ "max_concurrent_images": 2, "mode": "sequential" }"#)
            .unwrap();

        let config = BatchConfig::load(&path).unwrap();
        assert_eq!(config.max_concurrent_images, 2);
        assert_eq!(config.mode, ProcessingMode::Sequential);
        assert_eq!(config.bands_per_image, 4);
        assert_eq!(config.output_suffix, "_gris");
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = BatchConfig {
            max_concurrent_images: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(GraywerkError::Config(_))));
    }

    #[test]
    fn zero_bands_is_rejected() {
        let config = BatchConfig {
            bands_per_image: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(GraywerkError::Config(_))));
    }

    #[test]
    fn extension_match_ignores_case() {
        let config = BatchConfig::default();
        assert!(config.accepts("Photo.JPG"));
        assert!(config.accepts("scan.Jpeg"));
        assert!(config.accepts("icon.png"));
        assert!(!config.accepts("notes.txt"));
        assert!(!config.accepts("png"));
    }

    #[test]
    fn sequential_mode_accepts_jpeg_only() {
        let config = BatchConfig {
            mode: ProcessingMode::Sequential,
            ..Default::default()
        };
        assert!(config.accepts("a.jpg"));
        assert!(config.accepts("b.JPEG"));
        assert!(!config.accepts("c.png"));
        assert_eq!(BatchConfig::sequential().effective_extensions(), vec!["jpg", "jpeg"]);
    }
}
