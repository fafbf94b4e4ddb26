// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Graywerk batch converter.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GraywerkError;

/// Unique identifier for one batch run, attached to every log span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a batch is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Images run concurrently under the permit pool, written to a separate
    /// output directory with a suffixed name.
    #[default]
    Parallel,
    /// Images run one after another and overwrite their source file.
    Sequential,
}

/// Where a converted image is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// `<dir>/<base><suffix>.<ext>`.
    Directory { dir: PathBuf, suffix: String },
    /// Overwrite the input file.
    InPlace,
}

/// One unit of batch work: an input image and where its result goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingTask {
    pub input: PathBuf,
    pub destination: Destination,
}

impl ProcessingTask {
    pub fn new(input: impl Into<PathBuf>, destination: Destination) -> Self {
        Self {
            input: input.into(),
            destination,
        }
    }

    /// File name of the input, for log lines.
    pub fn file_name(&self) -> String {
        self.input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.input.display().to_string())
    }

    /// Path the converted image is written to.
    ///
    /// Returns `None` when the input name has no extension to place the
    /// suffix in front of.
    pub fn output_path(&self) -> Option<PathBuf> {
        match &self.destination {
            Destination::InPlace => Some(self.input.clone()),
            Destination::Directory { dir, suffix } => {
                let name = self.input.file_name()?.to_str()?;
                suffixed_file_name(name, suffix).map(|n| dir.join(n))
            }
        }
    }
}

/// Insert `suffix` before the final `.` of `file_name`.
///
/// The extension is kept exactly as given, including its case:
/// `Foto.JPG` with `_gris` becomes `Foto_gris.JPG`.
pub fn suffixed_file_name(file_name: &str, suffix: &str) -> Option<String> {
    let (base, ext) = file_name.rsplit_once('.')?;
    Some(format!("{base}{suffix}.{ext}"))
}

/// Terminal state of one image worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    /// Converted and written.
    Done,
    /// The input could not be read as an image.
    DecodeFailed,
    /// At least one row band failed; nothing was written.
    RowFailed,
    /// The converted image could not be written.
    EncodeFailed,
    /// The wait for a permit was interrupted before admission.
    Interrupted,
    /// The worker's blocking task died unexpectedly.
    Aborted,
}

impl ItemStatus {
    /// Terminal state corresponding to an item-level error.
    pub fn from_error(err: &GraywerkError) -> Self {
        match err {
            GraywerkError::Decode { .. } => Self::DecodeFailed,
            GraywerkError::RowProcessing { .. } => Self::RowFailed,
            GraywerkError::Encode { .. } | GraywerkError::Io(_) => Self::EncodeFailed,
            GraywerkError::InterruptedWait => Self::Interrupted,
            GraywerkError::WorkerPanicked(_)
            | GraywerkError::InputDirectory(_)
            | GraywerkError::Config(_)
            | GraywerkError::Serialization(_) => Self::Aborted,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Completion record emitted by an image worker to the batch driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemReport {
    pub input: PathBuf,
    /// Written file, present only when `status` is `Done`.
    pub output: Option<PathBuf>,
    /// `(width, height)` once the image has been decoded.
    pub dimensions: Option<(u32, u32)>,
    /// Wall time from admission to completion.
    pub elapsed: Duration,
    pub status: ItemStatus,
    pub error: Option<String>,
}

impl ItemReport {
    pub fn done(input: &Path, output: PathBuf, dimensions: (u32, u32), elapsed: Duration) -> Self {
        Self {
            input: input.to_path_buf(),
            output: Some(output),
            dimensions: Some(dimensions),
            elapsed,
            status: ItemStatus::Done,
            error: None,
        }
    }

    pub fn failed(
        input: &Path,
        dimensions: Option<(u32, u32)>,
        elapsed: Duration,
        err: &GraywerkError,
    ) -> Self {
        Self {
            input: input.to_path_buf(),
            output: None,
            dimensions,
            elapsed,
            status: ItemStatus::from_error(err),
            error: Some(err.to_string()),
        }
    }
}

/// Aggregated outcome of one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: BatchId,
    pub started_at: DateTime<Utc>,
    pub processed: usize,
    pub errors: usize,
    /// Wall time of the whole batch, set by [`BatchResult::finish`].
    pub total: Duration,
    /// Highest number of images that held a permit at the same time.
    pub peak_in_flight: usize,
    pub items: Vec<ItemReport>,
}

impl BatchResult {
    pub fn new(batch_id: BatchId) -> Self {
        Self {
            batch_id,
            started_at: Utc::now(),
            processed: 0,
            errors: 0,
            total: Duration::ZERO,
            peak_in_flight: 0,
            items: Vec::new(),
        }
    }

    /// Count a finished item.
    pub fn record(&mut self, report: ItemReport) {
        if report.status.is_success() {
            self.processed += 1;
        } else {
            self.errors += 1;
        }
        self.items.push(report);
    }

    pub fn finish(&mut self, total: Duration, peak_in_flight: usize) {
        self.total = total;
        self.peak_in_flight = peak_in_flight;
    }

    /// Mean time per processed image, `None` if nothing was processed.
    pub fn average(&self) -> Option<Duration> {
        u32::try_from(self.processed)
            .ok()
            .filter(|n| *n > 0)
            .map(|n| self.total / n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_goes_before_final_dot() {
        assert_eq!(suffixed_file_name("a.jpg", "_gris").as_deref(), Some("a_gris.jpg"));
        assert_eq!(
            suffixed_file_name("holiday.2024.PNG", "_gris").as_deref(),
            Some("holiday.2024_gris.PNG")
        );
        assert_eq!(suffixed_file_name("README", "_gris"), None);
    }

    #[test]
    fn output_path_for_directory_destination() {
        let task = ProcessingTask::new(
            "imagenes/Foto.JPEG",
            Destination::Directory {
                dir: "imagenes_grises".into(),
                suffix: "_gris".into(),
            },
        );
        assert_eq!(
            task.output_path(),
            Some(PathBuf::from("imagenes_grises/Foto_gris.JPEG"))
        );
        assert_eq!(task.file_name(), "Foto.JPEG");
    }

    #[test]
    fn in_place_destination_overwrites_input() {
        let task = ProcessingTask::new("imagenes/a.jpg", Destination::InPlace);
        assert_eq!(task.output_path(), Some(PathBuf::from("imagenes/a.jpg")));
    }

    #[test]
    fn status_from_error() {
        assert_eq!(
            ItemStatus::from_error(&GraywerkError::InterruptedWait),
            ItemStatus::Interrupted
        );
        let decode = GraywerkError::Decode {
            path: "x.png".into(),
            reason: "bad header".into(),
        };
        assert_eq!(ItemStatus::from_error(&decode), ItemStatus::DecodeFailed);
    }

    #[test]
    fn batch_counts_and_average() {
        let mut result = BatchResult::new(BatchId::new());
        assert_eq!(result.average(), None);

        let ok = ItemReport::done(
            Path::new("a.jpg"),
            "out/a_gris.jpg".into(),
            (100, 100),
            Duration::from_millis(5),
        );
        let bad = ItemReport::failed(
            Path::new("b.jpg"),
            None,
            Duration::from_millis(1),
            &GraywerkError::InterruptedWait,
        );
        result.record(ok.clone());
        result.record(ok);
        result.record(bad);
        result.finish(Duration::from_millis(40), 2);

        assert_eq!(result.processed, 2);
        assert_eq!(result.errors, 1);
        assert_eq!(result.average(), Some(Duration::from_millis(20)));
        assert_eq!(result.items.len(), 3);
    }
}
