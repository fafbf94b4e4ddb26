// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-image pipeline: admit, decode, fan out row bands, join, encode.
//
// Every outcome (written, decode failure, band failure, encode failure,
// interrupted wait, panicked blocking task) comes back as an `ItemReport`.
// Nothing escapes this module as an error, so one bad image can never take
// its siblings down with it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{Span, error, info, instrument, warn};

use graywerk_core::error::GraywerkError;
use graywerk_core::types::{ItemReport, ProcessingTask};

use crate::band::{BandOp, grayscale_band, process_bands_with};
use crate::codec::ImageCodec;
use crate::permit::{Interrupt, PermitPool};

/// Runs one image at a time through the grayscale pipeline. Shared by all
/// tasks of a batch.
pub struct ImageWorker {
    codec: Arc<dyn ImageCodec>,
    pool: PermitPool,
    bands: u32,
    band_op: BandOp,
}

struct Converted {
    output: PathBuf,
    dimensions: (u32, u32),
}

/// A failed stage, with the image size if decoding got that far.
type StageFailure = (GraywerkError, Option<(u32, u32)>);

impl ImageWorker {
    pub fn new(codec: Arc<dyn ImageCodec>, pool: PermitPool, bands: u32) -> Self {
        Self {
            codec,
            pool,
            bands: bands.max(1),
            band_op: grayscale_band,
        }
    }

    /// Replace the per-band operation.
    #[cfg(test)]
    fn with_band_op(mut self, band_op: BandOp) -> Self {
        self.band_op = band_op;
        self
    }

    pub fn pool(&self) -> &PermitPool {
        &self.pool
    }

    /// Process `task` once a permit is available.
    ///
    /// The permit is held from admission until the write has finished (or
    /// failed) and is released on every path. Elapsed time is measured over
    /// the same span.
    #[instrument(skip_all, fields(file = %task.file_name()))]
    pub async fn run(&self, task: ProcessingTask, interrupt: &Interrupt) -> ItemReport {
        let permit = match self.pool.acquire_interruptible(interrupt).await {
            Ok(permit) => permit,
            Err(err) => {
                warn!(error = %err, "not admitted");
                return ItemReport::failed(&task.input, None, Duration::ZERO, &err);
            }
        };

        let started = Instant::now();
        let input = task.input.clone();
        let codec = Arc::clone(&self.codec);
        let (bands, band_op) = (self.bands, self.band_op);
        let span = Span::current();

        let joined = tokio::task::spawn_blocking(move || {
            span.in_scope(|| convert(codec.as_ref(), &task, bands, band_op))
        })
        .await;
        drop(permit);
        let elapsed = started.elapsed();

        match joined {
            Ok(Ok(done)) => {
                info!(
                    output = %done.output.display(),
                    elapsed_ms = elapsed.as_millis(),
                    "completed"
                );
                ItemReport::done(&input, done.output, done.dimensions, elapsed)
            }
            Ok(Err((err, dimensions))) => {
                warn!(error = %err, elapsed_ms = elapsed.as_millis(), "image failed");
                ItemReport::failed(&input, dimensions, elapsed, &err)
            }
            Err(join_err) => {
                let err = GraywerkError::WorkerPanicked(join_err.to_string());
                error!(error = %err, "image worker died");
                ItemReport::failed(&input, None, elapsed, &err)
            }
        }
    }
}

/// Decode, grayscale, encode. Runs on a blocking thread.
fn convert(
    codec: &dyn ImageCodec,
    task: &ProcessingTask,
    bands: u32,
    band_op: BandOp,
) -> Result<Converted, StageFailure> {
    let mut image = codec.decode(&task.input).map_err(|e| (e, None))?;
    let dimensions = image.dimensions();
    info!(width = dimensions.0, height = dimensions.1, "processing");

    // A band failure suppresses the write; whatever the other bands did is
    // thrown away with the buffer.
    process_bands_with(&mut image, bands, band_op).map_err(|e| (e, Some(dimensions)))?;

    let output = task.output_path().ok_or_else(|| {
        (
            GraywerkError::Encode {
                path: task.input.clone(),
                reason: "file name has no extension".into(),
            },
            Some(dimensions),
        )
    })?;
    codec
        .encode(&image, &output)
        .map_err(|e| (e, Some(dimensions)))?;

    Ok(Converted { output, dimensions })
}
