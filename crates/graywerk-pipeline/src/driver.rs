// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch driver — finds the input images, launches one worker per image
// under a shared permit pool, waits for all of them, and summarises.
//
// Only pre-flight problems (bad configuration, missing input directory,
// unusable output directory) fail a run. Once tasks are launched the driver
// waits for every one of them and the summary always reflects every item.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use graywerk_core::config::BatchConfig;
use graywerk_core::error::{GraywerkError, Result};
use graywerk_core::types::{BatchId, BatchResult, Destination, ItemReport, ProcessingMode, ProcessingTask};

use crate::codec::{FileCodec, ImageCodec};
use crate::permit::{Interrupt, PermitPool};
use crate::worker::ImageWorker;

/// Runs one batch described by a [`BatchConfig`].
pub struct BatchDriver {
    config: BatchConfig,
    codec: Arc<dyn ImageCodec>,
    interrupts: HashMap<String, Interrupt>,
}

impl BatchDriver {
    /// Driver reading and writing real files.
    pub fn new(config: BatchConfig) -> Self {
        let codec = Arc::new(FileCodec::new(config.jpeg_quality));
        Self::with_codec(config, codec)
    }

    pub fn with_codec(config: BatchConfig, codec: Arc<dyn ImageCodec>) -> Self {
        Self {
            config,
            codec,
            interrupts: HashMap::new(),
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Interrupt handle for the input named `file_name`.
    ///
    /// Triggering it makes that image give up its permit wait; images that
    /// are already admitted are unaffected.
    pub fn interrupt_for(&mut self, file_name: &str) -> Interrupt {
        self.interrupts
            .entry(file_name.to_string())
            .or_default()
            .clone()
    }

    /// Run the batch to completion.
    ///
    /// Triggering `shutdown` interrupts every image still waiting for a
    /// permit; running images finish and are reported normally.
    #[instrument(skip_all, fields(batch = %batch_id))]
    async fn run_batch(&self, batch_id: BatchId, shutdown: &Interrupt) -> Result<BatchResult> {
        self.config.validate()?;
        let config = &self.config;

        if !config.input_dir.is_dir() {
            return Err(GraywerkError::InputDirectory(config.input_dir.clone()));
        }
        if config.mode == ProcessingMode::Parallel && !config.output_dir.is_dir() {
            std::fs::create_dir_all(&config.output_dir)?;
            info!(dir = %config.output_dir.display(), "created output directory");
        }

        let mut result = BatchResult::new(batch_id);
        let inputs = discover_inputs(config)?;
        if inputs.is_empty() {
            info!(dir = %config.input_dir.display(), "no images found");
            result.finish(Duration::ZERO, 0);
            return Ok(result);
        }

        let (capacity, bands) = self.admission();
        info!(
            images = inputs.len(),
            capacity,
            bands,
            mode = ?config.mode,
            "starting batch"
        );

        let pool = PermitPool::new(capacity);
        let worker = Arc::new(ImageWorker::new(
            Arc::clone(&self.codec),
            pool.clone(),
            bands,
        ));
        let tasks: Vec<(ProcessingTask, Interrupt)> = inputs
            .into_iter()
            .map(|input| {
                let task = ProcessingTask::new(input, self.destination());
                let interrupt = self
                    .interrupts
                    .get(&task.file_name())
                    .cloned()
                    .unwrap_or_default();
                (task, interrupt)
            })
            .collect();

        let started = Instant::now();
        match config.mode {
            ProcessingMode::Parallel => {
                run_parallel(&worker, tasks, shutdown, &mut result).await;
            }
            ProcessingMode::Sequential => {
                run_sequential(&worker, tasks, shutdown, &mut result).await;
            }
        }
        result.finish(started.elapsed(), pool.peak_held());

        log_summary(&result, self.output_location());
        if let Some(path) = &config.report_path {
            if let Err(err) = write_report(&result, path) {
                warn!(error = %err, path = %path.display(), "could not write batch report");
            }
        }
        Ok(result)
    }

    /// Run the batch with a fresh batch id.
    ///
    /// Consumes the driver: interrupt handles belong to exactly one batch.
    pub async fn run(self, shutdown: &Interrupt) -> Result<BatchResult> {
        self.run_batch(BatchId::new(), shutdown).await
    }

    /// Permit capacity and bands per image for the configured mode.
    /// Sequential runs use one permit and one band.
    fn admission(&self) -> (usize, u32) {
        match self.config.mode {
            ProcessingMode::Parallel => {
                (self.config.max_concurrent_images, self.config.bands_per_image)
            }
            ProcessingMode::Sequential => (1, 1),
        }
    }

    fn destination(&self) -> Destination {
        match self.config.mode {
            ProcessingMode::Parallel => Destination::Directory {
                dir: self.config.output_dir.clone(),
                suffix: self.config.output_suffix.clone(),
            },
            ProcessingMode::Sequential => Destination::InPlace,
        }
    }

    fn output_location(&self) -> &Path {
        match self.config.mode {
            ProcessingMode::Parallel => &self.config.output_dir,
            ProcessingMode::Sequential => &self.config.input_dir,
        }
    }
}

/// Launch every task at once and join them all.
async fn run_parallel(
    worker: &Arc<ImageWorker>,
    tasks: Vec<(ProcessingTask, Interrupt)>,
    shutdown: &Interrupt,
    result: &mut BatchResult,
) {
    let item_interrupts: Vec<Interrupt> = tasks.iter().map(|(_, i)| i.clone()).collect();
    let relay = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown.triggered().await;
            warn!("shutdown requested, interrupting waiting images");
            for interrupt in item_interrupts {
                interrupt.trigger();
            }
        })
    };

    let handles: Vec<_> = tasks
        .into_iter()
        .map(|(task, interrupt)| {
            let input = task.input.clone();
            let worker = Arc::clone(worker);
            let handle = tokio::spawn(async move { worker.run(task, &interrupt).await });
            (input, handle)
        })
        .collect();

    for (input, handle) in handles {
        let report = match handle.await {
            Ok(report) => report,
            Err(err) => ItemReport::failed(
                &input,
                None,
                Duration::ZERO,
                &GraywerkError::WorkerPanicked(err.to_string()),
            ),
        };
        result.record(report);
    }
    relay.abort();
}

/// Process tasks one after another in enumeration order.
async fn run_sequential(
    worker: &ImageWorker,
    tasks: Vec<(ProcessingTask, Interrupt)>,
    shutdown: &Interrupt,
    result: &mut BatchResult,
) {
    let total = tasks.len();
    for (position, (task, interrupt)) in tasks.into_iter().enumerate() {
        info!("[{}/{}] {}", position + 1, total, task.file_name());
        if shutdown.is_triggered() {
            interrupt.trigger();
        }
        result.record(worker.run(task, &interrupt).await);
    }
}

/// Regular files in the input directory whose names carry an accepted
/// extension, sorted by path.
pub fn discover_inputs(config: &BatchConfig) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(&config.input_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let accepted = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| config.accepts(name));
        if accepted {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

fn log_summary(result: &BatchResult, location: &Path) {
    info!(
        processed = result.processed,
        errors = result.errors,
        total_ms = result.total.as_millis(),
        average_ms = ?result.average().map(|d| d.as_millis()),
        peak_in_flight = result.peak_in_flight,
        output = %location.display(),
        "batch complete"
    );
}

fn write_report(result: &BatchResult, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(path, json)?;
    Ok(())
}
