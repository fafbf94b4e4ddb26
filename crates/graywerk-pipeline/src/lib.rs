// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// graywerk-pipeline — Two-level parallel grayscale conversion.
//
// Images are admitted through a fixed-capacity permit pool; each admitted
// image is split into row bands that are converted on their own threads and
// joined before the result is written.

pub mod band;
pub mod codec;
pub mod driver;
pub mod permit;
pub mod worker;

// Re-export the primary structs so callers can use `graywerk_pipeline::BatchDriver` etc.
pub use band::{BandOp, RowBand, grayscale_band, partition_rows, process_bands, process_bands_with};
pub use codec::{FileCodec, ImageCodec};
pub use driver::BatchDriver;
pub use permit::{Interrupt, Permit, PermitPool};
pub use worker::ImageWorker;
