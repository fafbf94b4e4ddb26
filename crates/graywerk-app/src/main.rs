// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Graywerk — batch grayscale converter
//
// Entry point. Initialises logging, loads the batch configuration, wires
// Ctrl-C to a cooperative shutdown, and runs one batch. Every failure is
// logged and the process simply stops.

use std::path::PathBuf;

use graywerk_core::BatchConfig;
use graywerk_pipeline::{BatchDriver, Interrupt};

/// Environment variable naming a JSON config file.
const CONFIG_ENV: &str = "GRAYWERK_CONFIG";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Graywerk starting");

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "could not load configuration");
            return;
        }
    };

    let shutdown = Interrupt::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, finishing admitted images");
                shutdown.trigger();
            }
        });
    }

    let driver = BatchDriver::new(config);
    if let Err(e) = driver.run(&shutdown).await {
        if e.is_fatal() {
            tracing::error!(error = %e, "batch not started");
        } else {
            tracing::error!(error = %e, "batch aborted");
        }
    }
}

/// Config file from the first argument or `GRAYWERK_CONFIG`, defaults
/// otherwise.
fn load_config() -> graywerk_core::error::Result<BatchConfig> {
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

    match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading configuration");
            BatchConfig::load(&path)
        }
        None => Ok(BatchConfig::default()),
    }
}
