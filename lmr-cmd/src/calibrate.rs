use std::io::{stdout, Write};

use anyhow::{Context, Result};
use lmr::calibrate::{CalibrationConfig, CalibrationManager, CalibrationResult};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
struct Report {
    config: Settings,
    results: Vec<CalibrationResult>,
}

#[derive(Debug, Serialize)]
struct Settings {
    warmup_ms: u64,
    measurement_ms: u64,
    input_len: usize,
    vector_enabled: bool,
}

pub fn calibrate(warmup_ms: u64, measurement_ms: u64, vector_enabled: bool) -> Result<()> {
    let config = CalibrationConfig::builder()
        .warmup_ms(warmup_ms)
        .measurement_ms(measurement_ms)
        .vector_enabled(vector_enabled)
        .build();
    let manager = CalibrationManager::new(config);
    info!(candidates = ?manager.candidates(), "calibrating");
    manager.calibrate().context("calibrating kernels")?;

    let config = manager.config();
    let report = Report {
        config: Settings {
            warmup_ms: config.warmup_ms,
            measurement_ms: config.measurement_ms,
            input_len: config.input_len,
            vector_enabled: config.vector_enabled,
        },
        results: manager.results(),
    };
    let mut out = stdout().lock();
    serde_json::to_writer_pretty(&mut out, &report)?;
    writeln!(out)?;
    Ok(())
}
