// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use std::env;
use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Set up file logging when `ALMACEN_LOG` is present (EnvFilter syntax,
/// e.g. `almacen=debug`). The TUI owns the terminal, so logs never go to
/// stdout/stderr; silence is the default.
pub fn init_from_env() -> Result<Option<PathBuf>> {
    let Some(filter) = env::var_os("ALMACEN_LOG") else {
        return Ok(None);
    };
    let filter = EnvFilter::new(filter.to_string_lossy());

    let path = almacen_store::default_store_path()?.with_file_name("almacen.log");
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let file = File::create(&path)
        .with_context(|| format!("create log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();

    Ok(Some(path))
}
