use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use shared::types::server_config::LoggingConfig;

/// Append-only log file that is moved aside once it grows past `max_bytes`.
///
/// Rotated files are named `<file>.<YYYYmmdd-HHMMSS.mmm>`.
pub struct RotatingFileWriter {
    path: PathBuf,
    max_bytes: u64,
    file: File,
    written: u64,
}

impl RotatingFileWriter {
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = open_append(&path)?;
        let written = file.metadata()?.len();

        Ok(Self {
            path,
            max_bytes,
            file,
            written,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        let mut rotated = rotated_name(&self.path);
        // Two rotations within the same millisecond must not clobber each other.
        let mut n = 1;
        while rotated.exists() {
            rotated = PathBuf::from(format!("{}.{}", rotated_name(&self.path).display(), n));
            n += 1;
        }

        fs::rename(&self.path, &rotated)?;
        self.file = open_append(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            if let Err(e) = self.rotate() {
                // Keep logging into the current file rather than losing lines.
                eprintln!("log rotation failed for {}: {}", self.path.display(), e);
            }
        }

        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn rotated_name(path: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d-%H%M%S%.3f");
    PathBuf::from(format!("{}.{}", path.display(), stamp))
}

/// Install the global subscriber: env filter, human-readable stdout and
/// JSON lines into the rotating file. Keep the guard alive for the life of
/// the process or buffered lines are lost.
pub fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
    let writer = RotatingFileWriter::open(&config.file, config.max_file_bytes)
        .with_context(|| format!("Failed to open log file {}", config.file.display()))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(writer);

    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    let file_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_writer(non_blocking)
        .with_ansi(false);
    let stdout_layer = fmt::layer().with_target(true).with_ansi(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
