use anyhow::Result;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "insider_buys=info";

/// Log file that keeps only its most recent `max_lines` lines
#[derive(Debug, Clone)]
pub struct BoundedLogFile {
    path: PathBuf,
    max_lines: usize,
    lock: Arc<Mutex<()>>,
}

impl BoundedLogFile {
    pub fn new(path: impl Into<PathBuf>, max_lines: usize) -> Self {
        Self {
            path: path.into(),
            max_lines,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `bytes`, then drop the oldest lines beyond the limit
    pub fn append(&self, bytes: &[u8]) -> io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(bytes)?;
        drop(file);

        let text = fs::read_to_string(&self.path)?;
        let lines: Vec<&str> = text.lines().collect();
        if lines.len() > self.max_lines {
            let mut kept = lines[lines.len() - self.max_lines..].join("\n");
            kept.push('\n');
            fs::write(&self.path, kept)?;
        }
        Ok(())
    }
}

/// Buffers one event and hands it to the file when dropped
pub struct BoundedLogWriter {
    file: BoundedLogFile,
    buffer: Vec<u8>,
}

impl Write for BoundedLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let bytes = std::mem::take(&mut self.buffer);
        self.file.append(&bytes)
    }
}

impl Drop for BoundedLogWriter {
    fn drop(&mut self) {
        // Nowhere to report a failed log write
        let _ = self.flush();
    }
}

impl<'a> MakeWriter<'a> for BoundedLogFile {
    type Writer = BoundedLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        BoundedLogWriter {
            file: self.clone(),
            buffer: Vec::new(),
        }
    }
}

/// Install the process-wide subscriber: stderr plus the bounded log file.
/// `RUST_LOG` overrides the default filter. Later calls leave the first
/// subscriber in place.
pub fn init_logging(log_path: &Path, max_lines: usize) -> Result<()> {
    if let Some(dir) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(BoundedLogFile::new(log_path, max_lines));

    if tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .is_err()
    {
        debug!("Logging already initialized");
    }
    Ok(())
}
