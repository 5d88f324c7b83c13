use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Local;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::Result;

/// Buffered log file shared between the subscriber and the guard.
#[derive(Clone)]
struct SharedFile(Arc<Mutex<BufWriter<File>>>);

impl Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.0.lock() {
            Ok(mut file) => file.write(buf),
            Err(poisoned) => poisoned.into_inner().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.0.lock() {
            Ok(mut file) => file.flush(),
            Err(poisoned) => poisoned.into_inner().flush(),
        }
    }
}

/// Handle on the run's log file. Flushed by `close`, and on drop.
#[derive(Default)]
pub struct LogGuard {
    file: Option<SharedFile>,
    path: Option<PathBuf>,
}

impl LogGuard {
    /// A guard with no file sink (stderr-only logging, or tests).
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Build the default filter: `RUST_LOG` if set, else `railsync=<level>`.
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("railsync={level}")))
}

/// Install the global subscriber: stderr always, plus `railsync_<ts>.log`
/// in `log_dir` when given. A second call keeps the first subscriber.
pub fn init(level: &str, log_dir: Option<&Path>) -> Result<LogGuard> {
    let mut guard = LogGuard::disabled();

    let file_layer = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let path = dir.join(format!(
                "railsync_{}.log",
                Local::now().format("%Y%m%d_%H%M%S")
            ));
            let shared = SharedFile(Arc::new(Mutex::new(BufWriter::new(File::create(&path)?))));
            let writer = shared.clone();
            guard.file = Some(shared);
            guard.path = Some(path);
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(move || writer.clone()),
            )
        }
        None => None,
    };

    let _ = tracing_subscriber::registry()
        .with(build_filter(level))
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(file_layer)
        .try_init();

    Ok(guard)
}
