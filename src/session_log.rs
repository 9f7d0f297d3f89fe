//! Per-subject/session log capture.
//!
//! A [`SessionLog`] installs a thread-scoped tracing subscriber that records
//! every event at INFO and above into an in-memory buffer (and mirrors it to
//! stderr). Dropping or finishing the log restores the previous subscriber,
//! so nothing captured for one session can leak into the next.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::subscriber::DefaultGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;

/// File name for one session's captured log.
pub fn log_file_name(subject: &str, session: &str) -> String {
    format!("sub-{subject}_ses-{session}_log.txt")
}

#[derive(Clone, Default)]
struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // A poisoned buffer still holds everything written before the panic.
        let mut guard = match self.0.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CaptureBuffer {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter(Arc::clone(&self.0))
    }
}

impl CaptureBuffer {
    fn contents(&self) -> String {
        let guard = match self.0.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        String::from_utf8_lossy(&guard).into_owned()
    }
}

pub struct SessionLog {
    subject: String,
    session: String,
    path: PathBuf,
    buffer: CaptureBuffer,
    guard: Option<DefaultGuard>,
    written: bool,
}

impl SessionLog {
    /// Start capturing on the current thread. The log file goes to `log_dir`.
    pub fn begin(log_dir: &Path, subject: &str, session: &str, mirror_stderr: bool) -> Self {
        let buffer = CaptureBuffer::default();
        let capture = tracing_subscriber::fmt::layer()
            .with_writer(buffer.clone())
            .with_ansi(false)
            .with_target(false)
            .with_filter(LevelFilter::INFO);
        let mirror = mirror_stderr.then(|| {
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_filter(crate::telemetry::stderr_filter(crate::telemetry::debug_enabled()))
        });
        let subscriber = tracing_subscriber::registry().with(capture).with(mirror);
        let guard = tracing::subscriber::set_default(subscriber);

        Self {
            subject: subject.to_string(),
            session: session.to_string(),
            path: log_dir.join(log_file_name(subject, session)),
            buffer,
            guard: Some(guard),
            written: false,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    /// `sub/ses` string used as context in messages.
    pub fn unit(&self) -> String {
        format!("{}/{}", self.subject, self.session)
    }

    /// Detach the sink and write the captured text to the log file.
    pub fn finish(mut self) -> io::Result<PathBuf> {
        self.guard.take();
        self.written = true;
        self.write_out()?;
        Ok(self.path.clone())
    }

    fn write_out(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            crate::util::fs::ensure_dir(parent)?;
        }
        std::fs::write(&self.path, self.buffer.contents())
    }
}

impl Drop for SessionLog {
    fn drop(&mut self) {
        self.guard.take();
        if !self.written {
            // Unwinding out of a session: keep whatever was captured.
            let _ = self.write_out();
        }
    }
}
