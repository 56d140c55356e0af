//! Captures structured log output for assertions.
//!
//! Events are formatted as JSON lines by `tracing_subscriber` and kept in
//! memory. The subscriber is installed per thread, so a `#[tokio::test]` on
//! the default current-thread runtime sees only its own events.

use std::io;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::Level;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

/// In-memory sink for JSON-formatted tracing events.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Creates an empty capture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes events on the current thread into this capture until the
    /// guard is dropped.
    #[must_use = "events are only captured while the guard is alive"]
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_max_level(Level::DEBUG)
            .with_writer(self.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    /// Returns every captured event, oldest first.
    pub fn events(&self) -> Vec<Value> {
        let buffer = self.buffer.lock().expect("lock");
        String::from_utf8_lossy(&buffer)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).expect("log line is JSON"))
            .collect()
    }

    /// Returns error-level events whose message equals `message`.
    pub fn errors_with_message(&self, message: &str) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter(|event| event["level"] == "ERROR" && event["fields"]["message"] == message)
            .collect()
    }
}

/// Writer handed out per event.
#[derive(Debug)]
pub struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().expect("lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

/// Returns a string field of a captured event.
pub fn event_field<'e>(event: &'e Value, name: &str) -> Option<&'e str> {
    event["fields"][name].as_str()
}
