//! # Logging Process
//!
//! Log output is itself message passing: any process calls
//! [`ProcessCore::log`](crate::process::ProcessCore::log), which batches a
//! [`LogRequestMessage`] toward the reserved logging process like any other
//! outbound message. The logging process formats each request into a single
//! line and hands it to a [`LogSink`]. Because the sink runs on exactly one
//! process, no file lock or interleaving guard is needed anywhere else.
//!
//! This channel is deliberately separate from the `tracing` output the runtime
//! itself emits: `tracing` covers runtime diagnostics, while the logging
//! process carries application log lines that must survive even a hard
//! shutdown (hard-shutdown flushes still deliver frames bound for it).
//!
//! Line format:
//!
//! ```text
//! [ 08-26-26 14:03:59.102 ]( 5: 3, 1, 1, 1 ) : sample text
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Local};
use tracing::warn;

use crate::handler::HandlerRegistry;
use crate::id::ProcessId;
use crate::messages::LogRequestMessage;
use crate::process::{ManagedProcess, ProcessBody, ProcessCore, ProcessLogic, VirtualProcess};
use crate::properties::{ProcessProperties, LOGGING_PROCESS_PROPERTIES};

/// Destination for formatted log lines.
pub trait LogSink: Send + 'static {
    fn write_line(&mut self, line: &str) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sink that appends lines to a buffered file.
pub struct FileLogSink {
    writer: BufWriter<File>,
}

impl FileLogSink {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl LogSink for FileLogSink {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.writer, "{line}")
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Sink that writes lines to standard output.
pub struct StdoutLogSink;

impl LogSink for StdoutLogSink {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        println!("{line}");
        Ok(())
    }
}

/// Sink that collects lines in memory; the handle stays readable after the
/// logging process takes ownership of the sink.
#[derive(Clone, Default)]
pub struct MemoryLogSink {
    lines: std::sync::Arc<parking_lot::Mutex<Vec<String>>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl LogSink for MemoryLogSink {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.lines.lock().push(line.to_owned());
        Ok(())
    }
}

/// Formats one log line in the fixed runtime format.
pub fn format_log_line(
    timestamp: DateTime<Local>,
    source: ProcessId,
    properties: ProcessProperties,
    text: &str,
) -> String {
    format!(
        "[ {} ]( {}: {}, {}, {}, {} ) : {}",
        timestamp.format("%m-%d-%y %H:%M:%S%.3f"),
        source.0,
        properties.subject(),
        properties.major_part(),
        properties.minor_part(),
        properties.mode_part(),
        text
    )
}

struct LoggingLogic<S> {
    sink: S,
}

impl<S: LogSink> LoggingLogic<S> {
    fn write(&mut self, source: ProcessId, request: &LogRequestMessage) {
        let line = format_log_line(
            request.wall_time,
            source,
            request.source_properties,
            &request.text,
        );
        if let Err(error) = self.sink.write_line(&line) {
            warn!(%error, "log sink write failed");
        }
    }
}

impl<S: LogSink> ProcessLogic for LoggingLogic<S> {
    fn register_handlers(&mut self, registry: &mut HandlerRegistry<ProcessBody<Self>>) {
        registry.register::<LogRequestMessage, _>(|body, source, message| {
            body.logic.write(source, &message);
        });
    }

    fn on_run(&mut self, _: &mut ProcessCore) {
        if let Err(error) = self.sink.flush() {
            warn!(%error, "log sink flush failed");
        }
    }

    fn on_shutdown(&mut self, _: &mut ProcessCore) {
        if let Err(error) = self.sink.flush() {
            warn!(%error, "log sink flush failed");
        }
    }
}

/// Builds the reserved logging process around the given sink.
pub fn logging_process<S: LogSink>(sink: S) -> Box<dyn ManagedProcess> {
    VirtualProcess::boxed(LOGGING_PROCESS_PROPERTIES, LoggingLogic { sink })
}
