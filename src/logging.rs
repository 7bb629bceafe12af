//! Route `tracing` output above active progress bars.
//!
//! Log lines written straight to stderr land in the middle of a bar redraw
//! and shred the display. [`MeterWriter`] instead buffers bytes per line
//! and emits each completed line through the meter's draw target, which
//! erases the bar, prints the line, and redraws.
//!
//! ```no_run
//! use barcast::{Meter, MeterConfig};
//!
//! let meter = Meter::new(MeterConfig::default());
//! tracing_subscriber::fmt()
//!     .with_writer(meter.log_writer())
//!     .init();
//! ```

use std::io;

use tracing_subscriber::fmt::MakeWriter;

use crate::term::DrawTarget;

/// Line-buffering [`io::Write`] that prints through a [`DrawTarget`].
#[derive(Debug)]
pub struct MeterWriter {
    target: DrawTarget,
    buf: Vec<u8>,
}

impl MeterWriter {
    fn new(target: DrawTarget) -> Self {
        Self {
            target,
            buf: Vec::new(),
        }
    }

    fn emit_complete_lines(&mut self) {
        while let Some(newline) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            self.target.println(line.trim_end_matches('\n'));
        }
    }
}

impl io::Write for MeterWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        self.emit_complete_lines();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            let line = String::from_utf8_lossy(&self.buf).to_string();
            self.target.println(&line);
            self.buf.clear();
        }
        Ok(())
    }
}

impl Drop for MeterWriter {
    fn drop(&mut self) {
        let _ = io::Write::flush(self);
    }
}

/// Factory handing `tracing-subscriber` a fresh [`MeterWriter`] per event.
#[derive(Debug, Clone)]
pub struct MakeMeterWriter {
    target: DrawTarget,
}

impl MakeMeterWriter {
    /// Build a factory over the given draw target; usually obtained via
    /// [`crate::Meter::log_writer`].
    #[must_use]
    pub fn new(target: DrawTarget) -> Self {
        Self { target }
    }
}

impl<'a> MakeWriter<'a> for MakeMeterWriter {
    type Writer = MeterWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MeterWriter::new(self.target.clone())
    }
}
