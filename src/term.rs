//! Stderr draw target shared by the meter and the logging writer.
//!
//! The target remembers the last bar line it drew so that a diagnostic line
//! can be printed above the bar: erase, print, redraw. ANSI control
//! sequences are only emitted when stderr is a terminal; piped output gets
//! plain lines and no bar frames.

use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Cloneable handle to the meter's output stream.
#[derive(Debug, Clone)]
pub struct DrawTarget {
    inner: Arc<Mutex<DrawState>>,
}

#[derive(Debug)]
struct DrawState {
    output: Output,
    /// Last bar line drawn, with its vertical offset.
    current: Option<(usize, String)>,
}

#[derive(Debug)]
enum Output {
    Stderr { ansi: bool },
    Hidden,
    #[cfg(test)]
    Capture(Vec<String>),
}

impl DrawTarget {
    /// Draw to stderr; bar frames are emitted only on a terminal.
    #[must_use]
    pub fn stderr() -> Self {
        Self::with_output(Output::Stderr {
            ansi: io::stderr().is_terminal(),
        })
    }

    /// A target that draws nothing at all.
    #[must_use]
    pub fn hidden() -> Self {
        Self::with_output(Output::Hidden)
    }

    #[cfg(test)]
    pub(crate) fn capture() -> Self {
        Self::with_output(Output::Capture(Vec::new()))
    }

    fn with_output(output: Output) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DrawState {
                output,
                current: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DrawState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Draw `line` as the bar row `position` rows below the cursor.
    pub fn draw(&self, position: usize, line: &str) {
        let mut state = self.lock();
        state.current = Some((position, line.to_string()));
        if let Output::Stderr { ansi: true } = state.output {
            let mut err = io::stderr().lock();
            draw_line(&mut err, position, line);
            let _ = err.flush();
        }
    }

    /// Erase the bar row at `position`.
    pub fn clear(&self, position: usize) {
        let mut state = self.lock();
        state.current = None;
        if let Output::Stderr { ansi: true } = state.output {
            let mut err = io::stderr().lock();
            draw_line(&mut err, position, "");
            let _ = err.flush();
        }
    }

    /// Finish a bar that stays visible: move past it so the next shell
    /// prompt does not overwrite the final state.
    pub fn leave(&self) {
        let mut state = self.lock();
        let had_line = state.current.take().is_some();
        if had_line {
            if let Output::Stderr { ansi: true } = state.output {
                let mut err = io::stderr().lock();
                let _ = writeln!(err);
                let _ = err.flush();
            }
        }
    }

    /// Print `msg` on its own line above the bar, then restore the bar.
    pub fn println(&self, msg: &str) {
        let mut state = self.lock();
        let state = &mut *state;
        match &mut state.output {
            Output::Stderr { ansi } => {
                let ansi = *ansi;
                let mut err = io::stderr().lock();
                if ansi {
                    let _ = write!(err, "\r\x1b[K");
                }
                let _ = writeln!(err, "{msg}");
                if ansi {
                    if let Some((position, line)) = &state.current {
                        draw_line(&mut err, *position, line);
                    }
                }
                let _ = err.flush();
            }
            Output::Hidden => {}
            #[cfg(test)]
            Output::Capture(lines) => lines.push(msg.to_string()),
        }
    }

    #[cfg(test)]
    pub(crate) fn printed(&self) -> Vec<String> {
        match &self.lock().output {
            Output::Capture(lines) => lines.clone(),
            Output::Stderr { .. } | Output::Hidden => Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn current_line(&self) -> Option<(usize, String)> {
        self.lock().current.clone()
    }
}

fn draw_line(out: &mut impl Write, position: usize, line: &str) {
    let _ = if position == 0 {
        write!(out, "\r{line}\x1b[K")
    } else {
        // hop down to the stacked bar's row and back
        write!(out, "\x1b[{position}B\r{line}\x1b[K\x1b[{position}A\r")
    };
}
