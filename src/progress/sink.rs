//! Destinations for rendered status lines.

use std::io::Write;

/// Receives rendered progress.
///
/// `line` may carry terminal styling; `plain` is the same text with styling
/// removed, suitable for a label in a host UI.
pub trait StatusSink: Send + Sync {
    /// Called with each throttled render of the progress line.
    fn render(&self, line: &str, plain: &str);

    /// Called with free-form status messages such as "Done".
    fn message(&self, text: &str) {
        self.render(text, text);
    }
}

/// A sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStatus;

impl StatusSink for NoStatus {
    fn render(&self, _line: &str, _plain: &str) {}
}

/// Forwards the plain-text status to a caller-supplied callback.
pub struct CallbackStatus<F> {
    callback: F,
}

impl<F> CallbackStatus<F>
where
    F: Fn(&str) + Send + Sync,
{
    pub const fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> StatusSink for CallbackStatus<F>
where
    F: Fn(&str) + Send + Sync,
{
    fn render(&self, _line: &str, plain: &str) {
        (self.callback)(plain);
    }
}

/// Rewrites a single line on stderr.
#[derive(Debug, Default)]
pub struct TerminalStatus;

impl StatusSink for TerminalStatus {
    fn render(&self, line: &str, _plain: &str) {
        let mut err = std::io::stderr().lock();
        if let Err(e) = write!(err, "\r{line}     ").and_then(|()| err.flush()) {
            log::debug!("status write failed: {e}");
        }
    }

    fn message(&self, text: &str) {
        let term = console::Term::stderr();
        if let Err(e) = term.clear_line().and_then(|()| term.write_line(text)) {
            log::debug!("status write failed: {e}");
        }
    }
}
