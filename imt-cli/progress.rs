use std::sync::mpsc::Sender;

use thiserror::Error;

/// Raised by an observer to stop the batch it is watching
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ProgressError(pub String);

impl ProgressError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

pub type ProgressResult = Result<(), ProgressError>;

/// Receives completion percentages in `[0, 100]` on the compiling thread.
///
/// An `Err` aborts the compilation and is returned from it as
/// [`CompileError::Progress`](crate::CompileError::Progress).
pub trait ProgressObserver {
    fn on_progress(&mut self, percent: f64) -> ProgressResult;
}

impl<F: FnMut(f64) -> ProgressResult> ProgressObserver for F {
    fn on_progress(&mut self, percent: f64) -> ProgressResult {
        self(percent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    pub percent: f64,
}

/// Forwards to a channel; a dropped receiver fails the batch
impl ProgressObserver for Sender<ProgressEvent> {
    fn on_progress(&mut self, percent: f64) -> ProgressResult {
        self.send(ProgressEvent { percent })
            .map_err(|_| ProgressError::new("progress receiver disconnected"))
    }
}

/// Counts finished work units and reports them as a percentage
pub(crate) struct Progress<'o> {
    observer: Option<&'o mut dyn ProgressObserver>,
    done: usize,
    total: usize,
}

impl<'o> Progress<'o> {
    pub(crate) fn new(observer: Option<&'o mut dyn ProgressObserver>, total: usize) -> Self {
        Self {
            observer,
            done: 0,
            total,
        }
    }

    pub(crate) fn silent() -> Self {
        Self::new(None, 0)
    }

    pub(crate) fn start(&mut self) -> ProgressResult {
        self.report(0.0)
    }

    pub(crate) fn advance(&mut self) -> ProgressResult {
        if self.total == 0 {
            return Ok(());
        }
        self.done = (self.done + 1).min(self.total);
        let percent = if self.done == self.total {
            100.0
        } else {
            self.done as f64 * 100.0 / self.total as f64
        };
        self.report(percent)
    }

    fn report(&mut self, percent: f64) -> ProgressResult {
        match self.observer.as_mut() {
            Some(observer) => observer.on_progress(percent),
            None => Ok(()),
        }
    }
}
