//! Running totals for a batch, shared by every in-flight item.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Successful prompt extractions and prompt-parse errors out of `total`.
///
/// Both counters only ever go up. `done` counts extractions rather than
/// items, so an item that is retried after a later failure counts again.
#[derive(Debug)]
pub struct Progress {
    total: usize,
    done: AtomicUsize,
    errors: AtomicUsize,
}

impl Progress {
    /// Fresh counters for a batch of `total` items.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            done: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        }
    }

    /// Count a successful extraction, returning the new total.
    pub fn record_done(&self) -> usize {
        self.done.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Count a parse error, returning the new total.
    pub fn record_error(&self) -> usize {
        self.errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Number of items in the batch
    pub fn total(&self) -> usize {
        self.total
    }

    /// Successful extractions so far
    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }

    /// Parse errors so far
    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    /// `Done runs n/total.`
    pub fn done_line(&self) -> DoneLine<'_> {
        DoneLine(self)
    }

    /// `Errors n/total.`
    pub fn error_line(&self) -> ErrorLine<'_> {
        ErrorLine(self)
    }
}

/// Display adaptor for the success counter.
pub struct DoneLine<'a>(&'a Progress);

impl fmt::Display for DoneLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Done runs {}/{}.", self.0.done(), self.0.total())
    }
}

/// Display adaptor for the error counter.
pub struct ErrorLine<'a>(&'a Progress);

impl fmt::Display for ErrorLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Errors {}/{}.", self.0.errors(), self.0.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_independent() {
        let progress = Progress::new(3);
        assert_eq!(progress.record_done(), 1);
        assert_eq!(progress.record_done(), 2);
        assert_eq!(progress.record_error(), 1);
        assert_eq!(progress.done(), 2);
        assert_eq!(progress.errors(), 1);
        assert_eq!(progress.done_line().to_string(), "Done runs 2/3.");
        assert_eq!(progress.error_line().to_string(), "Errors 1/3.");
        assert_eq!(progress.total(), 3);
    }
}
