//! Centralized diagnostic sink
//!
//! Non-fatal errors are reported here and processing continues with a
//! best-effort fallback. Each report keeps the error code, the operation and a
//! structural dump of the cells involved, logs it through `tracing` and bumps
//! the error counter in [`crate::metrics`].

use crate::error::{Error, ErrorKind};
use crate::metrics;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use tracing::{error, warn};

/// Default number of retained reports
pub const DEFAULT_RETAINED: usize = 4096;

/// One reported error
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub operation: &'static str,
    pub message: String,
    /// Structural dumps of the involved cells
    pub cells: Vec<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SLIP error [{}] in {}: {}", self.kind.as_str(), self.operation, self.message)?;
        for cell in &self.cells {
            write!(f, "\n    {}", cell)?;
        }
        Ok(())
    }
}

/// Diagnostic sink owned by an arena
#[derive(Debug)]
pub struct Diagnostics {
    entries: VecDeque<Diagnostic>,
    retained: usize,
    total: u64,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(DEFAULT_RETAINED)
    }
}

impl Diagnostics {
    /// Create a sink keeping at most `retained` reports (oldest dropped first)
    pub fn new(retained: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            retained: retained.max(1),
            total: 0,
        }
    }

    /// Report an error with dumps of the involved cells
    pub fn report(&mut self, err: &Error, operation: &'static str, cells: Vec<String>) {
        let entry = Diagnostic {
            kind: err.kind(),
            operation,
            message: err.to_string(),
            cells,
        };

        if err.is_fatal() {
            error!(kind = entry.kind.as_str(), operation, "{}", entry);
        } else {
            warn!(kind = entry.kind.as_str(), operation, "{}", entry);
        }
        metrics::record_error(entry.kind);

        if self.entries.len() == self.retained {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        self.total += 1;
    }

    /// Retained reports, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&Diagnostic> {
        self.entries.back()
    }

    /// Number of retained reports of a kind
    pub fn count(&self, kind: ErrorKind) -> usize {
        self.entries.iter().filter(|d| d.kind == kind).count()
    }

    /// Reports ever made, including dropped ones
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take all retained reports
    pub fn drain(&mut self) -> Vec<Diagnostic> {
        self.entries.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellId;

    #[test]
    fn test_report_and_count() {
        let mut sink = Diagnostics::default();
        sink.report(&Error::DoubleRelease(CellId::new(5)), "release", vec!["cell 5".into()]);
        sink.report(&Error::StructuralCorruption("bad".into()), "allocate", vec![]);

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.count(ErrorKind::DoubleRelease), 1);
        let last = sink.last().unwrap();
        assert_eq!(last.operation, "allocate");
        assert!(last.to_string().contains("[structural_corruption]"));
    }

    #[test]
    fn test_retention_limit() {
        let mut sink = Diagnostics::new(2);
        for i in 0..5 {
            sink.report(&Error::DoubleRelease(CellId::new(i)), "release", vec![]);
        }
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.total(), 5);
        let drained = sink.drain();
        assert!(drained[1].message.contains("0x00000004"));
        assert!(sink.is_empty());
    }
}
