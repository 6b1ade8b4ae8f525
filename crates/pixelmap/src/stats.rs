//! Per-run error accounting: one thread-safe counter per class plus the
//! first message seen for it, summarised at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use tracing::{error, warn};

pub const ERROR_CLASSES: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Compression,
    Kind,
    Parse,
    EmptyChunks,
    EmptyRegions,
    LonelyChunks,
    LonelyRegions,
}

impl ErrorClass {
    pub const ALL: [ErrorClass; ERROR_CLASSES] = [
        ErrorClass::Compression,
        ErrorClass::Kind,
        ErrorClass::Parse,
        ErrorClass::EmptyChunks,
        ErrorClass::EmptyRegions,
        ErrorClass::LonelyChunks,
        ErrorClass::LonelyRegions,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ErrorClass::Compression => "compression",
            ErrorClass::Kind => "type",
            ErrorClass::Parse => "parse",
            ErrorClass::EmptyChunks => "empty chunks",
            ErrorClass::EmptyRegions => "empty regions",
            ErrorClass::LonelyChunks => "lonely chunks",
            ErrorClass::LonelyRegions => "lonely regions",
        }
    }

    fn index(self) -> usize {
        match self {
            ErrorClass::Compression => 0,
            ErrorClass::Kind => 1,
            ErrorClass::Parse => 2,
            ErrorClass::EmptyChunks => 3,
            ErrorClass::EmptyRegions => 4,
            ErrorClass::LonelyChunks => 5,
            ErrorClass::LonelyRegions => 6,
        }
    }
}

#[derive(Default)]
pub struct RunStats {
    counters: [AtomicU64; ERROR_CLASSES],
    first_message: [OnceLock<String>; ERROR_CLASSES],
    chunks_rendered: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, class: ErrorClass) {
        self.report_n(class, 1);
    }

    pub fn report_n(&self, class: ErrorClass, n: u64) {
        if n > 0 {
            self.counters[class.index()].fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn report_with(&self, class: ErrorClass, message: impl Into<String>) {
        let _ = self.first_message[class.index()].set(message.into());
        self.report(class);
    }

    pub fn count(&self, class: ErrorClass) -> u64 {
        self.counters[class.index()].load(Ordering::Relaxed)
    }

    pub fn chunk_rendered(&self) {
        self.chunks_rendered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunks_rendered(&self) -> u64 {
        self.chunks_rendered.load(Ordering::Relaxed)
    }

    /// Log non-zero counters and the first error string per class.
    pub fn summarize(&self) {
        for class in ErrorClass::ALL {
            let count = self.count(class);
            if count == 0 {
                continue;
            }
            warn!("{}: {}", class.label(), count);
            if let Some(message) = self.first_message[class.index()].get() {
                error!("{}: {}", class.label(), message);
            }
        }
    }
}

/// Snapshot returned to embedders and the CLI when a run finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub chunks_rendered: u64,
    pub errors: [u64; ERROR_CLASSES],
}

impl RunSummary {
    pub fn from_stats(stats: &RunStats) -> Self {
        let mut errors = [0u64; ERROR_CLASSES];
        for class in ErrorClass::ALL {
            errors[class.index()] = stats.count(class);
        }
        Self { chunks_rendered: stats.chunks_rendered(), errors }
    }

    pub fn count(&self, class: ErrorClass) -> u64 {
        self.errors[class.index()]
    }
}
