// SLIP - Rust Implementation
// A doubly-linked list engine with reference-counted sublists

#![warn(rust_2018_idioms)]

pub mod arena;
pub mod cell;
pub mod diagnostics;
pub mod list;
pub mod metrics;

// Re-exports for convenience
pub use arena::{Arena, ArenaConfig, ArenaStats};
pub use cell::{CellId, CellKind, CellState, Datum};
pub use diagnostics::{Diagnostic, Diagnostics};
pub use error::{Error, ErrorKind, Result};
pub use list::{Cursor, SplitSide, Value};

/// SLIP error types
pub mod error {
    use crate::cell::CellId;
    use serde::Serialize;
    use thiserror::Error;

    #[derive(Error, Debug, Clone, PartialEq)]
    pub enum Error {
        #[error("Invalid operation on temporary cell {0}")]
        InvalidOperationOnTemporary(CellId),

        #[error("Double release of cell {0}")]
        DoubleRelease(CellId),

        #[error("Structural corruption: {0}")]
        StructuralCorruption(String),

        #[error("Incompatible replace target: {0}")]
        IncompatibleReplaceTarget(String),

        #[error("Invalid linkage: {0}")]
        InvalidLinkage(String),

        #[error("Allocator exhausted: {0}")]
        AllocatorExhausted(String),

        #[error("Configuration error: {0}")]
        Configuration(String),

        #[error("Arena not initialized (call init after reset)")]
        NotInitialized,
    }

    /// Error code without payload, used by the diagnostic sink and metrics
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub enum ErrorKind {
        InvalidOperationOnTemporary,
        DoubleRelease,
        StructuralCorruption,
        IncompatibleReplaceTarget,
        InvalidLinkage,
        AllocatorExhausted,
        Configuration,
        NotInitialized,
    }

    impl Error {
        pub fn kind(&self) -> ErrorKind {
            match self {
                Error::InvalidOperationOnTemporary(_) => ErrorKind::InvalidOperationOnTemporary,
                Error::DoubleRelease(_) => ErrorKind::DoubleRelease,
                Error::StructuralCorruption(_) => ErrorKind::StructuralCorruption,
                Error::IncompatibleReplaceTarget(_) => ErrorKind::IncompatibleReplaceTarget,
                Error::InvalidLinkage(_) => ErrorKind::InvalidLinkage,
                Error::AllocatorExhausted(_) => ErrorKind::AllocatorExhausted,
                Error::Configuration(_) => ErrorKind::Configuration,
                Error::NotInitialized => ErrorKind::NotInitialized,
            }
        }

        /// Fatal errors leave the engine without backing storage
        pub fn is_fatal(&self) -> bool {
            matches!(
                self,
                Error::AllocatorExhausted(_) | Error::Configuration(_) | Error::NotInitialized
            )
        }
    }

    impl ErrorKind {
        pub fn as_str(&self) -> &'static str {
            match self {
                ErrorKind::InvalidOperationOnTemporary => "invalid_operation_on_temporary",
                ErrorKind::DoubleRelease => "double_release",
                ErrorKind::StructuralCorruption => "structural_corruption",
                ErrorKind::IncompatibleReplaceTarget => "incompatible_replace_target",
                ErrorKind::InvalidLinkage => "invalid_linkage",
                ErrorKind::AllocatorExhausted => "allocator_exhausted",
                ErrorKind::Configuration => "configuration",
                ErrorKind::NotInitialized => "not_initialized",
            }
        }
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
