use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Stage of a parallel backend's batch lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    /// Kernel build, thread pool construction.
    Compile,
    /// Device or host buffer allocation.
    Alloc,
    /// Host to device or device to host copy.
    Transfer,
    /// Running the block codec over the batch.
    Execute,
    /// Waiting for the batch to complete.
    Sync,
}

impl fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Compile => "compile",
            Self::Alloc => "alloc",
            Self::Transfer => "transfer",
            Self::Execute => "execute",
            Self::Sync => "sync",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum LzssError {
    /// Propagated I/O error without a known path (in-memory or stdio streams).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error on a named file.
    #[error("I/O error on {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A raw or encoded payload would not fit its fixed-capacity buffer.
    #[error("block {block}: payload needs {needed} bytes but capacity is {capacity}")]
    CapacityExceeded {
        block: u32,
        needed: usize,
        capacity: usize,
    },

    /// Decoding ran out of bits in the middle of a symbol.
    #[error("block {block}: truncated stream, symbol needs {needed_bits} bits but {remaining_bits} remain")]
    TruncatedStream {
        block: u32,
        needed_bits: usize,
        remaining_bits: usize,
    },

    /// The symbol stream decodes, but not to the declared block.
    #[error("block {block}: corrupt payload: {reason}")]
    CorruptBlock { block: u32, reason: String },

    /// Declared container layout does not match what was found.
    #[error("framing error: {0}")]
    Framing(String),

    #[error("block {block}: checksum mismatch, expected {expected:016x}, got {actual:016x}")]
    ChecksumMismatch {
        block: u32,
        expected: u64,
        actual: u64,
    },

    /// The parallel backend failed at a specific stage of the batch.
    #[error("dispatch failed during {stage}: {message}")]
    Dispatch {
        stage: DispatchStage,
        message: String,
    },

    #[error("dispatch of {blocks} blocks did not complete within {timeout:?}")]
    DispatchTimeout { blocks: usize, timeout: Duration },

    #[error("config error: {0}")]
    Config(String),
}

impl LzssError {
    pub fn dispatch(stage: DispatchStage, message: impl Into<String>) -> Self {
        Self::Dispatch {
            stage,
            message: message.into(),
        }
    }

    /// Attach `path` to a bare I/O error; other variants pass through.
    pub fn with_path(self, path: impl Into<PathBuf>) -> Self {
        match self {
            Self::Io(source) => Self::File {
                path: path.into(),
                source,
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, LzssError>;
