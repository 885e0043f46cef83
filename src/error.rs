//! Error type for capture operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::ring::BufferState;

/// How the pipeline reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Startup cannot continue; tear down and exit non-zero.
    Initialization,
    /// One capture step failed; log and keep looping.
    RecoverableCapture,
    /// Frame geometry does not fit the surface; drop the frame.
    PresentationMismatch,
}

/// Error type for capture operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Failed to open the device node.
    #[error("failed to open {}: {source}", .path.display())]
    DeviceOpen {
        /// Device node path.
        path: PathBuf,
        /// OS error.
        #[source]
        source: io::Error,
    },
    /// The device lacks a required capability.
    #[error("{} does not support {missing}", .path.display())]
    Capability {
        /// Device node path.
        path: PathBuf,
        /// Name of the missing capability.
        missing: &'static str,
    },
    /// The driver rejected the format request.
    #[error("{} cannot set format {requested}: {reason}", .path.display())]
    FormatNegotiation {
        /// Device node path.
        path: PathBuf,
        /// Format that was asked for, as text.
        requested: String,
        /// Driver error or description of the substitution.
        reason: String,
        /// OS error when the request itself failed.
        #[source]
        source: Option<io::Error>,
    },
    /// The driver refused or short-changed the buffer request.
    #[error("unable to allocate {requested} buffers (granted {granted})")]
    BufferAllocation {
        /// Buffers asked for.
        requested: u32,
        /// Buffers granted.
        granted: u32,
        /// OS error when the request itself failed.
        #[source]
        source: Option<io::Error>,
    },
    /// Querying a buffer's placement failed.
    #[error("unable to query buffer {index}: {source}")]
    BufferQuery {
        /// Buffer index.
        index: u32,
        /// OS error.
        #[source]
        source: io::Error,
    },
    /// Mapping a buffer failed.
    #[error("unable to map buffer {index}: {source}")]
    BufferMap {
        /// Buffer index.
        index: u32,
        /// OS error.
        #[source]
        source: io::Error,
    },
    /// Initial queueing of a buffer failed.
    #[error("unable to queue buffer {index}: {source}")]
    BufferQueue {
        /// Buffer index.
        index: u32,
        /// OS error.
        #[source]
        source: io::Error,
    },
    /// STREAMON failed.
    #[error("unable to start capture: {source}")]
    StreamStart {
        /// OS error.
        #[source]
        source: io::Error,
    },
    /// DQBUF failed.
    #[error("failed to dequeue buffer: {source}")]
    Dequeue {
        /// OS error.
        #[source]
        source: io::Error,
    },
    /// Returning a buffer to the driver failed.
    #[error("failed to requeue buffer {index}: {source}")]
    Requeue {
        /// Buffer index.
        index: u32,
        /// OS error.
        #[source]
        source: io::Error,
    },
    /// A buffer was not in the state an operation needs.
    #[error("buffer {index} is {actual:?}, expected {expected:?}")]
    InvalidBufferState {
        /// Buffer index.
        index: u32,
        /// State found, `None` when the index is outside the ring.
        actual: Option<BufferState>,
        /// State required.
        expected: BufferState,
    },
    /// The filled buffer holds fewer bytes than one frame.
    #[error("buffer {index} holds {actual} bytes, frame needs {expected}")]
    FrameLength {
        /// Buffer index.
        index: u32,
        /// Bytes required for a full frame.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },
    /// Surface rows do not match the frame rows.
    #[error("mismatch between texture size and buffer size: pitch {actual}, expected {expected}")]
    StrideMismatch {
        /// Row bytes of the frame.
        expected: usize,
        /// Pitch of the surface.
        actual: usize,
    },
    /// The presenter failed.
    #[error("presenter: {0}")]
    Presenter(String),
    /// The session was used after `close`.
    #[error("device is not open")]
    DeviceClosed,
}

impl CaptureError {
    /// Classify the error for the propagation policy.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Dequeue { .. } | Self::Requeue { .. } | Self::InvalidBufferState { .. } => {
                ErrorClass::RecoverableCapture
            }
            Self::FrameLength { .. } | Self::StrideMismatch { .. } => {
                ErrorClass::PresentationMismatch
            }
            _ => ErrorClass::Initialization,
        }
    }

    /// OS-level error code behind this error, when there is one.
    #[must_use]
    pub fn os_code(&self) -> Option<i32> {
        let source = match self {
            Self::DeviceOpen { source, .. }
            | Self::BufferQuery { source, .. }
            | Self::BufferMap { source, .. }
            | Self::BufferQueue { source, .. }
            | Self::StreamStart { source }
            | Self::Dequeue { source }
            | Self::Requeue { source, .. } => Some(source),
            Self::FormatNegotiation { source, .. } | Self::BufferAllocation { source, .. } => {
                source.as_ref()
            }
            _ => None,
        };
        source.and_then(io::Error::raw_os_error)
    }
}

/// Result type for capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;
