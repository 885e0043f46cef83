//! The steady-state capture loop.
//!
//! One iteration per displayed frame, all on the calling thread: poll input,
//! dequeue a filled buffer, copy it to the presenter, requeue the buffer.

use tracing::{debug, info, trace, warn};

use crate::error::{CaptureError, ErrorClass, Result};
use crate::ring::{BufferDescriptor, BufferRing};
use crate::session::Session;
use crate::traits::{InputSource, Presenter, VideoDevice};

/// How the process should exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The user quit after a successful start.
    Clean,
    /// Startup failed before the loop ran.
    InitFailed,
}

impl Exit {
    /// Process exit code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Clean => 0,
            Self::InitFailed => 1,
        }
    }
}

impl From<Exit> for std::process::ExitCode {
    fn from(exit: Exit) -> Self {
        Self::from(exit.code())
    }
}

/// Counters collected while the loop ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Frames copied and presented.
    pub presented: u64,
    /// Frames dequeued but not presented.
    pub dropped: u64,
    /// Failed dequeue attempts.
    pub dequeue_errors: u64,
    /// Failed requeue attempts, including retries of stranded buffers.
    pub requeue_errors: u64,
    /// Exit status.
    pub exit: Exit,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self {
            presented: 0,
            dropped: 0,
            dequeue_errors: 0,
            requeue_errors: 0,
            exit: Exit::Clean,
        }
    }
}

/// Run until an input event asks to stop.
pub fn run<D, P, I>(
    session: &mut Session<D>,
    ring: &mut BufferRing<D::Region>,
    presenter: &mut P,
    input: &mut I,
) -> RunSummary
where
    D: VideoDevice,
    P: Presenter,
    I: InputSource,
{
    let mut summary = RunSummary::default();
    info!(format = %session.format(), buffers = ring.len(), "capture loop started");

    loop {
        if input.poll_events().iter().any(|event| event.is_quit()) {
            session.request_stop();
        }
        if !session.is_running() {
            break;
        }

        let stranded = ring.census().filled;
        let returned = ring.requeue_stranded(session);
        summary.requeue_errors += u64::from(stranded.saturating_sub(returned));

        let desc = match ring.dequeue_one(session) {
            Ok(desc) => desc,
            Err(err) => {
                summary.dequeue_errors += 1;
                warn!(op = "dequeue", errno = err.os_code(), "{err}");
                continue;
            }
        };

        match present_frame(session, ring, presenter, &desc) {
            Ok(()) => summary.presented += 1,
            Err(err) => {
                summary.dropped += 1;
                if err.class() == ErrorClass::PresentationMismatch {
                    warn!(index = desc.index, sequence = desc.metadata.sequence, "{err}");
                } else {
                    warn!(index = desc.index, errno = err.os_code(), "frame dropped: {err}");
                }
            }
        }

        if let Err(err) = ring.requeue(session, desc.index) {
            summary.requeue_errors += 1;
            warn!(op = "requeue", errno = err.os_code(), "{err}");
        }
    }

    debug!(?summary, "capture loop stopped");
    summary
}

/// Copy one filled buffer to the presenter surface and show it.
fn present_frame<D, P>(
    session: &Session<D>,
    ring: &BufferRing<D::Region>,
    presenter: &mut P,
    desc: &BufferDescriptor,
) -> Result<()>
where
    D: VideoDevice,
    P: Presenter,
{
    let format = session.format();
    let expected = format.frame_bytes();
    let row_bytes = format.row_bytes();

    let mapped = ring.frame(session, desc.index)?;
    let filled = match desc.metadata.bytes_used as usize {
        0 => mapped.len(),
        used => used.min(mapped.len()),
    };
    let source = mapped
        .get(..expected)
        .filter(|_| filled >= expected)
        .ok_or(CaptureError::FrameLength {
            index: desc.index,
            expected,
            actual: filled,
        })?;

    let surface = presenter.surface()?;
    if surface.pitch != row_bytes {
        return Err(CaptureError::StrideMismatch {
            expected: row_bytes,
            actual: surface.pitch,
        });
    }
    let available = surface.pixels.len();
    let target = surface
        .pixels
        .get_mut(..expected)
        .ok_or(CaptureError::FrameLength {
            index: desc.index,
            expected,
            actual: available,
        })?;
    target.copy_from_slice(source);

    trace!(index = desc.index, sequence = desc.metadata.sequence, "frame copied");
    presenter.present()
}
