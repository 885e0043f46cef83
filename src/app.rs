//! Startup and teardown around the capture loop.

use tracing::{debug, info};

use crate::capture::{self, RunSummary};
use crate::error::Result;
use crate::ring::BufferRing;
use crate::session::Session;
use crate::traits::{Format, InputSource, Presenter, VideoDevice};

/// Allocate, map and queue `count` buffers, then start streaming.
///
/// Any failure tears down whatever was set up, including the device, and
/// returns the error.
pub fn prepare<D: VideoDevice>(
    session: &mut Session<D>,
    count: u32,
) -> Result<BufferRing<D::Region>> {
    let mut ring = match BufferRing::allocate(session, count) {
        Ok(ring) => ring,
        Err(err) => {
            session.close();
            return Err(err);
        }
    };

    let started = ring
        .map_all(session)
        .and_then(|()| ring.enqueue_all(session))
        .and_then(|()| session.start_streaming());

    if let Err(err) = started {
        shutdown(session, &mut ring);
        return Err(err);
    }
    Ok(ring)
}

/// Stop streaming, unmap and release every buffer, close the device.
///
/// Tolerates a partially initialized session and ring.
pub fn shutdown<D: VideoDevice>(session: &mut Session<D>, ring: &mut BufferRing<D::Region>) {
    session.stop_streaming();
    ring.reclaim_all();
    ring.unmap_all(session);
    ring.release(session);
    session.close();
    debug!("capture teardown complete");
}

/// Bring up the pipeline on `session`, run it and tear it down.
///
/// `open_display` runs only after streaming has started, so no window is
/// created for a device that fails to initialize.
pub fn launch<D, P, I, F>(mut session: Session<D>, count: u32, open_display: F) -> Result<RunSummary>
where
    D: VideoDevice,
    P: Presenter,
    I: InputSource,
    F: FnOnce(&Format) -> Result<(P, I)>,
{
    let mut ring = prepare(&mut session, count)?;
    let format = session.format().clone();

    let display = open_display(&format).and_then(|(mut presenter, input)| {
        presenter.create_surface(format.width, format.height, format.fourcc)?;
        Ok((presenter, input))
    });
    let (mut presenter, mut input) = match display {
        Ok(display) => display,
        Err(err) => {
            shutdown(&mut session, &mut ring);
            return Err(err);
        }
    };

    let summary = capture::run(&mut session, &mut ring, &mut presenter, &mut input);
    info!(
        presented = summary.presented,
        dropped = summary.dropped,
        dequeue_errors = summary.dequeue_errors,
        requeue_errors = summary.requeue_errors,
        "capture finished"
    );

    presenter.destroy_surface();
    shutdown(&mut session, &mut ring);
    Ok(summary)
}
