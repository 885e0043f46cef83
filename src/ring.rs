//! Buffer ring: the pool of driver buffers shared with the capture device.
//!
//! Each slot tracks who owns its buffer. The application may only read a
//! buffer between `dequeue_one` and `requeue`; the driver owns it otherwise.
//!
//! ```text
//! Free -> QueuedToDevice -> FilledReadyForApp -> QueuedToDevice -> ... -> Free
//! ```

use tracing::{debug, trace, warn};

use crate::error::{CaptureError, Result};
use crate::session::Session;
use crate::traits::{BufferInfo, FrameMetadata, VideoDevice};

/// Who owns a buffer right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Allocated but not handed to the driver.
    Free,
    /// Owned by the driver, possibly being filled.
    QueuedToDevice,
    /// Owned by the application, holds a complete frame.
    FilledReadyForApp,
}

/// A buffer as seen by the capture loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor {
    /// Index in `[0, count)`.
    pub index: u32,
    /// Buffer length in bytes.
    pub length: u32,
    /// Driver offset used for the mapping.
    pub offset: u32,
    /// Ownership state.
    pub state: BufferState,
    /// Metadata reported by the last dequeue.
    pub metadata: FrameMetadata,
}

/// Number of buffers in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Census {
    /// Buffers in `Free`.
    pub free: u32,
    /// Buffers in `QueuedToDevice`.
    pub queued: u32,
    /// Buffers in `FilledReadyForApp`.
    pub filled: u32,
}

impl Census {
    /// Total buffers counted.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.free + self.queued + self.filled
    }
}

struct Slot<R> {
    info: Option<BufferInfo>,
    region: Option<R>,
    state: BufferState,
    metadata: FrameMetadata,
}

/// Fixed set of mapped driver buffers, addressed by index.
pub struct BufferRing<R> {
    slots: Vec<Slot<R>>,
}

impl<R> BufferRing<R> {
    /// Ask the driver for `count` buffers.
    pub fn allocate<D>(session: &mut Session<D>, count: u32) -> Result<Self>
    where
        D: VideoDevice<Region = R>,
    {
        let granted = session
            .device_mut()?
            .request_buffers(count)
            .map_err(|source| CaptureError::BufferAllocation {
                requested: count,
                granted: 0,
                source: Some(source),
            })?;

        if granted == 0 || granted < count {
            return Err(CaptureError::BufferAllocation {
                requested: count,
                granted,
                source: None,
            });
        }
        if granted > count {
            debug!(requested = count, granted, "driver granted extra buffers");
        }

        let slots = (0..count)
            .map(|_| Slot {
                info: None,
                region: None,
                state: BufferState::Free,
                metadata: FrameMetadata::default(),
            })
            .collect();
        debug!(count, "buffers allocated");
        Ok(Self { slots })
    }

    /// Number of buffers in the ring.
    pub fn len(&self) -> u32 {
        u32::try_from(self.slots.len()).unwrap_or(u32::MAX)
    }

    /// Whether the ring holds no buffers.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Ownership state of one buffer.
    pub fn state(&self, index: u32) -> Option<BufferState> {
        self.slot(index).map(|slot| slot.state)
    }

    /// Count buffers per state.
    pub fn census(&self) -> Census {
        self.slots
            .iter()
            .fold(Census::default(), |mut census, slot| {
                match slot.state {
                    BufferState::Free => census.free += 1,
                    BufferState::QueuedToDevice => census.queued += 1,
                    BufferState::FilledReadyForApp => census.filled += 1,
                }
                census
            })
    }

    /// Number of buffers currently mapped.
    pub fn mapped(&self) -> u32 {
        let mapped = self.slots.iter().filter(|slot| slot.region.is_some()).count();
        u32::try_from(mapped).unwrap_or(u32::MAX)
    }

    /// Query and map every buffer read-only.
    ///
    /// If any buffer fails, everything mapped so far is unmapped before the
    /// error is returned.
    pub fn map_all<D>(&mut self, session: &mut Session<D>) -> Result<()>
    where
        D: VideoDevice<Region = R>,
    {
        if let Err(err) = self.try_map_all(session) {
            warn!(
                op = "map_all",
                errno = err.os_code(),
                mapped = self.mapped(),
                "{err}"
            );
            self.unmap_all(session);
            return Err(err);
        }
        debug!(count = self.len(), "buffers mapped");
        Ok(())
    }

    fn try_map_all<D>(&mut self, session: &mut Session<D>) -> Result<()>
    where
        D: VideoDevice<Region = R>,
    {
        let device = session.device_mut()?;
        for (index, slot) in (0u32..).zip(self.slots.iter_mut()) {
            if slot.region.is_some() {
                continue;
            }
            let info = device
                .query_buffer(index)
                .map_err(|source| CaptureError::BufferQuery { index, source })?;
            let region = device
                .map_buffer(&info)
                .map_err(|source| CaptureError::BufferMap { index, source })?;
            trace!(index, length = info.length, offset = info.offset, "buffer mapped");
            slot.info = Some(info);
            slot.region = Some(region);
        }
        Ok(())
    }

    /// Hand every buffer to the driver. Runs once, before streaming starts.
    pub fn enqueue_all<D>(&mut self, session: &mut Session<D>) -> Result<()>
    where
        D: VideoDevice<Region = R>,
    {
        let device = session.device_mut()?;
        for (index, slot) in (0u32..).zip(self.slots.iter_mut()) {
            if slot.state != BufferState::Free {
                return Err(CaptureError::InvalidBufferState {
                    index,
                    actual: Some(slot.state),
                    expected: BufferState::Free,
                });
            }
            device
                .queue_buffer(index)
                .map_err(|source| CaptureError::BufferQueue { index, source })?;
            slot.state = BufferState::QueuedToDevice;
        }
        debug!(count = self.len(), "buffers queued");
        Ok(())
    }

    /// Wait for the driver to return a filled buffer.
    pub fn dequeue_one<D>(&mut self, session: &mut Session<D>) -> Result<BufferDescriptor>
    where
        D: VideoDevice<Region = R>,
    {
        let dequeued = session
            .device_mut()?
            .dequeue_buffer()
            .map_err(|source| CaptureError::Dequeue { source })?;

        let index = dequeued.index;
        let Some(slot) = self.slot_mut(index) else {
            return Err(CaptureError::InvalidBufferState {
                index,
                actual: None,
                expected: BufferState::QueuedToDevice,
            });
        };
        if slot.state != BufferState::QueuedToDevice {
            return Err(CaptureError::InvalidBufferState {
                index,
                actual: Some(slot.state),
                expected: BufferState::QueuedToDevice,
            });
        }

        slot.state = BufferState::FilledReadyForApp;
        slot.metadata = dequeued.metadata;
        trace!(index, sequence = slot.metadata.sequence, "buffer dequeued");
        Ok(Self::describe(index, slot))
    }

    /// Bytes of a buffer the application currently owns.
    ///
    /// The slice borrows the session, so it cannot be held across `requeue`.
    pub fn frame<'a, D>(&'a self, session: &'a Session<D>, index: u32) -> Result<&'a [u8]>
    where
        D: VideoDevice<Region = R>,
    {
        let slot = self.owned_slot(index)?;
        let region = slot.region.as_ref().ok_or(CaptureError::InvalidBufferState {
            index,
            actual: Some(slot.state),
            expected: BufferState::FilledReadyForApp,
        })?;
        Ok(session.device()?.region_bytes(region))
    }

    /// Return an application-owned buffer to the driver.
    ///
    /// On failure the buffer stays application-owned.
    pub fn requeue<D>(&mut self, session: &mut Session<D>, index: u32) -> Result<()>
    where
        D: VideoDevice<Region = R>,
    {
        self.owned_slot(index)?;
        session
            .device_mut()?
            .queue_buffer(index)
            .map_err(|source| CaptureError::Requeue { index, source })?;
        if let Some(slot) = self.slot_mut(index) {
            slot.state = BufferState::QueuedToDevice;
        }
        trace!(index, "buffer requeued");
        Ok(())
    }

    /// Retry requeue for every buffer still owned by the application.
    ///
    /// Returns how many buffers went back to the driver.
    pub fn requeue_stranded<D>(&mut self, session: &mut Session<D>) -> u32
    where
        D: VideoDevice<Region = R>,
    {
        let stranded: Vec<u32> = (0u32..)
            .zip(self.slots.iter())
            .filter(|(_, slot)| slot.state == BufferState::FilledReadyForApp)
            .map(|(index, _)| index)
            .collect();

        let mut returned = 0;
        for index in stranded {
            match self.requeue(session, index) {
                Ok(()) => returned += 1,
                Err(err) => warn!(op = "requeue", errno = err.os_code(), "{err}"),
            }
        }
        returned
    }

    /// Return every buffer to `Free` once the driver has stopped streaming.
    pub fn reclaim_all(&mut self) {
        for slot in &mut self.slots {
            slot.state = BufferState::Free;
        }
    }

    /// Unmap every mapped buffer. Unmapped slots are skipped, so this is safe
    /// to call repeatedly and on a partially mapped ring.
    pub fn unmap_all<D>(&mut self, session: &mut Session<D>)
    where
        D: VideoDevice<Region = R>,
    {
        let Ok(device) = session.device_mut() else {
            return;
        };
        for (index, slot) in (0u32..).zip(self.slots.iter_mut()) {
            let Some(region) = slot.region.take() else {
                continue;
            };
            if let Err(err) = device.unmap_buffer(region) {
                warn!(
                    op = "munmap",
                    index,
                    errno = err.raw_os_error(),
                    "Unable to unmap buffer: {err}"
                );
            }
            slot.info = None;
        }
    }

    /// Give the buffers back to the driver. Failure is logged.
    pub fn release<D>(&mut self, session: &mut Session<D>)
    where
        D: VideoDevice<Region = R>,
    {
        if self.mapped() > 0 {
            warn!(mapped = self.mapped(), "releasing buffers that are still mapped");
        }
        let Ok(device) = session.device_mut() else {
            return;
        };
        if let Err(err) = device.release_buffers() {
            warn!(
                op = "reqbufs",
                errno = err.raw_os_error(),
                "Unable to release buffers: {err}"
            );
        }
    }

    fn slot(&self, index: u32) -> Option<&Slot<R>> {
        self.slots.get(usize::try_from(index).ok()?)
    }

    fn slot_mut(&mut self, index: u32) -> Option<&mut Slot<R>> {
        self.slots.get_mut(usize::try_from(index).ok()?)
    }

    fn owned_slot(&self, index: u32) -> Result<&Slot<R>> {
        match self.slot(index) {
            Some(slot) if slot.state == BufferState::FilledReadyForApp => Ok(slot),
            other => Err(CaptureError::InvalidBufferState {
                index,
                actual: other.map(|slot| slot.state),
                expected: BufferState::FilledReadyForApp,
            }),
        }
    }

    fn describe(index: u32, slot: &Slot<R>) -> BufferDescriptor {
        let info = slot.info.unwrap_or(BufferInfo {
            index,
            length: 0,
            offset: 0,
        });
        BufferDescriptor {
            index,
            length: info.length,
            offset: info.offset,
            state: slot.state,
            metadata: slot.metadata.clone(),
        }
    }
}
