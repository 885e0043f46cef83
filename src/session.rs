//! Device session: open, capability check, format negotiation, streaming.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::device::V4L2Device;
use crate::error::{CaptureError, Result};
use crate::traits::{Format, FourCC, VideoDevice};

/// Outcome of format negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiation {
    /// The driver accepted the requested resolution.
    Exact,
    /// The driver substituted its own resolution, which the session adopted.
    Adjusted {
        /// Requested (width, height).
        requested: (u32, u32),
        /// Adopted (width, height).
        actual: (u32, u32),
    },
}

/// An open capture device together with its negotiated format.
///
/// The device lives in an `Option`: `None` means closed, whatever numeric
/// value the descriptor had.
pub struct Session<D: VideoDevice> {
    path: PathBuf,
    device: Option<D>,
    format: Format,
    negotiation: Negotiation,
    streaming: bool,
    running: bool,
}

impl Session<V4L2Device> {
    /// Open a V4L2 node and negotiate `requested` on it.
    pub fn open(path: &Path, requested: &Format) -> Result<Self> {
        let device = V4L2Device::open(path).map_err(|source| CaptureError::DeviceOpen {
            path: path.to_path_buf(),
            source,
        })?;
        Self::negotiate(path, device, requested)
    }
}

impl<D: VideoDevice> Session<D> {
    /// Validate an already opened device and negotiate `requested` on it.
    ///
    /// On error the device is dropped, which closes it.
    pub fn negotiate(path: impl Into<PathBuf>, mut device: D, requested: &Format) -> Result<Self> {
        let path = path.into();
        let caps = device.capabilities();
        debug!(
            driver = %caps.driver,
            card = %caps.card,
            bus = %caps.bus_info,
            "device capabilities"
        );

        if !caps.can_capture {
            return Err(CaptureError::Capability {
                path,
                missing: "video capture",
            });
        }
        if !caps.can_stream {
            return Err(CaptureError::Capability {
                path,
                missing: "streaming",
            });
        }

        let mut wanted = requested.clone();
        wanted.fourcc = FourCC::YUYV;

        let format = device
            .set_format(&wanted)
            .map_err(|source| CaptureError::FormatNegotiation {
                path: path.clone(),
                requested: wanted.to_string(),
                reason: source.to_string(),
                source: Some(source),
            })?;

        if format.fourcc != FourCC::YUYV {
            return Err(CaptureError::FormatNegotiation {
                path,
                requested: wanted.to_string(),
                reason: format!("driver substituted {}", format.fourcc),
                source: None,
            });
        }

        let negotiation = if format.width == wanted.width && format.height == wanted.height {
            Negotiation::Exact
        } else {
            info!(
                "Requested resolution {}x{} is not available, using {}x{}",
                wanted.width, wanted.height, format.width, format.height
            );
            Negotiation::Adjusted {
                requested: (wanted.width, wanted.height),
                actual: (format.width, format.height),
            }
        };

        info!(path = %path.display(), format = %format, "format negotiated");

        Ok(Self {
            path,
            device: Some(device),
            format,
            negotiation,
            streaming: false,
            running: true,
        })
    }

    /// Device node path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The format the driver actually accepted. Size everything from this.
    pub const fn format(&self) -> &Format {
        &self.format
    }

    /// Whether the driver adjusted the requested resolution.
    pub const fn negotiation(&self) -> Negotiation {
        self.negotiation
    }

    /// Whether the device is still open.
    pub const fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Whether STREAMON succeeded and STREAMOFF has not run yet.
    pub const fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Whether the capture loop should keep going.
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Ask the capture loop to stop at the top of its next iteration.
    pub fn request_stop(&mut self) {
        self.running = false;
    }

    /// Borrow the device.
    pub fn device(&self) -> Result<&D> {
        self.device.as_ref().ok_or(CaptureError::DeviceClosed)
    }

    /// Borrow the device mutably.
    pub fn device_mut(&mut self) -> Result<&mut D> {
        self.device.as_mut().ok_or(CaptureError::DeviceClosed)
    }

    /// Start streaming. Every buffer must already be queued.
    pub fn start_streaming(&mut self) -> Result<()> {
        self.device_mut()?
            .stream_on()
            .map_err(|source| CaptureError::StreamStart { source })?;
        self.streaming = true;
        debug!("streaming started");
        Ok(())
    }

    /// Stop streaming. Failure is logged and otherwise ignored.
    pub fn stop_streaming(&mut self) {
        if !self.streaming {
            return;
        }
        self.streaming = false;

        let Some(device) = self.device.as_mut() else {
            return;
        };
        match device.stream_off() {
            Ok(()) => debug!("streaming stopped"),
            Err(err) => warn!(
                op = "stream_off",
                errno = err.raw_os_error(),
                "Unable to stop capture: {err}"
            ),
        }
    }

    /// Release the device. Safe to call more than once.
    pub fn close(&mut self) {
        if self.device.take().is_some() {
            debug!(path = %self.path.display(), "device closed");
        }
        self.streaming = false;
        self.running = false;
    }
}

impl<D: VideoDevice> Drop for Session<D> {
    fn drop(&mut self) {
        self.stop_streaming();
        self.close();
    }
}
