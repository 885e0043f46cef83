//! Core types and collaborator traits for the capture pipeline.

use std::fmt;
use std::io;
use std::time::Duration;

use crate::error::Result;

/// Bytes per pixel of the packed YUYV (4:2:2) encoding.
pub const YUYV_BYTES_PER_PIXEL: u32 = 2;

/// Pixel format representation (e.g., YUYV, MJPG).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// Field order of the captured images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldOrder {
    /// Let the driver choose.
    #[default]
    Any,
    /// Progressive (non-interlaced) frames.
    Progressive,
    /// Both fields interleaved in one buffer.
    Interlaced,
    /// Fields alternate between buffers.
    Alternate,
    /// Any other order the driver reports.
    Other,
}

impl From<v4l::format::FieldOrder> for FieldOrder {
    fn from(order: v4l::format::FieldOrder) -> Self {
        use v4l::format::FieldOrder as V4l;
        match order {
            V4l::Any => Self::Any,
            V4l::Progressive => Self::Progressive,
            V4l::Interlaced => Self::Interlaced,
            V4l::Alternate => Self::Alternate,
            _ => Self::Other,
        }
    }
}

impl From<FieldOrder> for v4l::format::FieldOrder {
    fn from(order: FieldOrder) -> Self {
        match order {
            FieldOrder::Progressive => Self::Progressive,
            FieldOrder::Interlaced => Self::Interlaced,
            FieldOrder::Alternate => Self::Alternate,
            FieldOrder::Any | FieldOrder::Other => Self::Any,
        }
    }
}

/// Video format specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Field order.
    pub field: FieldOrder,
    /// Bytes per line (stride).
    pub stride: u32,
    /// Total frame size in bytes.
    pub size: u32,
}

impl Format {
    /// Create a new YUYV-sized format specification.
    ///
    /// `stride` and `size` saturate at `u32::MAX`; the driver clamps the
    /// request on negotiation.
    #[must_use]
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        let stride = width.saturating_mul(YUYV_BYTES_PER_PIXEL);
        let size = stride.saturating_mul(height);
        Self {
            width,
            height,
            fourcc,
            field: FieldOrder::Any,
            stride,
            size,
        }
    }

    /// Bytes in one tightly packed row.
    #[must_use]
    pub const fn row_bytes(&self) -> usize {
        self.width as usize * YUYV_BYTES_PER_PIXEL as usize
    }

    /// Bytes needed for one complete frame.
    #[must_use]
    pub const fn frame_bytes(&self) -> usize {
        self.row_bytes() * self.height as usize
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.fourcc)
    }
}

/// Device capability flags.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// Placement of one driver buffer, as reported by a buffer query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    /// Buffer index.
    pub index: u32,
    /// Length of the buffer in bytes.
    pub length: u32,
    /// Offset to pass to mmap.
    pub offset: u32,
}

/// Metadata for a captured frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameMetadata {
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
    /// Actual bytes used in the frame buffer.
    pub bytes_used: u32,
}

/// A buffer handed back by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dequeued {
    /// Buffer index.
    pub index: u32,
    /// Frame metadata.
    pub metadata: FrameMetadata,
}

/// An owned copy of a captured video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw frame data.
    pub data: Vec<u8>,
    /// Frame metadata.
    pub metadata: FrameMetadata,
}

/// Abstraction over the driver's capture control operations.
///
/// Every call maps onto one control request against the device and reports
/// the OS error unchanged.
pub trait VideoDevice {
    /// A read-only mapping of one driver buffer.
    type Region;

    /// Get device capabilities.
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Set capture format. Returns the actual format set by the driver.
    fn set_format(&mut self, format: &Format) -> io::Result<Format>;

    /// Ask the driver for `count` mmap buffers. Returns the number granted.
    fn request_buffers(&mut self, count: u32) -> io::Result<u32>;

    /// Free all driver buffers.
    fn release_buffers(&mut self) -> io::Result<()>;

    /// Query length and mmap offset of one buffer.
    fn query_buffer(&mut self, index: u32) -> io::Result<BufferInfo>;

    /// Map a queried buffer read-only into this process.
    fn map_buffer(&mut self, info: &BufferInfo) -> io::Result<Self::Region>;

    /// Release a mapping created by `map_buffer`.
    fn unmap_buffer(&mut self, region: Self::Region) -> io::Result<()>;

    /// Bytes behind a mapping.
    fn region_bytes<'a>(&'a self, region: &'a Self::Region) -> &'a [u8];

    /// Hand a buffer to the driver.
    fn queue_buffer(&mut self, index: u32) -> io::Result<()>;

    /// Take the next filled buffer from the driver. May block.
    fn dequeue_buffer(&mut self) -> io::Result<Dequeued>;

    /// Start streaming.
    fn stream_on(&mut self) -> io::Result<()>;

    /// Stop streaming. The driver reclaims all queued buffers.
    fn stream_off(&mut self) -> io::Result<()>;
}

/// Writable view of a presenter surface.
#[derive(Debug)]
pub struct SurfaceMut<'a> {
    /// Surface pixel storage.
    pub pixels: &'a mut [u8],
    /// Bytes per surface row.
    pub pitch: usize,
}

/// Display side of the pipeline.
pub trait Presenter {
    /// Create the streaming surface frames are written into.
    fn create_surface(&mut self, width: u32, height: u32, fourcc: FourCC) -> Result<()>;

    /// Lock the surface for writing.
    fn surface(&mut self) -> Result<SurfaceMut<'_>>;

    /// Show the surface contents.
    fn present(&mut self) -> Result<()>;

    /// Drop the surface. Safe to call when none exists.
    fn destroy_surface(&mut self);
}

/// Keys the viewer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// A printable key.
    Char(char),
    /// Escape.
    Escape,
    /// Anything else.
    Other,
}

/// Input events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The window was closed.
    Quit,
    /// A key went down.
    KeyPress(Key),
}

impl Event {
    /// Whether this event asks the viewer to stop.
    #[must_use]
    pub const fn is_quit(&self) -> bool {
        matches!(
            self,
            Self::Quit | Self::KeyPress(Key::Escape | Key::Char('q' | 'Q'))
        )
    }
}

/// Non-blocking source of input events.
pub trait InputSource {
    /// Drain every pending event.
    fn poll_events(&mut self) -> Vec<Event>;
}
