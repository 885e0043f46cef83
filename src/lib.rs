//! Camview: a live V4L2 camera viewer.
//!
//! The capture side shares a ring of memory-mapped buffers with the driver
//! and moves each filled frame to a presenter surface. Devices, presenters
//! and input sources sit behind traits so the whole pipeline also runs
//! against a simulated device.

pub mod app;
pub mod capture;
pub mod config;
pub mod convert;
pub mod device;
pub mod error;
pub mod ring;
pub mod session;
pub mod traits;
pub mod validation;

#[cfg(feature = "window")]
pub mod window;

#[cfg(test)]
pub mod mock;

pub use capture::{Exit, RunSummary};
pub use config::{Cli, Config};
pub use device::V4L2Device;
pub use error::{CaptureError, ErrorClass, Result};
pub use ring::{BufferDescriptor, BufferRing, BufferState, Census};
pub use session::{Negotiation, Session};
pub use traits::{
    DeviceCapabilities, Event, Format, FourCC, Frame, FrameMetadata, InputSource, Key, Presenter,
    VideoDevice,
};
