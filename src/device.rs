//! V4L2 device implementation using the v4l crate.
//!
//! Format and capability handling go through the safe `v4l` API. The buffer
//! protocol (REQBUFS, QUERYBUF, mmap, QBUF, DQBUF, STREAMON/OFF) is driven
//! directly with `v4l::v4l2` so every buffer index stays under our control.

#![allow(unsafe_code)]

use std::os::raw::{c_int, c_void};
use std::path::Path;
use std::ptr::{self, NonNull};
use std::time::Duration;
use std::{io, mem, slice};

use tracing::debug;
use v4l::buffer::Type;
use v4l::memory::Memory;
use v4l::v4l2;
use v4l::v4l_sys::{v4l2_buffer, v4l2_requestbuffers};
use v4l::video::Capture;
use v4l::Device;

use crate::traits::{
    BufferInfo, DeviceCapabilities, Dequeued, FieldOrder, Format, FourCC, FrameMetadata,
    VideoDevice,
};

/// V4L2 device implementation wrapping the v4l crate.
pub struct V4L2Device {
    device: Device,
    capabilities: DeviceCapabilities,
}

impl V4L2Device {
    /// Open a V4L2 device node (e.g., `/dev/video0`) and query its capabilities.
    pub fn open(path: &Path) -> io::Result<Self> {
        let device = Device::with_path(path)?;
        let caps = device.query_caps()?;

        let capabilities = DeviceCapabilities {
            driver: caps.driver,
            card: caps.card,
            bus_info: caps.bus,
            can_capture: caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE),
            can_stream: caps.capabilities.contains(v4l::capability::Flags::STREAMING),
        };
        debug!(path = %path.display(), card = %capabilities.card, "opened device");

        Ok(Self {
            device,
            capabilities,
        })
    }

    fn fd(&self) -> c_int {
        self.device.handle().fd()
    }

    /// Issue one ioctl against the device with `arg` as the argument block.
    fn control<T>(&self, request: v4l2::vidioc::_IOC_TYPE, arg: &mut T) -> io::Result<()> {
        // SAFETY: `arg` is a live, exclusively borrowed struct whose layout
        // matches the one the request code encodes.
        unsafe { v4l2::ioctl(self.fd(), request, ptr::from_mut(arg).cast::<c_void>()) }
    }

    fn buffer(index: u32) -> v4l2_buffer {
        // SAFETY: v4l2_buffer is a plain C struct; all-zero is its documented
        // initial state.
        let mut buf: v4l2_buffer = unsafe { mem::zeroed() };
        buf.type_ = Type::VideoCapture as u32;
        buf.memory = Memory::Mmap as u32;
        buf.index = index;
        buf
    }

    fn request(&self, count: u32) -> io::Result<u32> {
        // SAFETY: plain C struct, zero is valid.
        let mut reqbufs: v4l2_requestbuffers = unsafe { mem::zeroed() };
        reqbufs.type_ = Type::VideoCapture as u32;
        reqbufs.memory = Memory::Mmap as u32;
        reqbufs.count = count;
        self.control(v4l2::vidioc::VIDIOC_REQBUFS, &mut reqbufs)?;
        Ok(reqbufs.count)
    }

    fn stream_control(&self, request: v4l2::vidioc::_IOC_TYPE) -> io::Result<()> {
        let mut typ = Type::VideoCapture as c_int;
        self.control(request, &mut typ)
    }
}

/// A read-only shared mapping of one capture buffer.
#[derive(Debug)]
pub struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
}

impl VideoDevice for V4L2Device {
    type Region = MappedRegion;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn set_format(&mut self, format: &Format) -> io::Result<Format> {
        let mut fmt = self.device.format()?;

        fmt.width = format.width;
        fmt.height = format.height;
        fmt.fourcc = format.fourcc.into();
        fmt.field_order = format.field.into();

        let fmt = self.device.set_format(&fmt)?;

        Ok(Format {
            width: fmt.width,
            height: fmt.height,
            fourcc: FourCC::from(fmt.fourcc),
            field: FieldOrder::from(fmt.field_order),
            stride: fmt.stride,
            size: fmt.size,
        })
    }

    fn request_buffers(&mut self, count: u32) -> io::Result<u32> {
        self.request(count)
    }

    fn release_buffers(&mut self) -> io::Result<()> {
        self.request(0).map(drop)
    }

    fn query_buffer(&mut self, index: u32) -> io::Result<BufferInfo> {
        let mut buf = Self::buffer(index);
        self.control(v4l2::vidioc::VIDIOC_QUERYBUF, &mut buf)?;

        // SAFETY: for MMAP memory the driver fills the `offset` member.
        let offset = unsafe { buf.m.offset };
        Ok(BufferInfo {
            index,
            length: buf.length,
            offset,
        })
    }

    fn map_buffer(&mut self, info: &BufferInfo) -> io::Result<MappedRegion> {
        let len = info.length as usize;
        let offset = libc::off_t::try_from(info.offset)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        // SAFETY: offset and length come straight from QUERYBUF for this fd.
        let addr = unsafe {
            v4l2::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_SHARED,
                self.fd(),
                offset,
            )?
        };
        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| io::Error::other("mmap returned null"))?;
        Ok(MappedRegion { ptr, len })
    }

    fn unmap_buffer(&mut self, region: MappedRegion) -> io::Result<()> {
        // SAFETY: the region was produced by `map_buffer` and is consumed here,
        // so it is unmapped exactly once.
        unsafe { v4l2::munmap(region.ptr.as_ptr().cast::<c_void>(), region.len) }
    }

    fn region_bytes<'a>(&'a self, region: &'a MappedRegion) -> &'a [u8] {
        // SAFETY: the mapping stays valid until `unmap_buffer` consumes the
        // region, which cannot happen while this borrow is alive.
        unsafe { slice::from_raw_parts(region.ptr.as_ptr(), region.len) }
    }

    fn queue_buffer(&mut self, index: u32) -> io::Result<()> {
        let mut buf = Self::buffer(index);
        self.control(v4l2::vidioc::VIDIOC_QBUF, &mut buf)
    }

    fn dequeue_buffer(&mut self) -> io::Result<Dequeued> {
        let mut buf = Self::buffer(0);
        self.control(v4l2::vidioc::VIDIOC_DQBUF, &mut buf)?;

        // V4L2 timestamps are always non-negative in practice
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let secs = buf.timestamp.tv_sec.max(0) as u64;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let nanos = (buf.timestamp.tv_usec.max(0) as u32).saturating_mul(1000);

        Ok(Dequeued {
            index: buf.index,
            metadata: FrameMetadata {
                sequence: buf.sequence,
                timestamp: Duration::new(secs, nanos),
                bytes_used: buf.bytesused,
            },
        })
    }

    fn stream_on(&mut self) -> io::Result<()> {
        self.stream_control(v4l2::vidioc::VIDIOC_STREAMON)
    }

    fn stream_off(&mut self) -> io::Result<()> {
        self.stream_control(v4l2::vidioc::VIDIOC_STREAMOFF)
    }
}
