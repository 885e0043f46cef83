//! Simulated device, presenter and input for testing without hardware.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use crate::error::{CaptureError, Result};
use crate::traits::{
    BufferInfo, Dequeued, DeviceCapabilities, Event, Format, FourCC, Frame, FrameMetadata,
    InputSource, Presenter, SurfaceMut, VideoDevice,
};

/// Mapping handle handed out by [`MockDevice`].
#[derive(Debug)]
pub struct MockRegion {
    index: usize,
}

struct MockBuffer {
    data: Vec<u8>,
    mapped: bool,
}

/// Simulated capture driver.
///
/// Buffers are filled in the order they were queued, each with the current
/// test pattern and a little-endian sequence number in its first four bytes.
pub struct MockDevice {
    capabilities: DeviceCapabilities,
    format: Format,
    max_resolution: Option<(u32, u32)>,
    substitute: Option<FourCC>,
    reject_format: bool,
    grant: Option<u32>,
    pattern: TestPattern,
    buffers: Vec<MockBuffer>,
    incoming: VecDeque<usize>,
    streaming: bool,
    sequence: u32,
    fail_map_at: Option<u32>,
    fail_queue_at: Option<u32>,
    fail_dequeue_on: Vec<u32>,
    bogus_index_on: Option<(u32, u32)>,
    fail_requeue_on: Vec<u32>,
    fail_stream_on: bool,
    fail_stream_off: bool,
    dequeue_calls: u32,
    requeue_calls: u32,
    unmapped: Vec<u32>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// Create a new mock device with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            capabilities: DeviceCapabilities {
                driver: "mock".to_owned(),
                card: "Mock Camera".to_owned(),
                bus_info: "mock:0".to_owned(),
                can_capture: true,
                can_stream: true,
            },
            format: Format::new(640, 480, FourCC::YUYV),
            max_resolution: None,
            substitute: None,
            reject_format: false,
            grant: None,
            pattern: TestPattern::ColorBars,
            buffers: Vec::new(),
            incoming: VecDeque::new(),
            streaming: false,
            sequence: 0,
            fail_map_at: None,
            fail_queue_at: None,
            fail_dequeue_on: Vec::new(),
            bogus_index_on: None,
            fail_requeue_on: Vec::new(),
            fail_stream_on: false,
            fail_stream_off: false,
            dequeue_calls: 0,
            requeue_calls: 0,
            unmapped: Vec::new(),
        }
    }

    /// Set the capabilities for this mock device.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Clamp negotiated resolutions to at most `width` x `height`.
    #[must_use]
    pub const fn with_max_resolution(mut self, width: u32, height: u32) -> Self {
        self.max_resolution = Some((width, height));
        self
    }

    /// Fill frames with `pattern`.
    #[must_use]
    pub const fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Answer every format request with EINVAL.
    #[must_use]
    pub const fn rejecting_format(mut self) -> Self {
        self.reject_format = true;
        self
    }

    /// Accept format requests but switch the pixel encoding.
    #[must_use]
    pub const fn substituting_fourcc(mut self, fourcc: FourCC) -> Self {
        self.substitute = Some(fourcc);
        self
    }

    /// Grant exactly `count` buffers regardless of the request.
    #[must_use]
    pub const fn granting(mut self, count: u32) -> Self {
        self.grant = Some(count);
        self
    }

    /// Fail mapping buffer `index`.
    #[must_use]
    pub const fn failing_map_at(mut self, index: u32) -> Self {
        self.fail_map_at = Some(index);
        self
    }

    /// Fail the initial queueing of buffer `index`.
    #[must_use]
    pub const fn failing_queue_at(mut self, index: u32) -> Self {
        self.fail_queue_at = Some(index);
        self
    }

    /// Fail the given dequeue calls (0-based call numbers).
    #[must_use]
    pub fn failing_dequeue_on(mut self, calls: &[u32]) -> Self {
        self.fail_dequeue_on = calls.to_vec();
        self
    }

    /// Report buffer `index` on dequeue call `call` (0-based) without
    /// handing over any queued buffer.
    #[must_use]
    pub const fn reporting_index_on(mut self, call: u32, index: u32) -> Self {
        self.bogus_index_on = Some((call, index));
        self
    }

    /// Fail the given requeue calls made while streaming (0-based).
    #[must_use]
    pub fn failing_requeue_on(mut self, calls: &[u32]) -> Self {
        self.fail_requeue_on = calls.to_vec();
        self
    }

    /// Reject STREAMON.
    #[must_use]
    pub const fn failing_stream_on(mut self) -> Self {
        self.fail_stream_on = true;
        self
    }

    /// Reject STREAMOFF.
    #[must_use]
    pub const fn failing_stream_off(mut self) -> Self {
        self.fail_stream_off = true;
        self
    }

    /// Buffer indices unmapped so far, in unmap order.
    pub fn unmapped(&self) -> &[u32] {
        &self.unmapped
    }

    /// Mappings that have not been released.
    pub fn live_mappings(&self) -> usize {
        self.buffers.iter().filter(|buf| buf.mapped).count()
    }

    /// Buffers currently allocated by the driver.
    pub fn allocated(&self) -> usize {
        self.buffers.len()
    }

    /// Buffers the driver currently holds for filling.
    pub fn queued(&self) -> usize {
        self.incoming.len()
    }

    fn einval() -> io::Error {
        io::Error::from_raw_os_error(libc::EINVAL)
    }
}

impl VideoDevice for MockDevice {
    type Region = MockRegion;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn set_format(&mut self, format: &Format) -> io::Result<Format> {
        if self.reject_format {
            return Err(Self::einval());
        }

        let (width, height) = self.max_resolution.map_or(
            (format.width, format.height),
            |(max_w, max_h)| (format.width.min(max_w), format.height.min(max_h)),
        );
        let mut accepted = Format::new(width, height, self.substitute.unwrap_or(format.fourcc));
        accepted.field = format.field;
        self.format = accepted.clone();
        Ok(accepted)
    }

    fn request_buffers(&mut self, count: u32) -> io::Result<u32> {
        let granted = self.grant.unwrap_or(count);
        let length = self.format.size as usize;
        self.buffers = (0..granted)
            .map(|_| MockBuffer {
                data: vec![0; length],
                mapped: false,
            })
            .collect();
        self.incoming.clear();
        Ok(granted)
    }

    fn release_buffers(&mut self) -> io::Result<()> {
        if self.buffers.iter().any(|buf| buf.mapped) {
            return Err(io::Error::from_raw_os_error(libc::EBUSY));
        }
        self.buffers.clear();
        self.incoming.clear();
        Ok(())
    }

    fn query_buffer(&mut self, index: u32) -> io::Result<BufferInfo> {
        let buf = self
            .buffers
            .get(index as usize)
            .ok_or_else(Self::einval)?;
        Ok(BufferInfo {
            index,
            length: u32::try_from(buf.data.len()).map_err(|_| Self::einval())?,
            offset: index * 4096,
        })
    }

    fn map_buffer(&mut self, info: &BufferInfo) -> io::Result<MockRegion> {
        if self.fail_map_at == Some(info.index) {
            return Err(io::Error::from_raw_os_error(libc::ENOMEM));
        }
        let index = info.index as usize;
        let buf = self.buffers.get_mut(index).ok_or_else(Self::einval)?;
        assert!(!buf.mapped, "buffer {index} mapped twice");
        buf.mapped = true;
        Ok(MockRegion { index })
    }

    fn unmap_buffer(&mut self, region: MockRegion) -> io::Result<()> {
        let buf = self
            .buffers
            .get_mut(region.index)
            .ok_or_else(Self::einval)?;
        assert!(buf.mapped, "buffer {} unmapped twice", region.index);
        buf.mapped = false;
        self.unmapped
            .push(u32::try_from(region.index).map_err(|_| Self::einval())?);
        Ok(())
    }

    fn region_bytes<'a>(&'a self, region: &'a MockRegion) -> &'a [u8] {
        self.buffers
            .get(region.index)
            .map(|buf| buf.data.as_slice())
            .unwrap_or_default()
    }

    fn queue_buffer(&mut self, index: u32) -> io::Result<()> {
        if self.streaming {
            let call = self.requeue_calls;
            self.requeue_calls += 1;
            if self.fail_requeue_on.contains(&call) {
                return Err(io::Error::from_raw_os_error(libc::EIO));
            }
        } else if self.fail_queue_at == Some(index) {
            return Err(Self::einval());
        }

        let slot = index as usize;
        if slot >= self.buffers.len() || self.incoming.contains(&slot) {
            return Err(Self::einval());
        }
        self.incoming.push_back(slot);
        Ok(())
    }

    fn dequeue_buffer(&mut self) -> io::Result<Dequeued> {
        let call = self.dequeue_calls;
        self.dequeue_calls += 1;
        if !self.streaming {
            return Err(Self::einval());
        }
        if self.fail_dequeue_on.contains(&call) {
            return Err(io::Error::from_raw_os_error(libc::EIO));
        }
        if let Some((_, index)) = self.bogus_index_on.filter(|&(at, _)| at == call) {
            return Ok(Dequeued {
                index,
                metadata: FrameMetadata::default(),
            });
        }
        let slot = self
            .incoming
            .pop_front()
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EAGAIN))?;

        let sequence = self.sequence;
        self.sequence += 1;

        let format = self.format.clone();
        let pattern = self.pattern;
        let buf = self.buffers.get_mut(slot).ok_or_else(Self::einval)?;
        fill_test_frame(&mut buf.data, &format, pattern);
        if let Some(stamp) = buf.data.get_mut(..4) {
            stamp.copy_from_slice(&sequence.to_le_bytes());
        }

        Ok(Dequeued {
            index: u32::try_from(slot).map_err(|_| Self::einval())?,
            metadata: FrameMetadata {
                sequence,
                timestamp: Duration::from_millis(u64::from(sequence) * 33), // ~30fps
                bytes_used: format.size,
            },
        })
    }

    fn stream_on(&mut self) -> io::Result<()> {
        if self.fail_stream_on {
            return Err(io::Error::from_raw_os_error(libc::EPIPE));
        }
        self.streaming = true;
        Ok(())
    }

    fn stream_off(&mut self) -> io::Result<()> {
        self.streaming = false;
        self.incoming.clear();
        if self.fail_stream_off {
            return Err(io::Error::from_raw_os_error(libc::ENODEV));
        }
        Ok(())
    }
}

/// Sequence number stamped into the first four bytes of a mock frame.
pub fn stamped_sequence(data: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = data.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// SMPTE color bars pattern.
    ColorBars,
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Solid color with specified Y, U, V values.
    Solid(u8, u8, u8),
}

/// Fill `data` with one YUYV frame of `pattern`.
fn fill_test_frame(data: &mut [u8], format: &Format, pattern: TestPattern) {
    match pattern {
        TestPattern::ColorBars => fill_color_bars(data, format.width),
        TestPattern::Gradient => fill_gradient(data, format.width),
        TestPattern::Solid(y, u, v) => fill_pairs(data, |_| (y, u, v)),
    }
}

/// Write every YUYV pixel pair, choosing its (Y, U, V) from the pair's x.
fn fill_pairs(data: &mut [u8], mut pick: impl FnMut(usize) -> (u8, u8, u8)) {
    for (pair, chunk) in data.chunks_exact_mut(4).enumerate() {
        let (y, u, v) = pick(pair);
        chunk.copy_from_slice(&[y, u, y, v]);
    }
}

fn fill_color_bars(data: &mut [u8], width: u32) {
    // White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
    const BARS: [(u8, u8, u8); 8] = [
        (235, 128, 128),
        (210, 16, 146),
        (170, 166, 16),
        (145, 54, 34),
        (106, 202, 222),
        (81, 90, 240),
        (41, 240, 110),
        (16, 128, 128),
    ];
    let pairs_per_row = (width as usize / 2).max(1);
    let bar_width = (width as usize / 8).max(1);
    fill_pairs(data, |pair| {
        let x = (pair % pairs_per_row) * 2;
        BARS[(x / bar_width).min(7)]
    });
}

fn fill_gradient(data: &mut [u8], width: u32) {
    let width = (width as usize).max(1);
    let pairs_per_row = (width / 2).max(1);
    fill_pairs(data, |pair| {
        let x = (pair % pairs_per_row) * 2;
        #[allow(clippy::cast_possible_truncation)]
        let y = ((x * 255) / width) as u8;
        (y, 128, 128)
    });
}

/// Presenter that keeps a copy of every presented frame.
pub struct RecordingPresenter {
    surface: Option<(u32, u32)>,
    pixels: Vec<u8>,
    pitch_override: Option<usize>,
    fail_create: bool,
    presented: Vec<Frame>,
    destroyed: bool,
}

impl Default for RecordingPresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingPresenter {
    /// Presenter with a tightly packed YUYV surface.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            surface: None,
            pixels: Vec::new(),
            pitch_override: None,
            fail_create: false,
            presented: Vec::new(),
            destroyed: false,
        }
    }

    /// Report `pitch` instead of the packed row size.
    #[must_use]
    pub const fn with_pitch(mut self, pitch: usize) -> Self {
        self.pitch_override = Some(pitch);
        self
    }

    /// Fail `create_surface`.
    #[must_use]
    pub const fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// Frames presented so far.
    pub fn presented(&self) -> &[Frame] {
        &self.presented
    }

    /// Whether `destroy_surface` ran after a surface existed.
    pub const fn destroyed(&self) -> bool {
        self.destroyed
    }
}

impl Presenter for RecordingPresenter {
    fn create_surface(&mut self, width: u32, height: u32, fourcc: FourCC) -> Result<()> {
        if self.fail_create {
            return Err(CaptureError::Presenter("surface creation refused".to_owned()));
        }
        let format = Format::new(width, height, fourcc);
        self.pixels = vec![0; format.frame_bytes()];
        self.surface = Some((width, height));
        Ok(())
    }

    fn surface(&mut self) -> Result<SurfaceMut<'_>> {
        let (width, _) = self
            .surface
            .ok_or_else(|| CaptureError::Presenter("no surface".to_owned()))?;
        let pitch = self.pitch_override.unwrap_or(width as usize * 2);
        Ok(SurfaceMut {
            pixels: &mut self.pixels,
            pitch,
        })
    }

    fn present(&mut self) -> Result<()> {
        let sequence = stamped_sequence(&self.pixels).unwrap_or_default();
        self.presented.push(Frame {
            data: self.pixels.clone(),
            metadata: FrameMetadata {
                sequence,
                ..FrameMetadata::default()
            },
        });
        Ok(())
    }

    fn destroy_surface(&mut self) {
        if self.surface.take().is_some() {
            self.destroyed = true;
        }
        self.pixels.clear();
    }
}

/// Input that stays quiet for a number of polls, then sends `Quit`.
pub struct ScriptedInput {
    quiet_polls: u32,
    polls: u32,
}

impl ScriptedInput {
    /// Send `Quit` on poll number `polls` (0-based).
    #[must_use]
    pub const fn quit_after(polls: u32) -> Self {
        Self {
            quiet_polls: polls,
            polls: 0,
        }
    }

    /// Number of polls so far.
    pub const fn polls(&self) -> u32 {
        self.polls
    }
}

impl InputSource for ScriptedInput {
    fn poll_events(&mut self) -> Vec<Event> {
        let poll = self.polls;
        self.polls += 1;
        if poll >= self.quiet_polls {
            vec![Event::Quit]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_device_creation() {
        let device = MockDevice::new();
        assert_eq!(device.capabilities().driver, "mock");
        assert!(device.capabilities().can_capture);
        assert!(device.capabilities().can_stream);
    }

    #[test]
    fn test_mock_device_format() {
        let mut device = MockDevice::new().with_max_resolution(1280, 720);
        let actual = device
            .set_format(&Format::new(1920, 1080, FourCC::YUYV))
            .expect("set_format should succeed");
        assert_eq!((actual.width, actual.height), (1280, 720));
        assert_eq!(actual.size, 1280 * 720 * 2);
    }

    #[test]
    fn test_mock_fifo_order() {
        let mut device = MockDevice::new();
        device
            .set_format(&Format::new(64, 4, FourCC::YUYV))
            .expect("set_format should succeed");
        device.request_buffers(3).expect("request should succeed");
        for index in [2, 0, 1] {
            device.queue_buffer(index).expect("queue should succeed");
        }
        device.stream_on().expect("stream on should succeed");

        let order: Vec<u32> = (0..3)
            .map(|_| device.dequeue_buffer().expect("dequeue should succeed").index)
            .collect();
        assert_eq!(order, vec![2, 0, 1]);
        assert!(device.dequeue_buffer().is_err());
    }

    #[test]
    fn test_color_bars_pattern() {
        let format = Format::new(640, 480, FourCC::YUYV);
        let mut data = vec![0u8; format.frame_bytes()];
        fill_test_frame(&mut data, &format, TestPattern::ColorBars);

        // First bar should be white (Y=235)
        assert_eq!(data[0], 235);
        // Last bar should be black (Y=16)
        assert_eq!(data[format.row_bytes() - 4], 16);
    }

    #[test]
    fn test_gradient_pattern() {
        let format = Format::new(640, 480, FourCC::YUYV);
        let mut data = vec![0u8; format.frame_bytes()];
        fill_test_frame(&mut data, &format, TestPattern::Gradient);

        // Left edge should be dark
        assert!(data[0] < 10);

        // Right edge should be bright (check last row, last pixel)
        let last_row_start = 479 * 640 * 2;
        assert!(data[last_row_start + 638 * 2] > 200);
    }

    #[test]
    fn test_solid_pattern() {
        let format = Format::new(64, 64, FourCC::YUYV);
        let mut data = vec![0u8; format.frame_bytes()];
        fill_test_frame(&mut data, &format, TestPattern::Solid(128, 64, 192));

        assert_eq!(&data[..4], &[128, 64, 128, 192]);
    }

    #[test]
    fn test_recording_presenter_lifecycle() {
        let mut presenter = RecordingPresenter::new();
        assert!(presenter.surface().is_err());

        presenter
            .create_surface(4, 2, FourCC::YUYV)
            .expect("surface");
        {
            let surface = presenter.surface().expect("surface exists");
            assert_eq!(surface.pitch, 8);
            surface.pixels[..4].copy_from_slice(&7u32.to_le_bytes());
        }
        presenter.present().expect("present");
        assert_eq!(presenter.presented()[0].metadata.sequence, 7);

        presenter.destroy_surface();
        assert!(presenter.destroyed());
        assert!(presenter.surface().is_err());
    }

    #[test]
    fn test_scripted_input() {
        let mut input = ScriptedInput::quit_after(2);
        assert!(input.poll_events().is_empty());
        assert!(input.poll_events().is_empty());
        assert_eq!(input.poll_events(), vec![Event::Quit]);
        assert_eq!(input.polls(), 3);
    }
}
