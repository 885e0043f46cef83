//! minifb window presenter and keyboard input.
//!
//! The presenter hands out a packed YUYV staging surface and converts it to
//! RGB on present. Presenter and input share one window.

use std::cell::RefCell;
use std::rc::Rc;

use minifb::{ScaleMode, Window, WindowOptions};
use tracing::{debug, warn};

use crate::convert::yuyv_to_rgb32;
use crate::error::{CaptureError, Result};
use crate::traits::{
    Event, Format, FourCC, InputSource, Key, Presenter, SurfaceMut, YUYV_BYTES_PER_PIXEL,
};

/// Window title.
pub const TITLE: &str = "Camera";

type SharedWindow = Rc<RefCell<Option<Window>>>;

/// Presenter drawing into a desktop window.
pub struct WindowPresenter {
    window: SharedWindow,
    fullscreen: bool,
    width: usize,
    height: usize,
    staging: Vec<u8>,
    rgb: Vec<u32>,
}

/// Keyboard and close events of the window owned by a [`WindowPresenter`].
pub struct WindowInput {
    window: SharedWindow,
}

/// Build a presenter and the input source bound to its window.
///
/// The window itself appears on `create_surface`.
#[must_use]
pub fn open(fullscreen: bool) -> (WindowPresenter, WindowInput) {
    let window: SharedWindow = Rc::new(RefCell::new(None));
    let input = WindowInput {
        window: Rc::clone(&window),
    };
    let presenter = WindowPresenter {
        window,
        fullscreen,
        width: 0,
        height: 0,
        staging: Vec::new(),
        rgb: Vec::new(),
    };
    (presenter, input)
}

impl WindowPresenter {
    fn pitch(&self) -> usize {
        self.width * YUYV_BYTES_PER_PIXEL as usize
    }
}

impl Presenter for WindowPresenter {
    fn create_surface(&mut self, width: u32, height: u32, fourcc: FourCC) -> Result<()> {
        if fourcc != FourCC::YUYV {
            return Err(CaptureError::Presenter(format!(
                "unsupported surface encoding {fourcc}"
            )));
        }

        let options = WindowOptions {
            borderless: self.fullscreen,
            resize: true,
            scale_mode: ScaleMode::AspectRatioStretch,
            ..WindowOptions::default()
        };
        let mut window = Window::new(TITLE, width as usize, height as usize, options)
            .map_err(|err| CaptureError::Presenter(err.to_string()))?;
        // Frame pacing comes from the driver.
        window.limit_update_rate(None);

        let format = Format::new(width, height, fourcc);
        self.width = width as usize;
        self.height = height as usize;
        self.staging = vec![0; format.frame_bytes()];
        self.rgb = vec![0; self.width * self.height];
        *self.window.borrow_mut() = Some(window);
        debug!(%format, fullscreen = self.fullscreen, "window created");
        Ok(())
    }

    fn surface(&mut self) -> Result<SurfaceMut<'_>> {
        if self.window.borrow().is_none() {
            return Err(CaptureError::Presenter("no window".to_owned()));
        }
        let pitch = self.pitch();
        Ok(SurfaceMut {
            pixels: &mut self.staging,
            pitch,
        })
    }

    fn present(&mut self) -> Result<()> {
        let pitch = self.pitch();
        yuyv_to_rgb32(&self.staging, pitch, self.width, &mut self.rgb);
        let mut slot = self.window.borrow_mut();
        let window = slot
            .as_mut()
            .ok_or_else(|| CaptureError::Presenter("no window".to_owned()))?;
        window
            .update_with_buffer(&self.rgb, self.width, self.height)
            .map_err(|err| CaptureError::Presenter(err.to_string()))
    }

    fn destroy_surface(&mut self) {
        if self.window.borrow_mut().take().is_some() {
            debug!("window closed");
        }
        self.staging = Vec::new();
        self.rgb = Vec::new();
    }
}

impl InputSource for WindowInput {
    fn poll_events(&mut self) -> Vec<Event> {
        let mut slot = self.window.borrow_mut();
        let Some(window) = slot.as_mut() else {
            warn!("input polled without a window");
            return vec![Event::Quit];
        };

        // `present` pumps the window as well, so read held keys, not press edges.
        window.update();
        key_events(window.get_keys(), window.is_open())
    }
}

fn key_events<K: IntoIterator<Item = minifb::Key>>(held: K, open: bool) -> Vec<Event> {
    let mut events: Vec<Event> = held
        .into_iter()
        .map(|key| Event::KeyPress(map_key(key)))
        .collect();
    if !open {
        events.push(Event::Quit);
    }
    events
}

fn map_key(key: minifb::Key) -> Key {
    match key {
        minifb::Key::Q => Key::Char('q'),
        minifb::Key::Escape => Key::Escape,
        _ => Key::Other,
    }
}
