//! Runtime configuration and command line parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::traits::{Format, FourCC};

/// Default capture node.
pub const DEFAULT_DEVICE: &str = "/dev/video0";
/// Default requested width in pixels.
pub const DEFAULT_WIDTH: u32 = 800;
/// Default requested height in pixels.
pub const DEFAULT_HEIGHT: u32 = 600;
/// Default number of driver buffers.
pub const DEFAULT_BUFFERS: u32 = 16;
/// Largest width or height accepted on the command line.
pub const MAX_DIMENSION: u32 = 16384;

/// Viewer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Capture device node.
    pub device_path: PathBuf,
    /// Requested width in pixels.
    pub width: u32,
    /// Requested height in pixels.
    pub height: u32,
    /// Open the window without decorations.
    pub fullscreen: bool,
    /// Number of buffers to request from the driver.
    pub buffer_count: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_path: PathBuf::from(DEFAULT_DEVICE),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            fullscreen: false,
            buffer_count: DEFAULT_BUFFERS,
        }
    }
}

impl Config {
    /// The YUYV format to ask the driver for.
    #[must_use]
    pub const fn requested_format(&self) -> Format {
        Format::new(self.width, self.height, FourCC::YUYV)
    }
}

/// Live V4L2 camera viewer.
#[derive(Debug, Parser)]
#[command(name = "camview", version, about)]
pub struct Cli {
    /// Device node path or index
    #[arg(short, long, value_name = "INDEX or PATH", default_value = DEFAULT_DEVICE)]
    pub device: String,

    /// Requested capture width
    #[arg(short = 'W', long, default_value_t = DEFAULT_WIDTH,
          value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_DIMENSION)))]
    pub width: u32,

    /// Requested capture height
    #[arg(short = 'H', long, default_value_t = DEFAULT_HEIGHT,
          value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_DIMENSION)))]
    pub height: u32,

    /// Open a borderless window sized to the frame (no desktop fullscreen)
    #[arg(short, long)]
    pub fullscreen: bool,

    /// Number of buffers to allocate
    #[arg(short, long, value_name = "INT", default_value_t = DEFAULT_BUFFERS,
          value_parser = clap::value_parser!(u32).range(1..))]
    pub buffers: u32,

    /// Log filter used when `RUST_LOG` is unset
    #[arg(long, value_name = "FILTER", default_value = "info")]
    pub log_level: String,
}

/// Accept either a node path or a bare index such as `2` for `/dev/video2`.
fn device_path(device: &str) -> PathBuf {
    if device.parse::<u32>().is_ok() {
        PathBuf::from(format!("/dev/video{device}"))
    } else {
        PathBuf::from(device)
    }
}

impl From<&Cli> for Config {
    fn from(cli: &Cli) -> Self {
        Self {
            device_path: device_path(&cli.device),
            width: cli.width,
            height: cli.height,
            fullscreen: cli.fullscreen,
            buffer_count: cli.buffers,
        }
    }
}
