//! Frame validation utilities for test pattern verification.
//!
//! These checks look at frames as they reached the display surface, so they
//! work the same for the simulated device and for vivid virtual cameras.

use thiserror::Error;

use crate::convert::pixel_at;
use crate::traits::{Format, Frame};

/// Expected RGB values for SMPTE color bars (8 bars).
///
/// Colors in order: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
const SMPTE_COLOR_BARS: [(u8, u8, u8); 8] = [
    (235, 235, 235), // White
    (235, 235, 11),  // Yellow
    (12, 236, 237),  // Cyan
    (13, 237, 13),   // Green
    (237, 13, 237),  // Magenta
    (238, 14, 13),   // Red
    (15, 15, 239),   // Blue
    (16, 16, 16),    // Black
];

/// Tolerance for RGB color matching (accounts for YUV->RGB conversion errors).
const COLOR_TOLERANCE: u32 = 15;

/// Reasons a frame or frame sequence fails validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A sample point lies outside the frame data.
    #[error("failed to get pixel at ({x}, {y})")]
    OutOfBounds {
        /// X coordinate.
        x: u32,
        /// Y coordinate.
        y: u32,
    },
    /// A color bar has the wrong color.
    #[error("color bar {bar} mismatch: expected RGB{expected:?}, got RGB{actual:?}")]
    ColorBar {
        /// Bar index.
        bar: usize,
        /// Expected color.
        expected: (u8, u8, u8),
        /// Sampled color.
        actual: (u8, u8, u8),
    },
    /// Luminance fell while moving right.
    #[error("gradient not monotonically increasing at x={x}")]
    GradientDecrease {
        /// X coordinate of the decrease.
        x: u32,
    },
    /// The frame is too flat to be a gradient.
    #[error("insufficient luminance change for gradient: {change}")]
    GradientFlat {
        /// Luminance change across the frame, rounded.
        change: i32,
    },
    /// No frames to check.
    #[error("cannot validate empty frame sequence")]
    Empty,
    /// Sequence numbers are not consecutive.
    #[error("frame sequence gap at index {index}: expected {expected}, got {actual}")]
    SequenceGap {
        /// Position in the slice.
        index: usize,
        /// Expected sequence number.
        expected: u32,
        /// Found sequence number.
        actual: u32,
    },
}

/// Validates that a frame contains the SMPTE color bar pattern.
///
/// Samples the center of each of the 8 vertical stripes on the middle row.
pub fn validate_color_bars(frame: &Frame, format: &Format) -> Result<(), ValidationError> {
    let bar_width = format.width / 8;
    let center_y = format.height / 2;

    for (bar, expected) in SMPTE_COLOR_BARS.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let x = (bar as u32 * bar_width) + (bar_width / 2);

        let actual = pixel_at(&frame.data, x, center_y, format.width)
            .ok_or(ValidationError::OutOfBounds { x, y: center_y })?;

        if !colors_match(actual, *expected, COLOR_TOLERANCE) {
            return Err(ValidationError::ColorBar {
                bar,
                expected: *expected,
                actual,
            });
        }
    }

    Ok(())
}

/// Validates that a frame contains a left-to-right luminance ramp.
pub fn validate_gradient(frame: &Frame, format: &Format) -> Result<(), ValidationError> {
    let center_y = format.height / 2;
    let mut first: Option<f32> = None;
    let mut prev: Option<f32> = None;

    for x in (0..format.width).step_by(10) {
        let (r, g, b) = pixel_at(&frame.data, x, center_y, format.width)
            .ok_or(ValidationError::OutOfBounds { x, y: center_y })?;

        // Y' in Rec. 601
        let luminance = 0.114f32.mul_add(
            f32::from(b),
            0.587f32.mul_add(f32::from(g), 0.299 * f32::from(r)),
        );

        // Allow small decreases due to rounding
        if prev.is_some_and(|prev| luminance < prev - 1.0) {
            return Err(ValidationError::GradientDecrease { x });
        }
        first.get_or_insert(luminance);
        prev = Some(luminance);
    }

    if let (Some(first), Some(last)) = (first, prev) {
        let change = last - first;
        if change < 50.0 {
            #[allow(clippy::cast_possible_truncation)]
            return Err(ValidationError::GradientFlat {
                change: change.round() as i32,
            });
        }
    }

    Ok(())
}

/// Validates that sequence numbers increment by exactly 1.
pub fn validate_frame_sequence(frames: &[Frame]) -> Result<(), ValidationError> {
    if frames.is_empty() {
        return Err(ValidationError::Empty);
    }

    for (index, pair) in frames.windows(2).enumerate() {
        let [prev, curr] = pair else { continue };
        let expected = prev.metadata.sequence.wrapping_add(1);
        if curr.metadata.sequence != expected {
            return Err(ValidationError::SequenceGap {
                index: index + 1,
                expected,
                actual: curr.metadata.sequence,
            });
        }
    }

    Ok(())
}

/// Whether all three channels are within `tolerance`.
fn colors_match(actual: (u8, u8, u8), expected: (u8, u8, u8), tolerance: u32) -> bool {
    let (ar, ag, ab) = actual;
    let (er, eg, eb) = expected;

    u32::from(ar.abs_diff(er)) <= tolerance
        && u32::from(ag.abs_diff(eg)) <= tolerance
        && u32::from(ab.abs_diff(eb)) <= tolerance
}
