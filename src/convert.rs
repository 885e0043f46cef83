//! YUYV pixel helpers for display and frame inspection.

/// Get RGB values for a pixel of a packed YUYV frame.
///
/// # Arguments
///
/// * `data` - Frame bytes
/// * `x` - X coordinate (0-based)
/// * `y` - Y coordinate (0-based)
/// * `width` - Frame width in pixels
///
/// # Returns
///
/// Returns `Some((r, g, b))` if the coordinates are valid, `None` otherwise.
/// For odd x coordinates the second luma sample of the pair is used with the
/// shared U/V values.
#[must_use]
pub fn pixel_at(data: &[u8], x: u32, y: u32, width: u32) -> Option<(u8, u8, u8)> {
    // YUYV format: [Y0 U Y1 V] repeats
    let pair_x = x & !1;
    let offset = ((y as usize) * (width as usize) + pair_x as usize) * 2;
    let [y0, u, y1, v]: [u8; 4] = data.get(offset..offset + 4)?.try_into().ok()?;

    let luma = if x % 2 == 0 { y0 } else { y1 };
    Some(yuv_to_rgb(luma, u, v))
}

/// Convert a packed YUYV frame into `0RGB` words, one per pixel.
///
/// `pitch` is the number of source bytes per row. Rows or pixels missing
/// from either buffer are left untouched.
pub fn yuyv_to_rgb32(src: &[u8], pitch: usize, width: usize, dst: &mut [u32]) {
    if width == 0 || pitch == 0 {
        return;
    }
    for (src_row, dst_row) in src.chunks(pitch).zip(dst.chunks_mut(width)) {
        let pixels = src_row.get(..width * 2).unwrap_or(src_row);
        for (quad, out) in pixels.chunks_exact(4).zip(dst_row.chunks_mut(2)) {
            let &[y0, u, y1, v] = quad else { continue };
            for (luma, word) in [y0, y1].into_iter().zip(out.iter_mut()) {
                let (r, g, b) = yuv_to_rgb(luma, u, v);
                *word = u32::from_be_bytes([0, r, g, b]);
            }
        }
    }
}

/// Convert YUV values to RGB.
///
/// Uses the ITU-R BT.601 conversion formula.
///
/// # Arguments
///
/// * `y` - Luminance value (16-235 for studio range)
/// * `u` - Blue-difference chroma value (16-240)
/// * `v` - Red-difference chroma value (16-240)
///
/// # Returns
///
/// RGB tuple with values clamped to 0-255 range.
#[must_use]
#[allow(clippy::many_single_char_names)]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y_f = f32::from(y);
    let u_f = f32::from(u) - 128.0;
    let v_f = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v_f, y_f);
    let g = 0.714_14f32.mul_add(-v_f, 0.344_14f32.mul_add(-u_f, y_f));
    let b = 1.772f32.mul_add(u_f, y_f);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let clamp = |val: f32| -> u8 { val.clamp(0.0, 255.0) as u8 };

    (clamp(r), clamp(g), clamp(b))
}
