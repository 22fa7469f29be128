//! Seeded pixel-corruption transform applied to each frame.
//!
//! Three effects, in order: horizontal slice displacement, a random
//! color-channel offset, optional scan lines. All randomness comes from a
//! per-frame seed, so one image + parameter set always renders the same
//! sequence.

use image::RgbaImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Valid intensity range for the transform.
pub const GLITCH_MIN: f64 = 0.1;
pub const GLITCH_MAX: f64 = 10.0;

pub struct Glitcher {
    pub color_offset: bool,
    pub scan_lines: bool,
}

impl Default for Glitcher {
    fn default() -> Self {
        Self {
            color_offset: true,
            scan_lines: false,
        }
    }
}

impl Glitcher {
    /// Produce one glitched frame. Output dimensions always equal input
    /// dimensions.
    pub fn glitch_frame(&self, src: &RgbaImage, intensity: f64, seed: u64) -> RgbaImage {
        let intensity = intensity.clamp(GLITCH_MIN, GLITCH_MAX);
        let (width, height) = src.dimensions();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut out = src.clone();

        if width == 0 || height == 0 {
            return out;
        }

        // Slice displacement: count and reach both scale with intensity.
        let slices = (intensity * 2.0).round().max(1.0) as u32;
        let max_offset = ((width as f64 * intensity / 100.0).round() as i64).max(1);
        let max_band = (height / 25).max(1);
        for _ in 0..slices {
            let y0 = rng.gen_range(0..height);
            let band = rng.gen_range(1..=max_band);
            let offset = rng.gen_range(-max_offset..=max_offset);
            if offset != 0 {
                shift_band(&mut out, y0, band, offset);
            }
        }

        if self.color_offset {
            let reach = (intensity * 3.0).round().max(1.0) as i64;
            let channel = rng.gen_range(0..3usize);
            let dx = rng.gen_range(-reach..=reach);
            let dy = rng.gen_range(-reach..=reach);
            offset_channel(&mut out, channel, dx, dy);
        }

        if self.scan_lines {
            for y in (1..height).step_by(2) {
                for x in 0..width {
                    let px = out.get_pixel_mut(x, y);
                    px.0[0] = 0;
                    px.0[1] = 0;
                    px.0[2] = 0;
                }
            }
        }

        out
    }
}

/// Rotate the rows in `[y0, y0+band)` horizontally by `offset` pixels,
/// wrapping at the edges.
fn shift_band(img: &mut RgbaImage, y0: u32, band: u32, offset: i64) {
    let (width, height) = img.dimensions();
    let shift_px = offset.rem_euclid(width as i64) as usize;
    if shift_px == 0 {
        return;
    }
    let row_bytes = width as usize * 4;
    let y_end = y0.saturating_add(band).min(height);
    let buf: &mut [u8] = &mut *img;
    for y in y0..y_end {
        let start = y as usize * row_bytes;
        let row = &mut buf[start..start + row_bytes];
        row.rotate_right(shift_px * 4);
    }
}

/// Replace one color channel with a copy of itself sampled at a wrapped
/// (dx, dy) offset. Alpha is left alone.
fn offset_channel(img: &mut RgbaImage, channel: usize, dx: i64, dy: i64) {
    let (width, height) = img.dimensions();
    let src = img.clone();
    for y in 0..height {
        for x in 0..width {
            let sx = (x as i64 + dx).rem_euclid(width as i64) as u32;
            let sy = (y as i64 + dy).rem_euclid(height as i64) as u32;
            img.get_pixel_mut(x, y).0[channel] = src.get_pixel(sx, sy).0[channel];
        }
    }
}
