//! Colour segmentation views: 8-bit HSV (hue halved to fit a byte) and
//! inclusive range masks.

use emio_core::ColorImage;
use image::{GrayImage, Luma, Rgb, RgbImage};

pub const MASK_ON: u8 = 255;

/// Converts an RGB frame to HSV with `H` in `[0, 180)` and `S`, `V` in
/// `[0, 255]`, stored in the three channels of an `RgbImage`.
pub fn rgb_to_hsv(frame: &ColorImage) -> RgbImage {
    let mut hsv = RgbImage::new(frame.width(), frame.height());
    for (dst, src) in hsv.pixels_mut().zip(frame.pixels()) {
        *dst = Rgb(hsv_pixel(src.0));
    }
    hsv
}

fn hsv_pixel([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let v = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let diff = v - min;

    let s = if v > 0.0 { 255.0 * diff / v } else { 0.0 };
    let mut h = if diff == 0.0 {
        0.0
    } else if v == rf {
        60.0 * (gf - bf) / diff
    } else if v == gf {
        120.0 + 60.0 * (bf - rf) / diff
    } else {
        240.0 + 60.0 * (rf - gf) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }

    let h = ((h / 2.0).round() as u32 % 180) as u8;
    [h, s.round() as u8, v as u8]
}

/// Marks pixels whose three channels all lie within `[lower, upper]`.
pub fn in_range(image: &RgbImage, lower: [u8; 3], upper: [u8; 3]) -> GrayImage {
    let mut mask = GrayImage::new(image.width(), image.height());
    for (dst, src) in mask.pixels_mut().zip(image.pixels()) {
        let inside = (0..3).all(|c| src.0[c] >= lower[c] && src.0[c] <= upper[c]);
        *dst = Luma([if inside { MASK_ON } else { 0 }]);
    }
    mask
}
