//! Depth sampling helpers for marker footprints.

use emio_core::{DepthImage, PixelCoordinates, Real};

/// Depth at the pixel containing `pixel` (coordinates truncated), `None`
/// outside the frame or where the sensor has no return.
pub fn depth_at(depth: &DepthImage, pixel: &PixelCoordinates) -> Option<Real> {
    if !(pixel.x >= 0.0 && pixel.y >= 0.0) {
        return None;
    }
    let (x, y) = (pixel.x as u32, pixel.y as u32);
    if x >= depth.width() || y >= depth.height() {
        return None;
    }
    let value = depth.get_pixel(x, y).0[0] as Real;
    (value > 0.0).then_some(value)
}

/// Even-odd point in polygon test.
pub fn polygon_contains(polygon: &[PixelCoordinates], x: Real, y: Real) -> bool {
    let mut inside = false;
    let mut j = polygon.len().wrapping_sub(1);
    for i in 0..polygon.len() {
        let (a, b) = (&polygon[i], &polygon[j]);
        if (a.y > y) != (b.y > y) && x < (b.x - a.x) * (y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Median of the valid depth samples whose pixel centre falls inside
/// `polygon`. Pixels without a return do not vote.
pub fn median_depth_in_polygon(depth: &DepthImage, polygon: &[PixelCoordinates]) -> Option<Real> {
    if polygon.len() < 3 || depth.width() == 0 || depth.height() == 0 {
        return None;
    }
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (Real::MAX, Real::MAX, Real::MIN, Real::MIN);
    for p in polygon {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    let x0 = min_x.floor().max(0.0) as u32;
    let y0 = min_y.floor().max(0.0) as u32;
    let x1 = (max_x.ceil().max(0.0) as u32).min(depth.width().saturating_sub(1));
    let y1 = (max_y.ceil().max(0.0) as u32).min(depth.height().saturating_sub(1));

    let mut samples = vec![];
    for y in y0..=y1 {
        for x in x0..=x1 {
            let value = depth.get_pixel(x, y).0[0];
            if value > 0.0 && polygon_contains(polygon, x as Real + 0.5, y as Real + 0.5) {
                samples.push(value as Real);
            }
        }
    }
    median(&mut samples)
}

fn median(samples: &mut [Real]) -> Option<Real> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_by(|a, b| a.total_cmp(b));
    let mid = samples.len() / 2;
    if samples.len() % 2 == 0 {
        Some((samples[mid - 1] + samples[mid]) / 2.0)
    } else {
        Some(samples[mid])
    }
}
