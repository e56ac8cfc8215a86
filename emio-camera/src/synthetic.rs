//! A simulated depth camera, marker detector and tracked target, for
//! demos and tests without hardware.

use std::{sync::Arc, thread, time::Duration};

use emio_calibration::RigidTransform;
use emio_core::{
    ColorImage, DepthDevice, DepthImage, DetectedMarker, DeviceFactory, Intrinsics,
    MarkerDetector, PixelCoordinates, PointCoordinates, Real,
};
use emio_sensor::PinholeCamera;
use image::{Luma, Rgb};

const BACKGROUND: Rgb<u8> = Rgb([110, 110, 110]);
const TARGET: Rgb<u8> = Rgb([30, 220, 50]);

/// A disc of tracker colour at a fixed depth.
#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticTarget {
    pub center: PixelCoordinates,
    pub radius: Real,
    pub depth: f32,
}

#[derive(Clone, Debug)]
pub struct SyntheticScene {
    pub intrinsics: Intrinsics,
    /// Depth of everything that is neither a target nor a marker, `0`
    /// for no return.
    pub background_depth: f32,
    pub targets: Vec<SyntheticTarget>,
    /// Markers the detector reports, with the depth painted under them.
    pub markers: Vec<(DetectedMarker, f32)>,
}

impl SyntheticScene {
    pub fn new(intrinsics: Intrinsics) -> Self {
        Self {
            intrinsics,
            background_depth: 0.0,
            targets: vec![],
            markers: vec![],
        }
    }

    pub fn with_background_depth(mut self, depth: f32) -> Self {
        self.background_depth = depth;
        self
    }

    pub fn with_target(mut self, center: PixelCoordinates, radius: Real, depth: f32) -> Self {
        self.targets.push(SyntheticTarget {
            center,
            radius,
            depth,
        });
        self
    }

    /// Places square markers `0..anchors.len()` where the anchors appear
    /// when the fixture sits at `camera_from_world`. Anchors behind the
    /// camera are skipped.
    pub fn with_marker_fixture(
        mut self,
        anchors: &[PointCoordinates],
        camera_from_world: &RigidTransform,
        half_size: Real,
    ) -> Self {
        let camera = PinholeCamera::from_intrinsics(&self.intrinsics);
        for (id, anchor) in anchors.iter().enumerate() {
            let Some((pixel, depth)) = camera.project(&camera_from_world.apply(anchor)) else {
                log::warn!("anchor {id} is not visible from the synthetic camera");
                continue;
            };
            let (cx, cy) = (pixel.x.round(), pixel.y.round());
            let marker = DetectedMarker::new(
                id as i32,
                [
                    PixelCoordinates::new(cx - half_size, cy - half_size),
                    PixelCoordinates::new(cx + half_size, cy - half_size),
                    PixelCoordinates::new(cx + half_size, cy + half_size),
                    PixelCoordinates::new(cx - half_size, cy + half_size),
                ],
            );
            self.markers.push((marker, depth as f32));
        }
        self
    }

    pub fn render_color(&self) -> ColorImage {
        let mut frame = ColorImage::from_pixel(
            self.intrinsics.width as u32,
            self.intrinsics.height as u32,
            BACKGROUND,
        );
        let dimensions = frame.dimensions();
        for target in &self.targets {
            paint_disc(target, |x, y| frame.put_pixel(x, y, TARGET), dimensions);
        }
        frame
    }

    pub fn render_depth(&self) -> DepthImage {
        let mut depth = DepthImage::from_pixel(
            self.intrinsics.width as u32,
            self.intrinsics.height as u32,
            Luma([self.background_depth]),
        );
        let dimensions = depth.dimensions();
        for (marker, value) in &self.markers {
            // one pixel of margin around the footprint
            let lo = marker.corners[0].map(|c| (c - 1.0).max(0.0) as u32);
            let hi = marker.corners[2].map(|c| (c + 1.0).max(0.0) as u32);
            for y in lo.y..=hi.y.min(dimensions.1.saturating_sub(1)) {
                for x in lo.x..=hi.x.min(dimensions.0.saturating_sub(1)) {
                    depth.put_pixel(x, y, Luma([*value]));
                }
            }
        }
        for target in &self.targets {
            paint_disc(target, |x, y| depth.put_pixel(x, y, Luma([target.depth])), dimensions);
        }
        depth
    }
}

fn paint_disc(target: &SyntheticTarget, mut put: impl FnMut(u32, u32), (width, height): (u32, u32)) {
    let r = target.radius;
    let y0 = (target.center.y - r).floor().max(0.0) as u32;
    let x0 = (target.center.x - r).floor().max(0.0) as u32;
    let y1 = ((target.center.y + r).ceil().max(0.0) as u32).min(height.saturating_sub(1));
    let x1 = ((target.center.x + r).ceil().max(0.0) as u32).min(width.saturating_sub(1));
    for y in y0..=y1 {
        for x in x0..=x1 {
            let offset = PixelCoordinates::new(x as Real, y as Real) - target.center;
            if offset.norm() <= r {
                put(x, y);
            }
        }
    }
}

/// Replays a [`SyntheticScene`] at a fixed frame interval.
pub struct SyntheticDevice {
    name: String,
    scene: SyntheticScene,
    frame_interval: Duration,
    color: ColorImage,
    depth: DepthImage,
    frames: u64,
}

impl SyntheticDevice {
    pub fn new(name: impl Into<String>, scene: SyntheticScene, frame_interval: Duration) -> Self {
        Self {
            name: name.into(),
            color: ColorImage::default(),
            depth: DepthImage::default(),
            scene,
            frame_interval,
            frames: 0,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl DepthDevice for SyntheticDevice {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn intrinsics(&self) -> Intrinsics {
        self.scene.intrinsics
    }

    fn refresh(&mut self) -> anyhow::Result<()> {
        thread::sleep(self.frame_interval);
        if self.frames == 0 {
            self.color = self.scene.render_color();
            self.depth = self.scene.render_depth();
        }
        self.frames += 1;
        Ok(())
    }

    fn read_color_frame(&self) -> ColorImage {
        self.color.clone()
    }

    fn read_depth_frame(&self) -> DepthImage {
        self.depth.clone()
    }

    fn close(&mut self) {
        log::debug!("synthetic camera {} closed after {} frames", self.name, self.frames);
    }
}

/// Builds [`SyntheticDevice`]s for any requested identifier.
#[derive(Clone, Debug)]
pub struct SyntheticFactory {
    pub scene: SyntheticScene,
    pub frame_interval: Duration,
    /// Time the device takes to come up.
    pub startup_delay: Duration,
    /// Identifier used when the caller does not ask for a camera.
    pub default_name: String,
}

impl SyntheticFactory {
    pub fn new(scene: SyntheticScene) -> Self {
        Self {
            scene,
            frame_interval: Duration::from_millis(10),
            startup_delay: Duration::ZERO,
            default_name: "synthetic-0".to_owned(),
        }
    }

    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    pub fn into_shared(self) -> Arc<dyn DeviceFactory> {
        Arc::new(self)
    }
}

impl DeviceFactory for SyntheticFactory {
    fn open(&self, camera: Option<&str>) -> anyhow::Result<Box<dyn DepthDevice>> {
        thread::sleep(self.startup_delay);
        let name = camera.unwrap_or(&self.default_name);
        Ok(Box::new(SyntheticDevice::new(
            name,
            self.scene.clone(),
            self.frame_interval,
        )))
    }
}

/// Reports the scene's markers regardless of the frame it is given.
#[derive(Clone, Debug)]
pub struct SyntheticDetector {
    markers: Vec<DetectedMarker>,
}

impl SyntheticDetector {
    pub fn new(scene: &SyntheticScene) -> Self {
        Self {
            markers: scene.markers.iter().map(|(m, _)| m.clone()).collect(),
        }
    }
}

impl MarkerDetector for SyntheticDetector {
    fn detect(&mut self, _frame: &ColorImage) -> anyhow::Result<Vec<DetectedMarker>> {
        Ok(self.markers.clone())
    }
}
