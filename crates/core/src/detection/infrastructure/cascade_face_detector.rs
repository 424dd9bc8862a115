//! Multi-scale Haar cascade face detector.
//!
//! Slides the cascade window over an image pyramid of the grayscale frame,
//! then clusters the raw hits so only corroborated faces are reported.
use image::{GrayImage, Luma};

use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::constants::{GROUP_EPS, MIN_FACE_SIZE, MIN_NEIGHBORS, SCALE_FACTOR};
use crate::shared::frame::Frame;
use crate::shared::region::Region;

use super::haar_cascade::{HaarCascade, WindowVerdict};
use super::integral_image::IntegralImage;
use super::region_grouper::RegionGrouper;

/// Tunable knobs of the multi-scale search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionParams {
    /// Each pyramid level searches windows this much larger than the last.
    pub scale_factor: f64,
    /// A face needs more than this many overlapping raw hits.
    pub min_neighbors: usize,
    /// Smallest reported face, in pixels, for both width and height.
    pub min_size: u32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            scale_factor: SCALE_FACTOR,
            min_neighbors: MIN_NEIGHBORS,
            min_size: MIN_FACE_SIZE,
        }
    }
}

pub struct CascadeFaceDetector {
    cascade: HaarCascade,
    params: DetectionParams,
    grouper: RegionGrouper,
}

impl CascadeFaceDetector {
    pub fn new(cascade: HaarCascade) -> Self {
        let params = DetectionParams::default();
        Self {
            cascade,
            params,
            grouper: RegionGrouper::new(params.min_neighbors, GROUP_EPS),
        }
    }

    /// Pyramid factors worth searching for an image of the given size.
    ///
    /// Stops once the scaled window no longer fits the image; skips levels
    /// whose window is still below `min_size`.
    fn scales(&self, width: u32, height: u32) -> Vec<f64> {
        let (ww, wh) = (
            self.cascade.window_width() as f64,
            self.cascade.window_height() as f64,
        );
        let min = f64::from(self.params.min_size);
        let mut scales = Vec::new();
        let mut factor = 1.0f64;
        loop {
            let win_w = (ww * factor).round();
            let win_h = (wh * factor).round();
            if win_w > f64::from(width) || win_h > f64::from(height) {
                break;
            }
            let scaled_w = (f64::from(width) / factor).round();
            let scaled_h = (f64::from(height) / factor).round();
            if scaled_w < ww || scaled_h < wh {
                break;
            }
            if win_w >= min && win_h >= min {
                scales.push(factor);
            }
            factor *= self.params.scale_factor;
        }
        scales
    }

    /// Raw cascade hits at one pyramid level, in frame coordinates.
    fn scan_level(&self, gray: &GrayImage, factor: f64, hits: &mut Vec<Region>) {
        let scaled_w = (f64::from(gray.width()) / factor).round() as u32;
        let scaled_h = (f64::from(gray.height()) / factor).round() as u32;
        let level = if scaled_w == gray.width() && scaled_h == gray.height() {
            gray.clone()
        } else {
            resize_bilinear(gray, scaled_w, scaled_h)
        };
        let ii = IntegralImage::new(&level);

        let (ww, wh) = (self.cascade.window_width(), self.cascade.window_height());
        let win_w = (ww as f64 * factor).round() as i32;
        let win_h = (wh as f64 * factor).round() as i32;
        let step = if factor > 2.0 { 1 } else { 2 };
        let max_x = ii.width() - ww;
        let max_y = ii.height() - wh;

        for y in (0..=max_y).step_by(step) {
            let mut x = 0;
            while x <= max_x {
                match self.cascade.classify(&ii, x, y) {
                    WindowVerdict::Accepted => hits.push(Region::new(
                        (x as f64 * factor).round() as i32,
                        (y as f64 * factor).round() as i32,
                        win_w,
                        win_h,
                    )),
                    // Nothing near a first-stage reject is worth a look.
                    WindowVerdict::Rejected(0) => x += step,
                    WindowVerdict::Rejected(_) | WindowVerdict::Flat => {}
                }
                x += step;
            }
        }
    }
}

/// BT.601 luma with OpenCV's fixed-point weights.
pub fn to_grayscale(frame: &Frame) -> Result<GrayImage, Box<dyn std::error::Error>> {
    let channels = frame.channels();
    if !matches!(channels, 1 | 3 | 4) {
        return Err(format!("unsupported channel count {channels}").into());
    }
    if !frame.is_well_formed() {
        return Err(format!(
            "frame holds {} bytes, {}x{}x{channels} needs {}",
            frame.data().len(),
            frame.width(),
            frame.height(),
            frame.expected_len()
        )
        .into());
    }
    let pixels = frame.as_ndarray()?;
    let gray = GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        let px = pixels.slice(ndarray::s![y as usize, x as usize, ..]);
        let luma = if channels == 1 {
            px[0]
        } else {
            let (r, g, b) = (u32::from(px[0]), u32::from(px[1]), u32::from(px[2]));
            ((r * 4899 + g * 9617 + b * 1868 + (1 << 13)) >> 14) as u8
        };
        Luma([luma])
    });
    Ok(gray)
}

/// Plain bilinear resampling with pixel centres aligned (`INTER_LINEAR`).
///
/// Unlike a filtered resize, each output pixel reads only its four nearest
/// source pixels, also when shrinking.
fn resize_bilinear(src: &GrayImage, width: u32, height: u32) -> GrayImage {
    let sx = f64::from(src.width()) / f64::from(width);
    let sy = f64::from(src.height()) / f64::from(height);
    let (max_x, max_y) = (src.width() - 1, src.height() - 1);

    // Source index pair and weight of the second sample, per axis.
    let taps = |dst: u32, scale: f64, max: u32| -> (u32, u32, f64) {
        let pos = ((f64::from(dst) + 0.5) * scale - 0.5).max(0.0);
        let i0 = (pos.floor() as u32).min(max);
        let i1 = (i0 + 1).min(max);
        (i0, i1, pos - f64::from(i0))
    };
    let cols: Vec<_> = (0..width).map(|x| taps(x, sx, max_x)).collect();
    let rows: Vec<_> = (0..height).map(|y| taps(y, sy, max_y)).collect();

    GrayImage::from_fn(width, height, |x, y| {
        let (x0, x1, fx) = cols[x as usize];
        let (y0, y1, fy) = rows[y as usize];
        let px = |x, y| f64::from(src.get_pixel(x, y).0[0]);
        let top = px(x0, y0) * (1.0 - fx) + px(x1, y0) * fx;
        let bottom = px(x0, y1) * (1.0 - fx) + px(x1, y1) * fx;
        Luma([(top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8])
    })
}

impl FaceDetector for CascadeFaceDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }
        let gray = to_grayscale(frame)?;

        let mut hits = Vec::new();
        for factor in self.scales(frame.width(), frame.height()) {
            self.scan_level(&gray, factor, &mut hits);
        }

        let faces: Vec<Region> = self
            .grouper
            .group(&hits)
            .into_iter()
            .filter_map(|r| r.clamp_to(frame.width(), frame.height()))
            .collect();
        log::debug!(
            "{} raw hits grouped into {} faces ({}x{})",
            hits.len(),
            faces.len(),
            frame.width(),
            frame.height()
        );
        Ok(faces)
    }
}
