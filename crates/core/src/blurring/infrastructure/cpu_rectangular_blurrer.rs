use thiserror::Error;

use crate::blurring::domain::frame_blurrer::FrameBlurrer;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

use super::gaussian::{self, RoiRect};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BlurError {
    #[error("kernel size must be a positive odd integer, got {0}")]
    InvalidKernelSize(usize),
    #[error("region {region:?} lies outside the {width}x{height} frame")]
    RegionOutOfBounds {
        region: Region,
        width: u32,
        height: u32,
    },
    #[error("frame holds {actual} bytes but its dimensions need {expected}")]
    MalformedFrame { actual: usize, expected: usize },
}

/// CPU rectangular blurrer using separable Gaussian blur.
///
/// Blurs the entire rectangular ROI for each region, in order. Regions that
/// overlap are blurred once per region. Every region is checked against the
/// frame before any pixel is written, so an error leaves the frame intact.
#[derive(Debug, Default)]
pub struct CpuRectangularBlurrer;

impl CpuRectangularBlurrer {
    pub fn new() -> Self {
        Self
    }

    fn validate(frame: &Frame, regions: &[Region], kernel_size: usize) -> Result<(), BlurError> {
        if kernel_size == 0 || kernel_size % 2 == 0 {
            return Err(BlurError::InvalidKernelSize(kernel_size));
        }
        if !frame.is_well_formed() {
            return Err(BlurError::MalformedFrame {
                actual: frame.data().len(),
                expected: frame.expected_len(),
            });
        }
        if let Some(bad) = regions
            .iter()
            .find(|r| !r.fits_within(frame.width(), frame.height()))
        {
            return Err(BlurError::RegionOutOfBounds {
                region: *bad,
                width: frame.width(),
                height: frame.height(),
            });
        }
        Ok(())
    }
}

impl FrameBlurrer for CpuRectangularBlurrer {
    fn blur(
        &self,
        frame: &mut Frame,
        regions: &[Region],
        kernel_size: usize,
    ) -> Result<(), Box<dyn std::error::Error>> {
        Self::validate(frame, regions, kernel_size)?;
        if kernel_size == 1 || regions.is_empty() {
            return Ok(());
        }

        let kernel = gaussian::gaussian_kernel_1d(kernel_size);
        let fw = frame.width() as usize;
        let channels = frame.channels() as usize;
        let data = frame.data_mut();

        let mut roi = Vec::new();
        let mut temp = Vec::new();
        for r in regions {
            let rect = RoiRect {
                x: r.x as usize,
                y: r.y as usize,
                w: r.width as usize,
                h: r.height as usize,
            };
            gaussian::extract_roi(data, fw, channels, rect, &mut roi);
            gaussian::separable_gaussian_blur_with_kernel(
                &mut roi, rect.w, rect.h, channels, &kernel, &mut temp,
            );
            gaussian::write_roi_back(data, &roi, fw, channels, rect);
        }

        Ok(())
    }
}
