//! Dynamic-object mask preparation.
//!
//! The segmentation mask of a frame is grown by a morphological dilation so
//! that object borders, segmentation noise and motion blur around moving
//! objects are covered, then binarized. The binary mask goes to the tracker;
//! a second mask derived from it selects the depth pixels that are forced to
//! the invalid sentinel.

use opencv::core::{self, Mat, Point, Scalar, Size, Vector};
use opencv::imgproc;
use opencv::prelude::*;
use serde::Deserialize;
use tracing::trace;

/// Depth value written at invalidated pixels.
pub const INVALID_DEPTH: f64 = 1.0;

/// Default radius of the elliptical structuring element.
pub const DEFAULT_DILATION_SIZE: i32 = 15;

/// Default reference resolution of the mask canvas (rows, cols).
pub const DEFAULT_CANVAS: (i32, i32) = (480, 640);

/// Which depth pixels are forced to [`INVALID_DEPTH`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthInvalidation {
    /// Pixels outside the dilated dynamic mask.
    #[default]
    Static,
    /// Pixels inside the dilated dynamic mask.
    Dynamic,
}

/// Parameters of the mask transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskConfig {
    /// Radius `r` of the (2r+1)x(2r+1) elliptical kernel.
    pub dilation_size: i32,
    pub canvas_rows: i32,
    pub canvas_cols: i32,
    /// Dilated intensities strictly above this are dynamic.
    pub threshold: f64,
    pub invalidation: DepthInvalidation,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            dilation_size: DEFAULT_DILATION_SIZE,
            canvas_rows: DEFAULT_CANVAS.0,
            canvas_cols: DEFAULT_CANVAS.1,
            threshold: 0.0,
            invalidation: DepthInvalidation::default(),
        }
    }
}

/// Turns raw segmentation masks into dynamic masks and punches depth holes.
///
/// Buffers are kept between frames; every buffer is fully rewritten by each
/// call so nothing leaks from one frame into the next.
pub struct MaskTransformer {
    config: MaskConfig,
    kernel: Mat,
    gray: Mat,
    dilated: Mat,
    dynamic: Mat,
    invalid: Mat,
    resized: Mat,
}

impl MaskTransformer {
    pub fn new(config: MaskConfig) -> opencv::Result<Self> {
        let r = config.dilation_size.max(0);
        let kernel = imgproc::get_structuring_element(
            imgproc::MORPH_ELLIPSE,
            Size::new(2 * r + 1, 2 * r + 1),
            Point::new(r, r),
        )?;
        let dynamic = Mat::new_rows_cols_with_default(
            config.canvas_rows,
            config.canvas_cols,
            core::CV_8UC1,
            Scalar::all(1.0),
        )?;

        Ok(Self {
            config,
            kernel,
            gray: Mat::default(),
            dilated: Mat::default(),
            dynamic,
            invalid: Mat::default(),
            resized: Mat::default(),
        })
    }

    /// Dilate and binarize `raw_mask`, then invalidate `depth` according to
    /// the configured policy.
    ///
    /// Returns the dynamic mask (1 = dynamic, 0 = static) at the resolution of
    /// `depth`. The raw mask is always processed at its native resolution; if
    /// `depth` was rescaled, the binary masks are resampled to match it.
    pub fn apply(&mut self, raw_mask: &Mat, depth: &mut Mat) -> opencv::Result<&Mat> {
        self.to_gray(raw_mask)?;

        imgproc::dilate(
            &self.gray,
            &mut self.dilated,
            &self.kernel,
            Point::new(-1, -1),
            1,
            core::BORDER_CONSTANT,
            imgproc::morphology_default_border_value()?,
        )?;
        imgproc::threshold(
            &self.dilated,
            &mut self.dynamic,
            self.config.threshold,
            1.0,
            imgproc::THRESH_BINARY,
        )?;

        let depth_size = depth.size()?;
        if self.dynamic.size()? != depth_size {
            imgproc::resize(
                &self.dynamic,
                &mut self.resized,
                depth_size,
                0.0,
                0.0,
                imgproc::INTER_NEAREST,
            )?;
            std::mem::swap(&mut self.dynamic, &mut self.resized);
        }

        let invalid_type = match self.config.invalidation {
            DepthInvalidation::Static => imgproc::THRESH_BINARY_INV,
            DepthInvalidation::Dynamic => imgproc::THRESH_BINARY,
        };
        imgproc::threshold(&self.dynamic, &mut self.invalid, 0.0, 255.0, invalid_type)?;
        depth.set_to(&Scalar::all(INVALID_DEPTH), &self.invalid)?;

        trace!(
            "mask: {} dynamic px, {} depth px invalidated",
            core::count_non_zero(&self.dynamic)?,
            core::count_non_zero(&self.invalid)?
        );
        Ok(&self.dynamic)
    }

    /// Normalize the raw mask to single-channel 8-bit.
    ///
    /// Colour masks collapse to the per-pixel maximum over the colour
    /// channels, so a pixel is non-zero when any channel is. Alpha is ignored.
    fn to_gray(&mut self, raw_mask: &Mat) -> opencv::Result<()> {
        let single = if raw_mask.channels() > 1 {
            let mut channels = Vector::<Mat>::new();
            core::split(raw_mask, &mut channels)?;
            let color_channels = if channels.len() == 4 { 3 } else { channels.len() };

            let mut merged = channels.get(0)?;
            for i in 1..color_channels {
                let mut max = Mat::default();
                core::max(&merged, &channels.get(i)?, &mut max)?;
                merged = max;
            }
            merged
        } else {
            raw_mask.try_clone()?
        };

        if single.depth() == core::CV_8U {
            self.gray = single;
        } else {
            single.convert_to(&mut self.gray, core::CV_8U, 1.0, 0.0)?;
        }
        Ok(())
    }
}
