//! Local adaptive image enhancement library
//!
//! This library implements a two-stage enhancement for single still images:
//! local adaptive color correction (LACC) followed by local adaptive contrast
//! enhancement (LACE).
//!
//! # Overview
//!
//! ## LACC (Local Adaptive Color Correction)
//! Equalizes the spatial means of the three color channels. The channel with
//! the largest mean is min-max rescaled and used as reference; the two other
//! channels are pulled toward it by a fixed-point iteration whose updates are
//! weighted by the reference itself:
//! ```text
//! X += (mean(L̂) - mean(X)) · L̂
//! ```
//! The balanced color is blended with the input and the input's
//! high-frequency detail is added back.
//!
//! ## LACE (Local Adaptive Contrast Enhancement)
//! Works on CIE L\*a\*b\*. Lightness is re-expanded by the ratio of global to
//! block variance, then passed through a guided filter that removes the
//! blocking artifacts of the block statistics:
//! ```text
//! L_eb  = L_mean + min(var(L) / var_B(L), 2) · (L - L_mean)
//! L_out = k · L_eb + b          (per-block linear fit, averaged per pixel)
//! ```
//! Finally the weaker chrominance channel is scaled toward the stronger one.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use adaptive_enhance::{enhance, LaccOptions, LaceOptions};
//!
//! let image = image::open("images/underwater.jpg").unwrap();
//! let result = enhance(&image, &LaccOptions::default(), &LaceOptions::default()).unwrap();
//! result.save("output.jpg").unwrap();
//! ```
//!
//! The stages can also be run separately:
//!
//! ```rust,no_run
//! use adaptive_enhance::{color_correct, contrast_enhance, lab, LaccOptions, LaceOptions};
//!
//! let image = image::open("images/underwater.jpg").unwrap();
//! let corrected = color_correct(&image, &LaccOptions::default()).unwrap();
//! let enhanced = contrast_enhance(&lab::rgb_to_lab(&corrected), &LaceOptions::default()).unwrap();
//! let rgb = lab::lab_to_rgb(&enhanced);
//! ```
//!
//! # Value Ranges
//!
//! - LACC input and output: RGB channels in [0, 1]
//! - LACE input and output: L in [0, 100], a\* and b\* in [-127, 127]
//! - Output is converted to 8-bit RGB [0, 255] only at export time

use image::{DynamicImage, Rgb, Rgb32FImage, RgbImage};

pub mod kernel;
pub mod lab;
pub mod lace;
pub mod lacc;
pub mod plane;

pub use kernel::{BoxKernel, Border};
pub use lace::{
    balance_chroma, contrast_enhance, contrast_enhance_full, expand_contrast, guided_smooth,
    local_extrema, BlockStatistics, ChromaFactors, LaceOptions, LaceOutput, LocalExtrema,
};
pub use lacc::{
    balance_channels, classify_channels, color_correct, color_correct_full,
    color_correct_rgb32f, compose, detail_layer, iteration_bound, BalanceReport, BalancedChannels,
    ChannelOrder, DegeneratePolicy, LaccOptions, LaccOutput,
};
pub use plane::{rgb32f_from_interleaved, Plane};

/// Errors that can occur during enhancement
#[derive(Debug, Clone, PartialEq)]
pub enum EnhanceError {
    /// The reference channel is spatially constant and cannot be min-max rescaled
    DegenerateChannel { channel: usize },
    /// The input does not have exactly three channels
    InvalidChannelCount(usize),
    /// Channel balancing did not reach the stop criterion within the iteration bound
    NonConvergence { iterations: usize, loss: f64 },
    /// A kernel side was zero or even
    InvalidKernelSize(usize),
    /// A Gaussian standard deviation was not positive
    InvalidSigma(f32),
    /// The guided-filter epsilon was negative or not finite
    InvalidEpsilon(f32),
    /// The balancing stop criterion was negative or not finite
    InvalidStopCriterion(f64),
    /// The image has no pixels
    EmptyImage,
    /// A raw sample buffer does not match the declared dimensions
    BufferSizeMismatch { expected: usize, actual: usize },
}

impl std::fmt::Display for EnhanceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnhanceError::DegenerateChannel { channel } => {
                write!(f, "channel {channel} is constant and cannot be normalized")
            }
            EnhanceError::InvalidChannelCount(count) => {
                write!(f, "expected 3 channels, got {count}")
            }
            EnhanceError::NonConvergence { iterations, loss } => write!(
                f,
                "channel balancing did not converge after {iterations} iterations (loss {loss})"
            ),
            EnhanceError::InvalidKernelSize(size) => {
                write!(f, "kernel size must be odd and positive, got {size}")
            }
            EnhanceError::InvalidSigma(value) => write!(f, "sigma must be positive, got {value}"),
            EnhanceError::InvalidEpsilon(value) => {
                write!(f, "epsilon must be finite and non-negative, got {value}")
            }
            EnhanceError::InvalidStopCriterion(value) => {
                write!(f, "stop criterion must be finite and non-negative, got {value}")
            }
            EnhanceError::EmptyImage => write!(f, "image has no pixels"),
            EnhanceError::BufferSizeMismatch { expected, actual } => {
                write!(f, "expected {expected} samples, got {actual}")
            }
        }
    }
}

impl std::error::Error for EnhanceError {}

/// Result type for enhancement operations
pub type EnhanceResult<T> = Result<T, EnhanceError>;

/// Run both stages on an RGB float image in [0, 1]
///
/// LACC, conversion to L\*a\*b\*, LACE and conversion back to sRGB.
///
/// # Errors
///
/// Returns the first error reported by either stage.
pub fn enhance_rgb32f(
    image: &Rgb32FImage,
    lacc: &LaccOptions,
    lace: &LaceOptions,
) -> EnhanceResult<Rgb32FImage> {
    let corrected = color_correct_rgb32f(image, lacc)?;
    let enhanced = contrast_enhance(&lab::rgb_to_lab(&corrected), lace)?;
    Ok(lab::lab_to_rgb(&enhanced))
}

/// Run both stages on a decoded image and quantize to 8-bit RGB
///
/// # Errors
///
/// - [`EnhanceError::InvalidChannelCount`] if the image does not have three channels
/// - Anything [`enhance_rgb32f`] reports
///
/// # Example
///
/// ```rust,no_run
/// use adaptive_enhance::{enhance, LaccOptions, LaceOptions};
///
/// let image = image::open("images/underwater.jpg").unwrap();
/// let lace = LaceOptions { block_size: 31, epsilon: 0.05 };
/// let result = enhance(&image, &LaccOptions::default(), &lace).unwrap();
/// ```
pub fn enhance(
    image: &DynamicImage,
    lacc: &LaccOptions,
    lace: &LaceOptions,
) -> EnhanceResult<RgbImage> {
    let channels = usize::from(image.color().channel_count());
    if channels != 3 {
        return Err(EnhanceError::InvalidChannelCount(channels));
    }
    let rgb = enhance_rgb32f(&image.to_rgb32f(), lacc, lace)?;
    Ok(float_to_rgb8(&rgb))
}

/// Quantize a [0, 1] float image to 8-bit RGB, rounding to nearest
pub fn float_to_rgb8(image: &Rgb32FImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut output = RgbImage::new(width, height);

    for (x, y, pixel) in image.enumerate_pixels() {
        let quantize = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        output.put_pixel(
            x,
            y,
            Rgb([quantize(pixel.0[0]), quantize(pixel.0[1]), quantize(pixel.0[2])]),
        );
    }

    output
}
