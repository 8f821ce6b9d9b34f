//! Local Adaptive Contrast Enhancement (LACE)
//!
//! Operates on a CIE L\*a\*b\* image stored in an [`Rgb32FImage`]
//! (channel 0 = L in [0, 100], channels 1-2 = a\*, b\* in [-127, 127]).
//!
//! Lightness goes through four steps, all built on one `B x B` box kernel:
//!
//! ```text
//! ratio  = min(var(L) / block_var(L), 2)
//! L_eb   = R[ratio]·L + R[(1 - ratio)·block_mean(L)]
//! k      = var_B(L_eb) / (var_B(L_eb) + (max_B - min_B)²·ε)
//! v      = mean_B(L_eb) - k·(mean_B(L_eb) - min_B)
//! L_out  = clip(R[k]·L_eb + R[v - k·min_B], 0, 100)
//! ```
//!
//! where `R[·]` averages a per-block field over every block containing a
//! pixel ([`BoxKernel::redistribute`]). The chrominance channels are then
//! pulled toward each other by [`balance_chroma`].

use std::cmp::Ordering;

use image::Rgb32FImage;
use tracing::debug;

use crate::kernel::BoxKernel;
use crate::plane::{self, Plane};
use crate::{EnhanceError, EnhanceResult};

/// Lower bound on block variance before it is used as a divisor
pub const VARIANCE_FLOOR: f32 = 1e-8;

/// Cap on the per-block contrast gain
pub const MAX_CONTRAST_RATIO: f32 = 2.0;

/// Offset that keeps shifted chrominance strictly positive
const CHROMA_SHIFT: f32 = 128.0;

const LIGHTNESS_RANGE: (f32, f32) = (0.0, 100.0);
const CHROMA_RANGE: (f32, f32) = (-127.0, 127.0);

/// Tuning knobs of the contrast enhancement stage
#[derive(Debug, Clone, PartialEq)]
pub struct LaceOptions {
    /// Side of the square statistics / morphology / guided-filter kernel (odd)
    pub block_size: usize,
    /// Guided-filter regularization, larger means smoother (>= 0)
    pub epsilon: f32,
}

impl Default for LaceOptions {
    fn default() -> Self {
        Self {
            block_size: 25,
            epsilon: 1e-2,
        }
    }
}

impl LaceOptions {
    /// Check the options and build the block kernel they describe
    ///
    /// # Errors
    ///
    /// - [`EnhanceError::InvalidKernelSize`] for a zero or even block size
    /// - [`EnhanceError::InvalidEpsilon`] for a negative or non-finite epsilon
    pub fn validate(&self) -> EnhanceResult<BoxKernel> {
        if !(self.epsilon >= 0.0 && self.epsilon.is_finite()) {
            return Err(EnhanceError::InvalidEpsilon(self.epsilon));
        }
        BoxKernel::centered(self.block_size)
    }
}

/// Dense per-pixel block mean and variance
#[derive(Debug, Clone)]
pub struct BlockStatistics {
    pub mean: Plane,
    /// `mean(I²) - mean(I)²`, floored
    pub variance: Plane,
}

impl BlockStatistics {
    /// Block statistics with the variance floored at [`VARIANCE_FLOOR`]
    pub fn compute(input: &Plane, kernel: &BoxKernel) -> Self {
        Self::with_floor(input, kernel, VARIANCE_FLOOR)
    }

    /// Block statistics with the variance floored at `floor`
    pub fn with_floor(input: &Plane, kernel: &BoxKernel, floor: f32) -> Self {
        let mean = kernel.mean(input);
        let squared = {
            let mut squared = input.clone();
            plane::apply(&mut squared, |v| v * v);
            kernel.mean(&squared)
        };
        let variance = plane::zip_map(&squared, &mean, |sq, m| (sq - m * m).max(floor));
        Self { mean, variance }
    }
}

/// Local minimum and maximum under the block structuring element
#[derive(Debug, Clone)]
pub struct LocalExtrema {
    pub min: Plane,
    pub max: Plane,
}

/// Multiplicative chroma corrections applied by [`balance_chroma`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChromaFactors {
    pub a: f32,
    pub b: f32,
}

/// Output of [`contrast_enhance_full`]
#[derive(Debug, Clone)]
pub struct LaceOutput {
    /// Enhanced L\*a\*b\* image
    pub image: Rgb32FImage,
    /// Contrast-expanded lightness before guided smoothing
    pub expanded: Plane,
    /// Factors applied to a\* and b\*
    pub chroma: ChromaFactors,
}

/// Re-expand lightness by the capped ratio of global to block variance
///
/// Each pixel receives the average of the mappings of every block that
/// contains it.
pub fn expand_contrast(lightness: &Plane, kernel: &BoxKernel) -> Plane {
    let stats = BlockStatistics::compute(lightness, kernel);
    let global_var = plane::variance(lightness) as f32;

    let mut ratio = stats.variance.clone();
    plane::apply(&mut ratio, |block_var| {
        (global_var / block_var).min(MAX_CONTRAST_RATIO)
    });
    let offset = plane::zip_map(&ratio, &stats.mean, |r, m| (1.0 - r) * m);

    let gain = kernel.redistribute(&ratio);
    let offset = kernel.redistribute(&offset);

    debug!(global_var, "expanded block contrast");
    plane::zip3_map(&gain, lightness, &offset, |g, l, o| g * l + o)
}

/// Erosion and dilation of `input` with the block structuring element
pub fn local_extrema(input: &Plane, kernel: &BoxKernel) -> LocalExtrema {
    LocalExtrema {
        min: kernel.erode(input),
        max: kernel.dilate(input),
    }
}

/// Guided-filter smoothing of the contrast-expanded lightness
///
/// The guide is `(L_eb - min) / (max - min)`; the per-block fit is shrunk
/// toward the block mean as `epsilon` grows. A block whose variance and
/// regularizer are both zero gets gain 0 and collapses to its mean.
/// The result is clipped to [0, 100].
///
/// # Arguments
///
/// * `expanded` - Lightness from [`expand_contrast`]
/// * `extrema` - Local minimum and maximum of `expanded`
/// * `kernel` - Block window shared with the statistics stage
/// * `epsilon` - Regularization, scaled by the squared local range
///
/// # Returns
///
/// The smoothed lightness plane.
pub fn guided_smooth(
    expanded: &Plane,
    extrema: &LocalExtrema,
    kernel: &BoxKernel,
    epsilon: f32,
) -> Plane {
    let stats = BlockStatistics::with_floor(expanded, kernel, 0.0);

    let range = plane::zip_map(&extrema.max, &extrema.min, |hi, lo| hi - lo);
    let gain = plane::zip_map(&stats.variance, &range, |var, range| {
        let denom = var + range * range * epsilon;
        if denom > 0.0 {
            var / denom
        } else {
            0.0
        }
    });
    let offset = plane::zip3_map(&stats.mean, &gain, &extrema.min, |mean, k, lo| {
        mean - k * (mean - lo)
    });
    // v - k·min, the offset expressed against L_eb instead of the guide
    let intercept = plane::zip3_map(&offset, &gain, &extrema.min, |v, k, lo| v - k * lo);

    let gain = kernel.redistribute(&gain);
    let intercept = kernel.redistribute(&intercept);

    let (lo, hi) = LIGHTNESS_RANGE;
    plane::zip3_map(&gain, expanded, &intercept, |k, l, b| {
        (k * l + b).clamp(lo, hi)
    })
}

/// Pull the weaker chrominance channel toward the stronger one, in place
///
/// Both channels are shifted by +128 so their means are positive; the
/// smaller-mean channel is scaled by `1 + |mean_a - mean_b| / (mean_a + mean_b)`.
/// Equal means leave both channels untouched. Results are clipped to
/// [-127, 127].
pub fn balance_chroma(a: &mut Plane, b: &mut Plane) -> ChromaFactors {
    let mean_a = plane::mean(a) + f64::from(CHROMA_SHIFT);
    let mean_b = plane::mean(b) + f64::from(CHROMA_SHIFT);
    let denom = mean_a + mean_b;

    let factors = match mean_a.partial_cmp(&mean_b) {
        Some(Ordering::Less) => ChromaFactors {
            a: ((mean_b - mean_a) / denom) as f32,
            b: 0.0,
        },
        Some(Ordering::Greater) => ChromaFactors {
            a: 0.0,
            b: ((mean_a - mean_b) / denom) as f32,
        },
        Some(Ordering::Equal) | None => ChromaFactors { a: 0.0, b: 0.0 },
    };

    let (lo, hi) = CHROMA_RANGE;
    for (channel, factor) in [(a, factors.a), (b, factors.b)] {
        plane::apply(channel, |v| {
            let shifted = v + CHROMA_SHIFT;
            (shifted + factor * shifted - CHROMA_SHIFT).clamp(lo, hi)
        });
    }

    debug!(mean_a, mean_b, factor_a = factors.a, factor_b = factors.b, "balanced chroma");
    factors
}

/// Contrast enhancement returning the intermediate lightness and chroma factors
///
/// # Errors
///
/// - Option validation errors, see [`LaceOptions::validate`]
/// - [`EnhanceError::EmptyImage`] for a zero-sized image
pub fn contrast_enhance_full(lab: &Rgb32FImage, options: &LaceOptions) -> EnhanceResult<LaceOutput> {
    let kernel = options.validate()?;
    let (width, height) = lab.dimensions();
    if width == 0 || height == 0 {
        return Err(EnhanceError::EmptyImage);
    }

    let [lightness, mut a, mut b] = plane::split_channels(lab);

    let expanded = expand_contrast(&lightness, &kernel);
    let extrema = local_extrema(&expanded, &kernel);
    let smoothed = guided_smooth(&expanded, &extrema, &kernel, options.epsilon);
    let chroma = balance_chroma(&mut a, &mut b);

    Ok(LaceOutput {
        image: plane::merge_channels([&smoothed, &a, &b]),
        expanded,
        chroma,
    })
}

/// Contrast enhancement of an L\*a\*b\* image
///
/// # Errors
///
/// See [`contrast_enhance_full`].
pub fn contrast_enhance(lab: &Rgb32FImage, options: &LaceOptions) -> EnhanceResult<Rgb32FImage> {
    contrast_enhance_full(lab, options).map(|output| output.image)
}
