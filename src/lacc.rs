//! Local Adaptive Color Correction (LACC)
//!
//! Pulls the spatial means of the two weaker color channels toward the
//! strongest one, then recomposes the result with the high-frequency detail
//! of the input.
//!
//! ```text
//! L̂      = (L - min L) / (max L - min L)
//! X     += (mean(L̂) - mean(X)) · L̂            until Σ |mean(L̂) - mean(X)| ≤ stop
//! D      = I - G_σ * I
//! w      = I_s ^ 1.2
//! output = clip(D + (1 - w)·I_ct + w·I, 0, 1)
//! ```
//!
//! Input channels are expected in [0, 1].

use image::{DynamicImage, Rgb32FImage};
use tracing::{debug, warn};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::kernel::gaussian_blur;
use crate::plane::{self, Plane};
use crate::{EnhanceError, EnhanceResult};

/// Exponent of the blend weight taken from the weakest channel
const BLEND_EXPONENT: f32 = 1.2;

/// Iterations added on top of the estimate derived from the contraction rate
const ITERATION_SLACK: usize = 64;

/// Bound used when the contraction rate gives no finite estimate
const FALLBACK_ITERATIONS: usize = 10_000;

/// Ceiling on a derived bound
const MAX_DERIVED_ITERATIONS: usize = 10_000_000;

/// What to do when the reference channel is spatially constant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DegeneratePolicy {
    /// Skip the min-max rescale and use the channel as is
    #[default]
    Identity,
    /// Fail with [`EnhanceError::DegenerateChannel`]
    Reject,
}

/// Tuning knobs of the color correction stage
#[derive(Debug, Clone, PartialEq)]
pub struct LaccOptions {
    /// Stop balancing once the summed mean deviation is at most this value
    pub stop_criterion: f64,
    /// Side of the square Gaussian kernel used for the detail layer (odd)
    pub noise_kernel_size: usize,
    /// Standard deviation of the detail-layer Gaussian
    pub noise_std: f32,
    /// Upper bound on balancing iterations
    ///
    /// `None` derives the bound from how fast the loop contracts on the
    /// image at hand, see [`iteration_bound`].
    pub max_iterations: Option<usize>,
    /// How to treat a spatially constant reference channel
    pub degenerate_policy: DegeneratePolicy,
}

impl Default for LaccOptions {
    fn default() -> Self {
        Self {
            stop_criterion: 1e-2,
            noise_kernel_size: 25,
            noise_std: 1.0,
            max_iterations: None,
            degenerate_policy: DegeneratePolicy::Identity,
        }
    }
}

impl LaccOptions {
    /// Check every option before any pixel is touched
    ///
    /// # Errors
    ///
    /// - [`EnhanceError::InvalidStopCriterion`] for a negative or non-finite threshold
    /// - [`EnhanceError::InvalidKernelSize`] for a zero or even kernel side
    /// - [`EnhanceError::InvalidSigma`] for a non-positive or non-finite σ
    pub fn validate(&self) -> EnhanceResult<()> {
        if !(self.stop_criterion >= 0.0 && self.stop_criterion.is_finite()) {
            return Err(EnhanceError::InvalidStopCriterion(self.stop_criterion));
        }
        crate::kernel::gaussian_kernel(self.noise_kernel_size, self.noise_std)?;
        Ok(())
    }
}

/// Channel indices sorted ascending by spatial mean
///
/// Always a permutation of `0, 1, 2`; only [`classify_channels`] builds one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOrder {
    smallest: usize,
    medium: usize,
    largest: usize,
}

impl ChannelOrder {
    /// Index of the channel with the smallest mean
    pub fn smallest(&self) -> usize {
        self.smallest
    }

    /// Index of the channel ranked between the other two
    pub fn medium(&self) -> usize {
        self.medium
    }

    /// The reference channel
    pub fn largest(&self) -> usize {
        self.largest
    }

    /// `[smallest, medium, largest]`
    pub fn as_array(&self) -> [usize; 3] {
        [self.smallest, self.medium, self.largest]
    }
}

/// Outcome of the balancing loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceReport {
    /// Corrective iterations actually performed
    pub iterations: usize,
    /// `|mean_l - mean_m| + |mean_l - mean_s|` when the loop stopped
    pub loss: f64,
    /// The reference channel was constant and left un-normalized
    pub degenerate_reference: bool,
}

/// The three channels after balancing, each still in its own buffer
#[derive(Debug, Clone)]
pub struct BalancedChannels {
    /// Balanced channel that started with the smallest mean
    pub smallest: Plane,
    /// Balanced channel that started with the middle mean
    pub medium: Plane,
    /// Min-max rescaled reference channel
    pub reference: Plane,
    pub report: BalanceReport,
}

/// Output of [`color_correct_full`]
#[derive(Debug, Clone)]
pub struct LaccOutput {
    /// Final corrected image, channels in [0, 1]
    pub image: Rgb32FImage,
    /// Ranking of the input channels by mean
    pub order: ChannelOrder,
    /// How the balancing loop ended
    pub report: BalanceReport,
}

/// Spatial mean of each channel
pub fn channel_means(image: &Rgb32FImage) -> [f64; 3] {
    let channels = plane::split_channels(image);
    [
        plane::mean(&channels[0]),
        plane::mean(&channels[1]),
        plane::mean(&channels[2]),
    ]
}

/// Rank the channels by spatial mean; equal means keep their index order
pub fn classify_channels(image: &Rgb32FImage) -> ChannelOrder {
    order_from_means(channel_means(image))
}

fn order_from_means(means: [f64; 3]) -> ChannelOrder {
    let mut indices = [0usize, 1, 2];
    indices.sort_by(|&a, &b| means[a].total_cmp(&means[b]));
    ChannelOrder {
        smallest: indices[0],
        medium: indices[1],
        largest: indices[2],
    }
}

/// Iterations the balancing loop may take to bring `initial_loss` down to `stop`
///
/// Every correction multiplies both mean deviations by `1 - mean_l`, so the
/// loop needs about `ln(initial_loss / stop) / -ln|1 - mean_l|` steps. A
/// reference that is dark almost everywhere has `mean_l` close to zero and
/// needs many of them. The estimate is doubled and padded for `f32` rounding.
///
/// # Arguments
///
/// * `initial_loss` - Summed mean deviation before the first correction
/// * `mean_l` - Mean of the (rescaled) reference channel
/// * `stop` - Stop criterion
///
/// # Returns
///
/// The derived bound, capped at ten million. A fixed bound of 10 000 is
/// returned when the rate does not contract or `stop` is zero.
pub fn iteration_bound(initial_loss: f64, mean_l: f64, stop: f64) -> usize {
    if initial_loss <= stop {
        return ITERATION_SLACK;
    }

    let rate = (1.0 - mean_l).abs();
    if rate.is_nan() || rate >= 1.0 {
        return FALLBACK_ITERATIONS;
    }
    if rate == 0.0 {
        return 1 + ITERATION_SLACK;
    }

    let expected = (initial_loss / stop).ln() / -rate.ln();
    if !expected.is_finite() {
        return FALLBACK_ITERATIONS;
    }
    let bound = (2.0 * expected.ceil()).min(MAX_DERIVED_ITERATIONS as f64) as usize;
    bound + ITERATION_SLACK
}

/// A min-max range of zero, or NaN from non-finite samples, cannot be rescaled
fn is_degenerate_range(range: f32) -> bool {
    range.is_nan() || range <= 0.0
}

/// Drive the means of the two weaker channels toward the rescaled reference
///
/// Updates are weighted by the rescaled reference so bright reference regions
/// receive proportionally larger corrections.
///
/// # Arguments
///
/// * `channels` - The three planes in original channel order
/// * `order` - Ranking from [`classify_channels`]
/// * `options` - Stop criterion, iteration bound and degenerate policy
///
/// # Returns
///
/// The balanced planes, each in its own buffer, and a [`BalanceReport`].
///
/// # Errors
///
/// - [`EnhanceError::DegenerateChannel`] if the reference channel is constant
///   and the policy is [`DegeneratePolicy::Reject`]
/// - [`EnhanceError::NonConvergence`] if the loss is still above
///   `stop_criterion` once the iteration bound is spent
pub fn balance_channels(
    channels: [Plane; 3],
    order: ChannelOrder,
    options: &LaccOptions,
) -> EnhanceResult<BalancedChannels> {
    let mut channels = channels;
    let mut take = |index: usize| std::mem::replace(&mut channels[index], Plane::new(0, 0));
    let mut smallest = take(order.smallest);
    let mut medium = take(order.medium);
    let mut reference = take(order.largest);

    let (lo, hi) = plane::min_max(&reference);
    let range = hi - lo;
    let degenerate_reference = is_degenerate_range(range);
    if degenerate_reference {
        match options.degenerate_policy {
            DegeneratePolicy::Reject => {
                return Err(EnhanceError::DegenerateChannel {
                    channel: order.largest,
                })
            }
            DegeneratePolicy::Identity => {
                warn!(
                    channel = order.largest,
                    value = lo,
                    "reference channel is constant, skipping min-max rescale"
                );
            }
        }
    } else {
        plane::apply(&mut reference, |v| (v - lo) / range);
    }

    let mean_l = plane::mean(&reference);
    let mut mean_s = plane::mean(&smallest);
    let mut mean_m = plane::mean(&medium);
    let mut iterations = 0;

    let initial_loss = (mean_l - mean_m).abs() + (mean_l - mean_s).abs();
    let max_iterations = options
        .max_iterations
        .unwrap_or_else(|| iteration_bound(initial_loss, mean_l, options.stop_criterion));

    let loss = loop {
        let loss = (mean_l - mean_m).abs() + (mean_l - mean_s).abs();
        if loss <= options.stop_criterion {
            break loss;
        }
        if iterations >= max_iterations {
            return Err(EnhanceError::NonConvergence { iterations, loss });
        }

        let step_s = (mean_l - mean_s) as f32;
        let step_m = (mean_l - mean_m) as f32;
        plane::apply_with(&mut smallest, &reference, |x, l| x + step_s * l);
        plane::apply_with(&mut medium, &reference, |x, l| x + step_m * l);
        mean_s = plane::mean(&smallest);
        mean_m = plane::mean(&medium);
        iterations += 1;
    };

    debug!(
        iterations,
        max_iterations,
        loss,
        mean_l,
        mean_m,
        mean_s,
        "channel balancing converged"
    );

    Ok(BalancedChannels {
        smallest,
        medium,
        reference,
        report: BalanceReport {
            iterations,
            loss,
            degenerate_reference,
        },
    })
}

/// High-frequency residual `I - G * I` of every channel
///
/// # Errors
///
/// Propagates kernel validation errors from [`gaussian_blur`].
pub fn detail_layer(image: &Rgb32FImage, kernel_size: usize, sigma: f32) -> EnhanceResult<[Plane; 3]> {
    let [c0, c1, c2] = plane::split_channels(image);
    let residual = |channel: Plane| -> EnhanceResult<Plane> {
        let blurred = gaussian_blur(&channel, kernel_size, sigma)?;
        Ok(plane::zip_map(&channel, &blurred, |i, g| i - g))
    };
    Ok([residual(c0)?, residual(c1)?, residual(c2)?])
}

/// Write balanced channels back into their original positions
pub fn reassemble(balanced: &BalancedChannels, order: ChannelOrder) -> Rgb32FImage {
    let mut slots = [&balanced.reference; 3];
    slots[order.smallest] = &balanced.smallest;
    slots[order.medium] = &balanced.medium;
    plane::merge_channels(slots)
}

/// Blend corrected and original color, add the detail back, clip to [0, 1]
///
/// The blend weight `w = original[smallest]^1.2` favours the original color
/// where the weakest channel is already strong.
///
/// # Arguments
///
/// * `original` - Input image
/// * `corrected` - Balanced channels written back in original order
/// * `detail` - Per-channel residual from [`detail_layer`]
/// * `smallest` - Index of the channel with the smallest input mean
pub fn compose(
    original: &Rgb32FImage,
    corrected: &Rgb32FImage,
    detail: &[Plane; 3],
    smallest: usize,
) -> Rgb32FImage {
    let (width, height) = original.dimensions();
    let mut output = Rgb32FImage::new(width, height);
    let detail: [&[f32]; 3] = [
        plane::samples(&detail[0]),
        plane::samples(&detail[1]),
        plane::samples(&detail[2]),
    ];

    let blend = |index: usize, out: &mut [f32], orig: &[f32], ct: &[f32]| {
        let w = orig[smallest].max(0.0).powf(BLEND_EXPONENT);
        for channel in 0..3 {
            let value = detail[channel][index] + (1.0 - w) * ct[channel] + w * orig[channel];
            out[channel] = value.clamp(0.0, 1.0);
        }
    };

    let out_raw: &mut [f32] = &mut output;

    #[cfg(feature = "rayon")]
    out_raw
        .par_chunks_exact_mut(3)
        .zip(original.as_raw().par_chunks_exact(3))
        .zip(corrected.as_raw().par_chunks_exact(3))
        .enumerate()
        .for_each(|(index, ((out, orig), ct))| blend(index, out, orig, ct));

    #[cfg(not(feature = "rayon"))]
    out_raw
        .chunks_exact_mut(3)
        .zip(original.as_raw().chunks_exact(3))
        .zip(corrected.as_raw().chunks_exact(3))
        .enumerate()
        .for_each(|(index, ((out, orig), ct))| blend(index, out, orig, ct));

    output
}

/// Color correction returning the image together with the balancing details
///
/// # Arguments
///
/// * `image` - RGB float image, channels in [0, 1]
/// * `options` - Stage options, validated before any pixel is read
///
/// # Returns
///
/// A [`LaccOutput`] with the corrected image, the channel ranking and the
/// balancing report.
///
/// # Errors
///
/// - Option validation errors, see [`LaccOptions::validate`]
/// - [`EnhanceError::EmptyImage`] for a zero-sized image
/// - Balancing errors, see [`balance_channels`]
pub fn color_correct_full(image: &Rgb32FImage, options: &LaccOptions) -> EnhanceResult<LaccOutput> {
    options.validate()?;
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(EnhanceError::EmptyImage);
    }

    let channels = plane::split_channels(image);
    let order = order_from_means([
        plane::mean(&channels[0]),
        plane::mean(&channels[1]),
        plane::mean(&channels[2]),
    ]);
    debug!(?order, "classified channels");

    let balanced = balance_channels(channels, order, options)?;
    let corrected = reassemble(&balanced, order);
    let detail = detail_layer(image, options.noise_kernel_size, options.noise_std)?;

    Ok(LaccOutput {
        image: compose(image, &corrected, &detail, order.smallest),
        order,
        report: balanced.report,
    })
}

/// Color correction of an RGB float image in [0, 1]
///
/// # Errors
///
/// See [`color_correct_full`].
pub fn color_correct_rgb32f(image: &Rgb32FImage, options: &LaccOptions) -> EnhanceResult<Rgb32FImage> {
    color_correct_full(image, options).map(|output| output.image)
}

/// Color correction of a decoded image
///
/// Only three-channel images are accepted; alpha or grayscale inputs are
/// rejected rather than silently converted.
///
/// # Errors
///
/// - [`EnhanceError::InvalidChannelCount`] if the image does not have three channels
/// - Everything [`color_correct_full`] reports
pub fn color_correct(image: &DynamicImage, options: &LaccOptions) -> EnhanceResult<Rgb32FImage> {
    let channels = usize::from(image.color().channel_count());
    if channels != 3 {
        return Err(EnhanceError::InvalidChannelCount(channels));
    }
    color_correct_rgb32f(&image.to_rgb32f(), options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, RgbaImage};

    /// Small deterministic xorshift so test images are reproducible
    struct XorShift(u64);

    impl XorShift {
        fn next_unit(&mut self) -> f32 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            (self.0 >> 40) as f32 / (1u64 << 24) as f32
        }
    }

    fn noisy_image(seed: u64, means: [f32; 3], amplitude: f32) -> Rgb32FImage {
        let mut rng = XorShift(seed);
        Rgb32FImage::from_fn(48, 40, |_, _| {
            let mut pixel = [0.0f32; 3];
            for (channel, value) in pixel.iter_mut().enumerate() {
                let noise = (rng.next_unit() * 2.0 - 1.0) * amplitude;
                *value = (means[channel] + noise).clamp(0.0, 1.0);
            }
            Rgb(pixel)
        })
    }

    fn flat(value: [f32; 3]) -> Rgb32FImage {
        Rgb32FImage::from_pixel(50, 50, Rgb(value))
    }

    #[test]
    fn test_classify_distinct_means() {
        let image = flat([0.8, 0.2, 0.5]);
        let order = classify_channels(&image);
        assert_eq!(order.as_array(), [1, 2, 0]);
    }

    #[test]
    fn test_classify_ties_keep_index_order() {
        let image = flat([0.4, 0.4, 0.4]);
        assert_eq!(classify_channels(&image).as_array(), [0, 1, 2]);

        let image = flat([0.6, 0.3, 0.6]);
        assert_eq!(classify_channels(&image).as_array(), [1, 0, 2]);
    }

    #[test]
    fn test_balance_identical_channels_needs_no_iterations() {
        let image = flat([0.5, 0.5, 0.5]);
        let order = classify_channels(&image);
        let balanced =
            balance_channels(plane::split_channels(&image), order, &LaccOptions::default()).unwrap();

        assert_eq!(balanced.report.iterations, 0);
        assert_eq!(balanced.report.loss, 0.0);
        assert!(balanced.report.degenerate_reference);
    }

    #[test]
    fn test_balance_rejects_constant_reference_when_asked() {
        let image = flat([0.2, 0.7, 0.4]);
        let options = LaccOptions {
            degenerate_policy: DegeneratePolicy::Reject,
            ..LaccOptions::default()
        };
        let order = classify_channels(&image);
        let result = balance_channels(plane::split_channels(&image), order, &options);
        assert!(matches!(
            result,
            Err(EnhanceError::DegenerateChannel { channel: 1 })
        ));
    }

    #[test]
    fn test_balance_converges_reproducibly() {
        let image = noisy_image(0x5eed, [0.2, 0.5, 0.8], 0.15);
        let options = LaccOptions::default();

        let run = || {
            let order = classify_channels(&image);
            assert_eq!(order.as_array(), [0, 1, 2]);
            balance_channels(plane::split_channels(&image), order, &options).unwrap()
        };
        let first = run();
        let second = run();

        assert!(first.report.iterations > 0);
        assert!(first.report.loss <= 1e-2);
        assert_eq!(first.report.iterations, second.report.iterations);
        assert_eq!(first.report.loss, second.report.loss);

        let mean_l = plane::mean(&first.reference);
        let loss = (mean_l - plane::mean(&first.medium)).abs()
            + (mean_l - plane::mean(&first.smallest)).abs();
        assert!(loss <= 1e-2);
    }

    #[test]
    fn test_balance_loss_does_not_increase() {
        let image = noisy_image(7, [0.1, 0.3, 0.9], 0.1);
        let order = classify_channels(&image);
        let mut previous = f64::INFINITY;

        for max_iterations in 0..6 {
            let options = LaccOptions {
                stop_criterion: 0.0,
                max_iterations: Some(max_iterations),
                ..LaccOptions::default()
            };
            match balance_channels(plane::split_channels(&image), order, &options) {
                Err(EnhanceError::NonConvergence { iterations, loss }) => {
                    assert_eq!(iterations, max_iterations);
                    assert!(loss <= previous + 1e-9);
                    previous = loss;
                }
                other => panic!("expected non-convergence, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_balance_reports_non_convergence() {
        let image = noisy_image(11, [0.2, 0.5, 0.8], 0.1);
        let options = LaccOptions {
            stop_criterion: 0.0,
            max_iterations: Some(3),
            ..LaccOptions::default()
        };
        let result = color_correct_rgb32f(&image, &options);
        assert!(matches!(
            result,
            Err(EnhanceError::NonConvergence { iterations: 3, .. })
        ));
    }

    #[test]
    fn test_balance_converges_with_dim_reference() {
        // a single bright pixel in an otherwise constant reference channel
        // leaves mean(L̂) at 1/4096, so each correction shrinks the loss by
        // only 0.02 % and convergence needs roughly 15 000 iterations
        let mut image = Rgb32FImage::from_pixel(64, 64, Rgb([0.2, 0.25, 0.3]));
        image.put_pixel(17, 42, Rgb([0.2, 0.25, 1.0]));
        let order = classify_channels(&image);
        assert_eq!(order.largest(), 2);

        let balanced =
            balance_channels(plane::split_channels(&image), order, &LaccOptions::default()).unwrap();
        assert!(!balanced.report.degenerate_reference);
        assert!(balanced.report.iterations > 10_000);
        assert!(balanced.report.loss <= 1e-2);
    }

    #[test]
    fn test_iteration_bound_follows_contraction_rate() {
        // (1 - 0.5)^n * 1.0 <= 1e-2 needs n = 7
        let bound = iteration_bound(1.0, 0.5, 1e-2);
        assert!(bound >= 7);
        assert!(bound <= 2 * 7 + ITERATION_SLACK);

        let slow = iteration_bound(0.45, 1.0 / 4096.0, 1e-2);
        assert!(slow > 15_000);

        assert_eq!(iteration_bound(0.0, 0.5, 1e-2), ITERATION_SLACK);
        assert_eq!(iteration_bound(1.0, 0.0, 1e-2), FALLBACK_ITERATIONS);
        assert_eq!(iteration_bound(1.0, 0.5, 0.0), FALLBACK_ITERATIONS);
        assert_eq!(iteration_bound(1.0, f64::NAN, 1e-2), FALLBACK_ITERATIONS);
    }

    #[test]
    fn test_degenerate_range() {
        assert!(is_degenerate_range(0.0));
        assert!(is_degenerate_range(-0.0));
        assert!(is_degenerate_range(f32::NAN));
        assert!(!is_degenerate_range(1e-6));
    }

    #[test]
    fn test_detail_layer_reflects_at_edges() {
        let image = Rgb32FImage::from_fn(20, 20, |x, _| {
            let v = x as f32 / 19.0;
            Rgb([v, v, v])
        });
        let taps = crate::kernel::gaussian_kernel(5, 1.0).unwrap();
        let detail = detail_layer(&image, 5, 1.0).unwrap();

        // mirrored neighbours 2, 1, 1, 2 around x = 0 of the ramp
        let expected = -(2.0 * taps[0] + taps[1] + taps[3] + 2.0 * taps[4]) / 19.0;
        assert!((expected + 0.0372).abs() < 1e-3);
        for channel in &detail {
            assert!((channel.get_pixel(0, 7)[0] - expected).abs() < 1e-5);
            assert!(channel.get_pixel(10, 7)[0].abs() < 1e-5);
        }
    }

    #[test]
    fn test_flat_image_is_unchanged() {
        let image = flat([0.5, 0.5, 0.5]);
        let output = color_correct_rgb32f(&image, &LaccOptions::default()).unwrap();
        for pixel in output.pixels() {
            for channel in 0..3 {
                assert!((pixel.0[channel] - 0.5).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_output_range() {
        let image = noisy_image(99, [0.05, 0.6, 0.95], 0.3);
        let output = color_correct_full(&image, &LaccOptions::default()).unwrap();
        assert_eq!(output.image.dimensions(), image.dimensions());
        for pixel in output.image.pixels() {
            for channel in 0..3 {
                assert!((0.0..=1.0).contains(&pixel.0[channel]));
            }
        }
    }

    #[test]
    fn test_correction_reduces_color_cast() {
        let image = noisy_image(3, [0.2, 0.5, 0.8], 0.05);
        let before = channel_means(&image);
        let output = color_correct_rgb32f(&image, &LaccOptions::default()).unwrap();
        let after = channel_means(&output);

        let spread = |m: [f64; 3]| {
            m.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
                - m.iter().cloned().fold(f64::INFINITY, f64::min)
        };
        assert!(spread(after) < spread(before));
    }

    #[test]
    fn test_reassemble_restores_positions() {
        let image = noisy_image(21, [0.7, 0.1, 0.4], 0.05);
        let order = classify_channels(&image);
        assert_eq!(order.as_array(), [1, 2, 0]);
        let balanced =
            balance_channels(plane::split_channels(&image), order, &LaccOptions::default()).unwrap();
        let merged = reassemble(&balanced, order);
        let channels = plane::split_channels(&merged);
        assert_eq!(channels[0].as_raw(), balanced.reference.as_raw());
        assert_eq!(channels[1].as_raw(), balanced.smallest.as_raw());
        assert_eq!(channels[2].as_raw(), balanced.medium.as_raw());
    }

    #[test]
    fn test_rejects_four_channel_input() {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(4, 4));
        let result = color_correct(&image, &LaccOptions::default());
        assert!(matches!(result, Err(EnhanceError::InvalidChannelCount(4))));
    }

    #[test]
    fn test_accepts_rgb8_input() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(30, 30, Rgb([128, 128, 128])));
        let output = color_correct(&image, &LaccOptions::default()).unwrap();
        assert_eq!(output.dimensions(), (30, 30));
    }

    #[test]
    fn test_invalid_options() {
        let image = flat([0.5, 0.5, 0.5]);
        let even = LaccOptions {
            noise_kernel_size: 24,
            ..LaccOptions::default()
        };
        assert!(matches!(
            color_correct_rgb32f(&image, &even),
            Err(EnhanceError::InvalidKernelSize(24))
        ));

        let negative = LaccOptions {
            stop_criterion: -1.0,
            ..LaccOptions::default()
        };
        assert!(matches!(
            color_correct_rgb32f(&image, &negative),
            Err(EnhanceError::InvalidStopCriterion(_))
        ));
    }
}
