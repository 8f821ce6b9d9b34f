//! Single-channel scalar fields and the reductions both stages are built on.
//!
//! Every intermediate quantity of the pipeline (a color channel, a block
//! mean, a per-pixel gain) is a [`Plane`]: an owned `f32` buffer with the
//! dimensions of the source image. Color images are split into three
//! independently owned planes and written back explicitly with
//! [`merge_channels`], so no channel is ever reachable through two handles.

use image::{ImageBuffer, Luma, Rgb32FImage};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::{EnhanceError, EnhanceResult};

/// Owned single-channel `f32` field
pub type Plane = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Samples per partial sum. Fixed so that reductions are reproducible
/// regardless of how many threads rayon decides to use.
const REDUCTION_CHUNK: usize = 4096;

/// Build an RGB float image from interleaved samples
///
/// # Errors
///
/// - [`EnhanceError::InvalidChannelCount`] if `channels` is not 3
/// - [`EnhanceError::EmptyImage`] if either dimension is zero
/// - [`EnhanceError::BufferSizeMismatch`] if `data` does not hold
///   `width * height * 3` samples
pub fn rgb32f_from_interleaved(
    width: u32,
    height: u32,
    channels: usize,
    data: Vec<f32>,
) -> EnhanceResult<Rgb32FImage> {
    if channels != 3 {
        return Err(EnhanceError::InvalidChannelCount(channels));
    }
    if width == 0 || height == 0 {
        return Err(EnhanceError::EmptyImage);
    }

    let expected = width as usize * height as usize * channels;
    let actual = data.len();
    if actual != expected {
        return Err(EnhanceError::BufferSizeMismatch { expected, actual });
    }
    Rgb32FImage::from_raw(width, height, data)
        .ok_or(EnhanceError::BufferSizeMismatch { expected, actual })
}

/// Borrow the raw samples of a plane
pub fn samples(plane: &Plane) -> &[f32] {
    plane.as_raw()
}

/// Mutably borrow the raw samples of a plane
pub fn samples_mut(plane: &mut Plane) -> &mut [f32] {
    plane
}

/// Wrap row-major samples into a plane
///
/// Panics if `data` does not hold exactly `width * height` samples; every
/// caller in this crate derives `data` from a plane of the same dimensions.
pub(crate) fn from_samples(width: u32, height: u32, data: Vec<f32>) -> Plane {
    let mut plane = Plane::new(width, height);
    samples_mut(&mut plane).copy_from_slice(&data);
    plane
}

/// Split an RGB float image into three owned planes
pub fn split_channels(image: &Rgb32FImage) -> [Plane; 3] {
    let (width, height) = image.dimensions();
    let mut channels = [
        Plane::new(width, height),
        Plane::new(width, height),
        Plane::new(width, height),
    ];

    for (index, pixel) in image.as_raw().chunks_exact(3).enumerate() {
        for (channel, plane) in channels.iter_mut().enumerate() {
            samples_mut(plane)[index] = pixel[channel];
        }
    }

    channels
}

/// Interleave three planes of equal size back into an RGB float image
pub fn merge_channels(channels: [&Plane; 3]) -> Rgb32FImage {
    let (width, height) = channels[0].dimensions();
    debug_assert!(channels.iter().all(|c| c.dimensions() == (width, height)));

    let mut image = Rgb32FImage::new(width, height);
    let raw: &mut [f32] = &mut image;
    for (index, pixel) in raw.chunks_exact_mut(3).enumerate() {
        for (channel, plane) in channels.iter().enumerate() {
            pixel[channel] = samples(plane)[index];
        }
    }

    image
}

fn sum_f64(values: &[f32], term: impl Fn(f32) -> f64 + Sync + Send) -> f64 {
    #[cfg(feature = "rayon")]
    let partials: Vec<f64> = values
        .par_chunks(REDUCTION_CHUNK)
        .map(|chunk| chunk.iter().map(|&v| term(v)).sum::<f64>())
        .collect();

    #[cfg(not(feature = "rayon"))]
    let partials: Vec<f64> = values
        .chunks(REDUCTION_CHUNK)
        .map(|chunk| chunk.iter().map(|&v| term(v)).sum::<f64>())
        .collect();

    partials.into_iter().sum()
}

/// Spatial mean of a plane, accumulated in `f64`
pub fn mean(plane: &Plane) -> f64 {
    let values = samples(plane);
    if values.is_empty() {
        return 0.0;
    }
    sum_f64(values, f64::from) / values.len() as f64
}

/// Population variance of a plane (unweighted, no floor)
pub fn variance(plane: &Plane) -> f64 {
    let values = samples(plane);
    if values.is_empty() {
        return 0.0;
    }
    let mu = mean(plane);
    sum_f64(values, |v| {
        let d = f64::from(v) - mu;
        d * d
    }) / values.len() as f64
}

/// Smallest and largest sample of a plane
pub fn min_max(plane: &Plane) -> (f32, f32) {
    samples(plane)
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

/// Apply `f` to every sample of `plane` in place
pub fn apply(plane: &mut Plane, f: impl Fn(f32) -> f32 + Sync + Send) {
    #[cfg(feature = "rayon")]
    samples_mut(plane).par_iter_mut().for_each(|v| *v = f(*v));

    #[cfg(not(feature = "rayon"))]
    samples_mut(plane).iter_mut().for_each(|v| *v = f(*v));
}

/// Combine `other` into `target` sample by sample
pub fn apply_with(target: &mut Plane, other: &Plane, f: impl Fn(f32, f32) -> f32 + Sync + Send) {
    debug_assert_eq!(target.dimensions(), other.dimensions());

    #[cfg(feature = "rayon")]
    samples_mut(target)
        .par_iter_mut()
        .zip(samples(other).par_iter())
        .for_each(|(t, &o)| *t = f(*t, o));

    #[cfg(not(feature = "rayon"))]
    samples_mut(target)
        .iter_mut()
        .zip(samples(other).iter())
        .for_each(|(t, &o)| *t = f(*t, o));
}

/// New plane holding `f(a, b)` for every pair of samples
pub fn zip_map(a: &Plane, b: &Plane, f: impl Fn(f32, f32) -> f32 + Sync + Send) -> Plane {
    let mut out = a.clone();
    apply_with(&mut out, b, f);
    out
}

/// New plane holding `f(a, b, c)` for every triple of samples
pub fn zip3_map(
    a: &Plane,
    b: &Plane,
    c: &Plane,
    f: impl Fn(f32, f32, f32) -> f32 + Sync + Send,
) -> Plane {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    debug_assert_eq!(a.dimensions(), c.dimensions());

    let (width, height) = a.dimensions();
    let (sa, sb, sc) = (samples(a), samples(b), samples(c));

    #[cfg(feature = "rayon")]
    let data: Vec<f32> = (0..sa.len())
        .into_par_iter()
        .map(|i| f(sa[i], sb[i], sc[i]))
        .collect();

    #[cfg(not(feature = "rayon"))]
    let data: Vec<f32> = (0..sa.len()).map(|i| f(sa[i], sb[i], sc[i])).collect();

    from_samples(width, height, data)
}
