//! Square window primitives over [`Plane`]s: box mean, erosion, dilation and
//! the Gaussian blur used for the detail layer.
//!
//! A [`BoxKernel`] is an odd `B x B` window with an anchor. Filtering follows
//! correlation semantics: the output at `x` covers the samples
//! `x - anchor ..= x - anchor + B - 1` in both directions. Filtering with the
//! flipped anchor `B - anchor - 1` instead visits every window that *contains*
//! `x`, which is how per-block quantities are averaged back onto pixels
//! (see [`BoxKernel::redistribute`]).

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::plane::{self, Plane};
use crate::{EnhanceError, EnhanceResult};

/// How samples outside the image are synthesized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Border {
    /// `aaa|abcd|ddd`
    Replicate,
    /// `dcb|abcd|cba`
    Reflect101,
}

impl Border {
    fn index(self, i: isize, len: usize) -> usize {
        let last = len as isize - 1;
        match self {
            Border::Replicate => i.clamp(0, last) as usize,
            Border::Reflect101 => {
                if len == 1 {
                    return 0;
                }
                let period = 2 * last;
                let i = i.rem_euclid(period);
                (if i > last { period - i } else { i }) as usize
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum WindowOp<'a> {
    Mean,
    Min,
    Max,
    /// Weighted sum with one tap per window position
    Weighted(&'a [f32]),
}

/// Odd square box window with an anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxKernel {
    size: usize,
    anchor: usize,
}

impl BoxKernel {
    /// Box of side `size` anchored at its centre, `(size + 1) / 2 - 1`
    ///
    /// # Errors
    ///
    /// Returns [`EnhanceError::InvalidKernelSize`] if `size` is zero or even.
    pub fn centered(size: usize) -> EnhanceResult<Self> {
        validate_kernel_size(size)?;
        Ok(Self {
            size,
            anchor: (size + 1) / 2 - 1,
        })
    }

    /// Box of side `size` with an explicit anchor
    ///
    /// # Errors
    ///
    /// Returns [`EnhanceError::InvalidKernelSize`] if `size` is zero or even,
    /// or if `anchor` falls outside the window.
    pub fn with_anchor(size: usize, anchor: usize) -> EnhanceResult<Self> {
        validate_kernel_size(size)?;
        if anchor >= size {
            return Err(EnhanceError::InvalidKernelSize(size));
        }
        Ok(Self { size, anchor })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn anchor(&self) -> usize {
        self.anchor
    }

    /// The same window with its anchor mirrored, `size - anchor - 1`
    pub fn flipped(&self) -> Self {
        Self {
            size: self.size,
            anchor: self.size - self.anchor - 1,
        }
    }

    /// Normalized box filter: the window mean at every pixel
    pub fn mean(&self, input: &Plane) -> Plane {
        self.filter(input, WindowOp::Mean, Border::Reflect101)
    }

    /// Average a per-block field over every block that contains each pixel
    ///
    /// A value computed for the block anchored at `p` belongs to all pixels
    /// of that block. Box filtering with the flipped anchor gathers, for
    /// each pixel, the values of exactly those blocks.
    pub fn redistribute(&self, per_block: &Plane) -> Plane {
        self.flipped().mean(per_block)
    }

    /// Morphological erosion (window minimum), edges replicated
    pub fn erode(&self, input: &Plane) -> Plane {
        self.filter(input, WindowOp::Min, Border::Replicate)
    }

    /// Morphological dilation (window maximum), edges replicated
    pub fn dilate(&self, input: &Plane) -> Plane {
        self.filter(input, WindowOp::Max, Border::Replicate)
    }

    fn filter(&self, input: &Plane, op: WindowOp<'_>, border: Border) -> Plane {
        let (width, height) = input.dimensions();
        let (w, h) = (width as usize, height as usize);
        if w == 0 || h == 0 {
            return input.clone();
        }

        let rows = self.horizontal_pass(plane::samples(input), w, h, op, border);
        let columns = self.horizontal_pass(&transpose(&rows, w, h), h, w, op, border);
        plane::from_samples(width, height, transpose(&columns, h, w))
    }

    fn horizontal_pass(
        &self,
        src: &[f32],
        width: usize,
        height: usize,
        op: WindowOp<'_>,
        border: Border,
    ) -> Vec<f32> {
        let mut out = vec![0.0f32; width * height];

        #[cfg(feature = "rayon")]
        out.par_chunks_mut(width)
            .zip(src.par_chunks(width))
            .for_each(|(dst, row)| self.filter_line(dst, row, op, border));

        #[cfg(not(feature = "rayon"))]
        out.chunks_mut(width)
            .zip(src.chunks(width))
            .for_each(|(dst, row)| self.filter_line(dst, row, op, border));

        out
    }

    fn filter_line(&self, dst: &mut [f32], row: &[f32], op: WindowOp<'_>, border: Border) {
        let len = row.len();
        let padded: Vec<f32> = (0..len + self.size - 1)
            .map(|i| row[border.index(i as isize - self.anchor as isize, len)])
            .collect();

        match op {
            WindowOp::Mean => {
                let mut prefix = Vec::with_capacity(padded.len() + 1);
                prefix.push(0.0f64);
                let mut acc = 0.0f64;
                for &v in &padded {
                    acc += f64::from(v);
                    prefix.push(acc);
                }
                let norm = self.size as f64;
                for (x, d) in dst.iter_mut().enumerate() {
                    *d = ((prefix[x + self.size] - prefix[x]) / norm) as f32;
                }
            }
            WindowOp::Min => {
                for (x, d) in dst.iter_mut().enumerate() {
                    *d = padded[x..x + self.size]
                        .iter()
                        .fold(f32::INFINITY, |a, &b| a.min(b));
                }
            }
            WindowOp::Max => {
                for (x, d) in dst.iter_mut().enumerate() {
                    *d = padded[x..x + self.size]
                        .iter()
                        .fold(f32::NEG_INFINITY, |a, &b| a.max(b));
                }
            }
            WindowOp::Weighted(taps) => {
                debug_assert_eq!(taps.len(), self.size);
                for (x, d) in dst.iter_mut().enumerate() {
                    *d = padded[x..x + self.size]
                        .iter()
                        .zip(taps)
                        .map(|(&v, &t)| f64::from(v) * f64::from(t))
                        .sum::<f64>() as f32;
                }
            }
        }
    }
}

fn validate_kernel_size(size: usize) -> EnhanceResult<()> {
    if size == 0 || size % 2 == 0 {
        return Err(EnhanceError::InvalidKernelSize(size));
    }
    Ok(())
}

fn transpose(src: &[f32], width: usize, height: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; width * height];
    for y in 0..height {
        for x in 0..width {
            out[x * height + y] = src[y * width + x];
        }
    }
    out
}

/// Normalized 1D Gaussian taps of length `size` and standard deviation `sigma`
///
/// # Errors
///
/// - [`EnhanceError::InvalidKernelSize`] if `size` is zero or even
/// - [`EnhanceError::InvalidSigma`] if `sigma` is not a positive finite number
pub fn gaussian_kernel(size: usize, sigma: f32) -> EnhanceResult<Vec<f32>> {
    validate_kernel_size(size)?;
    if !(sigma > 0.0 && sigma.is_finite()) {
        return Err(EnhanceError::InvalidSigma(sigma));
    }

    let centre = (size as f64 - 1.0) / 2.0;
    let two_sigma_sq = 2.0 * f64::from(sigma) * f64::from(sigma);
    let taps: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - centre;
            (-(d * d) / two_sigma_sq).exp()
        })
        .collect();
    let total: f64 = taps.iter().sum();

    Ok(taps.into_iter().map(|t| (t / total) as f32).collect())
}

/// Blur a plane with a `size x size` Gaussian of standard deviation `sigma`
///
/// The kernel is applied separably, centred on each pixel, with the border
/// mirrored without repeating the edge sample (`dcb|abcd|cba`), the same
/// border [`BoxKernel::mean`] uses.
///
/// # Arguments
///
/// * `input` - Plane to blur
/// * `size` - Side of the square kernel (odd)
/// * `sigma` - Standard deviation of the Gaussian in pixels
///
/// # Returns
///
/// A new plane with the same dimensions as `input`.
///
/// # Errors
///
/// See [`gaussian_kernel`].
pub fn gaussian_blur(input: &Plane, size: usize, sigma: f32) -> EnhanceResult<Plane> {
    let taps = gaussian_kernel(size, sigma)?;
    let kernel = BoxKernel::centered(size)?;
    Ok(kernel.filter(input, WindowOp::Weighted(&taps), Border::Reflect101))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn ramp(width: u32, height: u32) -> Plane {
        Plane::from_fn(width, height, |x, y| Luma([(y * width + x) as f32]))
    }

    #[test]
    fn test_centered_anchor() {
        let kernel = BoxKernel::centered(25).unwrap();
        assert_eq!(kernel.anchor(), 12);
        assert_eq!(kernel.flipped(), kernel);
    }

    #[test]
    fn test_flipped_anchor() {
        let kernel = BoxKernel::with_anchor(5, 0).unwrap();
        assert_eq!(kernel.flipped().anchor(), 4);
        assert_eq!(kernel.flipped().flipped(), kernel);
    }

    #[test]
    fn test_invalid_kernel_sizes() {
        assert!(matches!(
            BoxKernel::centered(0),
            Err(EnhanceError::InvalidKernelSize(0))
        ));
        assert!(matches!(
            BoxKernel::centered(4),
            Err(EnhanceError::InvalidKernelSize(4))
        ));
        assert!(BoxKernel::with_anchor(3, 3).is_err());
    }

    #[test]
    fn test_border_indices() {
        assert_eq!(Border::Replicate.index(-2, 4), 0);
        assert_eq!(Border::Replicate.index(5, 4), 3);
        assert_eq!(Border::Reflect101.index(-1, 4), 1);
        assert_eq!(Border::Reflect101.index(-2, 4), 2);
        assert_eq!(Border::Reflect101.index(4, 4), 2);
        assert_eq!(Border::Reflect101.index(3, 1), 0);
    }

    #[test]
    fn test_mean_of_constant_is_constant() {
        let plane = Plane::from_pixel(9, 7, Luma([0.5]));
        let kernel = BoxKernel::centered(5).unwrap();
        for &v in plane::samples(&kernel.mean(&plane)) {
            assert_eq!(v, 0.5);
        }
    }

    #[test]
    fn test_mean_interior_window() {
        let plane = ramp(7, 7);
        let kernel = BoxKernel::centered(3).unwrap();
        let mean = kernel.mean(&plane);
        // 3x3 window around (3, 3) of a linear ramp averages to its centre
        assert!((mean.get_pixel(3, 3)[0] - 24.0).abs() < 1e-5);
    }

    #[test]
    fn test_mean_respects_anchor() {
        // single row: window covers x - anchor ..= x - anchor + 2
        let plane = Plane::from_fn(6, 1, |x, _| Luma([x as f32]));
        let left = BoxKernel::with_anchor(3, 0).unwrap().mean(&plane);
        let right = BoxKernel::with_anchor(3, 2).unwrap().mean(&plane);
        // (1 + 2 + 3) / 3 on the row, the single row reflects onto itself vertically
        assert!((left.get_pixel(1, 0)[0] - 2.0).abs() < 1e-6);
        // (1 + 2 + 3) / 3 again, but reached from x = 3
        assert!((right.get_pixel(3, 0)[0] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_redistribute_visits_containing_blocks() {
        // a single impulse spreads to exactly the pixels whose blocks cover it
        let mut plane = Plane::new(9, 9);
        plane.put_pixel(4, 4, Luma([25.0]));
        let kernel = BoxKernel::with_anchor(5, 0).unwrap();
        let spread = kernel.redistribute(&plane);
        // block anchored at (4, 4) with anchor 0 covers 4..=8, so its value
        // lands on pixels 4..=8
        assert!((spread.get_pixel(8, 8)[0] - 1.0).abs() < 1e-6);
        assert!((spread.get_pixel(4, 4)[0] - 1.0).abs() < 1e-6);
        assert_eq!(spread.get_pixel(3, 4)[0], 0.0);
    }

    #[test]
    fn test_erode_dilate() {
        let plane = ramp(5, 5);
        let kernel = BoxKernel::centered(3).unwrap();
        let eroded = kernel.erode(&plane);
        let dilated = kernel.dilate(&plane);
        assert_eq!(eroded.get_pixel(2, 2)[0], 6.0);
        assert_eq!(dilated.get_pixel(2, 2)[0], 18.0);
        // replicated corner
        assert_eq!(eroded.get_pixel(0, 0)[0], 0.0);
        assert_eq!(dilated.get_pixel(4, 4)[0], 24.0);
    }

    #[test]
    fn test_gaussian_kernel_is_normalized_and_symmetric() {
        let taps = gaussian_kernel(25, 1.0).unwrap();
        assert_eq!(taps.len(), 25);
        let total: f32 = taps.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!((taps[0] - taps[24]).abs() < 1e-9);
        assert!(taps[12] > taps[11]);
    }

    #[test]
    fn test_gaussian_kernel_rejects_bad_sigma() {
        assert!(matches!(
            gaussian_kernel(5, 0.0),
            Err(EnhanceError::InvalidSigma(_))
        ));
        assert!(gaussian_kernel(5, f32::NAN).is_err());
    }

    #[test]
    fn test_gaussian_blur_reflects_at_edges() {
        // horizontal ramp: reflect-101 mirrors 0, 1, 2 to 2, 1, 0, 1, 2 at x = 0
        let plane = Plane::from_fn(20, 20, |x, _| Luma([x as f32]));
        let taps = gaussian_kernel(5, 1.0).unwrap();
        let blurred = gaussian_blur(&plane, 5, 1.0).unwrap();

        let expected_left = 2.0 * taps[0] + taps[1] + taps[3] + 2.0 * taps[4];
        let expected_right = 19.0 - expected_left;
        for y in [0, 10, 19] {
            assert!((blurred.get_pixel(0, y)[0] - expected_left).abs() < 1e-5);
            assert!((blurred.get_pixel(19, y)[0] - expected_right).abs() < 1e-4);
            // symmetric taps leave the interior of a linear ramp untouched
            assert!((blurred.get_pixel(10, y)[0] - 10.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_gaussian_blur_preserves_constant() {
        let plane = Plane::from_pixel(30, 30, Luma([0.5]));
        let blurred = gaussian_blur(&plane, 25, 1.0).unwrap();
        for &v in plane::samples(&blurred) {
            assert!((v - 0.5).abs() < 1e-5);
        }
    }
}
