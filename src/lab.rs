//! sRGB ↔ CIE L\*a\*b\* (D65) conversion of whole float images
//!
//! Both directions keep the interleaved [`Rgb32FImage`] layout, so a Lab
//! image is simply an `Rgb32FImage` whose channels hold L, a\* and b\*.

use image::Rgb32FImage;
use palette::white_point::D65;
use palette::{IntoColor, Lab, LinSrgb, Srgb};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

type LabD65 = Lab<D65, f32>;

fn srgb_to_lab(pixel: &mut [f32]) {
    let lin: LinSrgb<f32> = Srgb::new(pixel[0], pixel[1], pixel[2]).into_linear();
    let lab: LabD65 = lin.into_color();
    pixel.copy_from_slice(&[lab.l, lab.a, lab.b]);
}

fn lab_to_srgb(pixel: &mut [f32]) {
    let lin: LinSrgb<f32> = LabD65::new(pixel[0], pixel[1], pixel[2]).into_color();
    // out-of-gamut Lab can map to negative linear values
    let lin = LinSrgb::new(lin.red.max(0.0), lin.green.max(0.0), lin.blue.max(0.0));
    let srgb: Srgb<f32> = Srgb::from_linear(lin);
    pixel.copy_from_slice(&[
        srgb.red.clamp(0.0, 1.0),
        srgb.green.clamp(0.0, 1.0),
        srgb.blue.clamp(0.0, 1.0),
    ]);
}

fn convert(image: &Rgb32FImage, op: fn(&mut [f32])) -> Rgb32FImage {
    let mut output = image.clone();
    let raw: &mut [f32] = &mut output;

    #[cfg(feature = "rayon")]
    raw.par_chunks_exact_mut(3).for_each(op);

    #[cfg(not(feature = "rayon"))]
    raw.chunks_exact_mut(3).for_each(op);

    output
}

/// Convert gamma-encoded sRGB in [0, 1] to L\*a\*b\*
pub fn rgb_to_lab(image: &Rgb32FImage) -> Rgb32FImage {
    convert(image, srgb_to_lab)
}

/// Convert L\*a\*b\* back to gamma-encoded sRGB, clamped to [0, 1]
pub fn lab_to_rgb(image: &Rgb32FImage) -> Rgb32FImage {
    convert(image, lab_to_srgb)
}
