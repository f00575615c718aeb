use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageError, RgbImage};
use std::io::Write;

/// Encode to any writer: an output file or standard output, which cannot
/// seek.
pub fn write_png_to<W: Write>(writer: W, image: &RgbImage) -> Result<(), ImageError> {
    PngEncoder::new(writer).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgb8,
    )
}
