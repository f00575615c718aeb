use crate::spectrum::Color;
use image::{Rgb, RgbImage};

/// Per-pixel photon accumulator.
///
/// Counts are integers so that buffers filled by different workers can be
/// summed in any order with identical results.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramImage {
    width: u32,
    height: u32,
    counts: Vec<u64>,
}

impl HistogramImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            counts: vec![0; width as usize * height as usize * 3],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u64; 3] {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        [self.counts[i], self.counts[i + 1], self.counts[i + 2]]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn is_blank(&self) -> bool {
        self.counts.iter().all(|&c| c == 0)
    }

    /// Add every count of `other`, which must have the same size.
    pub fn merge(&mut self, other: &HistogramImage) {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        for (dst, src) in self.counts.iter_mut().zip(&other.counts) {
            *dst += src;
        }
    }

    /// Draw an antialiased line between two points in pixel coordinates.
    ///
    /// The walk steps one pixel at a time along the major axis and splits
    /// each step between the two nearest pixels on the minor axis. A step
    /// deposits `covered / extent · length` of light, where `covered` is the
    /// part of that pixel the segment spans along the major axis, so every
    /// unit of length deposits the same light whatever the direction, and
    /// segment ends inside a pixel only light the part they cover.
    pub fn line(&mut self, color: Color, x0: f64, y0: f64, x1: f64, y1: f64) {
        if !(x0.is_finite() && y0.is_finite() && x1.is_finite() && y1.is_finite()) {
            return;
        }
        let dx = x1 - x0;
        let dy = y1 - y0;
        if dx == 0.0 && dy == 0.0 {
            return;
        }

        let steep = dy.abs() > dx.abs();
        let (mut a0, mut b0, mut a1, mut b1) = if steep {
            (y0, x0, y1, x1)
        } else {
            (x0, y0, x1, y1)
        };
        if a0 > a1 {
            std::mem::swap(&mut a0, &mut a1);
            std::mem::swap(&mut b0, &mut b1);
        }

        let (major_size, minor_size) = if steep {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        };
        if major_size == 0 || minor_size == 0 {
            return;
        }
        // Both ends past the same minor edge: nothing lands on the image.
        let minor_limit = minor_size as f64 + 1.0;
        if (b0 < -1.0 && b1 < -1.0) || (b0 > minor_limit && b1 > minor_limit) {
            return;
        }

        let extent = a1 - a0;
        let gradient = (b1 - b0) / extent;
        let weight = dx.hypot(dy) / extent;

        // Pixel `i` spans `[i, i + 1)`; an end exactly on a boundary does
        // not reach into the next pixel.
        let first = a0.floor().max(0.0);
        let last = (a1.ceil() - 1.0).min(major_size as f64 - 1.0);
        if !(first <= last) {
            return;
        }

        for major in first as i64..=last as i64 {
            let start = a0.max(major as f64);
            let end = a1.min(major as f64 + 1.0);
            let covered = end - start;
            if covered <= 0.0 {
                continue;
            }

            // Sample at the middle of the covered span and split between
            // neighbours.
            let center = 0.5 * (start + end);
            let minor = b0 + gradient * (center - a0) - 0.5;
            if !(minor > -1.0 && minor < minor_size as f64) {
                continue;
            }
            let base = minor.floor();
            let frac = minor - base;
            let base = base as i64;

            let amount = weight * covered;
            let r = color.r as f64 * amount;
            let g = color.g as f64 * amount;
            let b = color.b as f64 * amount;
            self.plot(steep, major, base, r, g, b, 1.0 - frac);
            self.plot(steep, major, base + 1, r, g, b, frac);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn plot(&mut self, steep: bool, major: i64, minor: i64, r: f64, g: f64, b: f64, coverage: f64) {
        let (x, y) = if steep { (minor, major) } else { (major, minor) };
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let i = (y as usize * self.width as usize + x as usize) * 3;
        self.counts[i] += (r * coverage) as u64;
        self.counts[i + 1] += (g * coverage) as u64;
        self.counts[i + 2] += (b * coverage) as u64;
    }

    /// Tone map into 8-bit RGB.
    pub fn render(&self, scale: f64, exponent: f64) -> RgbImage {
        let mut image = RgbImage::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let [r, g, b] = self.pixel(x, y);
                image.put_pixel(
                    x,
                    y,
                    Rgb([
                        tone_map(r, scale, exponent),
                        tone_map(g, scale, exponent),
                        tone_map(b, scale, exponent),
                    ]),
                );
            }
        }
        image
    }
}

/// `255 · (count · scale / 255)^exponent`, clamped to a byte. With a linear
/// exponent this is simply `count · scale`.
pub fn tone_map(count: u64, scale: f64, exponent: f64) -> u8 {
    let value = count as f64 * scale / 255.0;
    if !(value > 0.0) {
        return 0;
    }
    let out = 255.0 * value.powf(exponent);
    if out >= 255.0 {
        255
    } else {
        out as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::COLOR_ONE;

    #[test]
    fn horizontal_line_fills_one_row() {
        let mut image = HistogramImage::new(10, 5);
        image.line(Color::white(), 0.0, 2.5, 10.0, 2.5);
        for x in 0..10 {
            assert_eq!(image.pixel(x, 2), [COLOR_ONE as u64; 3]);
            assert_eq!(image.pixel(x, 1), [0; 3]);
            assert_eq!(image.pixel(x, 3), [0; 3]);
        }
    }

    #[test]
    fn line_ending_on_a_pixel_boundary_stops_there() {
        let mut image = HistogramImage::new(20, 5);
        image.line(Color::white(), 0.0, 2.5, 10.0, 2.5);
        for x in 0..10 {
            assert_eq!(image.pixel(x, 2), [COLOR_ONE as u64; 3]);
        }
        assert_eq!(image.pixel(10, 2), [0; 3]);
        assert_eq!(image.total(), COLOR_ONE as u64 * 3 * 10);
    }

    #[test]
    fn short_segment_deposits_its_length() {
        let mut image = HistogramImage::new(5, 5);
        image.line(Color::white(), 0.9, 2.5, 1.1, 2.5);
        let expected = 0.2 * COLOR_ONE as f64 * 3.0;
        assert!((image.total() as f64 - expected).abs() <= 6.0, "{}", image.total());

        let mut diagonal = HistogramImage::new(5, 5);
        diagonal.line(Color::white(), 1.25, 1.25, 1.75, 1.75);
        let expected = 0.5 * std::f64::consts::SQRT_2 * COLOR_ONE as f64 * 3.0;
        assert!((diagonal.total() as f64 - expected).abs() <= 12.0, "{}", diagonal.total());
    }

    #[test]
    fn far_off_minor_coordinates_are_skipped() {
        let mut image = HistogramImage::new(8, 8);
        image.line(Color::white(), 0.0, 1e19, 8.0, 1e19);
        image.line(Color::white(), 1e30, 0.0, 1e30, 8.0);
        image.line(Color::white(), 0.0, -1e300, 8.0, -1e300);
        image.line(Color::white(), 0.0, 4.5, 8.0, 1e25);
        assert!(image.pixel(0, 4) != [0; 3]);
        assert!(image.total() < COLOR_ONE as u64 * 3 * 2);
    }

    #[test]
    fn steep_line_walks_rows() {
        let mut image = HistogramImage::new(5, 10);
        image.line(Color::new(100, 0, 0), 2.5, 0.0, 2.5, 10.0);
        for y in 0..10 {
            assert_eq!(image.pixel(2, y), [100, 0, 0]);
        }
    }

    #[test]
    fn off_image_lines_are_clipped() {
        let mut image = HistogramImage::new(4, 4);
        image.line(Color::white(), -100.0, -100.0, -50.0, -20.0);
        image.line(Color::white(), 1e300, 0.0, -1e300, 1.0);
        image.line(Color::white(), f64::NAN, 0.0, 2.0, 2.0);
        assert!(image.total() < COLOR_ONE as u64 * 3 * 8);

        let mut blank = HistogramImage::new(4, 4);
        blank.line(Color::white(), -100.0, -100.0, -50.0, -20.0);
        blank.line(Color::white(), f64::NAN, 0.0, 2.0, 2.0);
        assert!(blank.is_blank());
    }

    #[test]
    fn merge_adds_counts() {
        let mut a = HistogramImage::new(3, 1);
        let mut b = HistogramImage::new(3, 1);
        a.line(Color::white(), 0.0, 0.5, 3.0, 0.5);
        b.line(Color::new(1, 2, 3), 0.0, 0.5, 3.0, 0.5);
        a.merge(&b);
        assert_eq!(a.pixel(1, 0), [COLOR_ONE as u64 + 1, COLOR_ONE as u64 + 2, COLOR_ONE as u64 + 3]);
    }

    #[test]
    fn tone_map_is_monotonic() {
        for exponent in [1.0, 1.0 / 2.2, 2.0] {
            let scale = 0.1;
            let mut previous = 0;
            for count in (0..2_000_000u64).step_by(997) {
                let value = tone_map(count, scale, exponent);
                assert!(value >= previous);
                previous = value;
            }
            assert_eq!(previous, 255);
        }
    }

    #[test]
    fn zero_scale_is_black() {
        assert_eq!(tone_map(1_000_000, 0.0, 1.0), 0);
        assert_eq!(tone_map(0, 1.0, 1.0), 0);
    }
}
