//! Wavelength to RGB conversion and blackbody wavelength sampling.

/// Full-scale channel value for a single photon: one 8-bit output level
/// carried with 13 extra bits of fraction.
pub const COLOR_ONE: u32 = 255 * 8192;

/// Wavelength window the blackbody distribution is restricted to (nm).
pub const BLACKBODY_MIN_NM: f64 = 360.0;
pub const BLACKBODY_MAX_NM: f64 = 830.0;
const BLACKBODY_STEP_NM: f64 = 5.0;
const BLACKBODY_STEPS: usize = ((BLACKBODY_MAX_NM - BLACKBODY_MIN_NM) / BLACKBODY_STEP_NM) as usize;

/// Second radiation constant, `h·c / k`, in nm·K.
const C2_NM_K: f64 = 1.438_776_877e7;

/// Fixed-point photon color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u32,
    pub g: u32,
    pub b: u32,
}

impl Color {
    pub const fn new(r: u32, g: u32, b: u32) -> Self {
        Self { r, g, b }
    }

    pub const fn white() -> Self {
        Self::new(COLOR_ONE, COLOR_ONE, COLOR_ONE)
    }

    /// Color of a photon of the given wavelength in nanometers. Zero means
    /// white light; wavelengths outside the visible band are black.
    pub fn from_wavelength(nm: f64) -> Self {
        if nm == 0.0 {
            return Self::white();
        }
        if !(380.0..=780.0).contains(&nm) {
            return Self::default();
        }

        let (r, g, b) = if nm < 440.0 {
            (-(nm - 440.0) / (440.0 - 380.0), 0.0, 1.0)
        } else if nm < 490.0 {
            (0.0, (nm - 440.0) / (490.0 - 440.0), 1.0)
        } else if nm < 510.0 {
            (0.0, 1.0, -(nm - 510.0) / (510.0 - 490.0))
        } else if nm < 580.0 {
            ((nm - 510.0) / (580.0 - 510.0), 1.0, 0.0)
        } else if nm < 645.0 {
            (1.0, -(nm - 645.0) / (645.0 - 580.0), 0.0)
        } else {
            (1.0, 0.0, 0.0)
        };

        // Fall off toward the edges of human vision.
        let factor = if nm < 420.0 {
            0.3 + 0.7 * (nm - 380.0) / (420.0 - 380.0)
        } else if nm <= 700.0 {
            1.0
        } else {
            0.3 + 0.7 * (780.0 - nm) / (780.0 - 700.0)
        };

        let channel = |c: f64| (c * factor * COLOR_ONE as f64).round() as u32;
        Self::new(channel(r), channel(g), channel(b))
    }

    pub fn is_visible(&self) -> bool {
        self.r != 0 || self.g != 0 || self.b != 0
    }
}

/// Planck's law up to a constant factor.
fn planck(nm: f64, temperature: f64) -> f64 {
    let x = C2_NM_K / (nm * temperature);
    1.0 / (nm.powi(5) * x.exp_m1())
}

/// Invert the blackbody cumulative distribution at `u ∈ [0, 1)`.
///
/// The spectrum is tabulated over the blackbody window and integrated with
/// the trapezoid rule; the result is always inside the window.
pub fn blackbody_wavelength(temperature: f64, u: f64) -> f64 {
    if !(temperature > 0.0) {
        return BLACKBODY_MIN_NM;
    }

    let mut cdf = [0.0f64; BLACKBODY_STEPS + 1];
    let mut previous = planck(BLACKBODY_MIN_NM, temperature);
    for i in 1..=BLACKBODY_STEPS {
        let nm = BLACKBODY_MIN_NM + i as f64 * BLACKBODY_STEP_NM;
        let current = planck(nm, temperature);
        cdf[i] = cdf[i - 1] + 0.5 * (previous + current) * BLACKBODY_STEP_NM;
        previous = current;
    }

    let total = cdf[BLACKBODY_STEPS];
    if !(total > 0.0) || !total.is_finite() {
        return BLACKBODY_MIN_NM;
    }

    let target = u.clamp(0.0, 1.0) * total;
    let upper = cdf.partition_point(|&c| c < target).clamp(1, BLACKBODY_STEPS);
    let (lo, hi) = (cdf[upper - 1], cdf[upper]);
    let frac = if hi > lo { (target - lo) / (hi - lo) } else { 0.0 };
    let nm = BLACKBODY_MIN_NM + (upper as f64 - 1.0 + frac) * BLACKBODY_STEP_NM;
    nm.clamp(BLACKBODY_MIN_NM, BLACKBODY_MAX_NM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_wavelength_is_white() {
        assert_eq!(Color::from_wavelength(0.0), Color::white());
    }

    #[test]
    fn visibility_matches_the_visible_band() {
        assert!(!Color::from_wavelength(300.0).is_visible());
        assert!(!Color::from_wavelength(900.0).is_visible());
        let green = Color::from_wavelength(530.0);
        assert!(green.is_visible());
        assert_eq!(green.g, COLOR_ONE);
        assert_eq!(green.b, 0);
    }

    #[test]
    fn blackbody_draws_are_monotonic_and_bounded() {
        let mut last = BLACKBODY_MIN_NM;
        for i in 0..100 {
            let nm = blackbody_wavelength(5800.0, i as f64 / 100.0);
            assert!(nm >= last);
            assert!((BLACKBODY_MIN_NM..=BLACKBODY_MAX_NM).contains(&nm));
            last = nm;
        }
    }

    #[test]
    fn hotter_bodies_skew_blue() {
        let cool = blackbody_wavelength(2000.0, 0.5);
        let hot = blackbody_wavelength(12000.0, 0.5);
        assert!(hot < cool);
    }
}
