use crate::spectrum::{blackbody_wavelength, BLACKBODY_MAX_NM, BLACKBODY_MIN_NM};
use hqz_model::Sample;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

/// Closed interval a [`Sample`] can take.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    fn sorted(a: f64, b: f64) -> Self {
        if a > b {
            Self { min: b, max: a }
        } else {
            Self { min: a, max: b }
        }
    }
}

/// Per-ray random source. Never shared between rays: every ray gets a
/// sampler seeded from its own global index.
pub struct Sampler {
    rng: Xoshiro256Plus,
}

impl Sampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Xoshiro256Plus::seed_from_u64(seed),
        }
    }

    /// Uniform in `[0, 1)`.
    pub fn uniform(&mut self) -> f64 {
        self.rng.gen()
    }

    pub fn uniform_range(&mut self, a: f64, b: f64) -> f64 {
        a + (b - a) * self.uniform()
    }

    pub fn value(&mut self, sample: &Sample) -> f64 {
        match *sample {
            Sample::Constant(v) => v,
            Sample::Range { lower, upper } => self.uniform_range(lower, upper),
            Sample::Spectral { temperature } => {
                let u = self.uniform();
                blackbody_wavelength(temperature, u)
            }
        }
    }

    /// Every value [`Sampler::value`] can return for `sample`.
    pub fn bounds(sample: &Sample) -> Bounds {
        match *sample {
            Sample::Constant(v) => Bounds { min: v, max: v },
            Sample::Range { lower, upper } => Bounds::sorted(lower, upper),
            Sample::Spectral { .. } => Bounds {
                min: BLACKBODY_MIN_NM,
                max: BLACKBODY_MAX_NM,
            },
        }
    }

    /// Expected value, used where a render needs one deterministic number
    /// for a quantity that is resampled per ray.
    pub fn mean(sample: &Sample) -> f64 {
        match *sample {
            Sample::Constant(v) => v,
            Sample::Range { lower, upper } => 0.5 * (lower + upper),
            Sample::Spectral { .. } => {
                let b = Self::bounds(sample);
                0.5 * (b.min + b.max)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsorted_range_bounds_are_sorted() {
        let raw = Sample::Range {
            lower: 9.0,
            upper: -3.0,
        };
        let bounds = Sampler::bounds(&raw);
        assert_eq!(bounds, Bounds { min: -3.0, max: 9.0 });
    }

    #[test]
    fn range_values_stay_in_bounds() {
        let sample = Sample::range(2.0, 4.0);
        let mut sampler = Sampler::new(3);
        for _ in 0..1000 {
            let v = sampler.value(&sample);
            assert!((2.0..=4.0).contains(&v));
        }
    }

    #[test]
    fn spectral_bounds_are_finite() {
        let bounds = Sampler::bounds(&Sample::spectral(3000.0));
        assert!(bounds.min.is_finite() && bounds.max.is_finite());
        let mut sampler = Sampler::new(11);
        for _ in 0..100 {
            let nm = sampler.value(&Sample::spectral(3000.0));
            assert!(nm >= bounds.min && nm <= bounds.max);
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let sample = Sample::range(0.0, 100.0);
        let mut a = Sampler::new(42);
        let mut b = Sampler::new(42);
        let mut c = Sampler::new(43);
        let seq_a: Vec<f64> = (0..8).map(|_| a.value(&sample)).collect();
        let seq_b: Vec<f64> = (0..8).map(|_| b.value(&sample)).collect();
        let seq_c: Vec<f64> = (0..8).map(|_| c.value(&sample)).collect();
        assert_eq!(seq_a, seq_b);
        assert_ne!(seq_a, seq_c);
    }

    #[test]
    fn constant_does_not_consume_randomness() {
        let mut a = Sampler::new(5);
        let mut b = Sampler::new(5);
        a.value(&Sample::Constant(1.0));
        assert_eq!(a.uniform(), b.uniform());
    }
}
