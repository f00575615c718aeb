//! Shared scene model for the HQZ photon renderer.
//!
//! Every numeric parameter that may vary from ray to ray is a [`Sample`],
//! a declarative random variable evaluated by the renderer's sampler.

pub mod diagnostics;
pub mod document;
pub mod load;

pub use diagnostics::Diagnostics;
pub use load::{load_scene_reader, load_scene_str, scene_from_value, LoadError, Loaded};

/// Debug flag: draw the spatial index outline over the render.
pub const DEBUG_QUADTREE: u32 = 1 << 0;

/// A scalar random variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    Constant(f64),
    /// Uniform draw in `[lower, upper]`.
    Range { lower: f64, upper: f64 },
    /// Wavelength in nanometers drawn from a blackbody at `temperature` Kelvin.
    Spectral { temperature: f64 },
}

impl Sample {
    pub const ZERO: Sample = Sample::Constant(0.0);

    /// Uniform range; the endpoints may be given in either order.
    pub fn range(a: f64, b: f64) -> Self {
        if a > b {
            Sample::Range { lower: b, upper: a }
        } else {
            Sample::Range { lower: a, upper: b }
        }
    }

    pub fn spectral(temperature: f64) -> Self {
        Sample::Spectral { temperature }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Sample::Constant(_))
    }
}

impl Default for Sample {
    fn default() -> Self {
        Sample::ZERO
    }
}

impl From<f64> for Sample {
    fn from(value: f64) -> Self {
        Sample::Constant(value)
    }
}

/// Scene-space window mapped onto the output image, sampled once per ray.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub x: Sample,
    pub y: Sample,
    pub width: Sample,
    pub height: Sample,
}

/// Probabilities of the three scattering outcomes. Whatever is left over
/// from 1.0 is the probability of absorption.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Material {
    pub diffuse: f64,
    pub reflect: f64,
    pub transmit: f64,
}

impl Material {
    pub const fn new(diffuse: f64, reflect: f64, transmit: f64) -> Self {
        Self {
            diffuse,
            reflect,
            transmit,
        }
    }

    pub fn total(&self) -> f64 {
        self.diffuse + self.reflect + self.transmit
    }

    pub fn absorption(&self) -> f64 {
        (1.0 - self.total()).max(0.0)
    }

    /// Clamps negative probabilities to zero and rescales so the total never
    /// exceeds one.
    pub fn normalized(self) -> Self {
        let clean = Self::new(
            non_negative(self.diffuse),
            non_negative(self.reflect),
            non_negative(self.transmit),
        );
        let total = clean.total();
        if total > 1.0 {
            Self::new(
                clean.diffuse / total,
                clean.reflect / total,
                clean.transmit / total,
            )
        } else {
            clean
        }
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Normal angles (degrees) at the start of a segment and their change along it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Curve {
    pub a0: Sample,
    pub da: Sample,
}

/// A line segment from `(x0, y0)` to `(x0 + dx, y0 + dy)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Object {
    pub material: usize,
    pub x0: Sample,
    pub y0: Sample,
    pub dx: Sample,
    pub dy: Sample,
    pub curve: Option<Curve>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Light {
    pub power: Sample,
    pub x: Sample,
    pub y: Sample,
    /// Degrees.
    pub polar_angle: Sample,
    pub polar_distance: Sample,
    /// Degrees.
    pub ray_angle: Sample,
    /// Nanometers; zero means white light.
    pub wavelength: Sample,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub width: u32,
    pub height: u32,
    pub exposure: f64,
    pub gamma: f64,
    pub seed: u64,
    /// Ray budget; zero means unbounded.
    pub rays: u64,
    /// Wall-clock budget in seconds; zero means unbounded.
    pub time_limit: f64,
    pub debug: u32,
    pub viewport: Viewport,
    pub materials: Vec<Material>,
    pub objects: Vec<Object>,
    pub lights: Vec<Light>,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            exposure: 0.0,
            gamma: 0.0,
            seed: 0,
            rays: 0,
            time_limit: 0.0,
            debug: 0,
            viewport: Viewport::default(),
            materials: Vec::new(),
            objects: Vec::new(),
            lights: Vec::new(),
        }
    }
}

impl Scene {
    pub fn has_stopping_condition(&self) -> bool {
        self.rays > 0 || self.time_limit > 0.0
    }
}
