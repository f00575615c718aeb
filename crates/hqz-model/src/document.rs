//! Serialization back into the scene document format.
//!
//! The output is always the normalized form: materials are written as
//! outcome lists built from the canonical probabilities, and every sample
//! uses the shortest shape that describes it.

use crate::{Light, Material, Object, Sample, Scene};
use serde::ser::{SerializeSeq, SerializeTuple, Serializer};
use serde::Serialize;

impl Serialize for Sample {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            Sample::Constant(value) => serializer.serialize_f64(value),
            Sample::Range { lower, upper } => {
                let mut tuple = serializer.serialize_tuple(2)?;
                tuple.serialize_element(&lower)?;
                tuple.serialize_element(&upper)?;
                tuple.end()
            }
            Sample::Spectral { temperature } => {
                let mut tuple = serializer.serialize_tuple(2)?;
                tuple.serialize_element(&temperature)?;
                tuple.serialize_element("K")?;
                tuple.end()
            }
        }
    }
}

impl Serialize for Material {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let outcomes: Vec<(f64, &str)> = [
            (self.diffuse, "d"),
            (self.reflect, "r"),
            (self.transmit, "t"),
        ]
        .into_iter()
        .filter(|(probability, _)| *probability > 0.0)
        .collect();

        let mut seq = serializer.serialize_seq(Some(outcomes.len()))?;
        for outcome in &outcomes {
            seq.serialize_element(outcome)?;
        }
        seq.end()
    }
}

impl Serialize for Object {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.curve {
            None => {
                let mut tuple = serializer.serialize_tuple(5)?;
                tuple.serialize_element(&self.material)?;
                tuple.serialize_element(&self.x0)?;
                tuple.serialize_element(&self.y0)?;
                tuple.serialize_element(&self.dx)?;
                tuple.serialize_element(&self.dy)?;
                tuple.end()
            }
            Some(curve) => {
                let mut tuple = serializer.serialize_tuple(7)?;
                tuple.serialize_element(&self.material)?;
                tuple.serialize_element(&self.x0)?;
                tuple.serialize_element(&self.y0)?;
                tuple.serialize_element(&curve.a0)?;
                tuple.serialize_element(&self.dx)?;
                tuple.serialize_element(&self.dy)?;
                tuple.serialize_element(&curve.da)?;
                tuple.end()
            }
        }
    }
}

impl Serialize for Light {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(7)?;
        tuple.serialize_element(&self.power)?;
        tuple.serialize_element(&self.x)?;
        tuple.serialize_element(&self.y)?;
        tuple.serialize_element(&self.polar_angle)?;
        tuple.serialize_element(&self.polar_distance)?;
        tuple.serialize_element(&self.ray_angle)?;
        tuple.serialize_element(&self.wavelength)?;
        tuple.end()
    }
}

#[derive(Serialize)]
struct Document<'a> {
    resolution: [u32; 2],
    viewport: [Sample; 4],
    exposure: f64,
    gamma: f64,
    seed: u64,
    rays: u64,
    timelimit: f64,
    debug: u32,
    lights: &'a [Light],
    materials: &'a [Material],
    objects: &'a [Object],
}

impl Serialize for Scene {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Document {
            resolution: [self.width, self.height],
            viewport: [
                self.viewport.x,
                self.viewport.y,
                self.viewport.width,
                self.viewport.height,
            ],
            exposure: self.exposure,
            gamma: self.gamma,
            seed: self.seed,
            rays: self.rays,
            timelimit: self.time_limit,
            debug: self.debug,
            lights: &self.lights,
            materials: &self.materials,
            objects: &self.objects,
        }
        .serialize(serializer)
    }
}
