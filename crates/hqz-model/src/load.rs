//! Best-effort scene loader.
//!
//! Malformed fields never abort a load. They fall back to a default
//! (almost always zero) and leave a message in [`Diagnostics`]. Only a
//! document that is not JSON, or not a JSON object, is rejected outright.

use crate::{Curve, Diagnostics, Light, Material, Object, Sample, Scene, Viewport};
use serde_json::{Map, Value};
use std::io::Read;
use thiserror::Error;

static NULL: Value = Value::Null;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to parse scene JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("scene document must be a JSON object")]
    NotAnObject,
}

/// A loaded scene together with everything that looked wrong in it.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub scene: Scene,
    pub diagnostics: Diagnostics,
}

pub fn load_scene_str(text: &str) -> Result<Loaded, LoadError> {
    let value: Value = serde_json::from_str(text)?;
    load_value(&value)
}

pub fn load_scene_reader<R: Read>(reader: R) -> Result<Loaded, LoadError> {
    let value: Value = serde_json::from_reader(reader)?;
    load_value(&value)
}

fn load_value(value: &Value) -> Result<Loaded, LoadError> {
    let mut diagnostics = Diagnostics::new();
    let scene = scene_from_value(value, &mut diagnostics)?;
    Ok(Loaded { scene, diagnostics })
}

pub fn scene_from_value(value: &Value, diagnostics: &mut Diagnostics) -> Result<Scene, LoadError> {
    let root = value.as_object().ok_or(LoadError::NotAnObject)?;
    let mut loader = Loader { diagnostics };
    Ok(loader.scene(root))
}

struct Loader<'a> {
    diagnostics: &'a mut Diagnostics,
}

impl Loader<'_> {
    fn scene(&mut self, root: &Map<String, Value>) -> Scene {
        let field = |name: &str| root.get(name).unwrap_or(&NULL);
        let mut scene = Scene::default();

        if let Some(resolution) = self.tuple(field("resolution"), "resolution", 2) {
            scene.width = self.unsigned32(&resolution[0], "resolution[0]");
            scene.height = self.unsigned32(&resolution[1], "resolution[1]");
        }

        scene.exposure = self.number(field("exposure"), "exposure");
        scene.gamma = self.number(field("gamma"), "gamma");
        scene.seed = self.unsigned(field("seed"), "seed");
        scene.rays = self.unsigned(field("rays"), "rays");
        scene.debug = self.unsigned32(field("debug"), "debug");

        let time_limit = self.number(field("timelimit"), "timelimit");
        if time_limit < 0.0 {
            self.error("'timelimit' must not be negative");
        } else {
            scene.time_limit = time_limit;
        }

        if let Some(viewport) = self.tuple(field("viewport"), "viewport", 4) {
            scene.viewport = Viewport {
                x: self.sample(&viewport[0], "viewport[0]"),
                y: self.sample(&viewport[1], "viewport[1]"),
                width: self.sample(&viewport[2], "viewport[2]"),
                height: self.sample(&viewport[3], "viewport[3]"),
            };
        }

        if let Some(lights) = self.tuple(field("lights"), "lights", 1) {
            for (index, light) in lights.iter().enumerate() {
                if let Some(light) = self.light(light, index) {
                    scene.lights.push(light);
                }
            }
        }

        if let Some(materials) = self.optional_tuple(field("materials"), "materials") {
            for (index, material) in materials.iter().enumerate() {
                let material = self.material(material, index);
                scene.materials.push(material);
            }
        }

        if let Some(objects) = self.optional_tuple(field("objects"), "objects") {
            let material_count = scene.materials.len();
            for (index, object) in objects.iter().enumerate() {
                if let Some(object) = self.object(object, index, material_count) {
                    scene.objects.push(object);
                }
            }
        }

        scene
    }

    fn error(&mut self, message: impl Into<String>) {
        self.diagnostics.push(message);
    }

    /// Null is a quiet zero; any other non-number is a diagnosed zero.
    fn number(&mut self, value: &Value, noun: &str) -> f64 {
        match value {
            Value::Null => 0.0,
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            _ => {
                self.error(format!("'{noun}' expected a number value"));
                0.0
            }
        }
    }

    fn unsigned(&mut self, value: &Value, noun: &str) -> u64 {
        match value {
            Value::Null => 0,
            Value::Number(n) => match n.as_u64() {
                Some(v) => v,
                None => {
                    self.error(format!("'{noun}' expected a non-negative integer value"));
                    0
                }
            },
            _ => {
                self.error(format!("'{noun}' expected an integer value"));
                0
            }
        }
    }

    fn unsigned32(&mut self, value: &Value, noun: &str) -> u32 {
        let wide = self.unsigned(value, noun);
        u32::try_from(wide).unwrap_or_else(|_| {
            self.error(format!("'{noun}' value {wide} is larger than {}", u32::MAX));
            0
        })
    }

    fn tuple<'v>(&mut self, value: &'v Value, noun: &str, expected: usize) -> Option<&'v [Value]> {
        match value.as_array() {
            Some(items) if items.len() >= expected => Some(items.as_slice()),
            _ => {
                let plural = if expected == 1 { "" } else { "s" };
                self.error(format!(
                    "'{noun}' expected an array with at least {expected} item{plural}"
                ));
                None
            }
        }
    }

    /// Like [`Self::tuple`] with no minimum length, but a missing list is
    /// simply empty.
    fn optional_tuple<'v>(&mut self, value: &'v Value, noun: &str) -> Option<&'v [Value]> {
        if value.is_null() {
            None
        } else {
            self.tuple(value, noun, 0)
        }
    }

    fn sample(&mut self, value: &Value, noun: &str) -> Sample {
        match value {
            Value::Null => Sample::ZERO,
            Value::Number(n) => Sample::Constant(n.as_f64().unwrap_or(0.0)),
            Value::Array(items) if items.len() == 2 => match (&items[0], &items[1]) {
                (Value::Number(a), Value::Number(b)) => {
                    Sample::range(a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0))
                }
                (Value::Number(t), Value::String(unit)) if unit == "K" => {
                    let temperature = t.as_f64().unwrap_or(0.0);
                    if temperature <= 0.0 {
                        self.error(format!("'{noun}' blackbody temperature must be positive"));
                    }
                    Sample::spectral(temperature)
                }
                _ => self.unknown_sample(noun),
            },
            _ => self.unknown_sample(noun),
        }
    }

    fn unknown_sample(&mut self, noun: &str) -> Sample {
        self.error(format!(
            "'{noun}' expected a number, a [min, max] range, or a [temperature, \"K\"] spectrum"
        ));
        Sample::ZERO
    }

    fn light(&mut self, value: &Value, index: usize) -> Option<Light> {
        let noun = format!("lights[{index}]");
        let items = self.tuple(value, &noun, 7)?;
        Some(Light {
            power: self.sample(&items[0], &format!("{noun}.power")),
            x: self.sample(&items[1], &format!("{noun}.x")),
            y: self.sample(&items[2], &format!("{noun}.y")),
            polar_angle: self.sample(&items[3], &format!("{noun}.polar_angle")),
            polar_distance: self.sample(&items[4], &format!("{noun}.polar_distance")),
            ray_angle: self.sample(&items[5], &format!("{noun}.ray_angle")),
            wavelength: self.sample(&items[6], &format!("{noun}.wavelength")),
        })
    }

    /// Accepts the legacy outcome list `[[p, "d"], [p, "r"], ...]`, a bare
    /// `[d, r, t]` triple, or `{"d": .., "r": .., "t": ..}`. Unusable entries
    /// become a fully absorbing material so later indices stay put.
    fn material(&mut self, value: &Value, index: usize) -> Material {
        let raw = match value {
            Value::Array(items) if is_outcome_list(items) => self.outcome_list(items, index),
            Value::Array(items) if items.len() == 3 && items.iter().all(Value::is_number) => {
                Material::new(
                    items[0].as_f64().unwrap_or(0.0),
                    items[1].as_f64().unwrap_or(0.0),
                    items[2].as_f64().unwrap_or(0.0),
                )
            }
            Value::Object(fields) => {
                let mut probability = |key: &str| {
                    let noun = format!("materials[{index}].{key}");
                    self.number(fields.get(key).unwrap_or(&NULL), &noun)
                };
                let diffuse = probability("d");
                let reflect = probability("r");
                let transmit = probability("t");
                Material::new(diffuse, reflect, transmit)
            }
            _ => {
                self.error(format!(
                    "Material #{index} is neither an outcome list nor a d/r/t triple"
                ));
                return Material::default();
            }
        };

        let material = raw.normalized();
        if raw.diffuse < 0.0 || raw.reflect < 0.0 || raw.transmit < 0.0 {
            self.error(format!("Material #{index} has negative outcome probabilities"));
        }
        if raw.total() > 1.0 {
            self.error(format!(
                "Material #{index} outcome probabilities sum to {} (more than 1), rescaled",
                raw.total()
            ));
        }
        material
    }

    fn outcome_list(&mut self, outcomes: &[Value], index: usize) -> Material {
        let mut material = Material::default();
        for (i, outcome) in outcomes.iter().enumerate() {
            let probability = outcome[0].as_f64().unwrap_or(0.0);
            match outcome.get(1).and_then(Value::as_str).and_then(|s| s.chars().next()) {
                Some('d') => material.diffuse += probability,
                Some('r') => material.reflect += probability,
                Some('t') => material.transmit += probability,
                _ => self.error(format!(
                    "Material #{index} outcome #{i} has no known outcome code (d, r or t)"
                )),
            }
        }
        material
    }

    fn object(&mut self, value: &Value, index: usize, material_count: usize) -> Option<Object> {
        let noun = format!("objects[{index}]");
        let items = self.tuple(value, &noun, 5)?;

        let Some(material) = items[0].as_u64() else {
            self.error(format!("Material ID of object #{index} must be an unsigned integer"));
            return None;
        };
        if material as usize >= material_count {
            self.error(format!("Material ID ({material}) of object #{index} out of range"));
        }

        let sample = |loader: &mut Self, i: usize, field: &str| {
            loader.sample(&items[i], &format!("{noun}.{field}"))
        };

        let object = match items.len() {
            5 | 6 => {
                if items.len() == 6 {
                    self.error(format!("{noun} has 6 items; treating it as a straight segment"));
                }
                Object {
                    material: material as usize,
                    x0: sample(self, 1, "x0"),
                    y0: sample(self, 2, "y0"),
                    dx: sample(self, 3, "dx"),
                    dy: sample(self, 4, "dy"),
                    curve: None,
                }
            }
            _ => {
                if items.len() > 7 {
                    self.error(format!("{noun} has extra items after da; ignoring them"));
                }
                Object {
                    material: material as usize,
                    x0: sample(self, 1, "x0"),
                    y0: sample(self, 2, "y0"),
                    dx: sample(self, 4, "dx"),
                    dy: sample(self, 5, "dy"),
                    curve: Some(Curve {
                        a0: sample(self, 3, "a0"),
                        da: sample(self, 6, "da"),
                    }),
                }
            }
        };
        Some(object)
    }
}

fn is_outcome_list(items: &[Value]) -> bool {
    items.iter().all(|outcome| {
        outcome
            .as_array()
            .and_then(|parts| parts.first())
            .map_or(false, Value::is_number)
    })
}
