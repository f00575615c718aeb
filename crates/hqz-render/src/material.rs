use crate::geometry::Hit;
use crate::math::Ray;
use crate::sampler::Sampler;
use hqz_model::Material;
use std::f64::consts::TAU;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Diffuse,
    Reflect,
    Transmit,
}

/// Pick the outcome for the draw `r ∈ [0, 1)`, or `None` for absorption.
///
/// Outcomes are walked in diffuse, reflect, transmit order; the first whose
/// cumulative probability reaches `r` wins.
pub fn choose_outcome(material: &Material, r: f64) -> Option<Outcome> {
    let outcomes = [
        (material.diffuse, Outcome::Diffuse),
        (material.reflect, Outcome::Reflect),
        (material.transmit, Outcome::Transmit),
    ];

    let mut sum = 0.0;
    for (probability, outcome) in outcomes {
        if probability <= 0.0 {
            continue;
        }
        sum += probability;
        if r <= sum {
            return Some(outcome);
        }
    }
    None
}

/// Continue `ray` from `hit` according to `material`. Returns `false` when
/// the ray is absorbed.
pub fn scatter(material: &Material, hit: &Hit, ray: &mut Ray, sampler: &mut Sampler) -> bool {
    let r = sampler.uniform();
    let Some(outcome) = choose_outcome(material, r) else {
        return false;
    };

    ray.origin = hit.point;
    match outcome {
        Outcome::Diffuse => ray.set_angle(sampler.uniform_range(0.0, TAU)),
        Outcome::Reflect => ray.reflect(hit.normal),
        Outcome::Transmit => {}
    }
    true
}
