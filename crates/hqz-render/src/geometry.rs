use crate::math::{Aabb, Ray, Vec2};
use crate::sampler::Sampler;
use hqz_model::Object;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub distance: f64,
    pub point: Vec2,
    /// Unit length, but not oriented toward the incoming ray.
    pub normal: Vec2,
    pub object: usize,
}

/// One concrete draw of an object's geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: Vec2,
    pub delta: Vec2,
    /// Normal angles in degrees at the start and their change along the
    /// segment, for curved objects.
    pub normal_angles: Option<(f64, f64)>,
}

impl Segment {
    pub fn sample(object: &Object, sampler: &mut Sampler) -> Self {
        let start = Vec2::new(sampler.value(&object.x0), sampler.value(&object.y0));
        let normal_angles = object
            .curve
            .as_ref()
            .map(|curve| (sampler.value(&curve.a0), sampler.value(&curve.da)));
        let delta = Vec2::new(sampler.value(&object.dx), sampler.value(&object.dy));
        Self {
            start,
            delta,
            normal_angles,
        }
    }

    pub fn intersect(&self, ray: &Ray, object: usize) -> Option<Hit> {
        let (distance, alpha) = ray.intersect_segment(self.start, self.delta)?;
        let normal = match self.normal_angles {
            None => self.delta.perpendicular().normalized(),
            Some((a0, da)) => Vec2::from_angle((a0 + alpha * da).to_radians()),
        };
        Some(Hit {
            distance,
            point: ray.at(distance),
            normal,
            object,
        })
    }
}

/// Box covering every segment `object` can sample to.
pub fn object_bounds(object: &Object) -> Aabb {
    let x0 = Sampler::bounds(&object.x0);
    let y0 = Sampler::bounds(&object.y0);
    let dx = Sampler::bounds(&object.dx);
    let dy = Sampler::bounds(&object.dy);

    Aabb::new(
        (x0.min + dx.min).min(x0.min),
        (y0.min + dy.min).min(y0.min),
        (x0.max + dx.max).max(x0.max),
        (y0.max + dy.max).max(y0.max),
    )
}

/// Lazily sampled geometry for the ray currently being traced.
///
/// Each object is drawn at most once per ray, on first touch, and reused
/// for every later bounce of that ray. [`SceneGeometry::reset`] starts a
/// new ray without reallocating.
pub struct SceneGeometry<'a> {
    objects: &'a [Object],
    cache: Vec<(u32, Segment)>,
    generation: u32,
}

impl<'a> SceneGeometry<'a> {
    pub fn new(objects: &'a [Object]) -> Self {
        let blank = Segment {
            start: Vec2::zero(),
            delta: Vec2::zero(),
            normal_angles: None,
        };
        Self {
            objects,
            cache: vec![(0, blank); objects.len()],
            generation: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn reset(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            for entry in &mut self.cache {
                entry.0 = 0;
            }
            self.generation = 1;
        }
    }

    pub fn segment(&mut self, index: usize, sampler: &mut Sampler) -> Segment {
        let entry = &mut self.cache[index];
        if entry.0 != self.generation {
            *entry = (self.generation, Segment::sample(&self.objects[index], sampler));
        }
        entry.1
    }

    pub fn intersect(&mut self, index: usize, ray: &Ray, sampler: &mut Sampler) -> Option<Hit> {
        self.segment(index, sampler).intersect(ray, index)
    }

    /// Sample every object now, in index order.
    pub fn resolve_all(&mut self, sampler: &mut Sampler) {
        for index in 0..self.objects.len() {
            self.segment(index, sampler);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hqz_model::{Curve, Sample};

    fn wall(x: f64) -> Object {
        Object {
            material: 0,
            x0: Sample::Constant(x),
            y0: Sample::Constant(-10.0),
            dx: Sample::Constant(0.0),
            dy: Sample::Constant(20.0),
            curve: None,
        }
    }

    #[test]
    fn straight_normal_is_perpendicular() {
        let mut sampler = Sampler::new(1);
        let segment = Segment::sample(&wall(5.0), &mut sampler);
        let hit = segment
            .intersect(&Ray::from_angle(Vec2::zero(), 0.0), 0)
            .unwrap();
        assert!((hit.distance - 5.0).abs() < 1e-12);
        assert!(hit.normal.x.abs() > 0.999);
        assert!(hit.normal.y.abs() < 1e-12);
    }

    #[test]
    fn curved_normal_is_interpolated() {
        let mut object = wall(5.0);
        object.curve = Some(Curve {
            a0: Sample::Constant(180.0),
            da: Sample::Constant(-90.0),
        });
        let mut sampler = Sampler::new(1);
        let segment = Segment::sample(&object, &mut sampler);
        // The ray crosses the wall halfway along it.
        let hit = segment
            .intersect(&Ray::from_angle(Vec2::zero(), 0.0), 3)
            .unwrap();
        let expected = Vec2::from_angle(135f64.to_radians());
        assert!((hit.normal.x - expected.x).abs() < 1e-12);
        assert!((hit.normal.y - expected.y).abs() < 1e-12);
        assert_eq!(hit.object, 3);
    }

    #[test]
    fn bounds_cover_every_draw() {
        let object = Object {
            material: 0,
            x0: Sample::range(0.0, 10.0),
            y0: Sample::Constant(5.0),
            dx: Sample::range(-20.0, 5.0),
            dy: Sample::range(1.0, 2.0),
            curve: None,
        };
        let bounds = object_bounds(&object);
        assert_eq!(bounds, Aabb::new(-20.0, 5.0, 15.0, 7.0));

        let mut sampler = Sampler::new(9);
        for _ in 0..200 {
            let s = Segment::sample(&object, &mut sampler);
            assert!(bounds.contains_point(s.start));
            assert!(bounds.contains_point(s.start + s.delta));
        }
    }

    #[test]
    fn geometry_is_sampled_once_per_ray() {
        let objects = vec![Object {
            material: 0,
            x0: Sample::range(0.0, 100.0),
            ..wall(0.0)
        }];
        let mut geometry = SceneGeometry::new(&objects);
        let mut sampler = Sampler::new(4);
        let first = geometry.segment(0, &mut sampler);
        let again = geometry.segment(0, &mut sampler);
        assert_eq!(first, again);

        geometry.reset();
        let next_ray = geometry.segment(0, &mut sampler);
        assert_ne!(first, next_ray);
    }
}
