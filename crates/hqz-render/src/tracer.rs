use crate::geometry::SceneGeometry;
use crate::histogram::HistogramImage;
use crate::material::scatter;
use crate::math::{Aabb, Ray, Vec2};
use crate::quadtree::Quadtree;
use crate::sampler::Sampler;
use crate::spectrum::Color;
use hqz_model::{Light, Scene};

/// Bounces allowed before a ray is abandoned.
pub const MAX_BOUNCES: u32 = 1000;
/// Wavelength draws allowed before a ray is discarded as invisible.
pub const MAX_WAVELENGTH_TRIES: u32 = 1000;

/// How a single ray ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RayOutcome {
    /// Left the scene through the viewport boundary.
    Exited,
    Absorbed,
    BounceLimit,
    /// Never emitted: no light to choose or no visible wavelength drawn.
    /// Discarded rays do not count toward exposure.
    Discarded,
}

impl RayOutcome {
    pub fn is_traced(self) -> bool {
        self != RayOutcome::Discarded
    }
}

/// One draw of the viewport, shared by every segment of a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportSample {
    pub origin: Vec2,
    pub size: Vec2,
}

impl ViewportSample {
    pub fn sample(scene: &Scene, sampler: &mut Sampler) -> Self {
        let viewport = &scene.viewport;
        let origin = Vec2::new(sampler.value(&viewport.x), sampler.value(&viewport.y));
        let size = Vec2::new(
            sampler.value(&viewport.width),
            sampler.value(&viewport.height),
        );
        Self { origin, size }
    }

    /// Scene box covered by the viewport.
    pub fn bounds(&self) -> Aabb {
        let far = self.origin + self.size;
        Aabb::new(
            self.origin.x.min(far.x),
            self.origin.y.min(far.y),
            self.origin.x.max(far.x),
            self.origin.y.max(far.y),
        )
    }

    /// Map a scene point to pixel coordinates. A zero-size viewport maps to
    /// non-finite coordinates, which the histogram refuses to draw.
    pub fn to_pixels(&self, point: Vec2, width: u32, height: u32) -> Vec2 {
        Vec2::new(
            (point.x - self.origin.x) * width as f64 / self.size.x,
            (point.y - self.origin.y) * height as f64 / self.size.y,
        )
    }
}

/// Traces single photon paths through a scene.
///
/// The tracer itself is immutable and shared by every worker; the per-ray
/// state lives in the sampler, geometry cache and histogram passed in.
pub struct Tracer<'a> {
    scene: &'a Scene,
    quadtree: &'a Quadtree,
    light_power: f64,
}

impl<'a> Tracer<'a> {
    /// `light_power` is the expected total power used to draw a light.
    pub fn new(scene: &'a Scene, quadtree: &'a Quadtree, light_power: f64) -> Self {
        Self {
            scene,
            quadtree,
            light_power,
        }
    }

    pub fn scene(&self) -> &'a Scene {
        self.scene
    }

    /// Trace one ray, drawing every segment of its path into `image`.
    ///
    /// `geometry` must have been reset for this ray.
    pub fn trace_ray(
        &self,
        sampler: &mut Sampler,
        geometry: &mut SceneGeometry<'_>,
        image: &mut HistogramImage,
    ) -> RayOutcome {
        let Some(light) = self.choose_light(sampler) else {
            return RayOutcome::Discarded;
        };
        let Some((mut ray, color)) = emit(light, sampler) else {
            return RayOutcome::Discarded;
        };

        let viewport = ViewportSample::sample(self.scene, sampler);
        let (width, height) = (self.scene.width, self.scene.height);
        let draw = |image: &mut HistogramImage, from: Vec2, to: Vec2| {
            let a = viewport.to_pixels(from, width, height);
            let b = viewport.to_pixels(to, width, height);
            image.line(color, a.x, a.y, b.x, b.y);
        };

        for _ in 0..MAX_BOUNCES {
            match self.quadtree.intersect(&ray, geometry, sampler) {
                Some(hit) => {
                    draw(image, ray.origin, hit.point);
                    let object = &self.scene.objects[hit.object];
                    let Some(material) = self.scene.materials.get(object.material) else {
                        return RayOutcome::Absorbed;
                    };
                    if !scatter(material, &hit, &mut ray, sampler) {
                        return RayOutcome::Absorbed;
                    }
                }
                None => {
                    let distance = ray.intersect_furthest(&viewport.bounds());
                    draw(image, ray.origin, ray.at(distance));
                    return RayOutcome::Exited;
                }
            }
        }
        RayOutcome::BounceLimit
    }

    /// Pick a light with probability proportional to its sampled power.
    ///
    /// Every light's power is drawn while walking the cumulative sum, so
    /// the number of draws does not depend on which light wins. Rounding
    /// can leave the draw past the end, in which case the last light is
    /// used.
    fn choose_light(&self, sampler: &mut Sampler) -> Option<&'a Light> {
        let lights = &self.scene.lights;
        match lights.len() {
            0 => None,
            1 => Some(&lights[0]),
            _ => {
                let r = sampler.uniform_range(0.0, self.light_power);
                let mut sum = 0.0;
                let mut chosen = None;
                for light in lights {
                    sum += sampler.value(&light.power);
                    if chosen.is_none() && r <= sum {
                        chosen = Some(light);
                    }
                }
                chosen.or(lights.last())
            }
        }
    }
}

/// Starting ray and color for `light`, or `None` if no visible wavelength
/// came up within the retry limit.
fn emit(light: &Light, sampler: &mut Sampler) -> Option<(Ray, Color)> {
    let x = sampler.value(&light.x);
    let y = sampler.value(&light.y);
    let polar_angle = sampler.value(&light.polar_angle).to_radians();
    let polar_distance = sampler.value(&light.polar_distance);
    let origin = Vec2::new(x, y) + Vec2::from_angle(polar_angle) * polar_distance;
    let ray = Ray::from_angle(origin, sampler.value(&light.ray_angle).to_radians());

    for _ in 0..MAX_WAVELENGTH_TRIES {
        let color = Color::from_wavelength(sampler.value(&light.wavelength));
        if color.is_visible() {
            return Some((ray, color));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use hqz_model::{Material, Object, Sample, Viewport};

    fn light(x: f64, y: f64, angle: f64, wavelength: Sample) -> Light {
        Light {
            power: Sample::Constant(1.0),
            x: Sample::Constant(x),
            y: Sample::Constant(y),
            polar_angle: Sample::ZERO,
            polar_distance: Sample::ZERO,
            ray_angle: Sample::Constant(angle),
            wavelength,
        }
    }

    fn scene(lights: Vec<Light>) -> Scene {
        Scene {
            width: 64,
            height: 64,
            rays: 1,
            viewport: Viewport {
                x: Sample::ZERO,
                y: Sample::ZERO,
                width: Sample::Constant(64.0),
                height: Sample::Constant(64.0),
            },
            lights,
            ..Scene::default()
        }
    }

    fn trace(scene: &Scene, seed: u64) -> (RayOutcome, HistogramImage) {
        let tree = Quadtree::build(&scene.objects);
        let tracer = Tracer::new(scene, &tree, 1.0);
        let mut geometry = SceneGeometry::new(&scene.objects);
        let mut image = HistogramImage::new(scene.width, scene.height);
        let mut sampler = Sampler::new(seed);
        let outcome = tracer.trace_ray(&mut sampler, &mut geometry, &mut image);
        (outcome, image)
    }

    #[test]
    fn lone_ray_runs_to_the_viewport_edge() {
        let scene = scene(vec![light(10.0, 32.5, 0.0, Sample::Constant(550.0))]);
        let (outcome, image) = trace(&scene, 7);
        assert_eq!(outcome, RayOutcome::Exited);
        for y in 0..64 {
            for x in 0..64 {
                let lit = image.pixel(x, y) != [0; 3];
                assert_eq!(lit, y == 32 && x >= 10, "pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn invisible_wavelength_is_discarded() {
        let scene = scene(vec![light(10.0, 32.5, 0.0, Sample::Constant(1000.0))]);
        let (outcome, image) = trace(&scene, 7);
        assert_eq!(outcome, RayOutcome::Discarded);
        assert!(image.is_blank());
    }

    #[test]
    fn no_lights_means_nothing_to_trace() {
        let (outcome, _) = trace(&scene(Vec::new()), 0);
        assert!(!outcome.is_traced());
    }

    #[test]
    fn absorbing_wall_stops_the_ray() {
        let mut scene = scene(vec![light(10.0, 32.5, 0.0, Sample::ZERO)]);
        scene.materials = vec![Material::default()];
        scene.objects = vec![Object {
            material: 0,
            x0: Sample::Constant(40.0),
            y0: Sample::Constant(0.0),
            dx: Sample::ZERO,
            dy: Sample::Constant(64.0),
            curve: None,
        }];
        let (outcome, image) = trace(&scene, 3);
        assert_eq!(outcome, RayOutcome::Absorbed);
        assert_ne!(image.pixel(39, 32), [0; 3]);
        assert_eq!(image.pixel(41, 32), [0; 3]);
    }

    #[test]
    fn missing_material_absorbs() {
        let mut scene = scene(vec![light(10.0, 32.5, 0.0, Sample::ZERO)]);
        scene.objects = vec![Object {
            material: 5,
            x0: Sample::Constant(40.0),
            y0: Sample::Constant(0.0),
            dx: Sample::ZERO,
            dy: Sample::Constant(64.0),
            curve: None,
        }];
        let (outcome, _) = trace(&scene, 3);
        assert_eq!(outcome, RayOutcome::Absorbed);
    }

    #[test]
    fn mirror_box_hits_the_bounce_limit() {
        let mut scene = scene(vec![light(32.0, 32.5, 0.0, Sample::ZERO)]);
        scene.materials = vec![Material::new(0.0, 1.0, 0.0)];
        let wall = |x: f64| Object {
            material: 0,
            x0: Sample::Constant(x),
            y0: Sample::Constant(0.0),
            dx: Sample::ZERO,
            dy: Sample::Constant(64.0),
            curve: None,
        };
        scene.objects = vec![wall(8.0), wall(56.0)];
        let (outcome, _) = trace(&scene, 3);
        assert_eq!(outcome, RayOutcome::BounceLimit);
    }

    #[test]
    fn light_choice_follows_power() {
        let mut dim = light(0.0, 0.0, 0.0, Sample::ZERO);
        dim.power = Sample::Constant(1.0);
        let mut bright = light(0.0, 0.0, 0.0, Sample::ZERO);
        bright.power = Sample::Constant(3.0);
        let scene = scene(vec![dim, bright]);
        let tree = Quadtree::build(&scene.objects);
        let tracer = Tracer::new(&scene, &tree, 4.0);

        let mut bright_count = 0;
        for seed in 0..4000 {
            let mut sampler = Sampler::new(seed);
            let chosen = tracer.choose_light(&mut sampler).map(|l| l.power);
            if chosen == Some(Sample::Constant(3.0)) {
                bright_count += 1;
            }
        }
        let fraction = bright_count as f64 / 4000.0;
        assert!((fraction - 0.75).abs() < 0.05, "{fraction}");
    }
}
