use crate::geometry::SceneGeometry;
use crate::histogram::HistogramImage;
use crate::math::Vec2;
use crate::quadtree::Quadtree;
use crate::sampler::Sampler;
use crate::scheduler::{run_batches, Batch, BatchPlan, BatchQueue, CancelToken, DEFAULT_BATCH_SIZE};
use crate::spectrum::Color;
use crate::tracer::{RayOutcome, Tracer, ViewportSample};
use hqz_model::{Diagnostics, Scene, DEBUG_QUADTREE};
use image::RgbImage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Reference resolution the exposure scale is normalized to.
const REFERENCE_AREA: f64 = 1024.0 * 576.0;
/// Overlay lines come out at roughly a quarter of full brightness.
const OVERLAY_SCALE: f64 = 0.25 / 8192.0;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no stopping condition set; expected a ray limit and/or a time limit")]
    NoStoppingCondition,
    #[error("failed to build worker pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSettings {
    /// Worker threads; zero means one per core.
    pub threads: usize,
    pub batch_size: u64,
    /// Log progress every this many batches; zero disables it.
    pub progress_every: u64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            threads: 0,
            batch_size: DEFAULT_BATCH_SIZE,
            progress_every: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderStats {
    /// Rays that were emitted; the exposure denominator.
    pub rays_traced: u64,
    pub rays_discarded: u64,
    pub rays_exited: u64,
    pub rays_absorbed: u64,
    pub rays_bounce_limited: u64,
    pub batches: u64,
    pub elapsed: Duration,
    pub interrupted: bool,
}

impl RenderStats {
    fn record(&mut self, outcome: RayOutcome) {
        match outcome {
            RayOutcome::Exited => self.rays_exited += 1,
            RayOutcome::Absorbed => self.rays_absorbed += 1,
            RayOutcome::BounceLimit => self.rays_bounce_limited += 1,
            RayOutcome::Discarded => {
                self.rays_discarded += 1;
                return;
            }
        }
        self.rays_traced += 1;
    }

    fn add(&mut self, other: &RenderStats) {
        self.rays_traced += other.rays_traced;
        self.rays_discarded += other.rays_discarded;
        self.rays_exited += other.rays_exited;
        self.rays_absorbed += other.rays_absorbed;
        self.rays_bounce_limited += other.rays_bounce_limited;
        self.batches += other.batches;
    }
}

/// Snapshot handed to the progress callback after every batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub batches_done: u64,
    pub rays_done: u64,
    /// Zero when unbounded.
    pub rays_budget: u64,
    pub elapsed: Duration,
}

impl Progress {
    pub fn fraction(&self) -> Option<f64> {
        (self.rays_budget > 0).then(|| self.rays_done as f64 / self.rays_budget as f64)
    }
}

pub struct RenderOutput {
    pub image: RgbImage,
    pub histogram: HistogramImage,
    pub stats: RenderStats,
    pub diagnostics: Diagnostics,
}

/// A validated scene with its spatial index, ready to render any number
/// of times.
pub struct Renderer {
    scene: Scene,
    quadtree: Quadtree,
    light_power: f64,
    diagnostics: Diagnostics,
}

impl Renderer {
    pub fn new(scene: Scene) -> Result<Self, RenderError> {
        if !scene.has_stopping_condition() {
            return Err(RenderError::NoStoppingCondition);
        }

        let mut diagnostics = Diagnostics::new();
        for (index, object) in scene.objects.iter().enumerate() {
            if object.material >= scene.materials.len() {
                diagnostics.push(format!(
                    "Object #{index} uses missing material #{}; it absorbs every ray",
                    object.material
                ));
            }
        }

        let light_power: f64 = scene
            .lights
            .iter()
            .map(|light| Sampler::mean(&light.power))
            .sum();
        if scene.lights.is_empty() {
            diagnostics.push("Scene has no lights; the image will be black");
        } else if !(light_power > 0.0) {
            diagnostics.push("Total light power is not positive; the image will be black");
        }

        let viewport = &scene.viewport;
        if Sampler::mean(&viewport.width) == 0.0 || Sampler::mean(&viewport.height) == 0.0 {
            diagnostics.push("Viewport has zero size; nothing will be drawn");
        }

        let quadtree = Quadtree::build(&scene.objects);
        Ok(Self {
            scene,
            quadtree,
            light_power,
            diagnostics,
        })
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn quadtree(&self) -> &Quadtree {
        &self.quadtree
    }

    /// Sum of the expected power of every light.
    pub fn light_power(&self) -> f64 {
        self.light_power
    }

    /// Problems found while preparing the scene.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn render(
        &self,
        settings: &RenderSettings,
        cancel: &CancelToken,
    ) -> Result<RenderOutput, RenderError> {
        self.render_with_progress(settings, cancel, |_| {})
    }

    /// Render, calling `on_batch` from the worker thread after each batch.
    pub fn render_with_progress<F>(
        &self,
        settings: &RenderSettings,
        cancel: &CancelToken,
        on_batch: F,
    ) -> Result<RenderOutput, RenderError>
    where
        F: Fn(&Progress) + Sync,
    {
        let scene = &self.scene;
        let time_limit = if scene.time_limit > 0.0 {
            Duration::try_from_secs_f64(scene.time_limit).ok()
        } else {
            None
        };
        let queue = BatchQueue::new(
            BatchPlan {
                seed: scene.seed,
                rays: scene.rays,
                time_limit,
                batch_size: settings.batch_size,
            },
            cancel.clone(),
        );

        log::info!(
            "render: {}x{}, {} objects, {} lights, {} rays, time limit {}",
            scene.width,
            scene.height,
            scene.objects.len(),
            scene.lights.len(),
            if scene.rays == 0 { "unbounded".to_string() } else { scene.rays.to_string() },
            time_limit.map_or("none".to_string(), |t| format!("{:.1}s", t.as_secs_f64())),
        );

        let tracer = Tracer::new(scene, &self.quadtree, self.light_power);
        let batches_done = AtomicU64::new(0);
        let rays_done = AtomicU64::new(0);

        let workers = run_batches(
            settings.threads,
            &queue,
            || Worker::new(&tracer),
            |worker, batch| {
                worker.run(batch);
                let progress = Progress {
                    batches_done: batches_done.fetch_add(1, Ordering::Relaxed) + 1,
                    rays_done: rays_done.fetch_add(batch.count, Ordering::Relaxed) + batch.count,
                    rays_budget: scene.rays,
                    elapsed: queue.elapsed(),
                };
                log_progress(&progress, settings.progress_every);
                on_batch(&progress);
            },
        )?;

        let mut histogram = HistogramImage::new(scene.width, scene.height);
        let mut stats = RenderStats::default();
        for worker in &workers {
            histogram.merge(&worker.image);
            stats.add(&worker.stats);
        }
        stats.elapsed = queue.elapsed();
        stats.interrupted = cancel.is_cancelled();

        let exponent = if scene.gamma > 0.0 { 1.0 / scene.gamma } else { 1.0 };
        let mut image = histogram.render(self.exposure_scale(stats.rays_traced), exponent);
        if scene.debug & DEBUG_QUADTREE != 0 {
            self.draw_quadtree(&mut image);
        }

        log::info!(
            "render: done, {} rays traced ({} discarded) in {} batches, {:.2}s{}",
            stats.rays_traced,
            stats.rays_discarded,
            stats.batches,
            stats.elapsed.as_secs_f64(),
            if stats.interrupted { ", interrupted" } else { "" },
        );

        Ok(RenderOutput {
            image,
            histogram,
            stats,
            diagnostics: self.diagnostics.clone(),
        })
    }

    /// Histogram-to-pixel scale for a render that traced `rays_traced` rays.
    pub fn exposure_scale(&self, rays_traced: u64) -> f64 {
        if rays_traced == 0 || !(self.light_power > 0.0) {
            return 0.0;
        }
        let scene = &self.scene;
        let area_scale = (scene.width as f64 * scene.height as f64 / REFERENCE_AREA).sqrt();
        let intensity_scale = self.light_power / (255.0 * 8192.0);
        (1.0 + 10.0 * scene.exposure).exp() * area_scale * intensity_scale / rays_traced as f64
    }

    /// Outline every quadtree node over the finished image.
    fn draw_quadtree(&self, image: &mut RgbImage) {
        let scene = &self.scene;
        let viewport = &scene.viewport;
        let view = ViewportSample {
            origin: Vec2::new(Sampler::mean(&viewport.x), Sampler::mean(&viewport.y)),
            size: Vec2::new(Sampler::mean(&viewport.width), Sampler::mean(&viewport.height)),
        };

        let mut overlay = HistogramImage::new(scene.width, scene.height);
        self.quadtree.visit(|bounds, _| {
            let corners = [
                Vec2::new(bounds.left, bounds.top),
                Vec2::new(bounds.right, bounds.top),
                Vec2::new(bounds.right, bounds.bottom),
                Vec2::new(bounds.left, bounds.bottom),
            ]
            .map(|corner| view.to_pixels(corner, scene.width, scene.height));
            for i in 0..4 {
                let (a, b) = (corners[i], corners[(i + 1) % 4]);
                overlay.line(Color::white(), a.x, a.y, b.x, b.y);
            }
        });

        let lines = overlay.render(OVERLAY_SCALE, 1.0);
        for (pixel, line) in image.pixels_mut().zip(lines.pixels()) {
            for (c, l) in pixel.0.iter_mut().zip(line.0) {
                *c = c.saturating_add(l);
            }
        }
    }
}

/// Convenience for a one-shot render without cancellation.
pub fn render_scene(scene: &Scene, settings: &RenderSettings) -> Result<RenderOutput, RenderError> {
    Renderer::new(scene.clone())?.render(settings, &CancelToken::new())
}

struct Worker<'a> {
    tracer: &'a Tracer<'a>,
    geometry: SceneGeometry<'a>,
    image: HistogramImage,
    stats: RenderStats,
}

impl<'a> Worker<'a> {
    fn new(tracer: &'a Tracer<'a>) -> Self {
        let scene = tracer.scene();
        Self {
            tracer,
            geometry: SceneGeometry::new(&scene.objects),
            image: HistogramImage::new(scene.width, scene.height),
            stats: RenderStats::default(),
        }
    }

    fn run(&mut self, batch: Batch) {
        for offset in 0..batch.count {
            let mut sampler = Sampler::new(batch.ray_seed(offset));
            self.geometry.reset();
            let outcome = self
                .tracer
                .trace_ray(&mut sampler, &mut self.geometry, &mut self.image);
            self.stats.record(outcome);
        }
        self.stats.batches += 1;
    }
}

fn log_progress(progress: &Progress, every: u64) {
    if every == 0 || progress.batches_done % every != 0 {
        return;
    }
    let elapsed = progress.elapsed.as_secs_f64();
    match progress.fraction() {
        Some(fraction) if fraction > 0.0 => {
            let remaining = (elapsed / fraction - elapsed).max(0.0);
            log::info!(
                "render: {}/{} rays ({:.1}%) elapsed {:.1}s eta {:.1}s",
                progress.rays_done,
                progress.rays_budget,
                fraction * 100.0,
                elapsed,
                remaining
            );
        }
        _ => log::info!(
            "render: {} rays elapsed {:.1}s",
            progress.rays_done,
            elapsed
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hqz_model::{Light, Sample};

    fn lit_scene() -> Scene {
        Scene {
            width: 32,
            height: 32,
            exposure: 0.5,
            rays: 10,
            viewport: hqz_model::Viewport {
                x: Sample::ZERO,
                y: Sample::ZERO,
                width: Sample::Constant(32.0),
                height: Sample::Constant(32.0),
            },
            lights: vec![Light {
                power: Sample::Constant(1.0),
                x: Sample::Constant(16.0),
                y: Sample::Constant(16.0),
                ray_angle: Sample::range(0.0, 360.0),
                ..Light::default()
            }],
            ..Scene::default()
        }
    }

    #[test]
    fn exposure_scale_matches_reference_resolution() {
        let mut scene = lit_scene();
        scene.width = 1024;
        scene.height = 576;
        scene.exposure = 0.0;
        let renderer = Renderer::new(scene).unwrap();
        let expected = std::f64::consts::E / (255.0 * 8192.0) / 4.0;
        assert!((renderer.exposure_scale(4) - expected).abs() < 1e-15);
        assert_eq!(renderer.exposure_scale(0), 0.0);
    }

    #[test]
    fn missing_materials_are_reported_once_each() {
        let mut scene = lit_scene();
        scene.objects = vec![hqz_model::Object {
            material: 2,
            ..hqz_model::Object::default()
        }];
        let renderer = Renderer::new(scene).unwrap();
        assert_eq!(renderer.diagnostics().len(), 1);
        assert!(renderer.diagnostics().contains("missing material #2"));
    }

    #[test]
    fn quadtree_overlay_only_adds_light() {
        let mut scene = lit_scene();
        scene.objects = (0..12)
            .map(|i| hqz_model::Object {
                material: 0,
                x0: Sample::Constant(2.0 + i as f64 * 2.5),
                y0: Sample::Constant(4.0),
                dx: Sample::Constant(1.0),
                dy: Sample::Constant(20.0),
                curve: None,
            })
            .collect();
        scene.materials = vec![hqz_model::Material::new(0.0, 0.0, 1.0)];
        let settings = RenderSettings {
            threads: 1,
            ..RenderSettings::default()
        };

        let plain = render_scene(&scene, &settings).unwrap();
        scene.debug = DEBUG_QUADTREE;
        let debug = render_scene(&scene, &settings).unwrap();

        let mut brighter = false;
        for (a, b) in plain.image.pixels().zip(debug.image.pixels()) {
            for (x, y) in a.0.iter().zip(b.0) {
                assert!(y >= *x);
                brighter |= y > *x;
            }
        }
        assert!(brighter);
    }
}
