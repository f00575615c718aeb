//! Stochastic 2D photon tracer and image output.

pub mod math;
pub mod spectrum;
pub mod sampler;
pub mod geometry;
pub mod quadtree;
pub mod material;
pub mod histogram;
pub mod tracer;
pub mod scheduler;
pub mod integrator;
pub mod image_out;

pub use integrator::{render_scene, Progress, RenderError, RenderOutput, RenderSettings, RenderStats, Renderer};
pub use scheduler::{CancelToken, DEFAULT_BATCH_SIZE};
