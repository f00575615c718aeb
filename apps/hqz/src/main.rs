use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, Utc};
use clap::Parser;
use hqz_model::{load_scene_str, Diagnostics, Scene};
use hqz_render::image_out::write_png_to;
use hqz_render::{CancelToken, RenderError, RenderSettings, RenderStats, Renderer, DEFAULT_BATCH_SIZE};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Parser)]
#[command(name = "hqz", version, about = "Render a 2D photon-path scene to PNG")]
struct Cli {
    /// Scene JSON, or `-` for standard input.
    scene: PathBuf,

    /// Output PNG, or `-` for standard output.
    output: PathBuf,

    /// Worker threads; 0 uses every core.
    #[arg(long, default_value_t = 0)]
    threads: usize,

    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: u64,

    /// Override the scene's seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Override the scene's ray budget; 0 is unbounded.
    #[arg(long)]
    rays: Option<u64>,

    /// Override the scene's time limit in seconds; 0 is unbounded.
    #[arg(long)]
    time_limit: Option<f64>,

    /// Log progress every N batches; 0 disables it.
    #[arg(long, default_value_t = 100)]
    progress_every: u64,

    /// Write a JSON receipt describing the run.
    #[arg(long)]
    receipt: Option<PathBuf>,

    /// Write the scene as it was understood, after overrides.
    #[arg(long)]
    dump_scene: Option<PathBuf>,
}

/// Process exit status for each failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitStatus {
    Usage = 1,
    Input = 2,
    Output = 3,
    Scene = 5,
    Write = 6,
    Render = 7,
}

#[derive(Debug)]
struct Failure {
    status: ExitStatus,
    error: anyhow::Error,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.error)
    }
}

trait OrExit<T> {
    fn or_exit(self, status: ExitStatus) -> Result<T, Failure>;
}

impl<T> OrExit<T> for anyhow::Result<T> {
    fn or_exit(self, status: ExitStatus) -> Result<T, Failure> {
        self.map_err(|error| Failure { status, error })
    }
}

#[derive(Serialize)]
struct RenderReceipt {
    version: String,
    started_at_utc: String,
    finished_at_utc: String,
    scene: PathBuf,
    output: PathBuf,
    settings: SettingsSummary,
    stats: StatsSummary,
    diagnostics: Vec<String>,
    host: HostInfo,
}

#[derive(Serialize)]
struct SettingsSummary {
    width: u32,
    height: u32,
    seed: u64,
    rays: u64,
    time_limit: f64,
    threads: usize,
    batch_size: u64,
}

#[derive(Serialize)]
struct StatsSummary {
    rays_traced: u64,
    rays_discarded: u64,
    rays_exited: u64,
    rays_absorbed: u64,
    rays_bounce_limited: u64,
    batches: u64,
    elapsed_secs: f64,
    interrupted: bool,
}

impl From<&RenderStats> for StatsSummary {
    fn from(stats: &RenderStats) -> Self {
        Self {
            rays_traced: stats.rays_traced,
            rays_discarded: stats.rays_discarded,
            rays_exited: stats.rays_exited,
            rays_absorbed: stats.rays_absorbed,
            rays_bounce_limited: stats.rays_bounce_limited,
            batches: stats.batches,
            elapsed_secs: stats.elapsed.as_secs_f64(),
            interrupted: stats.interrupted,
        }
    }
}

#[derive(Serialize)]
struct HostInfo {
    os: String,
    arch: String,
    cpus: usize,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let status = if err.use_stderr() { ExitStatus::Usage as i32 } else { 0 };
            let _ = err.print();
            std::process::exit(status);
        }
    };

    if let Err(failure) = run(cli) {
        eprintln!("error: {failure}");
        std::process::exit(failure.status as i32);
    }
}

fn run(cli: Cli) -> Result<(), Failure> {
    let started_at_utc = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    let text = read_input(&cli.scene).or_exit(ExitStatus::Input)?;
    let loaded = load_scene_str(&text)
        .with_context(|| format!("failed to parse scene {:?}", cli.scene))
        .or_exit(ExitStatus::Scene)?;
    let mut scene = loaded.scene;
    apply_overrides(&mut scene, &cli);

    if let Some(path) = &cli.dump_scene {
        write_json(path, &scene).or_exit(ExitStatus::Write)?;
    }

    // Open the output before spending time on the render.
    let mut output = open_output(&cli.output).or_exit(ExitStatus::Output)?;

    let renderer = Renderer::new(scene).map_err(|err| Failure {
        status: match err {
            RenderError::NoStoppingCondition => ExitStatus::Scene,
            RenderError::ThreadPool(_) => ExitStatus::Render,
        },
        error: err.into(),
    })?;

    let mut diagnostics = loaded.diagnostics;
    diagnostics.extend(renderer.diagnostics().clone());
    report(&diagnostics);

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        log::warn!("interrupted; finishing batches in flight");
        handler_token.cancel();
    }) {
        log::warn!("failed to install Ctrl-C handler: {err}");
    }

    let settings = RenderSettings {
        threads: cli.threads,
        batch_size: cli.batch_size,
        progress_every: cli.progress_every,
    };
    let result = renderer
        .render(&settings, &cancel)
        .context("render failed")
        .or_exit(ExitStatus::Render)?;

    write_png_to(&mut output, &result.image)
        .map_err(anyhow::Error::from)
        .and_then(|()| output.flush().map_err(anyhow::Error::from))
        .with_context(|| format!("failed to write image {:?}", cli.output))
        .or_exit(ExitStatus::Write)?;

    if let Some(path) = &cli.receipt {
        let scene = renderer.scene();
        let receipt = RenderReceipt {
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at_utc,
            finished_at_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            scene: cli.scene.clone(),
            output: cli.output.clone(),
            settings: SettingsSummary {
                width: scene.width,
                height: scene.height,
                seed: scene.seed,
                rays: scene.rays,
                time_limit: scene.time_limit,
                threads: cli.threads,
                batch_size: cli.batch_size,
            },
            stats: StatsSummary::from(&result.stats),
            diagnostics: diagnostics.messages().to_vec(),
            host: HostInfo {
                os: std::env::consts::OS.to_string(),
                arch: std::env::consts::ARCH.to_string(),
                cpus: std::thread::available_parallelism().map_or(1, |n| n.get()),
            },
        };
        write_json(path, &receipt).or_exit(ExitStatus::Write)?;
    }

    Ok(())
}

fn apply_overrides(scene: &mut Scene, cli: &Cli) {
    if let Some(seed) = cli.seed {
        scene.seed = seed;
    }
    if let Some(rays) = cli.rays {
        scene.rays = rays;
    }
    if let Some(time_limit) = cli.time_limit {
        scene.time_limit = time_limit;
    }
}

fn report(diagnostics: &Diagnostics) {
    if !diagnostics.is_empty() {
        log::warn!("{} scene problem(s):\n{}", diagnostics.len(), diagnostics);
    }
}

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == "-"
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    if is_stdio(path) {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("failed to read scene from standard input")?;
        Ok(text)
    } else {
        fs::read_to_string(path).map_err(|err| anyhow!("failed to read input {:?}: {}", path, err))
    }
}

fn open_output(path: &Path) -> anyhow::Result<Box<dyn Write>> {
    if is_stdio(path) {
        return Ok(Box::new(BufWriter::new(io::stdout().lock())));
    }
    let file = fs::File::create(path)
        .map_err(|err| anyhow!("failed to create output {:?}: {}", path, err))?;
    Ok(Box::new(BufWriter::new(file)))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &json)
}

fn atomic_write(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .map_err(|err| anyhow!("failed to create output directory {:?}: {}", parent, err))?;
    }

    let tmp_path = temp_path(path);
    let mut file = fs::File::create(&tmp_path)
        .map_err(|err| anyhow!("failed to create temp file {:?}: {}", tmp_path, err))?;
    file.write_all(data)
        .map_err(|err| anyhow!("failed to write temp file {:?}: {}", tmp_path, err))?;
    file.sync_all()
        .map_err(|err| anyhow!("failed to sync temp file {:?}: {}", tmp_path, err))?;

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(anyhow!("failed to replace output {:?}: {}", path, err));
    }

    if let Ok(dir) = fs::File::open(parent) {
        let _ = dir.sync_all();
    }

    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("output");
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    parent.join(format!(".{}.part-{}-{}", file_name, std::process::id(), stamp))
}
