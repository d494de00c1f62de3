//! beamray CLI - trace X-ray beamlines from the command line
//!
//! Reads a JSON scene (beamline, rays, material tables) and an optional TOML
//! trace configuration, traces every ray and writes the events as CSV.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use beamray_trace::{event_count, BackendKind, Tracer};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod scene;

use scene::{load_config, terminal_summary, write_csv, Scene};

#[derive(Parser)]
#[command(name = "beamray")]
#[command(about = "Batched X-ray ray tracing through beamline optics", long_about = None)]
struct Cli {
    /// Log debug output (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trace a scene and write its events as CSV
    Trace {
        /// Scene file (.json)
        scene: PathBuf,
        /// Trace configuration (.toml); defaults are sized for the beamline
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output CSV file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Execution backend: cpu or gpu
        #[arg(long)]
        backend: Option<BackendKind>,
        /// Random seed
        #[arg(long)]
        seed: Option<u64>,
        /// Rays per batch
        #[arg(long)]
        max_batch_size: Option<usize>,
        /// Only write the last event of every ray
        #[arg(long)]
        last_only: bool,
    },
    /// Describe a scene file
    Info {
        /// Scene file (.json)
        scene: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Trace {
            scene,
            config,
            output,
            backend,
            seed,
            max_batch_size,
            last_only,
        } => {
            let options = TraceOptions {
                backend,
                seed,
                max_batch_size,
                last_only,
            };
            run_trace(&scene, config.as_deref(), output.as_deref(), &options)?;
        }
        Commands::Info { scene } => {
            show_info(&scene)?;
        }
    }

    Ok(())
}

struct TraceOptions {
    backend: Option<BackendKind>,
    seed: Option<u64>,
    max_batch_size: Option<usize>,
    last_only: bool,
}

fn run_trace(scene_path: &Path, config_path: Option<&Path>, output: Option<&Path>, options: &TraceOptions) -> Result<()> {
    let scene = Scene::load(scene_path)?;
    let mut config = load_config(config_path, &scene.beamline)?;
    if let Some(backend) = options.backend {
        config.backend = backend;
    }
    if let Some(seed) = options.seed {
        config.random_seed = Some(seed);
    }
    if let Some(max_batch_size) = options.max_batch_size {
        config.max_batch_size = max_batch_size;
    }

    let started = Instant::now();
    let mut tracer = Tracer::new(config.backend).context("creating backend")?;
    let history = tracer
        .trace(&scene.beamline, &scene.rays, &scene.materials, &config)
        .context("tracing failed")?;
    info!(
        rays = history.len(),
        events = event_count(&history),
        elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
        "trace finished"
    );
    for (kind, rays) in terminal_summary(&history) {
        info!(rays, "{kind}");
    }

    let rows = match output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            let mut out = BufWriter::new(file);
            let rows = write_csv(&mut out, &history, options.last_only)?;
            out.flush().with_context(|| format!("writing {}", path.display()))?;
            rows
        }
        None => {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            let rows = write_csv(&mut out, &history, options.last_only)?;
            out.flush().context("writing stdout")?;
            rows
        }
    };
    info!(rows, "records written");

    Ok(())
}

fn show_info(path: &Path) -> Result<()> {
    let scene = Scene::load(path)?;
    println!("Scene: {}", path.display());
    println!("  Elements: {}", scene.beamline.len());
    for (kind, count) in scene.element_kinds() {
        println!("    {kind}: {count}");
    }
    println!("  Rays: {}", scene.rays.len());
    println!("  Materials: {}", scene.materials.material_count());
    if let Err(err) = scene.materials.validate() {
        println!("  Material tables invalid: {err}");
    }

    let config = beamray_trace::TraceConfig::for_beamline(&scene.beamline);
    println!("  Default event budget: {}", config.max_events);

    Ok(())
}
