//! # Marquee CLI
//!
//! Command-line interface for the Marquee texture cache.
//!
//! ## Commands
//! - `preload` - Request textures, wait for the loader and report memory usage
//! - `probe` - Print the source kind and header dimensions of a file
//! - `config` - Print or write the effective configuration

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use marquee_assets::{ImageSizeCache, SourceKind, TextureCache, TextureContext, TextureOptions};
use marquee_core::{FrontendConfig, MaxSizeInfo};
use marquee_renderer::HeadlessBackend;

/// Marquee texture cache CLI
#[derive(Parser)]
#[command(name = "marquee")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "marquee.json")]
    pub config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Load textures through the cache and report memory usage
    Preload {
        /// Texture paths
        #[arg(required = true)]
        paths: Vec<String>,

        /// VRAM budget in megabytes
        #[arg(long)]
        max_vram: Option<u32>,

        /// Decode at natural size instead of the display box
        #[arg(long)]
        no_optimize: bool,

        /// Decode on the calling thread
        #[arg(long)]
        sync: bool,

        /// Display box, e.g. 640x480
        #[arg(long, value_parser = parse_max_size)]
        max_size: Option<MaxSizeInfo>,

        /// Seconds to wait for queued decodes
        #[arg(long, default_value = "30")]
        timeout: u64,
    },

    /// Print the source kind and dimensions of a file
    Probe {
        /// File to probe
        path: PathBuf,
    },

    /// Print the effective configuration
    Config {
        /// Write it to this file instead
        #[arg(short, long)]
        write: Option<PathBuf>,
    },
}

/// Parse a `WIDTHxHEIGHT` display box
pub fn parse_max_size(value: &str) -> Result<MaxSizeInfo, String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", value))?;
    let width: f32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width '{}'", width))?;
    let height: f32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height '{}'", height))?;
    if width <= 0.0 || height <= 0.0 {
        return Err(format!("display box {} must be positive", value));
    }
    Ok(MaxSizeInfo::new(width, height, false))
}

/// Execute the CLI command
pub fn execute(cli: Cli) -> Result<()> {
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    run(cli)
}

/// Run a command without touching the logger
pub fn run(cli: Cli) -> Result<()> {
    let mut config = FrontendConfig::load_or_default(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    match cli.command {
        Commands::Preload {
            paths,
            max_vram,
            no_optimize,
            sync,
            max_size,
            timeout,
        } => {
            if let Some(max_vram) = max_vram {
                config.textures.max_vram_mb = max_vram;
            }
            if no_optimize {
                config.textures.optimize_vram = false;
            }
            if sync {
                config.textures.async_images = false;
            }
            preload(&config, &paths, max_size, Duration::from_secs(timeout))?;
        }

        Commands::Probe { path } => {
            let (kind, size) = probe(&path);
            match size {
                Some(size) => println!("{}: {} {}x{}", path.display(), kind, size.width, size.height),
                None => println!("{}: {} (size unknown)", path.display(), kind),
            }
        }

        Commands::Config { write } => match write {
            Some(target) => {
                config
                    .save(&target)
                    .with_context(|| format!("failed to write {}", target.display()))?;
                log::info!("Configuration written to {}", target.display());
            }
            None => println!("{}", serde_json::to_string_pretty(&config)?),
        },
    }

    Ok(())
}

/// Source kind and header dimensions of `path`
pub fn probe(path: &Path) -> (SourceKind, Option<marquee_core::Size2>) {
    let name = path.to_string_lossy();
    let kind = SourceKind::from_path(&name);
    let size = ImageSizeCache::new().probe(&name, path);
    (kind, size)
}

fn preload(
    config: &FrontendConfig,
    paths: &[String],
    max_size: Option<MaxSizeInfo>,
    timeout: Duration,
) -> Result<()> {
    config.textures.validate()?;

    let backend = Arc::new(HeadlessBackend::new());
    let ctx = TextureContext::from_config(backend.clone(), config);
    let size_cache_path = ctx.fs().cache_path("image_sizes.json");
    let ctx = match ImageSizeCache::load(&size_cache_path) {
        Ok(size_cache) => ctx.with_size_cache(size_cache),
        Err(e) => {
            log::debug!("No image size cache at {}: {}", size_cache_path.display(), e);
            ctx
        }
    };
    let cache = TextureCache::new(Arc::new(ctx));

    log::info!("Preloading {} textures...", paths.len());
    let options = TextureOptions {
        max_size,
        ..TextureOptions::default()
    };
    let textures: Vec<_> = paths
        .iter()
        .inspect(|path| {
            if !cache.context().fs().exists(path) {
                log::warn!("{} does not exist", path);
            }
        })
        .map(|path| (path, cache.get(path, options)))
        .collect();

    if !cache.wait_idle(timeout) {
        bail!("loader still busy after {:?}", timeout);
    }

    for (path, texture) in &textures {
        let bound = texture.bind();
        let size = texture.size();
        let state = if bound { "bound" } else { "failed" };
        println!("{:>7} {:>5}x{:<5} {}", state, size.width, size.height, path);
    }

    println!("{}", cache.report());
    let stats = backend.stats();
    log::info!(
        "{} GPU textures, {} created, {} destroyed",
        stats.texture_count,
        stats.textures_created,
        stats.textures_destroyed
    );

    if cache.context().size_cache().is_dirty() {
        if let Err(e) = cache.save_size_cache() {
            log::warn!("Failed to save image size cache: {}", e);
        }
    }
    Ok(())
}
