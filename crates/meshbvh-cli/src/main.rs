//! meshbvh CLI - build, cache and inspect mesh BVHs
//!
//! Loads OBJ meshes, builds (or reuses a cached) binned-SAH BVH and reports
//! tree statistics.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use meshbvh::cache::codec;
use meshbvh::{
    build_bvh_with_config, load_or_build, validate_nodes, BvhCacheMetadata, BvhStats, SahConfig,
};

mod obj;

/// Cache directory used when `--cache-dir` is not given, relative to the root.
const DEFAULT_CACHE_DIR: &str = ".meshbvh";

#[derive(Parser)]
#[command(name = "meshbvh")]
#[command(about = "Binned-SAH BVH builder with an on-disk cache", long_about = None)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a BVH for an OBJ mesh and print its statistics
    Build {
        /// Input .obj file
        mesh: PathBuf,
        /// Directory for cache files (default: <root>/.meshbvh)
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        /// Project root that cache identities are relative to (default: current directory)
        #[arg(long)]
        root: Option<PathBuf>,
        /// TOML file with SAH settings
        #[arg(long)]
        config: Option<PathBuf>,
        /// Always build, never read or write the cache
        #[arg(long)]
        no_cache: bool,
        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Display the header and validity of a cache file
    Inspect {
        /// Path to the .bvh cache file
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Build {
            mesh,
            cache_dir,
            root,
            config,
            no_cache,
            json,
        } => {
            let options = BuildOptions {
                cache_dir,
                root,
                config,
                no_cache,
            };
            let report = build_mesh(&mesh, &options)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Inspect { file } => {
            inspect_cache(&file)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

struct BuildOptions {
    cache_dir: Option<PathBuf>,
    root: Option<PathBuf>,
    config: Option<PathBuf>,
    no_cache: bool,
}

#[derive(Serialize)]
struct BuildReport {
    mesh: PathBuf,
    vertices: usize,
    triangles: usize,
    cache: Option<PathBuf>,
    elapsed_ms: f64,
    stats: BvhStats,
}

fn load_config(path: Option<&Path>) -> Result<SahConfig> {
    let Some(path) = path else {
        return Ok(SahConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config = SahConfig::from_toml_str(&text)
        .with_context(|| format!("Invalid config {}", path.display()))?;
    Ok(config)
}

fn build_mesh(mesh_path: &Path, options: &BuildOptions) -> Result<BuildReport> {
    let config = load_config(options.config.as_deref())?;

    let text = fs::read_to_string(mesh_path)
        .with_context(|| format!("Failed to read {}", mesh_path.display()))?;
    let mesh = obj::parse_obj(&text)
        .with_context(|| format!("Failed to parse {}", mesh_path.display()))?;
    tracing::debug!(
        vertices = mesh.vertex_count(),
        triangles = mesh.triangle_count(),
        "loaded mesh"
    );

    let start = Instant::now();
    let (build, cache) = if options.no_cache {
        (build_bvh_with_config(&mesh.positions, &mesh.indices, &config)?, None)
    } else {
        let root = match &options.root {
            Some(root) => std::path::absolute(root)?,
            None => std::env::current_dir()?,
        };
        let source = std::path::absolute(mesh_path)?;
        let cache_dir = match &options.cache_dir {
            Some(dir) => std::path::absolute(dir)?,
            None => root.join(DEFAULT_CACHE_DIR),
        };
        let cache_path = BvhCacheMetadata::cache_path_for(&source, &cache_dir);
        let metadata = BvhCacheMetadata::for_source(&source, &cache_path, &root)
            .with_context(|| format!("Failed to stat {}", source.display()))?;
        let build = load_or_build(&metadata, &mesh.positions, &mesh.indices, &config)?;
        (build, Some(cache_path))
    };
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    Ok(BuildReport {
        mesh: mesh_path.to_path_buf(),
        vertices: mesh.vertex_count(),
        triangles: mesh.triangle_count(),
        cache,
        elapsed_ms,
        stats: BvhStats::compute(&build.nodes, &config),
    })
}

fn print_report(report: &BuildReport) {
    let stats = &report.stats;
    println!("Mesh:       {}", report.mesh.display());
    println!("Vertices:   {}", report.vertices);
    println!("Triangles:  {}", report.triangles);
    match &report.cache {
        Some(path) => println!("Cache:      {}", path.display()),
        None => println!("Cache:      disabled"),
    }
    println!();
    println!(
        "Nodes:      {} ({} interior, {} leaves)",
        stats.node_count, stats.interior_count, stats.leaf_count
    );
    println!("Max depth:  {}", stats.max_depth);
    println!("SAH cost:   {:.3}", stats.sah_cost);
    println!("Time:       {:.2} ms", report.elapsed_ms);
}

fn inspect_cache(path: &Path) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let record =
        codec::decode(&bytes).with_context(|| format!("Failed to decode {}", path.display()))?;

    println!("Cache file: {}", path.display());
    println!("Version:    {}", record.version);
    println!("Source:     {}", record.source_relative);
    println!("Location:   {}", record.cache_relative);
    println!("Size:       {} bytes", record.source_size);
    println!("Mtime:      {} ns", record.source_mtime_ns);
    println!("Nodes:      {}", record.nodes.len());
    match validate_nodes(&record.nodes) {
        Ok(()) => {
            let stats = BvhStats::compute(&record.nodes, &SahConfig::default());
            println!("Triangles:  {}", stats.triangle_count);
            println!("Max depth:  {}", stats.max_depth);
            println!("Valid:      yes");
        }
        Err(e) => println!("Valid:      no ({e})"),
    }

    Ok(())
}
