//! idwkit CLI - IDW surfaces, region means and their regression through a shared cache

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use idwkit_algorithms::statistics::RegressionSummary;
use idwkit_core::io::{read_geojson, read_geotiff, read_region_table};
use idwkit_core::vector::{total_bounds, Region};
use idwkit_core::Raster;
use idwkit_pipeline::{
    default_warm_ks, InterpolationParams, OutputPaths, OutputRequest, Pipeline, PipelineConfig,
};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "idwkit")]
#[command(author, version, about = "IDW interpolation, zonal means and regression with a shared artifact cache", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Pipeline configuration (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache root, overrides the configuration
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Sample points (GeoJSON), overrides the configuration
    #[arg(long, global = true)]
    samples: Option<PathBuf>,

    /// Region polygons (GeoJSON), overrides the configuration
    #[arg(long, global = true)]
    regions: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Interpolation parameters shared by every keyed command
#[derive(Args, Clone, Copy)]
struct KeyArgs {
    /// Distance-decay exponent, > 1
    #[arg(short, long, default_value = "2.0")]
    k: f64,
    /// Cell size in meters (truncated to whole meters)
    #[arg(short, long, default_value = "500")]
    cell: f64,
    /// Nearest neighbors per cell
    #[arg(long, default_value = "32")]
    knn: usize,
}

impl KeyArgs {
    fn params(&self) -> InterpolationParams {
        InterpolationParams::new(self.k, self.cell, self.knn)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Interpolate the sample values onto the region grid
    Interpolate {
        #[command(flatten)]
        key: KeyArgs,
    },
    /// Mean raster value per region
    Zonal {
        #[command(flatten)]
        key: KeyArgs,
    },
    /// Regress the region attribute on the region mean and write the region layer
    Regress {
        #[command(flatten)]
        key: KeyArgs,
    },
    /// Ensure any combination of artifacts for one key
    Ensure {
        #[command(flatten)]
        key: KeyArgs,
        /// Metadata JSON
        #[arg(long)]
        metadata: bool,
        /// Region table
        #[arg(long)]
        table: bool,
        /// Regression summary
        #[arg(long)]
        summary: bool,
        /// Per-region residuals
        #[arg(long)]
        residuals: bool,
        /// Region polygons with mean, prediction and residual (GeoJSON)
        #[arg(long)]
        region_layer: bool,
        /// PNG preview with this longest side
        #[arg(long)]
        preview: Option<usize>,
        /// Every artifact, preview at the configured size
        #[arg(long)]
        all: bool,
    },
    /// Pre-generate a range of k values
    Warm {
        /// k values (default 1.1 to 6.0 in steps of 0.1)
        #[arg(long, value_delimiter = ',')]
        ks: Vec<f64>,
        /// Cell size in meters
        #[arg(short, long, default_value = "500")]
        cell: f64,
        /// Nearest neighbors per cell
        #[arg(long, default_value = "32")]
        knn: usize,
        /// Raster and preview only
        #[arg(long)]
        raster_only: bool,
    },
    /// Describe the datasets, or a raster file
    Inspect {
        /// Raster file to describe instead of the datasets
        raster: Option<PathBuf>,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install log subscriber")
}

fn spinner(msg: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .context("Invalid spinner template")?,
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = dir.clone();
    }
    if let Some(path) = &cli.samples {
        config.samples = path.clone();
    }
    if let Some(path) = &cli.regions {
        config.regions = path.clone();
    }
    Ok(config)
}

fn ensure(pipeline: &Pipeline, key: &KeyArgs, request: &OutputRequest) -> Result<OutputPaths> {
    let pb = spinner("Ensuring outputs...")?;
    let start = Instant::now();
    let paths = pipeline
        .ensure_outputs(&key.params(), request)
        .context("Failed to ensure outputs")?;
    pb.finish_and_clear();
    println!("Key: {}", paths.key);
    print_paths(&paths);
    println!("  Processing time: {:.2?}", start.elapsed());
    Ok(paths)
}

fn print_paths(paths: &OutputPaths) {
    println!("  raster:    {}", paths.raster.display());
    let optional = [
        ("metadata", &paths.metadata),
        ("table", &paths.table),
        ("summary", &paths.summary),
        ("residuals", &paths.residuals),
        ("regions", &paths.regions),
        ("preview", &paths.preview),
    ];
    for (name, path) in optional {
        if let Some(path) = path {
            println!("  {:<10} {}", format!("{name}:"), path.display());
        }
    }
}

fn print_summary(path: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let summary: RegressionSummary = serde_json::from_reader(file).context("Failed to parse summary")?;
    println!("\n{} ({}), n = {} of {} rows", summary.formula, summary.model, summary.n, summary.rows_before);
    println!("  Intercept: {:.6}", summary.params.intercept);
    println!("  Slope:     {:.6}", summary.params.slope);
    println!("  R2:        {:.6}", summary.r2);
    println!("  p (slope): {:.6}", summary.p_value_slope);
    println!("  RMSE:      {:.6}", summary.rmse);
    println!("  MAE:       {:.6}", summary.mae);
    Ok(())
}

fn inspect_raster(path: &Path) -> Result<()> {
    let pb = spinner("Reading raster...")?;
    let raster: Raster<f32> = read_geotiff(path).context("Failed to read raster")?;
    pb.finish_and_clear();

    let (rows, cols) = raster.shape();
    let bounds = raster.bounds();
    let stats = raster.statistics();

    println!("File: {}", path.display());
    println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
    println!("Cell size: {}", raster.cell_size());
    println!(
        "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        bounds.0, bounds.1, bounds.2, bounds.3
    );
    if let Some(crs) = raster.crs() {
        println!("CRS: {}", crs);
    }
    if let Some(nodata) = raster.nodata() {
        println!("NoData: {}", nodata);
    }
    println!("\nStatistics:");
    if let Some(min) = stats.min {
        println!("  Min: {:.4}", min);
    }
    if let Some(max) = stats.max {
        println!("  Max: {:.4}", max);
    }
    if let Some(mean) = stats.mean() {
        println!("  Mean: {:.4}", mean);
    }
    println!(
        "  Valid cells: {} ({:.1}%)",
        stats.valid_count,
        100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
    );
    Ok(())
}

fn inspect_datasets(config: &PipelineConfig) -> Result<()> {
    let pb = spinner("Reading datasets...")?;
    let samples = read_geojson(&config.samples)
        .with_context(|| format!("Failed to read samples {}", config.samples.display()))?;
    let regions = read_geojson(&config.regions)
        .with_context(|| format!("Failed to read regions {}", config.regions.display()))?;
    pb.finish_and_clear();

    for (label, fc, path) in [("Samples", &samples, &config.samples), ("Regions", &regions, &config.regions)] {
        println!("{}: {}", label, path.display());
        println!("  Features: {}", fc.len());
        match &fc.crs {
            Some(crs) => println!("  CRS: {}", crs),
            None => println!("  CRS: unknown"),
        }
        let fields: Vec<String> = fc.field_names().into_iter().collect();
        println!("  Fields: {}", fields.join(", "));
    }

    samples
        .require_fields(&[config.fields.sample_value.as_str()], "SAMPLES")
        .context("Samples dataset is unusable")?;
    let regions = Region::from_features(&regions, &config.fields.region_id, &config.fields.region_attribute)
        .context("Regions dataset is unusable")?;
    if let Some((x0, y0, x1, y1)) = total_bounds(&regions) {
        println!("\nGrid extent: ({:.6}, {:.6}) - ({:.6}, {:.6})", x0, y0, x1, y1);
    }
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;
    let config = load_config(&cli)?;
    let max_dim = config.max_dim;

    match cli.command {
        Commands::Interpolate { key } => {
            let pipeline = Pipeline::new(config);
            ensure(&pipeline, &key, &OutputRequest::raster().with_metadata())?;
        }

        Commands::Zonal { key } => {
            let pipeline = Pipeline::new(config);
            let paths = ensure(&pipeline, &key, &OutputRequest::raster().with_table())?;
            if let Some(path) = &paths.table {
                let table = read_region_table(File::open(path)?).context("Failed to read region table")?;
                println!("\nRegions: {} ({} with a mean)", table.len(), table.covered());
            }
        }

        Commands::Regress { key } => {
            let pipeline = Pipeline::new(config);
            let request = OutputRequest::raster().with_summary().with_residuals().with_regions();
            let paths = ensure(&pipeline, &key, &request)?;
            if let Some(path) = &paths.summary {
                print_summary(path)?;
            }
        }

        Commands::Ensure {
            key,
            metadata,
            table,
            summary,
            residuals,
            region_layer,
            preview,
            all,
        } => {
            let request = if all {
                OutputRequest::all(preview.unwrap_or(max_dim))
            } else {
                OutputRequest {
                    metadata,
                    table,
                    summary,
                    residuals,
                    regions: region_layer,
                    preview,
                }
            };
            let pipeline = Pipeline::new(config);
            ensure(&pipeline, &key, &request)?;
        }

        Commands::Warm {
            ks,
            cell,
            knn,
            raster_only,
        } => {
            let ks = if ks.is_empty() { default_warm_ks() } else { ks };
            let request = if raster_only {
                OutputRequest::raster().with_preview(max_dim)
            } else {
                OutputRequest::all(max_dim)
            };
            let pipeline = Pipeline::new(config);

            let pb = ProgressBar::new(ks.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{bar:40.green} {pos}/{len} {msg}")
                    .context("Invalid progress template")?,
            );
            let start = Instant::now();
            for &k in &ks {
                pb.set_message(format!("k = {k}"));
                let key = KeyArgs { k, cell, knn };
                pipeline
                    .ensure_outputs(&key.params(), &request)
                    .with_context(|| format!("Failed to warm k = {k}"))?;
                pb.inc(1);
            }
            pb.finish_and_clear();

            let counts = pipeline.counters().snapshot();
            info!(
                passes = counts.passes,
                rasters = counts.raster,
                tables = counts.table,
                previews = counts.preview,
                "warm complete"
            );
            println!("Warmed {} keys in {:.2?}", ks.len(), start.elapsed());
        }

        Commands::Inspect { raster } => match raster {
            Some(path) => inspect_raster(&path)?,
            None => inspect_datasets(&config)?,
        },
    }

    Ok(())
}
