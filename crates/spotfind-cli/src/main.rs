//! spotfind CLI — locate blob-like features in an image and write them as JSON.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use ndarray::Array2;
use spotfind::{LocateConfig, Locator, RefineStrategy};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "spotfind")]
#[command(about = "Locate bright blob-like features in images with sub-pixel accuracy")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Locate features in an image.
    Locate(CliLocateArgs),

    /// Print a default configuration as JSON, ready to edit.
    DefaultConfig {
        /// Feature diameter in pixels (odd).
        #[arg(long, default_value = "9")]
        diameter: usize,
    },
}

#[derive(Debug, Clone, Args)]
struct CliLocateArgs {
    /// Path to the input image (any format the image crate reads).
    #[arg(long)]
    image: PathBuf,

    /// Path to write located features (JSON).
    #[arg(long)]
    out: PathBuf,

    /// Path to a configuration file (JSON). Command-line flags below
    /// override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Feature diameter in pixels (odd). Required unless --config is given.
    #[arg(long)]
    diameter: Option<usize>,

    /// Minimum integrated brightness.
    #[arg(long)]
    minmass: Option<f64>,

    /// Maximum radius of gyration.
    #[arg(long)]
    maxsize: Option<f64>,

    /// Minimum distance between feature centers (default: diameter + 1).
    #[arg(long)]
    separation: Option<usize>,

    /// Brightness percentile of nonzero pixels a local maximum must clear.
    #[arg(long)]
    percentile: Option<f64>,

    /// Keep only this many brightest features.
    #[arg(long)]
    topn: Option<usize>,

    /// Track dark features on a bright background.
    #[arg(long)]
    invert: bool,

    /// Skip size/eccentricity/signal characterization.
    #[arg(long)]
    no_characterize: bool,

    /// Refinement execution strategy.
    #[arg(long, value_enum, default_value_t = StrategyArg::Reference)]
    strategy: StrategyArg,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Reference,
    Fast2d,
}

impl StrategyArg {
    fn to_core(self) -> RefineStrategy {
        match self {
            Self::Reference => RefineStrategy::Reference,
            Self::Fast2d => RefineStrategy::Fast2d,
        }
    }
}

impl CliLocateArgs {
    fn to_config(&self) -> CliResult<LocateConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| -> CliError {
                    format!("failed to read config {}: {}", path.display(), e).into()
                })?;
                serde_json::from_str(&text)?
            }
            None => {
                let diameter = self
                    .diameter
                    .ok_or("either --diameter or --config is required")?;
                LocateConfig::from_diameter(diameter)
            }
        };

        if let Some(diameter) = self.diameter {
            config.diameter = diameter;
        }
        if let Some(minmass) = self.minmass {
            config.minmass = minmass;
        }
        if self.maxsize.is_some() {
            config.maxsize = self.maxsize;
        }
        if self.separation.is_some() {
            config.separation = self.separation;
        }
        if let Some(percentile) = self.percentile {
            config.percentile = percentile;
        }
        if self.topn.is_some() {
            config.topn = self.topn;
        }
        config.invert = self.invert;
        config.characterize = !self.no_characterize;
        config.strategy = self.strategy.to_core();
        // Images arrive as 8-bit grayscale.
        config.bit_depth = Some(8);
        Ok(config)
    }
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Locate(args) => run_locate(&args),
        Commands::DefaultConfig { diameter } => run_default_config(diameter),
    }
}

// ── default-config ──────────────────────────────────────────────────────

fn run_default_config(diameter: usize) -> CliResult<()> {
    let config = LocateConfig::from_diameter(diameter);
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

// ── locate ──────────────────────────────────────────────────────────────

fn run_locate(args: &CliLocateArgs) -> CliResult<()> {
    tracing::info!("Loading image: {}", args.image.display());

    let img = image::open(&args.image).map_err(|e| -> CliError {
        format!("Failed to open image {}: {}", args.image.display(), e).into()
    })?;
    let gray = img.to_luma8();
    let (w, h) = gray.dimensions();
    tracing::info!("Image size: {}x{}", w, h);

    let raw = Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
        gray.get_pixel(x as u32, y as u32).0[0] as f64
    })
    .into_dyn();

    let config = args.to_config()?;
    let locator = Locator::new(config);
    let table = locator.locate(&raw)?;

    tracing::info!("Located {} features", table.len());

    let json = serde_json::to_string_pretty(&table)?;
    std::fs::write(&args.out, &json)?;
    tracing::info!("Results written to {}", args.out.display());

    Ok(())
}
