use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use equalizer::{equalize, BackendKind, EqualizerConfig, GrayImage};

#[derive(Parser, Debug)]
#[command(name = "equalize")]
#[command(version, about = "Histogram equalization of 8-bit grayscale images", long_about = None)]
struct Cli {
    /// Input image file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output image file [default: <INPUT stem>_out.<ext>]
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Compute backend
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// YAML or JSON configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the histogram, cumulative histogram and lookup table
    #[arg(long)]
    print_tables: bool,

    /// Skip the host-side invariant checks
    #[arg(long)]
    no_verify: bool,

    /// Log filter, e.g. "debug" or "equalizer=trace"
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Config file values with command-line flags applied on top.
    fn config(&self) -> anyhow::Result<EqualizerConfig> {
        let mut config = match &self.config {
            Some(path) => EqualizerConfig::read_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => EqualizerConfig::default(),
        };

        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if self.print_tables {
            config.print_tables = true;
        }
        if self.no_verify {
            config.verify = false;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }

        Ok(config)
    }

    fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| default_output_path(&self.input))
    }
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let mut name = format!("{}_out", stem);
    if let Some(extension) = input.extension() {
        name.push('.');
        name.push_str(&extension.to_string_lossy());
    }

    input.with_file_name(name)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.config()?;
    let _logger = common::setup_logging(&config.log_level).context("failed to start logging")?;

    let image = GrayImage::read_file(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;
    log::info!(
        "Loaded {} ({}x{})",
        cli.input.display(),
        image.width(),
        image.height()
    );

    let result = equalize(&image, &config).context("equalization failed")?;
    log::info!("Stage timings: {}", result.timings);

    if config.print_tables {
        println!("H:   {}\n", result.histogram);
        println!("CH:  {}\n", result.cumulative);
        println!("LUT: {}\n", result.lut);
    }

    let output = cli.output_path();
    result
        .image
        .save_file(&output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    log::info!("Saved {}", output.display());

    Ok(())
}
