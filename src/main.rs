//! Pneumonia CAM CLI
//!
//! Runs the explainable pneumonia screening pipeline on a single chest X-ray
//! and writes the report payload next to the heatmap overlay.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use pneumonia_cam::backend::{backend_name, default_device, GradientBackend};
use pneumonia_cam::utils::format_duration;
use pneumonia_cam::utils::logging::{init_logging, LogConfig, LogLevel};
use pneumonia_cam::{
    ConfidenceBand, DiagnosisClass, DiagnosisConfig, DiagnosisOutcome, DiagnosisRequest,
    DiagnosisService, ModelHost,
};

/// Explainable pneumonia screening for chest X-rays
///
/// Classifies a radiograph as Normal or Pneumonia with a frozen Burn CNN and
/// explains the decision with a Grad-CAM heatmap.
#[derive(Parser, Debug)]
#[command(name = "pneumonia_cam")]
#[command(version)]
#[command(about = "Explainable chest X-ray pneumonia screening with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long)]
    log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Diagnose a single chest X-ray (JPEG or PNG)
    Diagnose {
        /// Path to the input image
        #[arg(short, long)]
        image: PathBuf,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Model weights (overrides model.weights_path), without extension
        #[arg(short, long)]
        weights: Option<PathBuf>,

        /// Decision threshold on the Pneumonia probability (0.0-1.0)
        #[arg(short, long)]
        threshold: Option<f32>,

        /// Patient or study identifier shown in the report
        #[arg(long)]
        study_id: Option<String>,

        /// Directory for report.json and overlay.png
        #[arg(short, long, default_value = "output/report")]
        output_dir: PathBuf,
    },

    /// Write randomly initialized weights for smoke tests
    InitWeights {
        /// Output path for the record, without extension
        #[arg(short, long)]
        output: PathBuf,

        /// TOML configuration file (architecture section)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    ShowConfig {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };
    if let Some(level) = cli.log_level.as_deref() {
        log_config.level = LogLevel::parse(level);
    }

    let _ = init_logging(&log_config);

    match cli.command {
        Commands::Diagnose {
            image,
            config,
            weights,
            threshold,
            study_id,
            output_dir,
        } => {
            print_banner();
            let mut config = load_config(config.as_deref())?;
            if let Some(weights) = weights {
                config.model.weights_path = Some(weights);
            }
            cmd_diagnose(&config, &image, threshold, study_id, &output_dir)?;
        }

        Commands::InitWeights { output, config } => {
            print_banner();
            let config = load_config(config.as_deref())?;
            cmd_init_weights(&config, &output)?;
        }

        Commands::ShowConfig { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════════╗
 ║   🫁 Pneumonia CAM                                           ║
 ║   Explainable Chest X-ray Screening with Burn + Rust         ║
 ╚══════════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn load_config(path: Option<&Path>) -> Result<DiagnosisConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            Ok(DiagnosisConfig::load(path)?)
        }
        None => Ok(DiagnosisConfig::default()),
    }
}

fn cmd_diagnose(
    config: &DiagnosisConfig,
    image: &Path,
    threshold: Option<f32>,
    study_id: Option<String>,
    output_dir: &Path,
) -> Result<()> {
    println!("{}", "Diagnosis Configuration:".cyan().bold());
    println!("  📷 Image:     {}", image.display());
    println!(
        "  🧠 Weights:   {}",
        config
            .model
            .weights_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<not set>".to_string())
    );
    println!("  🖥️  Backend:   {}", backend_name());
    println!(
        "  ⚖️  Threshold: {:.2}",
        threshold.unwrap_or(config.decision.threshold)
    );
    println!();

    println!("{}", "Loading model...".cyan());
    let service = DiagnosisService::initialize(config)?;

    let bytes =
        fs::read(image).with_context(|| format!("Failed to read image {}", image.display()))?;

    let mut request = DiagnosisRequest::new(bytes);
    request.threshold = threshold;
    request.study_id = study_id;

    let outcome = service.diagnose(&request)?;
    print_outcome(&outcome);

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let report_path = output_dir.join("report.json");
    fs::write(&report_path, outcome.payload.to_json()?)?;

    let overlay_path = output_dir.join("overlay.png");
    fs::write(&overlay_path, &outcome.payload.overlay_png)?;

    println!();
    println!("{}", "Outputs:".cyan().bold());
    println!("  📄 {}", report_path.display());
    println!("  🖼️  {}", overlay_path.display());

    service.shutdown();
    Ok(())
}

fn print_outcome(outcome: &DiagnosisOutcome) {
    let record = outcome.record();
    let fields = &outcome.payload.fields;

    let label = match record.label() {
        DiagnosisClass::Pneumonia => fields.diagnosis.red().bold(),
        DiagnosisClass::Normal => fields.diagnosis.green().bold(),
    };
    let band = match record.confidence_band() {
        ConfidenceBand::High => record.confidence_band().to_string().green(),
        ConfidenceBand::Medium => record.confidence_band().to_string().yellow(),
        ConfidenceBand::Low => record.confidence_band().to_string().red(),
    };

    println!("{}", "Result:".cyan().bold());
    println!("  Diagnosis:   {}", label);
    println!("  Probability: {}", fields.probability);
    println!("  Confidence:  {}", band);
    println!("  Assessment:  {}", fields.assessment);
    println!("  Saliency:    {}", fields.saliency_note);
    println!("  Study ID:    {}", fields.study_id);
    println!(
        "  Time:        {}",
        format_duration(outcome.elapsed_ms / 1000.0)
    );
    println!();
    println!("{}", fields.disclaimer.dimmed());
}

fn cmd_init_weights(config: &DiagnosisConfig, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    println!("{}", "Writing randomly initialized weights...".cyan());
    ModelHost::<GradientBackend>::write_initial_weights(&config.model, output, &default_device())?;

    println!(
        "{} {} (untrained; for pipeline smoke tests only)",
        "Saved:".green().bold(),
        output.display()
    );
    Ok(())
}
