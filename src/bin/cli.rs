//! Tripredict CLI - Command-line interface for triathlon race predictions

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use tripredict::core::consistency::ValidationReport;
use tripredict::data::{ArtifactSource, FsArtifactSource, ModelKind, ModelRepository};
use tripredict::error::validate_user_input;
use tripredict::models::{Confidence, DistanceCategory, Gender, PriorResult, RacePrediction, UserInput};
use tripredict::predictor::{EngineConfig, RacePredictor};

/// Default artifact directory (relative to project root)
const DEFAULT_MODEL_DIR: &str = "artifacts";

#[derive(Parser)]
#[command(name = "tripredict")]
#[command(author, version, about = "Triathlon race-time prediction CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding model and table artifacts
    #[arg(long, default_value = DEFAULT_MODEL_DIR, global = true)]
    model_dir: PathBuf,

    /// Fetch artifacts from this base URL instead of --model-dir
    #[cfg(feature = "remote")]
    #[arg(long, global = true)]
    model_base_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict swim, bike, run and total time for one race
    Predict {
        /// Distance: sprint, olympic, 70.3 or 140.6
        #[arg(short, long)]
        distance: DistanceCategory,

        #[command(flatten)]
        athlete: AthleteArgs,

        /// Print the prediction and validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the data tier and confidence an input would get
    Tier {
        #[command(flatten)]
        athlete: AthleteArgs,
    },

    /// Load and check every artifact
    ValidateArtifacts {
        /// Only check this distance (default: all)
        #[arg(short, long)]
        distance: Option<DistanceCategory>,
    },
}

#[derive(Args)]
struct AthleteArgs {
    /// Read the athlete profile from a JSON file; flags override its fields
    #[arg(long)]
    input: Option<PathBuf>,

    /// M or F
    #[arg(long)]
    gender: Option<Gender>,

    #[arg(long)]
    age: Option<u32>,

    /// Functional threshold power (W)
    #[arg(long)]
    ftp: Option<f64>,

    /// Body weight (kg)
    #[arg(long)]
    weight: Option<f64>,

    /// Critical swim speed as pace (seconds per 100 m)
    #[arg(long)]
    css: Option<f64>,

    /// Run threshold pace (seconds per km)
    #[arg(long)]
    threshold_pace: Option<f64>,

    /// Prior result as DISTANCE:SECONDS, e.g. olympic:9000 (repeatable)
    #[arg(long = "prior", value_parser = parse_prior)]
    priors: Vec<PriorResult>,
}

impl AthleteArgs {
    fn to_input(&self) -> Result<UserInput> {
        let mut input = match &self.input {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read input from {:?}", path))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("Failed to parse input from {:?}", path))?
            }
            None => UserInput::default(),
        };

        if self.gender.is_some() {
            input.gender = self.gender;
        }
        if self.age.is_some() {
            input.age = self.age;
        }
        if self.ftp.is_some() {
            input.ftp_watts = self.ftp;
        }
        if self.weight.is_some() {
            input.weight_kg = self.weight;
        }
        if self.css.is_some() {
            input.css_sec_per_100m = self.css;
        }
        if self.threshold_pace.is_some() {
            input.threshold_pace_sec_per_km = self.threshold_pace;
        }
        input.prior_results.extend(self.priors.iter().copied());

        validate_user_input(&input)?;
        Ok(input)
    }
}

fn parse_prior(raw: &str) -> std::result::Result<PriorResult, String> {
    let (distance, seconds) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected DISTANCE:SECONDS, got {}", raw))?;
    let distance = distance.parse::<DistanceCategory>()?;
    let finish_seconds = seconds
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid seconds {:?}: {}", seconds, e))?;
    Ok(PriorResult {
        distance,
        finish_seconds,
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Predict {
            distance,
            athlete,
            json,
        } => {
            let input = athlete.to_input()?;
            predict_race(artifact_source(&cli)?, *distance, &input, *json)?;
        }
        Commands::Tier { athlete } => show_tier(&athlete.to_input()?),
        Commands::ValidateArtifacts { distance } => {
            validate_artifacts(artifact_source(&cli)?, *distance)?;
        }
    }

    Ok(())
}

#[cfg(feature = "remote")]
fn artifact_source(cli: &Cli) -> Result<Arc<dyn ArtifactSource>> {
    use tripredict::data::{HttpArtifactSource, HttpSourceConfig};

    match &cli.model_base_url {
        Some(url) => {
            let source = HttpArtifactSource::new(url.clone(), HttpSourceConfig::default())
                .with_context(|| format!("Failed to create HTTP client for {}", url))?;
            Ok(Arc::new(source))
        }
        None => local_source(&cli.model_dir),
    }
}

#[cfg(not(feature = "remote"))]
fn artifact_source(cli: &Cli) -> Result<Arc<dyn ArtifactSource>> {
    local_source(&cli.model_dir)
}

fn local_source(model_dir: &Path) -> Result<Arc<dyn ArtifactSource>> {
    if !model_dir.is_dir() {
        bail!("Model directory {:?} does not exist", model_dir);
    }
    Ok(Arc::new(FsArtifactSource::new(model_dir)))
}

/// Format seconds as h:mm:ss
fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// Format a pace in seconds as m:ss
fn format_pace(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

fn confidence_label(confidence: Confidence) -> colored::ColoredString {
    match confidence {
        Confidence::High => confidence.to_string().green().bold(),
        Confidence::Moderate => confidence.to_string().yellow().bold(),
        Confidence::Low => confidence.to_string().red().bold(),
    }
}

fn predict_race(
    source: Arc<dyn ArtifactSource>,
    distance: DistanceCategory,
    input: &UserInput,
    json: bool,
) -> Result<()> {
    let repository = Arc::new(ModelRepository::new(source));
    let predictor = RacePredictor::new(repository, EngineConfig::default())?;
    let (prediction, report) = predictor
        .predict_with_validation(input, distance)
        .with_context(|| format!("Prediction for {} failed", distance))?;

    if json {
        let body = serde_json::json!({ "prediction": prediction, "validation": report });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    print_prediction(&prediction);
    print_validation(&report);
    Ok(())
}

fn print_prediction(prediction: &RacePrediction) {
    println!(
        "{}: {} ({}, confidence {})",
        "Prediction".green(),
        prediction.distance,
        prediction.tier,
        confidence_label(prediction.confidence)
    );
    println!();

    println!("{}", "Segments:".yellow().bold());
    println!("{:<6} {:>10}  {}", "", "time", "detail");
    println!("{}", "-".repeat(50));
    println!(
        "{:<6} {:>10}  {}/100m",
        "Swim",
        format_duration(prediction.swim.seconds),
        format_pace(prediction.swim.pace_per_100m)
    );
    println!(
        "{:<6} {:>10}",
        "T1",
        format_duration(prediction.transitions.t1)
    );
    println!(
        "{:<6} {:>10}  {:.0} W avg, {:.0} W NP, IF {:.2}",
        "Bike",
        format_duration(prediction.bike.seconds),
        prediction.bike.avg_watts,
        prediction.bike.normalized_watts,
        prediction.bike.intensity_factor
    );
    println!(
        "{:<6} {:>10}",
        "T2",
        format_duration(prediction.transitions.t2)
    );
    println!(
        "{:<6} {:>10}  {}/km, {}/mi",
        "Run",
        format_duration(prediction.run.seconds),
        format_pace(prediction.run.pace_per_km),
        format_pace(prediction.run.pace_per_mile)
    );
    println!("{}", "-".repeat(50));
    println!(
        "{:<6} {:>10}",
        "Total".bold(),
        format_duration(prediction.total_seconds).bold()
    );
    println!();

    println!("{}", "Finish time range:".yellow().bold());
    let q = &prediction.quantiles;
    for (label, value) in [
        ("p05", q.p05),
        ("p25", q.p25),
        ("p50", q.p50),
        ("p75", q.p75),
        ("p95", q.p95),
    ] {
        println!("  {} {:>10}", label, format_duration(value));
    }
    println!();
    println!(
        "{}",
        format!("model version {}", prediction.model_version).dimmed()
    );
}

fn print_validation(report: &ValidationReport) {
    if report.valid {
        println!("{}", "Consistency checks passed".green());
        return;
    }
    println!("{}", "Consistency warnings:".yellow().bold());
    for warning in &report.warnings {
        println!("  {} {}", "!".yellow(), warning);
    }
}

fn show_tier(input: &UserInput) {
    let tier = tripredict::core::classify(input);
    let confidence = Confidence::from_tier(tier);
    println!(
        "{}: {} ({})",
        "Data tier".green(),
        tier,
        confidence_label(confidence)
    );
    if tier.level() < 3 {
        println!(
            "{}",
            "Adding FTP, CSS or threshold pace raises confidence to high.".dimmed()
        );
    }
}

fn validate_artifacts(
    source: Arc<dyn ArtifactSource>,
    distance: Option<DistanceCategory>,
) -> Result<()> {
    println!("{} {}", "Checking artifacts in".green(), source.describe());
    println!();

    let repository = ModelRepository::new(source);
    let mut failures = 0usize;

    let tables: [(&str, Result<()>); 3] = [
        (
            "imputation tables",
            repository.imputation_tables().map(|_| ()).map_err(Into::into),
        ),
        (
            "feature config",
            repository.feature_config().map(|_| ()).map_err(Into::into),
        ),
        (
            "model metadata",
            repository.metadata().map(|_| ()).map_err(Into::into),
        ),
    ];
    for (label, result) in tables {
        match result {
            Ok(()) => println!("  {} {}", "ok".green(), label),
            Err(e) => {
                failures += 1;
                println!("  {} {}: {}", "FAIL".red().bold(), label, e);
            }
        }
    }

    let distances = match distance {
        Some(d) => vec![d],
        None => DistanceCategory::ALL.to_vec(),
    };
    for distance in distances {
        println!();
        println!("{}", format!("{}:", distance).yellow().bold());
        for kind in ModelKind::ALL {
            match repository.ensemble(kind, distance) {
                Ok(model) => println!(
                    "  {} {:<14} {:>4} trees, depth {:>2}, {:>2} features",
                    "ok".green(),
                    kind.key(),
                    model.n_trees(),
                    model.max_depth(),
                    model.num_features()
                ),
                Err(e) => {
                    failures += 1;
                    println!("  {} {:<14} {}", "FAIL".red().bold(), kind.key(), e);
                }
            }
        }
    }

    println!();
    if failures > 0 {
        bail!("{} artifact(s) failed to load", failures);
    }
    println!("{}", "All artifacts loaded".green().bold());
    Ok(())
}
