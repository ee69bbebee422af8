use std::fs;
use std::path::{Path, PathBuf};

use adforge_contracts::brand::BrandOverrides;
use adforge_contracts::config::EngineConfig;
use adforge_contracts::events::EventWriter;
use adforge_contracts::runs::summary::write_summary;
use adforge_contracts::CreativeError;
use adforge_engine::{CreativeRequest, Orchestrator};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{info, warn};
use serde_json::{json, Map};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "adforge", version, about = "Ad creative generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate image+caption creatives from a logo and a product photo.
    Generate(GenerateArgs),
    /// Print the configuration report and exit non-zero when not runnable.
    CheckConfig,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    logo: PathBuf,
    #[arg(long)]
    product: PathBuf,
    #[arg(long)]
    brand: Option<String>,
    #[arg(long = "product-name")]
    product_name: Option<String>,
    #[arg(long, default_value = ".")]
    out: PathBuf,
    #[arg(long)]
    units: Option<usize>,
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long)]
    rich_prompts: bool,
    #[arg(long)]
    events: Option<PathBuf>,
}

fn main() {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(Env::default().default_filter_or("info"));
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("adforge error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::CheckConfig => run_check_config(),
    }
}

fn run_check_config() -> Result<i32> {
    let report = EngineConfig::from_env().validate();
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(if report.is_runnable() { 0 } else { 2 })
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let mut config = EngineConfig::from_env();
    if let Some(units) = args.units {
        config.units = units.clamp(1, 50);
    }
    if let Some(workers) = args.workers {
        config.workers = workers.clamp(1, 16);
    }
    if args.rich_prompts {
        config.rich_prompts = true;
    }

    let report = config.validate();
    for problem in report.problems() {
        warn!("config: {problem}");
    }
    if !report.is_runnable() {
        bail!("image edit service is not configured (run `adforge check-config`)");
    }

    let request = CreativeRequest {
        logo: read_image(&args.logo, "logo")?,
        product: read_image(&args.product, "product")?,
        overrides: BrandOverrides::new(args.brand, args.product_name),
        units: None,
    };
    let events = args
        .events
        .as_ref()
        .map(|path| EventWriter::new(path, Uuid::new_v4().to_string()));

    let orchestrator = Orchestrator::from_config(&config)?.with_events(events);
    let archive = match orchestrator.run(&request) {
        Ok(archive) => archive,
        Err(CreativeError::AllUnitsFailed { requested, reasons }) => {
            for reason in &reasons {
                warn!("{reason}");
            }
            bail!("all {requested} creative units failed");
        }
        Err(err) => return Err(err.into()),
    };

    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    let archive_path = args.out.join(&archive.file_name);
    fs::write(&archive_path, &archive.bytes)
        .with_context(|| format!("failed to write {}", archive_path.display()))?;

    let digest = hex::encode(Sha256::digest(&archive.bytes));
    let mut extra = Map::new();
    extra.insert("brand".to_string(), json!(archive.brand));
    write_summary(
        &args.out.join("summary.json"),
        &archive.summary(Some(digest)),
        Some(&extra),
    )?;

    info!(
        "{} of {} creatives written",
        archive.succeeded, archive.requested
    );
    println!("{}", archive_path.display());
    Ok(0)
}

fn read_image(path: &Path, label: &str) -> Result<Vec<u8>> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read {label} {}", path.display()))?;
    if bytes.is_empty() {
        bail!("{label} image is empty: {}", path.display());
    }
    Ok(bytes)
}
